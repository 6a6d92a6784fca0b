//! Video sub-instruction set, reached through `drawOperations`
//!
//! Lines are tagged `(D)`. Most operations are plain field lists; the
//! multi-animation loader also walks the referenced extension item, since
//! the number of script bytes it consumes depends on that blob.

use crate::block::run_handler;
use crate::context::DecodeContext;
use crate::cursor::ByteCursor;
use crate::error::{DecompileError, Result};
use crate::expression::{read_expr, read_var_index};
use crate::opcode_tables::{call, op, Delegate, OpHandler, Operand};
use log::debug;

use Operand::{Expr as E, VarIndex as V, U16 as W, U8 as B};

pub const VIDEO_PREFIX: &str = "(D) ";

/// Item ids of multi-animations are biased by this value
const MULT_ID_BASE: i32 = 30000;
const MAP_OBJECTS_INLINE_LIMIT: u16 = 65520;

pub(crate) const VIDEO_OPS: &[(u8, OpHandler)] = &[
    (0x00, call("o2_loadMult", Delegate::LoadMult)),
    (0x01, call("o2_playMult", Delegate::PlayMult)),
    (0x02, op("o2_freeMultKeys", &[W])),
    (0x07, op("o1_initCursor", &[V, V, W, W, W])),
    (0x08, op("o1_initCursorAnim", &[E, W, W, W])),
    (0x09, op("o1_clearCursorAnim", &[E])),
    (0x0A, op("o2_setRenderFlags", &[E])),
    (0x10, call("o1_loadAnim", Delegate::LoadAnim)),
    (0x11, op("o1_freeAnim", &[E])),
    (0x12, op("o1_updateAnim", &[E, E, E, E, E, W])),
    (0x13, op("o2_multSub", &[E, E, E, E, E])),
    (0x14, op("o2_initMult", &[W, W, W, W, W, V, V, V])),
    (0x15, op("o1_freeMult", &[])),
    (0x16, op("o1_animate", &[])),
    (0x17, call("o2_loadMultObject", Delegate::LoadMultObject)),
    (0x18, op("o1_getAnimLayerInfo", &[E, E, V, V, V, V])),
    (0x19, op("o1_getObjAnimSize", &[E, V, V, V, V])),
    (0x1A, call("o1_loadStatic", Delegate::LoadStatic)),
    (0x1B, op("o1_freeStatic", &[E])),
    (0x1C, op("o2_renderStatic", &[E, E])),
    (0x1D, op("o2_loadCurLayer", &[E, E])),
    (0x20, op("o2_playCDTrack", &[E])),
    (0x22, op("o2_stopCD", &[])),
    (0x23, op("o2_readLIC", &[E])),
    (0x24, op("o2_freeLIC", &[])),
    (0x25, op("o2_getCDTrackPos", &[V, V])),
    (0x30, op("o2_loadFontToSprite", &[W, W, W, W, W])),
    (0x31, op("o1_freeFontToSprite", &[W])),
    (0x40, call("o2_totSub", Delegate::TotSub)),
    (0x41, op("o2_switchTotSub", &[W, W])),
    (0x42, call("o2_pushVars", Delegate::PushVars)),
    (0x43, call("o2_popVars", Delegate::PopVars)),
    (0x50, call("o2_loadMapObjects", Delegate::LoadMapObjects)),
    (0x51, op("o2_freeGoblins", &[])),
    (0x52, op("o2_moveGoblin", &[E, E, E])),
    (0x53, op("o2_writeGoblinPos", &[V, V, E])),
    (0x54, op("o2_stopGoblin", &[E])),
    (0x55, op("o2_setGoblinState", &[E, E, E])),
    (0x56, op("o2_placeGoblin", &[E, E, E, E])),
    (0x80, op("o2_initScreen", &[B, B, E, E])),
    (0x81, op("o2_scroll", &[E, E, E, E, E, E])),
    (0x82, op("o2_setScrollOffset", &[E, E])),
    (0x83, op("o2_playImd", &[E, E, E, E, E, E, E, E, E])),
    (0x84, op("o2_getImdInfo", &[E, V, V, V, V, V])),
    (0x85, op("o2_openItk", &[E])),
    (0x86, op("o2_closeItk", &[])),
];

pub fn draw_operations(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    let code = cur.read_u8()?;
    let handler = *ctx
        .sets
        .video
        .get(code)
        .ok_or(DecompileError::MissingVideoOp(code))?;
    run_handler(ctx, cur, &handler, VIDEO_PREFIX)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn count(blob: &mut ByteCursor) -> Result<usize> {
    Ok(blob.read_i16()?.max(0) as usize)
}

/// Multi-animation loader
///
/// Each static and animation record of the blob has an inline expression
/// plus layer tables in the script; each keyframe with command 1, 3 or 4
/// carries extra script words.
pub fn load_mult(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let mut id = cur.read_u16()?;
    if id & 0x8000 != 0 {
        id &= 0x7FFF;
        cur.skip(1)?;
    }

    let data = ctx.ext_item(id as i32 - MULT_ID_BASE)?;
    let mut blob = ByteCursor::new(&data);

    let statics = blob.read_u8()?.wrapping_add(1);
    let has_imds = statics & 0x80 != 0;
    let statics = statics & 0x7F;
    let anims = blob.read_u8()?.wrapping_add(1);
    debug!(
        "mult {}: {} statics, {} anims, imds {}",
        id, statics, anims, has_imds
    );

    for _ in 0..statics {
        read_expr(cur)?;
        let layers = cur.read_u16()? as usize;
        cur.skip(layers * 2)?;
        let frames = cur.read_u16()? as usize;
        cur.skip(2 + frames * 8)?;
        blob.skip(14)?;
    }

    for _ in 0..anims {
        read_expr(cur)?;
        let frames = cur.read_u16()? as usize;
        cur.skip(2 + frames * 8)?;
        blob.skip(14)?;
    }

    blob.skip(2)?;
    let n = count(&mut blob)?;
    blob.skip(n * 4)?;
    for _ in 0..4 {
        let n = count(&mut blob)?;
        blob.skip(n * 10)?;
    }
    blob.skip(5 * 16 * 3)?;
    let n = count(&mut blob)?;
    blob.skip(n * 7)?;
    let n = count(&mut blob)?;
    blob.skip(n * 80)?;
    let n = count(&mut blob)?;
    blob.skip(n * if has_imds { 4 } else { 28 })?;

    let keys = count(&mut blob)?;
    let key_size = if has_imds { 12 } else { 36 };
    for _ in 0..keys {
        blob.skip(2)?;
        let cmd = blob.read_i16()?;
        blob.seek_relative(-4)?;
        match cmd {
            1 | 4 => cur.skip(2)?,
            3 => cur.skip(4)?,
            _ => {}
        }
        blob.skip(key_size)?;
    }

    if has_imds {
        let n = cur.read_u16()? as usize;
        cur.skip(n * 2)?;
        if ctx.version >= 51 {
            let n = cur.read_u16()? as usize;
            cur.skip(n * 14)?;
        }
    }

    ctx.emit_op(label, &[id.to_string()]);
    Ok(())
}

pub fn play_mult(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let data = cur.read_u16()?;
    ctx.emit_op(label, &[(data >> 1).to_string(), (data & 1).to_string()]);
    Ok(())
}

pub fn load_anim(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let anim = read_expr(cur)?;
    let layers = cur.read_u16()?;
    let frames = cur.read_u16()?;
    let layer_data = cur.read_exact(layers as usize * 8)?;
    let mut operands = vec![anim, layers.to_string(), frames.to_string()];
    if !layer_data.is_empty() {
        operands.push(hex(layer_data));
    }
    ctx.emit_op(label, &operands);
    Ok(())
}

pub fn load_static(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let index = read_expr(cur)?;
    let layers = cur.read_u16()?;
    cur.skip(layers as usize * 2)?;
    let frames = cur.read_u16()?;
    let unknown = cur.read_u16()?;
    cur.skip(frames as usize * 8)?;
    ctx.emit_op(
        label,
        &[
            index,
            layers.to_string(),
            frames.to_string(),
            unknown.to_string(),
        ],
    );
    Ok(())
}

pub fn load_map_objects(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let var = read_var_index(cur)?;
    let id = cur.read_u16()?;
    let mut objects = Vec::new();
    if id < MAP_OBJECTS_INLINE_LIMIT {
        let n = cur.read_u16()?;
        for _ in 0..n {
            objects.push(cur.read_u16()?.to_string());
        }
    }
    ctx.emit_op(
        label,
        &[var, id.to_string(), format!("[{}]", objects.join(", "))],
    );
    Ok(())
}

const MULT_OBJECT_FIELDS: [&str; 11] = [
    "animation",
    "layer",
    "frame",
    "animType",
    "order",
    "isPaused",
    "isStatic",
    "maxTick",
    "maxFrame",
    "newLayer",
    "newAnimation",
];

pub fn load_mult_object(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let mut operands = Vec::with_capacity(3 + MULT_OBJECT_FIELDS.len());
    for _ in 0..3 {
        operands.push(read_expr(cur)?);
    }
    for field in MULT_OBJECT_FIELDS {
        operands.push(format!("{}={}", field, read_expr(cur)?));
    }
    ctx.emit_op(label, &operands);
    Ok(())
}

pub fn tot_sub(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let length = cur.read_u8()?;
    let name = if length & 0x80 != 0 {
        read_expr(cur)?
    } else {
        let bytes = cur.read_exact(length as usize)?;
        format!("\"{}\"", String::from_utf8_lossy(bytes))
    };
    let flags = cur.read_u8()?;
    ctx.emit_op(label, &[name, flags.to_string()]);
    Ok(())
}

pub fn push_vars(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let n = cur.read_u8()?;
    let mut operands = Vec::with_capacity(n as usize);
    for _ in 0..n {
        if matches!(cur.peek_u8()?, 25 | 28) {
            let var = read_var_index(cur)?;
            cur.skip(1)?;
            operands.push(format!("{}:animDataSize", var));
        } else {
            operands.push(format!("{}:4", read_expr(cur)?));
        }
    }
    ctx.emit_op(label, &operands);
    Ok(())
}

pub fn pop_vars(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let n = cur.read_u8()?;
    let operands = (0..n)
        .map(|_| read_var_index(cur))
        .collect::<Result<Vec<_>>>()?;
    ctx.emit_op(label, &operands);
    Ok(())
}
