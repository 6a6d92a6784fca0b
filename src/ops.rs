//! Operations of the main instruction set whose operand layout is not a
//! plain list of fields

use crate::context::{DecodeContext, CODE_BASE};
use crate::cursor::ByteCursor;
use crate::error::{DecompileError, Result};
use crate::expression::{read_expr, read_var_index, END_EXPR, LVALUE_TOKENS};
use crate::texts::cp437_char;
use log::debug;

const TEXT_END: u8 = 200;
const TEXT_INSERT: u8 = b'.';
const NAMED_SOUND: u16 = 0xFFFF;

pub fn call_sub(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let offset = cur.read_u16()?;
    ctx.emit_op(label, &[offset.to_string()]);
    ctx.functions.push(offset as usize);
    Ok(())
}

pub fn print_tot_text(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let id = cur.read_u16()?;
    let hint = ctx.text_hint(id);
    ctx.emit_op(label, &[id.to_string(), "//".to_string(), hint]);
    Ok(())
}

pub fn assign(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    let dest = read_var_index(cur)?;
    let value = read_expr(cur)?;
    ctx.emit(&format!("{} = {}", dest, value));
    Ok(())
}

/// Assignment that may also fill consecutive array slots
pub fn assign_v2(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    let dest = read_var_index(cur)?;
    if cur.peek_u8()? == END_EXPR {
        cur.skip(1)?;
        let count = cur.read_u8()?;
        let values = (0..count)
            .map(|_| read_expr(cur))
            .collect::<Result<Vec<_>>>()?;
        ctx.emit(&format!("{} = [{}]", dest, values.join(", ")));
    } else {
        let value = read_expr(cur)?;
        ctx.emit(&format!("{} = {}", dest, value));
    }
    Ok(())
}

pub fn load_sprite_to_pos(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let slot = cur.read_u16()?.to_string();
    let left = read_expr(cur)?;
    let top = read_expr(cur)?;
    let transparency = cur.read_u8()?.to_string();
    cur.skip(1)?;
    ctx.emit_op(label, &[slot, left, top, transparency]);
    Ok(())
}

fn read_print_params(cur: &mut ByteCursor) -> Result<Vec<String>> {
    (0..5).map(|_| read_expr(cur)).collect()
}

/// Inline text up to a variable insert or the end marker
///
/// Returns the text and whether an insert (`.` then an optional lvalue and
/// one format byte) followed it.
fn read_text_run(cur: &mut ByteCursor) -> Result<(String, Option<String>)> {
    let mut text = String::new();
    loop {
        let b = cur.peek_u8()?;
        if b == TEXT_INSERT || b == TEXT_END {
            break;
        }
        text.push(cp437_char(b));
        cur.skip(1)?;
    }

    if cur.peek_u8()? == TEXT_END {
        return Ok((text, None));
    }
    cur.skip(1)?;
    let insert = if LVALUE_TOKENS.contains(&cur.peek_u8()?) {
        read_var_index(cur)?
    } else {
        String::new()
    };
    cur.skip(1)?;
    Ok((text, Some(insert)))
}

/// Five placement expressions, then quoted text runs each as its own operand
pub fn print_text(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let mut params = read_print_params(cur)?;
    while cur.peek_u8()? != TEXT_END {
        let (text, insert) = read_text_run(cur)?;
        match insert {
            Some(var) => params.push(format!("\"{}\" {}", text, var)),
            None => params.push(format!("\"{}\"", text)),
        }
    }
    cur.skip(1)?;
    ctx.emit_op(label, &params);
    Ok(())
}

/// Same layout, rendered as one continuous string
pub fn print_text_v2(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let params = read_print_params(cur)?;
    let mut text = String::from(" \"");
    loop {
        let (run, insert) = read_text_run(cur)?;
        text.push_str(&run);
        match insert {
            Some(var) => {
                text.push_str("\" ");
                text.push_str(&var);
            }
            None => text.push('"'),
        }
        if cur.peek_u8()? == TEXT_END {
            break;
        }
    }
    cur.skip(1)?;
    ctx.emit_op(label, &[params.join(" ") + &text]);
    Ok(())
}

fn ascii_name(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect()
}

/// Length byte; bit 7 selects an expression instead of an inline name
pub fn load_tot(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let size = cur.read_u8()?;
    let name = if size & 0x80 == 0 {
        ascii_name(cur.read_exact(size as usize)?)
    } else {
        read_expr(cur)?
    };
    ctx.emit_op(label, &[name]);
    Ok(())
}

fn palette_skip(mode: u8) -> Option<usize> {
    match mode {
        48 | 52 => Some(48),
        49 => Some(18),
        50 => Some(16),
        51 | 53 | 55 => Some(2),
        54 => Some(0),
        61 => Some(4),
        _ => None,
    }
}

pub fn pal_load(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let sub = cur.read_u8()?;
    let mode = sub & 0x7F;
    ctx.emit_op(label, &[((sub & 0x80 != 0) as u8).to_string(), mode.to_string()]);
    let skip = palette_skip(mode).ok_or(DecompileError::UnknownPaletteMode(mode))?;
    cur.skip(skip)
}

/// Restart the instruction counter of the enclosing block
pub fn set_cmd_count(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let count = cur.read_u8()?;
    ctx.cmd_count = count as usize;
    ctx.counter = 0;
    ctx.emit_op(label, &[count.to_string()]);
    Ok(())
}

pub fn load_sound(
    ctx: &mut DecodeContext,
    cur: &mut ByteCursor,
    label: &str,
    print_id: bool,
) -> Result<()> {
    let slot = read_expr(cur)?;
    let id = cur.read_u16()?;
    if id != NAMED_SOUND {
        ctx.emit_op(label, &[slot, id.to_string()]);
        return Ok(());
    }

    let name = format!("\"{}\"", ascii_name(cur.read_exact(9)?));
    if print_id {
        ctx.emit_op(label, &[slot, id.to_string(), name]);
    } else {
        ctx.emit_op(label, &[slot, name]);
    }
    Ok(())
}

pub fn get_tot_text_item_part(
    ctx: &mut DecodeContext,
    cur: &mut ByteCursor,
    label: &str,
) -> Result<()> {
    let id = cur.read_u16()?;
    let dest = read_var_index(cur)?;
    let part = read_expr(cur)?;
    let hint = ctx.text_hint(id);
    ctx.emit(&format!("{} = {} {} {} // {}", dest, label, id, part, hint));
    Ok(())
}

pub fn istrlen(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    if cur.peek_u8()? == 0x80 {
        debug!("istrlen with 0x80 prefix at {}", CODE_BASE + cur.position());
        cur.skip(1)?;
    }
    let string = read_var_index(cur)?;
    let length = read_var_index(cur)?;
    ctx.emit_op(label, &[string, length]);
    Ok(())
}
