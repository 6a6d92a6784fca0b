//! Block framing, opcode dispatch and control constructs
//!
//! A script is a sequence of framed blocks. Code blocks (type 1) carry an
//! instruction count and a declared byte size that must agree with what
//! decoding actually consumed. Hotspot blocks (type 2) list mouse regions
//! whose handlers are themselves nested blocks.

use crate::context::{DecodeContext, CODE_BASE};
use crate::cursor::ByteCursor;
use crate::error::{DecompileError, Result};
use crate::expression::{read_expr, read_var_index};
use crate::goblin_ops;
use crate::opcode_tables::{unpack_opcode, Delegate, OpHandler, Operand};
use crate::ops;
use crate::video_ops;
use log::{debug, warn};

pub const CODE_BLOCK: u8 = 1;
pub const HOTSPOT_BLOCK: u8 = 2;

const SWITCH_END: u8 = 251;
const ELSE_MARKER: u8 = 12;
const DEFAULT_MARKER: u8 = 4;

/// How the enclosing construct entered a block; only reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnContext {
    Branch,
    Loop,
    Handler,
}

/// Decode one framed block starting at the cursor
pub fn decode_block(
    ctx: &mut DecodeContext,
    cur: &mut ByteCursor,
    ret: ReturnContext,
) -> Result<()> {
    let start = cur.position();
    let block_type = cur.read_u8()?;
    let count = cur.read_u8()?;
    debug!(
        "block type {} with {} entries at {} ({:?})",
        block_type,
        count,
        CODE_BASE + start,
        ret
    );

    match block_type {
        CODE_BLOCK => decode_code_block(ctx, cur, start, count as usize),
        HOTSPOT_BLOCK => decode_hotspot_block(ctx, cur, count as usize),
        _ => Err(DecompileError::InvalidBlockType {
            offset: start,
            block_type,
        }),
    }
}

fn decode_code_block(
    ctx: &mut DecodeContext,
    cur: &mut ByteCursor,
    start: usize,
    count: usize,
) -> Result<()> {
    let size = cur.read_u16()? as usize;
    let expected = size + 2;
    if count == 0 {
        return cur.seek(start + expected);
    }

    let saved = (ctx.cmd_count, ctx.counter);
    ctx.cmd_count = count;
    ctx.counter = 0;
    ctx.indent();
    let result = decode_instructions(ctx, cur);
    ctx.dedent();
    (ctx.cmd_count, ctx.counter) = saved;
    result?;

    let consumed = cur.position() - start;
    if consumed > expected {
        return Err(DecompileError::BlockSizeMismatch {
            expected,
            actual: consumed,
        });
    }
    if consumed < expected {
        let residue = expected - consumed;
        warn!(
            "skipping {} trailing bytes of block at {}",
            residue,
            CODE_BASE + start
        );
        cur.skip(residue)?;
    }
    Ok(())
}

fn decode_instructions(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    while ctx.counter < ctx.cmd_count {
        let raw = cur.read_u8()?;
        ctx.counter += 1;

        let packed = unpack_opcode(raw);
        let handler = *ctx
            .table
            .get(packed.dense)
            .ok_or(DecompileError::MissingOpcode {
                raw,
                dense: packed.dense,
            })?;
        ctx.mark(cur.position());
        run_handler(ctx, cur, &handler, "")?;
    }
    Ok(())
}

fn decode_hotspot_block(ctx: &mut DecodeContext, cur: &mut ByteCursor, count: usize) -> Result<()> {
    ctx.indent();
    ctx.emit("hotspot {");
    let header = cur.read_exact(6)?;
    debug!(
        "hotspot header: mouse {} duration {} leave {} index {} {} recalc {}",
        header[0], header[1], header[2], header[3], header[4], header[5]
    );

    ctx.indent();
    for _ in 0..count {
        decode_hotspot(ctx, cur)?;
    }
    ctx.dedent();

    ctx.mark(cur.position());
    ctx.emit("}");
    ctx.dedent();
    Ok(())
}

fn decode_hotspot(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    ctx.mark(cur.position());
    let mut kind = cur.read_u8()?;
    if kind & 0x40 != 0 {
        kind -= 0x40;
        cur.skip(1)?;
    }

    let mut line = String::from("hotspot");
    for _ in 0..4 {
        let value = if kind & 0x80 != 0 {
            read_expr(cur)?
        } else {
            cur.read_u16()?.to_string()
        };
        line.push(' ');
        line.push_str(&value);
    }
    let kind = kind & 0x7F;
    line.insert_str("hotspot".len(), &format!(" {}", kind));

    match kind {
        11 | 12 => {
            ctx.emit(&line);
            cur.skip(6)?;
            decode_block(ctx, cur, ReturnContext::Handler)
        }
        0 | 1 => {
            ctx.emit(&line);
            cur.skip(6)?;
            decode_block(ctx, cur, ReturnContext::Handler)?;
            decode_block(ctx, cur, ReturnContext::Handler)
        }
        3..=10 => {
            let key = read_var_index(cur)?;
            let font = cur.read_u16()?;
            let colors = cur.read_exact(2)?;
            line.push_str(&format!(
                " input {} font {} colors {} {}",
                key, font, colors[0], colors[1]
            ));
            ctx.emit(&line);
            if (5..=8).contains(&kind) {
                let len = cur.read_u16()? as usize;
                cur.skip(len)?;
            }
            if kind & 1 == 0 {
                decode_block(ctx, cur, ReturnContext::Handler)?;
            }
            Ok(())
        }
        2 | 20 | 21 => {
            let key = cur.read_u16()?;
            let ids = cur.read_u16()?;
            let flags = cur.read_u16()?;
            line.push_str(&format!(" key {} ids {} flags {}", key, ids, flags));
            ctx.emit(&line);
            decode_block(ctx, cur, ReturnContext::Handler)
        }
        _ => {
            warn!("unknown hotspot type {} at {}", kind, CODE_BASE + cur.position());
            ctx.emit(&line);
            Ok(())
        }
    }
}

pub(crate) fn read_operand(cur: &mut ByteCursor, operand: Operand) -> Result<String> {
    Ok(match operand {
        Operand::Expr => read_expr(cur)?,
        Operand::VarIndex => read_var_index(cur)?,
        Operand::U8 => cur.read_u8()?.to_string(),
        Operand::U16 => cur.read_u16()?.to_string(),
    })
}

/// Run one table entry; `prefix` tags lines of the sub-instruction sets
pub(crate) fn run_handler(
    ctx: &mut DecodeContext,
    cur: &mut ByteCursor,
    handler: &OpHandler,
    prefix: &str,
) -> Result<()> {
    match *handler {
        OpHandler::NotYetSupported(name) => Err(DecompileError::NotYetSupported(name.to_string())),
        OpHandler::Fixed(name, operands) => {
            let values = operands
                .iter()
                .map(|&operand| read_operand(cur, operand))
                .collect::<Result<Vec<_>>>()?;
            ctx.emit_op(&format!("{}{}", prefix, name), &values);
            Ok(())
        }
        OpHandler::Delegate(name, delegate) => {
            let label = format!("{}{}", prefix, name);
            run_delegate(ctx, cur, &label, delegate)
        }
    }
}

fn run_delegate(
    ctx: &mut DecodeContext,
    cur: &mut ByteCursor,
    label: &str,
    delegate: Delegate,
) -> Result<()> {
    match delegate {
        Delegate::Switch => switch(ctx, cur),
        Delegate::RepeatUntil => repeat_until(ctx, cur),
        Delegate::WhileDo => while_do(ctx, cur),
        Delegate::If => if_else(ctx, cur),
        Delegate::CallSub => ops::call_sub(ctx, cur, label),
        Delegate::PrintTotText => ops::print_tot_text(ctx, cur, label),
        Delegate::AssignV1 => ops::assign(ctx, cur),
        Delegate::AssignV2 => ops::assign_v2(ctx, cur),
        Delegate::LoadSpriteToPos => ops::load_sprite_to_pos(ctx, cur, label),
        Delegate::PrintTextV1 => ops::print_text(ctx, cur, label),
        Delegate::PrintTextV2 => ops::print_text_v2(ctx, cur, label),
        Delegate::LoadTot => ops::load_tot(ctx, cur, label),
        Delegate::PalLoad => ops::pal_load(ctx, cur, label),
        Delegate::SetCmdCount => ops::set_cmd_count(ctx, cur, label),
        Delegate::LoadSoundV1 => ops::load_sound(ctx, cur, label, true),
        Delegate::LoadSoundV2 => ops::load_sound(ctx, cur, label, false),
        Delegate::GetTotTextItemPart => ops::get_tot_text_item_part(ctx, cur, label),
        Delegate::IstrlenV5 => ops::istrlen(ctx, cur, label),
        Delegate::DrawOperations => video_ops::draw_operations(ctx, cur),
        Delegate::LoadMult => video_ops::load_mult(ctx, cur, label),
        Delegate::PlayMult => video_ops::play_mult(ctx, cur, label),
        Delegate::LoadAnim => video_ops::load_anim(ctx, cur, label),
        Delegate::LoadStatic => video_ops::load_static(ctx, cur, label),
        Delegate::LoadMapObjects => video_ops::load_map_objects(ctx, cur, label),
        Delegate::LoadMultObject => video_ops::load_mult_object(ctx, cur, label),
        Delegate::TotSub => video_ops::tot_sub(ctx, cur, label),
        Delegate::PushVars => video_ops::push_vars(ctx, cur, label),
        Delegate::PopVars => video_ops::pop_vars(ctx, cur, label),
        Delegate::GoblinFuncV1 => goblin_ops::goblin_func_v1(ctx, cur),
        Delegate::GoblinFuncV2 => goblin_ops::goblin_func(ctx, cur),
        Delegate::GoblinFuncGeisha => goblin_ops::goblin_func_geisha(ctx, cur),
        Delegate::HandleGoblins => goblin_ops::handle_goblins(ctx, cur, label),
        Delegate::Infogrames => goblin_ops::infogrames(ctx, cur, label),
        Delegate::GoblinDummy => goblin_ops::dummy(ctx, cur, label),
    }
}

fn if_else(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    let cond = read_expr(cur)?;
    ctx.emit(&format!("if ({}) {{", cond));
    decode_block(ctx, cur, ReturnContext::Branch)?;

    if matches!(cur.peek_u8(), Ok(b) if b >> 4 == ELSE_MARKER) {
        ctx.mark(cur.position());
        cur.skip(1)?;
        ctx.emit("} else {");
        decode_block(ctx, cur, ReturnContext::Branch)?;
    }

    ctx.mark(cur.position());
    ctx.emit("}");
    Ok(())
}

fn while_do(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    let cond = read_expr(cur)?;
    ctx.emit(&format!("while ({}) {{", cond));
    decode_block(ctx, cur, ReturnContext::Loop)?;
    ctx.mark(cur.position());
    ctx.emit("}");
    Ok(())
}

fn repeat_until(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    ctx.emit("repeat {");
    decode_block(ctx, cur, ReturnContext::Loop)?;
    ctx.mark(cur.position());
    cur.skip(1)?;
    let cond = read_expr(cur)?;
    ctx.emit(&format!("}} until ({})", cond));
    Ok(())
}

fn switch(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    let var = read_var_index(cur)?;
    ctx.emit(&format!("switch ({}) {{", var));

    loop {
        ctx.mark(cur.position());
        let labels = cur.read_u8()?;
        if labels == SWITCH_END {
            break;
        }
        for _ in 0..labels {
            let label = read_expr(cur)?;
            ctx.emit(&format!("case {}:", label));
        }
        decode_block(ctx, cur, ReturnContext::Branch)?;
        ctx.emit("    break");
    }

    if matches!(cur.peek_u8(), Ok(b) if b >> 4 == DEFAULT_MARKER) {
        ctx.mark(cur.position());
        ctx.emit("default:");
        cur.skip(1)?;
        decode_block(ctx, cur, ReturnContext::Branch)?;
        ctx.emit("    break");
    }

    ctx.mark(cur.position());
    ctx.emit("}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode_tables::instruction_sets;
    use crate::texts::TextTable;

    fn decode(version: u8, bytes: &[u8]) -> (Result<()>, String, usize) {
        let texts = TextTable::new();
        let mut ctx = DecodeContext::new(instruction_sets().unwrap(), version, &texts).unwrap();
        let mut cur = ByteCursor::new(bytes);
        let result = decode_block(&mut ctx, &mut cur, ReturnContext::Handler);
        (result, ctx.into_trace(), cur.position())
    }

    /// Frame `body` as a code block of `count` instructions
    fn code_block(count: u8, body: &[u8]) -> Vec<u8> {
        let mut bytes = vec![CODE_BLOCK, count];
        bytes.extend_from_slice(&(body.len() as u16 + 2).to_le_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_empty_block() {
        let (result, trace, pos) = decode(49, &[1, 0, 0, 0]);
        assert!(result.is_ok());
        assert!(trace.is_empty());
        assert_eq!(pos, 2);
    }

    #[test]
    fn test_consumed_matches_declared_size() {
        // o1_keyFunc 7 ; o1_capturePop
        let bytes = code_block(2, &[0xF4, 0x07, 0x00, 0xF6]);
        let (result, trace, pos) = decode(49, &bytes);
        assert!(result.is_ok());
        assert_eq!(pos, bytes.len());
        assert_eq!(
            trace,
            "[00000133]:     o1_keyFunc 7\n[00000136]:     o1_capturePop\n"
        );
    }

    #[test]
    fn test_trailing_residue_is_skipped() {
        let mut bytes = code_block(1, &[0xF6, 0xAA, 0xBB]);
        bytes.push(0xCC);
        let (result, _, pos) = decode(49, &bytes);
        assert!(result.is_ok());
        assert_eq!(pos, 7);
    }

    #[test]
    fn test_over_read_is_size_mismatch() {
        let bytes = [CODE_BLOCK, 1, 2, 0, 0xF4, 0x07, 0x00];
        let (result, _, _) = decode(49, &bytes);
        assert_eq!(
            result.unwrap_err(),
            DecompileError::BlockSizeMismatch {
                expected: 4,
                actual: 7
            }
        );
    }

    #[test]
    fn test_invalid_block_type() {
        let (result, _, _) = decode(49, &[7, 1, 0, 0]);
        assert_eq!(
            result.unwrap_err(),
            DecompileError::InvalidBlockType {
                offset: 0,
                block_type: 7
            }
        );
    }

    #[test]
    fn test_missing_opcode() {
        // dense 0x28 has no handler in version 49
        let bytes = code_block(1, &[0xE8]);
        let (result, _, _) = decode(49, &bytes);
        assert_eq!(
            result.unwrap_err(),
            DecompileError::MissingOpcode {
                raw: 0xE8,
                dense: 0x28
            }
        );
    }

    #[test]
    fn test_not_yet_supported() {
        let bytes = code_block(1, &[0xD6]);
        let (result, _, _) = decode(52, &bytes);
        assert_eq!(
            result.unwrap_err(),
            DecompileError::NotYetSupported("o7_invalidate".to_string())
        );
    }

    #[test]
    fn test_if_else() {
        let then_body = code_block(1, &[0xF6]);
        let else_body = code_block(1, &[0xF4, 0x01, 0x00]);
        let mut body = vec![0x80, 21, 1, 99];
        body.extend_from_slice(&then_body);
        body.push(0xC0);
        body.extend_from_slice(&else_body);
        let bytes = code_block(1, &body);

        let (result, trace, pos) = decode(49, &bytes);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(pos, bytes.len());
        let lines: Vec<&str> = trace.lines().map(|l| l.split_once(':').unwrap().1).collect();
        assert_eq!(
            lines,
            vec![
                "     if (1) {",
                "         o1_capturePop",
                "     } else {",
                "         o1_keyFunc 1",
                "     }",
            ]
        );
    }

    #[test]
    fn test_if_without_else_leaves_next_opcode() {
        let then_body = code_block(1, &[0xF6]);
        let mut body = vec![0x80, 21, 0, 99];
        body.extend_from_slice(&then_body);
        body.extend_from_slice(&[0xF6]);
        let bytes = code_block(2, &body);

        let (result, trace, _) = decode(49, &bytes);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(trace.matches("o1_capturePop").count(), 2);
        assert!(!trace.contains("else"));
    }

    #[test]
    fn test_switch_without_cases() {
        // switch on var8_3, immediate end of cases, no default
        let bytes = code_block(2, &[0x50, 18, 3, 0, 251, 0xF6]);
        let (result, trace, pos) = decode(49, &bytes);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(pos, bytes.len());
        assert!(trace.contains("switch (var8_3) {"));
        assert!(!trace.contains("case"));
        assert!(!trace.contains("default"));
        assert!(trace.contains("o1_capturePop"));
    }

    #[test]
    fn test_switch_with_cases_and_default() {
        let case_body = code_block(1, &[0xF6]);
        let mut body = vec![0x50, 18, 3, 0, 2, 21, 1, 99, 21, 2, 99];
        body.extend_from_slice(&case_body);
        body.push(251);
        body.push(0x40);
        body.extend_from_slice(&case_body);
        let bytes = code_block(1, &body);

        let (result, trace, pos) = decode(49, &bytes);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(pos, bytes.len());
        assert!(trace.contains("case 1:"));
        assert!(trace.contains("case 2:"));
        assert!(trace.contains("default:"));
        assert_eq!(trace.matches("break").count(), 2);
    }

    #[test]
    fn test_loops() {
        let body = code_block(1, &[0xF6]);
        let mut ops = vec![0x70, 18, 1, 0, 99];
        ops.extend_from_slice(&body);
        ops.push(0x60);
        ops.extend_from_slice(&body);
        ops.extend_from_slice(&[0x00, 18, 2, 0, 99]);
        let bytes = code_block(2, &ops);

        let (result, trace, pos) = decode(49, &bytes);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(pos, bytes.len());
        assert!(trace.contains("while (var8_1) {"));
        assert!(trace.contains("repeat {"));
        assert!(trace.contains("} until (var8_2)"));
    }

    #[test]
    fn test_set_cmd_count_extends_block() {
        // declared count 1, setcmdCount raises it to 2 more instructions
        let bytes = code_block(1, &[0xFF, 2, 0xF6, 0xF6]);
        let (result, trace, pos) = decode(49, &bytes);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(pos, bytes.len());
        assert!(trace.contains("o1_setcmdCount 2"));
        assert_eq!(trace.matches("o1_capturePop").count(), 2);
    }

    #[test]
    fn test_hotspot_block() {
        let handler = code_block(1, &[0xF6]);
        let mut bytes = vec![HOTSPOT_BLOCK, 1, 0, 0, 0, 0, 0, 0];
        // type 11, literal dimensions
        bytes.push(11);
        for v in [10u16, 20, 30, 40] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&[0; 6]);
        bytes.extend_from_slice(&handler);

        let (result, trace, pos) = decode(49, &bytes);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(pos, bytes.len());
        assert!(trace.contains("hotspot {"));
        assert!(trace.contains("hotspot 11 10 20 30 40"));
        assert!(trace.contains("o1_capturePop"));
        assert!(trace.trim_end().ends_with('}'));
    }

    #[test]
    fn test_hotspot_expression_dimensions_and_input() {
        let handler = code_block(1, &[0xF6]);
        let mut bytes = vec![HOTSPOT_BLOCK, 1, 0, 0, 0, 0, 0, 0];
        // type 4 with the expression flag and the extra byte flag
        bytes.extend_from_slice(&[0x80 | 0x40 | 4, 0xEE]);
        for v in [1u8, 2, 3, 4] {
            bytes.extend_from_slice(&[21, v, 99]);
        }
        bytes.extend_from_slice(&[18, 5, 0, 2, 0, 15, 0]);
        bytes.extend_from_slice(&handler);

        let (result, trace, pos) = decode(49, &bytes);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(pos, bytes.len());
        assert!(trace.contains("hotspot 4 1 2 3 4 input var8_5 font 2 colors 15 0"));
    }

    /// One-region hotspot block with literal dimensions followed by `trailer`
    fn hotspot_block(kind: u8, trailer: &[u8]) -> Vec<u8> {
        let mut bytes = vec![HOTSPOT_BLOCK, 1, 0, 0, 0, 0, 0, 0, kind];
        for v in [10u16, 20, 30, 40] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(trailer);
        bytes
    }

    #[test]
    fn test_hotspot_enter_and_leave_handlers() {
        for kind in [0, 1] {
            let mut trailer = vec![0; 6];
            trailer.extend_from_slice(&code_block(1, &[0xF6]));
            trailer.extend_from_slice(&code_block(1, &[0xF4, 0x01, 0x00]));
            let bytes = hotspot_block(kind, &trailer);

            let (result, trace, pos) = decode(49, &bytes);
            assert!(result.is_ok(), "{:?}", result);
            assert_eq!(pos, bytes.len(), "type {}", kind);
            assert!(trace.contains(&format!("hotspot {} 10 20 30 40", kind)));
            assert!(trace.contains("o1_capturePop"));
            assert!(trace.contains("o1_keyFunc 1"));
        }
    }

    #[test]
    fn test_hotspot_input_with_inline_payload() {
        let input = [18, 5, 0, 2, 0, 15, 0, 3, 0, 0xAA, 0xBB, 0xCC];

        let mut trailer = input.to_vec();
        trailer.extend_from_slice(&code_block(1, &[0xF6]));
        let bytes = hotspot_block(6, &trailer);
        let (result, trace, pos) = decode(49, &bytes);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(pos, bytes.len());
        assert!(trace.contains("hotspot 6 10 20 30 40 input var8_5 font 2 colors 15 0"));
        assert!(trace.contains("o1_capturePop"));

        // odd types carry no handler block
        let mut bytes = hotspot_block(7, &input);
        bytes.push(0xF6);
        let (result, trace, pos) = decode(49, &bytes);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(pos, bytes.len() - 1);
        assert!(!trace.contains("o1_capturePop"));
    }

    #[test]
    fn test_hotspot_input_without_payload_or_handler() {
        let bytes = hotspot_block(3, &[18, 5, 0, 2, 0, 15, 0]);
        let (result, trace, pos) = decode(49, &bytes);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(pos, bytes.len());
        assert!(trace.contains("hotspot 3 10 20 30 40 input var8_5 font 2 colors 15 0"));
    }

    #[test]
    fn test_hotspot_keyed_handler() {
        for kind in [2, 20, 21] {
            let mut trailer = vec![1, 0, 2, 0, 3, 0];
            trailer.extend_from_slice(&code_block(1, &[0xF6]));
            let bytes = hotspot_block(kind, &trailer);

            let (result, trace, pos) = decode(49, &bytes);
            assert!(result.is_ok(), "{:?}", result);
            assert_eq!(pos, bytes.len(), "type {}", kind);
            assert!(trace.contains(&format!("hotspot {} 10 20 30 40 key 1 ids 2 flags 3", kind)));
            assert!(trace.contains("o1_capturePop"));
        }
    }
}
