//! Goblin sub-instruction sets
//!
//! Three dispatchers share the `(G)` line tag: the version 49 one with its
//! object-parameter prefix, the Geisha one keyed by the raw command, and the
//! generic one that maps raw commands onto a dense index first.

use crate::block::run_handler;
use crate::context::DecodeContext;
use crate::cursor::ByteCursor;
use crate::error::{DecompileError, Result};
use crate::opcode_tables::{call, op, Delegate, OpHandler, Operand};
use indexmap::IndexMap;
use log::debug;

use Operand::U16 as W;

pub const GOBLIN_PREFIX: &str = "(G) ";

/// Debug command the generic dispatcher skips without output
const GOBLIN_DEBUG_CMD: u16 = 101;

/// Raw goblin command to dense index
const GOBLIN_CODES: &[(u16, u16)] = &[
    (0, 0),
    (1, 1),
    (2, 2),
    (4, 3),
    (5, 4),
    (6, 5),
    (7, 6),
    (8, 7),
    (9, 8),
    (10, 9),
    (12, 10),
    (13, 71),
    (14, 12),
    (16, 14),
    (21, 15),
    (22, 16),
    (23, 17),
    (24, 18),
    (25, 19),
    (26, 20),
    (27, 21),
    (28, 22),
    (29, 23),
    (30, 24),
    (32, 25),
    (33, 26),
    (34, 27),
    (35, 28),
    (36, 29),
    (37, 30),
    (40, 31),
    (41, 32),
    (42, 33),
    (43, 34),
    (44, 35),
    (50, 36),
    (52, 37),
    (53, 38),
    (100, 39),
    (152, 40),
    (200, 41),
    (201, 42),
    (202, 43),
    (203, 44),
    (204, 45),
    (250, 46),
    (251, 47),
    (252, 48),
    (500, 49),
    (502, 50),
    (503, 51),
    (600, 52),
    (601, 53),
    (602, 54),
    (603, 55),
    (604, 56),
    (605, 57),
    (1000, 58),
    (1001, 59),
    (1002, 60),
    (1003, 61),
    (1004, 62),
    (1005, 63),
    (1006, 64),
    (1008, 65),
    (1009, 66),
    (1010, 67),
    (1011, 68),
    (1015, 69),
    (2005, 70),
    (3, 71),
    // pass-through codes used by the Ween demo scripts
    (11, 11),
    (15, 15),
    (3000, 3000),
];

lazy_static! {
    static ref GOBLIN_CODE_MAP: IndexMap<u16, u16> = GOBLIN_CODES.iter().copied().collect();
}

pub fn goblin_dense_index(raw: u16) -> Option<u16> {
    GOBLIN_CODE_MAP.get(&raw).copied()
}

pub(crate) const GOBLIN_OPS: &[(u16, OpHandler)] = &[
    (0x00, call("o2_loadInfogramesIns", Delegate::Infogrames)),
    (0x01, op("o2_startInfogrames", &[W])),
    (0x02, op("o2_stopInfogrames", &[W])),
    (0x09, call("o2_playInfogrames", Delegate::Infogrames)),
    (0x0B, op("o_weenNOP_11", &[W])),
    (0x0F, op("o1_setRelaxTime", &[])),
    (0x27, call("o2_handleGoblins", Delegate::HandleGoblins)),
    (0x47, call("o1_dummy", Delegate::GoblinDummy)),
    (3000, op("o_weenNOP_3000", &[])),
];

pub(crate) const GOBLIN_V1_OPS: &[(u16, OpHandler)] = &[
    (1, op("o1_setState", &[])),
    (2, op("o1_setCurFrame", &[])),
    (4, op("o1_setMultState", &[])),
    (5, op("o1_setOrder", &[])),
    (8, op("o1_setType", &[])),
    (9, op("o1_setNoTick", &[])),
    (10, op("o1_setPickable", &[])),
    (12, op("o1_setXPos", &[])),
    (13, op("o1_setYPos", &[])),
    (21, op("o1_getState", &[])),
    (22, op("o1_getCurFrame", &[])),
    (32, op("o1_getObjMaxFrame", &[])),
    (40, op("o1_manipulateMap", &[W, W, W])),
    (44, op("o1_setPassMap", &[W, W, W])),
    (150, op("o1_setGoblinMultState", &[W, W, W])),
    (152, op("o1_setGoblinUnk14", &[W, W])),
    (200, op("o1_setItemIdInPocket", &[W])),
    (201, op("o1_setItemIndInPocket", &[W])),
    (1000, op("o1_loadObjects", &[W])),
    (1001, op("o1_freeObjects", &[])),
    (1002, op("o1_animateObjects", &[])),
    (1003, op("o1_drawObjects", &[])),
    (1004, op("o1_loadMap", &[])),
    (1005, op("o1_moveGoblin", &[W, W])),
    (1008, op("o1_loadGoblin", &[])),
    (1009, op("o1_writeTreatItem", &[W, W, W])),
    (1010, op("o1_moveGoblin0", &[])),
    (1015, op("o1_setGoblinObjectsPos", &[W, W])),
    (2005, op("o1_initGoblin", &[])),
];

pub(crate) const GEISHA_OPS: &[(u16, OpHandler)] = &[
    (0, op("oGeisha_gamePenetration", &[W, W, W, W])),
    (1, op("oGeisha_gameDiving", &[W, W, W])),
    (2, op("oGeisha_loadTitleMusic", &[])),
    (3, op("oGeisha_playMusic", &[])),
    (4, op("oGeisha_stopMusic", &[])),
    (6, op("oGeisha_caress1", &[])),
    (7, op("oGeisha_caress2", &[])),
];

/// Command word followed by a parameter word the dispatchers ignore
fn read_command(cur: &mut ByteCursor) -> Result<u16> {
    let cmd = cur.read_u16()?;
    cur.skip(2)?;
    Ok(cmd)
}

pub fn goblin_func(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    let cmd = read_command(cur)?;
    if cmd == GOBLIN_DEBUG_CMD {
        debug!("ignoring goblin debug command at {}", cur.position());
        return Ok(());
    }

    let handler = goblin_dense_index(cmd)
        .and_then(|dense| ctx.sets.goblin.get(dense))
        .copied()
        .ok_or(DecompileError::MissingGoblinOp(cmd))?;
    run_handler(ctx, cur, &handler, GOBLIN_PREFIX)
}

pub fn goblin_func_geisha(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    let cmd = read_command(cur)?;
    let handler = *ctx
        .sets
        .goblin_geisha
        .get(cmd)
        .ok_or(DecompileError::MissingGoblinOp(cmd))?;
    run_handler(ctx, cur, &handler, GOBLIN_PREFIX)
}

/// Version 49 dispatcher
///
/// Command ranges select an object-parameter prefix. Commands below 40
/// without an object are generic object operations, printed by number.
pub fn goblin_func_v1(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    let mut cmd = read_command(cur)?;
    let mut object = None;

    if cmd > 0 && cmd < 17 {
        object = Some(cur.read_u16()?);
        let _extra = cur.read_u16()?;
    } else if cmd > 90 && cmd < 107 {
        object = Some(cur.read_u16()?);
        let _extra = cur.read_u16()?;
        cmd -= 90;
    } else if cmd > 110 && cmd < 128 {
        object = Some(cur.read_u16()?);
        cmd -= 90;
    } else if cmd > 20 && cmd < 38 {
        object = Some(cur.read_u16()?);
    }

    if cmd < 40 && object.is_none() {
        ctx.emit_op("o1_goblinFunc", &[cmd.to_string()]);
        return Ok(());
    }

    let handler = *ctx
        .sets
        .goblin_v1
        .get(cmd)
        .ok_or(DecompileError::MissingGoblinOp(cmd))?;
    run_handler(ctx, cur, &handler, GOBLIN_PREFIX)
}

pub fn handle_goblins(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let operands = (0..6)
        .map(|_| -> Result<String> { Ok(format!("var32_{}", cur.read_u16()? as u32 * 4)) })
        .collect::<Result<Vec<_>>>()?;
    ctx.emit_op(label, &operands);
    Ok(())
}

pub fn infogrames(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    let var = format!("var8_{}", cur.read_u16()? as u32 * 4);
    ctx.emit_op(label, &[var]);
    Ok(())
}

/// Re-reads the ignored parameter word as a word count and dumps those bytes
pub fn dummy(ctx: &mut DecodeContext, cur: &mut ByteCursor, label: &str) -> Result<()> {
    cur.seek_relative(-2)?;
    let words = cur.read_u16()? as usize;
    let operands: Vec<String> = cur
        .read_exact(words * 2)?
        .iter()
        .map(|b| b.to_string())
        .collect();
    ctx.emit_op(label, &operands);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode_tables::instruction_sets;
    use crate::texts::TextTable;

    type Dispatch = fn(&mut DecodeContext, &mut ByteCursor) -> Result<()>;

    fn dispatch(version: u8, func: Dispatch, bytes: &[u8]) -> (Result<()>, String, usize) {
        let texts = TextTable::new();
        let mut ctx = DecodeContext::new(instruction_sets().unwrap(), version, &texts).unwrap();
        let mut cur = ByteCursor::new(bytes);
        let result = func(&mut ctx, &mut cur);
        (result, ctx.into_trace(), cur.position())
    }

    #[test]
    fn test_supported_raw_codes_resolve() {
        let sets = instruction_sets().unwrap();
        for raw in [0u16, 1, 2, 3, 10, 11, 13, 15, 100, 3000] {
            let dense = goblin_dense_index(raw).unwrap();
            assert!(
                sets.goblin.get(dense).is_some(),
                "raw {} -> dense {}",
                raw,
                dense
            );
        }
        assert_eq!(goblin_dense_index(3), goblin_dense_index(13));
        assert_eq!(goblin_dense_index(17), None);
    }

    #[test]
    fn test_generic_dispatch() {
        // raw 2 -> dense 2
        let (result, trace, pos) = dispatch(50, goblin_func, &[2, 0, 0, 0, 9, 0]);
        assert!(result.is_ok());
        assert!(trace.ends_with("(G) o2_stopInfogrames 9\n"));
        assert_eq!(pos, 6);

        // raw 100 -> dense 39
        let bytes = [100, 0, 0, 0, 1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0];
        let (_, trace, _) = dispatch(50, goblin_func, &bytes);
        assert!(trace.ends_with(
            "(G) o2_handleGoblins var32_4 var32_8 var32_12 var32_16 var32_20 var32_24\n"
        ));
    }

    #[test]
    fn test_debug_command_is_silent() {
        let (result, trace, pos) = dispatch(50, goblin_func, &[101, 0, 0, 0]);
        assert!(result.is_ok());
        assert!(trace.is_empty());
        assert_eq!(pos, 4);
    }

    #[test]
    fn test_unmapped_and_unsupported_commands() {
        let (result, _, _) = dispatch(50, goblin_func, &[17, 0, 0, 0]);
        assert_eq!(result.unwrap_err(), DecompileError::MissingGoblinOp(17));
        // raw 4 maps to dense 3, which has no entry
        let (result, _, _) = dispatch(50, goblin_func, &[4, 0, 0, 0]);
        assert_eq!(result.unwrap_err(), DecompileError::MissingGoblinOp(4));
    }

    #[test]
    fn test_dummy_rereads_parameter_word() {
        // raw 13 -> dense 0x47; the parameter word is the byte-pair count
        let bytes = [13, 0, 2, 0, 7, 8, 9, 10];
        let (result, trace, pos) = dispatch(50, goblin_func, &bytes);
        assert!(result.is_ok());
        assert!(trace.ends_with("(G) o1_dummy 7 8 9 10\n"));
        assert_eq!(pos, 8);
    }

    #[test]
    fn test_geisha_dispatch_uses_raw_code() {
        let bytes = [1, 0, 0, 0, 1, 0, 2, 0, 3, 0];
        let (result, trace, pos) = dispatch(48, goblin_func_geisha, &bytes);
        assert!(result.is_ok());
        assert!(trace.ends_with("(G) oGeisha_gameDiving 1 2 3\n"));
        assert_eq!(pos, 10);

        let (result, _, _) = dispatch(48, goblin_func_geisha, &[5, 0, 0, 0]);
        assert_eq!(result.unwrap_err(), DecompileError::MissingGoblinOp(5));
    }

    #[test]
    fn test_v1_generic_object_command() {
        // 38 is outside every object range
        let (result, trace, pos) = dispatch(49, goblin_func_v1, &[38, 0, 0, 0]);
        assert!(result.is_ok());
        assert!(trace.ends_with("o1_goblinFunc 38\n"));
        assert_eq!(pos, 4);
    }

    #[test]
    fn test_v1_object_ranges() {
        // 92 reads object and extra, then becomes setCurFrame
        let (_, trace, pos) = dispatch(49, goblin_func_v1, &[92, 0, 0, 0, 5, 0, 6, 0]);
        assert!(trace.ends_with("(G) o1_setCurFrame\n"));
        assert_eq!(pos, 8);

        // 112 reads only the object, then becomes 22
        let (_, trace, pos) = dispatch(49, goblin_func_v1, &[112, 0, 0, 0, 5, 0]);
        assert!(trace.ends_with("(G) o1_getCurFrame\n"));
        assert_eq!(pos, 6);

        let (_, trace, _) = dispatch(49, goblin_func_v1, &[0xE8, 0x03, 0, 0, 4, 0]);
        assert!(trace.ends_with("(G) o1_loadObjects 4\n"));
    }

    #[test]
    fn test_v1_missing_command() {
        let (result, _, _) = dispatch(49, goblin_func_v1, &[3, 0, 0, 0, 1, 0, 1, 0]);
        assert_eq!(result.unwrap_err(), DecompileError::MissingGoblinOp(3));
    }
}
