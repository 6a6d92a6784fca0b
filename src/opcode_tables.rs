//! Instruction set tables for the script versions 48 to 52
//!
//! Every version table maps a dense opcode index (see [`unpack_opcode`]) to
//! an [`OpHandler`]. Version 49 is the base set; the other versions are
//! produced by copying their predecessor and replacing the listed slots.
//! The video and goblin sub-instruction sets live in their own modules and
//! are gathered here into one [`InstructionSets`] value built on first use.

use crate::error::{DecompileError, Result};
use crate::goblin_ops;
use crate::video_ops;
use indexmap::{IndexMap, IndexSet};
use std::hash::Hash;

/// Field decoder of a fixed-layout operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Expr,
    VarIndex,
    U8,
    U16,
}

/// Operations that need their own decoding routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delegate {
    CallSub,
    PrintTotText,
    Switch,
    RepeatUntil,
    WhileDo,
    If,
    AssignV1,
    AssignV2,
    LoadSpriteToPos,
    PrintTextV1,
    PrintTextV2,
    LoadTot,
    PalLoad,
    DrawOperations,
    SetCmdCount,
    GoblinFuncV1,
    GoblinFuncV2,
    GoblinFuncGeisha,
    LoadSoundV1,
    LoadSoundV2,
    GetTotTextItemPart,
    IstrlenV5,
    // video sub-instruction set
    LoadMult,
    PlayMult,
    LoadAnim,
    LoadStatic,
    LoadMapObjects,
    LoadMultObject,
    TotSub,
    PushVars,
    PopVars,
    // goblin sub-instruction set
    HandleGoblins,
    Infogrames,
    GoblinDummy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpHandler {
    /// Known opcode whose operand layout has not been worked out yet
    NotYetSupported(&'static str),
    /// Name followed by operands decoded in order
    Fixed(&'static str, &'static [Operand]),
    Delegate(&'static str, Delegate),
}

impl OpHandler {
    pub fn name(&self) -> &'static str {
        match self {
            OpHandler::NotYetSupported(name)
            | OpHandler::Fixed(name, _)
            | OpHandler::Delegate(name, _) => name,
        }
    }
}

pub(crate) const fn op(name: &'static str, operands: &'static [Operand]) -> OpHandler {
    OpHandler::Fixed(name, operands)
}

pub(crate) const fn call(name: &'static str, delegate: Delegate) -> OpHandler {
    OpHandler::Delegate(name, delegate)
}

pub(crate) const fn unported(name: &'static str) -> OpHandler {
    OpHandler::NotYetSupported(name)
}

/// Immutable opcode table keyed by a dense index or a raw sub-opcode
#[derive(Debug, Clone, PartialEq)]
pub struct OpTable<K: Hash + Eq> {
    name: &'static str,
    entries: IndexMap<K, OpHandler>,
}

impl<K> OpTable<K>
where
    K: Copy + Hash + Eq + Into<u16>,
{
    /// Build a table, rejecting a key listed twice
    pub fn from_entries(name: &'static str, entries: &[(K, OpHandler)]) -> Result<Self> {
        OpTable {
            name,
            entries: IndexMap::new(),
        }
        .layered(name, entries)
    }

    /// Copy this table and replace the slots named in `overrides`
    pub fn layered(&self, name: &'static str, overrides: &[(K, OpHandler)]) -> Result<Self> {
        let mut seen = IndexSet::new();
        let mut entries = self.entries.clone();
        for &(key, handler) in overrides {
            if !seen.insert(key) {
                return Err(DecompileError::DuplicateOpcode {
                    table: name,
                    key: key.into(),
                });
            }
            entries.insert(key, handler);
        }
        Ok(OpTable { name, entries })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, key: K) -> Option<&OpHandler> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }
}

/// An opcode byte split into its nibble-packed parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedOpcode {
    pub raw: u8,
    /// Extended group 1 to 4, or 0 for the single-nibble form
    pub group: u8,
    pub dense: u8,
}

/// Decode the dense opcode index of a raw instruction byte
///
/// A high nibble of 12 or more selects extended group `16 - high` and the
/// low nibble is the slot within that group. Otherwise the high nibble alone
/// is the index and the low nibble is ignored.
pub fn unpack_opcode(raw: u8) -> PackedOpcode {
    let (high, low) = (raw >> 4, raw & 0xF);
    let (group, dense) = if high >= 12 {
        let group = 16 - high;
        (group, group * 16 + low)
    } else {
        (0, high)
    };
    PackedOpcode { raw, group, dense }
}

use Operand::{Expr as E, VarIndex as V, U16 as W, U8 as B};

/// Version 49: Gobliiins, Bargon Attack, Fascination, Little Red
const GOB1_OPS: &[(u8, OpHandler)] = &[
    (0x00, call("o1_callSub", Delegate::CallSub)),
    (0x01, call("o1_callSub", Delegate::CallSub)),
    (0x02, call("o1_printTotText", Delegate::PrintTotText)),
    (0x03, op("o1_loadCursor", &[W, B])),
    (0x05, call("o1_switch", Delegate::Switch)),
    (0x06, call("o1_repeatUntil", Delegate::RepeatUntil)),
    (0x07, call("o1_whileDo", Delegate::WhileDo)),
    (0x08, call("o1_if", Delegate::If)),
    (0x09, call("o1_assign", Delegate::AssignV1)),
    (0x0A, call("o1_loadSpriteToPos", Delegate::LoadSpriteToPos)),
    (0x11, call("o1_printText", Delegate::PrintTextV1)),
    (0x12, call("o1_loadTot", Delegate::LoadTot)),
    (0x13, call("o1_palLoad", Delegate::PalLoad)),
    (0x14, op("o1_keyFunc", &[W])),
    (0x15, op("o1_capturePush", &[E, E, E, E])),
    (0x16, op("o1_capturePop", &[])),
    (0x17, op("o1_animPalInit", &[W, E, E])),
    (0x1E, call("o1_drawOperations", Delegate::DrawOperations)),
    (0x1F, call("o1_setcmdCount", Delegate::SetCmdCount)),
    (0x20, op("o1_return", &[])),
    (0x21, op("o1_renewTimeInVars", &[])),
    (0x22, op("o1_speakerOn", &[E])),
    (0x23, op("o1_speakerOff", &[])),
    (0x24, op("o1_putPixel", &[W, E, E, E])),
    (0x25, call("o1_goblinFunc", Delegate::GoblinFuncV1)),
    (0x26, op("o1_createSprite", &[W, W, W, W])),
    (0x27, op("o1_freeSprite", &[W])),
    (0x30, op("o1_returnTo", &[])),
    (0x31, op("o1_loadSpriteContent", &[W, W, W])),
    (0x32, op("o1_copySprite", &[W, W, E, E, E, E, E, E, W])),
    (0x33, op("o1_fillRect", &[W, E, E, E, E, E])),
    (0x34, op("o1_drawLine", &[W, E, E, E, E, E])),
    (0x35, op("o1_strToLong", &[V, V])),
    (0x36, unported("o1_invalidate")),
    (0x37, op("o1_setBackDelta", &[E, E])),
    (0x38, op("o1_playSound", &[E, E, E])),
    (0x39, op("o1_stopSound", &[E])),
    (0x3A, call("o1_loadSound", Delegate::LoadSoundV1)),
    (0x3B, op("o1_freeSoundSlot", &[E])),
    (0x3C, op("o1_waitEndPlay", &[])),
    (0x3D, op("o1_playComposition", &[V, E])),
    (0x3E, op("o1_getFreeMem", &[V, V])),
    (0x3F, op("o1_checkData", &[E, V])),
    (0x41, unported("o1_cleanupStr")),
    (0x42, op("o1_insertStr", &[V, E])),
    (0x43, unported("o1_cutStr")),
    (0x44, unported("o1_strstr")),
    (0x45, op("o1_istrlen", &[V, V])),
    (0x46, op("o1_setMousePos", &[E, E])),
    (0x47, op("o1_setFrameRate", &[E])),
    (0x48, op("o1_animatePalette", &[])),
    (0x49, op("o1_animateCursor", &[])),
    (0x4A, op("o1_blitCursor", &[])),
    (0x4B, op("o1_loadFont", &[E, W])),
    (0x4C, op("o1_freeFont", &[W])),
    (0x4D, op("o1_readData", &[E, V, E, E])),
    (0x4E, op("o1_writeData", &[E, V, E, E])),
    (0x4F, op("o1_manageDataFile", &[E])),
];

/// Version 48: Geisha
const GEISHA_OVERRIDES: &[(u8, OpHandler)] = &[
    (0x25, call("oGeisha_goblinFunc", Delegate::GoblinFuncGeisha)),
    (0x3A, op("oGeisha_loadSound", &[E, E])),
    (0x4D, op("oGeisha_readData", &[E, V])),
    (0x4E, op("oGeisha_writeData", &[E, V])),
];

/// Version 50: Gobliins 2, Ween
const GOB2_OVERRIDES: &[(u8, OpHandler)] = &[
    (0x09, call("o2_assign", Delegate::AssignV2)),
    (0x11, call("o2_printText", Delegate::PrintTextV2)),
    (0x17, op("o2_animPalInit", &[W, E, E])),
    (0x18, op("o2_addHotspot", &[E, E, E, E, E, E, W])),
    (0x19, op("o2_removeHotspot", &[E])),
    (0x1A, call("o2_getTotTextItemPart", Delegate::GetTotTextItemPart)),
    (0x25, call("o2_goblinFunc", Delegate::GoblinFuncV2)),
    (0x39, op("o2_stopSound", &[E])),
    (0x3A, call("o2_loadSound", Delegate::LoadSoundV2)),
    (0x3E, op("o2_getFreeMem", &[V, V])),
    (0x3F, op("o2_checkData", &[E, V])),
    (0x4D, op("o2_readData", &[E, V, E, E])),
    (0x4E, op("o2_writeData", &[E, V, E, E])),
];

/// Version 51: Goblins 3, Adibou 1, Inca 2, Woodruff, Lost in Time
const GOB3_OVERRIDES: &[(u8, OpHandler)] = &[
    (0x22, op("o3_speakerOn", &[E])),
    (0x23, op("o3_speakerOff", &[])),
    (0x25, unported("oInca2_spaceShooter")),
    (0x32, op("o3_copySprite", &[W, W, E, E, E, E, E, E, W])),
    (0x45, call("o5_istrlen", Delegate::IstrlenV5)),
];

/// Version 52: Playtoons, Adi 4, Adibou 2, Urban Runner
const GOB6_OVERRIDES: &[(u8, OpHandler)] = &[
    (0x03, unported("o6_loadCursor")),
    (0x09, unported("o6_assign")),
    (0x0B, unported("oPlaytoons_printText")),
    (0x11, unported("o7_printText")),
    (0x19, unported("o6_removeHotspot")),
    (0x1B, unported("oPlaytoons_F_1B")),
    (0x24, unported("oPlaytoons_putPixel")),
    (0x27, unported("oPlaytoons_freeSprite")),
    (0x32, unported("o1_copySprite")),
    (0x33, unported("o6_fillRect")),
    (0x34, unported("o7_drawLine")),
    (0x36, unported("o7_invalidate")),
    (0x3E, unported("o7_getFreeMem")),
    (0x3F, unported("oPlaytoons_checkData")),
    (0x4D, unported("oPlaytoons_readData")),
    (0x4E, unported("o7_writeData")),
];

pub const SUPPORTED_VERSIONS: [u8; 5] = [48, 49, 50, 51, 52];

/// Every opcode table, built once
#[derive(Debug, Clone)]
pub struct InstructionSets {
    versions: IndexMap<u8, OpTable<u8>>,
    pub video: OpTable<u8>,
    pub goblin: OpTable<u16>,
    pub goblin_v1: OpTable<u16>,
    pub goblin_geisha: OpTable<u16>,
}

impl InstructionSets {
    pub fn build() -> Result<Self> {
        let gob1 = OpTable::from_entries("gob1", GOB1_OPS)?;
        let geisha = gob1.layered("geisha", GEISHA_OVERRIDES)?;
        let gob2 = gob1.layered("gob2", GOB2_OVERRIDES)?;
        let gob3 = gob2.layered("gob3", GOB3_OVERRIDES)?;
        let gob6 = gob3.layered("gob6", GOB6_OVERRIDES)?;

        let mut versions = IndexMap::new();
        versions.insert(48, geisha);
        versions.insert(49, gob1);
        versions.insert(50, gob2);
        versions.insert(51, gob3);
        versions.insert(52, gob6);

        Ok(InstructionSets {
            versions,
            video: OpTable::from_entries("video", video_ops::VIDEO_OPS)?,
            goblin: OpTable::from_entries("goblin", goblin_ops::GOBLIN_OPS)?,
            goblin_v1: OpTable::from_entries("goblin_v1", goblin_ops::GOBLIN_V1_OPS)?,
            goblin_geisha: OpTable::from_entries("goblin_geisha", goblin_ops::GEISHA_OPS)?,
        })
    }

    pub fn version(&self, version: u8) -> Result<&OpTable<u8>> {
        self.versions
            .get(&version)
            .ok_or(DecompileError::UnsupportedVersion(version))
    }
}

lazy_static! {
    static ref INSTRUCTION_SETS: Result<InstructionSets> = InstructionSets::build();
}

/// Shared instruction sets; table construction errors surface on every call
pub fn instruction_sets() -> Result<&'static InstructionSets> {
    let sets: &'static Result<InstructionSets> = &INSTRUCTION_SETS;
    sets.as_ref().map_err(Clone::clone)
}
