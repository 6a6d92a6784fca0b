//! TOT container header
//!
//! A script file starts with a fixed 128-byte header followed by the code
//! segment, then optionally the embedded text section and the resource
//! section. Section offsets are absolute file offsets.

use crate::context::CODE_BASE;
use crate::cursor::ByteCursor;
use crate::error::{DecompileError, Result};
use std::fmt::{Display, Formatter};

const VERSION_OFFSET: usize = 41;
const TEXTS_OFFSET: usize = 48;
const RESOURCES_OFFSET: usize = 52;
const FUNCTIONS_OFFSET: usize = 100;
const FUNCTION_COUNT: usize = 14;

/// Absent section marker
const NO_SECTION: u32 = 0xFFFF_FFFF;
/// Unused function slot
pub const NO_FUNCTION: u16 = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotHeader {
    pub version: u8,
    pub texts_offset: Option<usize>,
    pub resources_offset: Option<usize>,
    pub functions: Vec<u16>,
}

fn section(offset: u32) -> Option<usize> {
    match offset {
        0 | NO_SECTION => None,
        offset => Some(offset as usize),
    }
}

impl TotHeader {
    pub fn parse(bytes: &[u8]) -> Result<TotHeader> {
        if bytes.len() < CODE_BASE {
            return Err(DecompileError::InvalidHeader(format!(
                "file is {} bytes, header needs {}",
                bytes.len(),
                CODE_BASE
            )));
        }

        let mut cur = ByteCursor::new(&bytes[..CODE_BASE]);
        cur.seek(VERSION_OFFSET)?;
        let version = cur.read_u8()?;
        cur.seek(TEXTS_OFFSET)?;
        let texts_offset = section(cur.read_u32()?);
        cur.seek(RESOURCES_OFFSET)?;
        let resources_offset = section(cur.read_u32()?);
        cur.seek(FUNCTIONS_OFFSET)?;
        let functions = (0..FUNCTION_COUNT)
            .map(|_| cur.read_u16())
            .collect::<Result<Vec<_>>>()?;

        Ok(TotHeader {
            version,
            texts_offset,
            resources_offset,
            functions,
        })
    }

    /// Entry offsets that point into the code segment
    pub fn exported(&self) -> impl Iterator<Item = u16> + '_ {
        self.functions
            .iter()
            .copied()
            .filter(|&f| f as usize >= CODE_BASE && f != NO_FUNCTION)
    }
}

impl Display for TotHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let offset = |o: Option<usize>| o.map_or("none".to_string(), |o| format!("{:#08x}", o));
        write!(
            f,
            "Script version:   {}\nTexts offset:     {}\nResources offset: {}\nFunctions:        {:?}",
            self.version,
            offset(self.texts_offset),
            offset(self.resources_offset),
            self.functions,
        )
    }
}

/// Script file split into its sections
#[derive(Debug, Clone)]
pub struct TotFile {
    pub header: TotHeader,
    pub code: Vec<u8>,
    pub texts: Vec<u8>,
    pub resources: Vec<u8>,
}

impl TotFile {
    pub fn parse(bytes: &[u8]) -> Result<TotFile> {
        let header = TotHeader::parse(bytes)?;
        let end = bytes.len();

        let clamp = |offset: usize| offset.clamp(CODE_BASE, end);
        let code_end = [header.texts_offset, header.resources_offset]
            .into_iter()
            .flatten()
            .map(clamp)
            .min()
            .unwrap_or(end);

        let texts = match header.texts_offset.map(clamp) {
            Some(start) => {
                let stop = header
                    .resources_offset
                    .map(clamp)
                    .filter(|&r| r >= start)
                    .unwrap_or(end);
                bytes[start..stop].to_vec()
            }
            None => Vec::new(),
        };
        let resources = header
            .resources_offset
            .map(|start| bytes[clamp(start)..].to_vec())
            .unwrap_or_default();

        Ok(TotFile {
            code: bytes[CODE_BASE..code_end].to_vec(),
            header,
            texts,
            resources,
        })
    }
}
