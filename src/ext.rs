//! Extension (EXT) tables and the shared COMMUN blob
//!
//! An EXT file lists auxiliary resources (animation and sprite data) that
//! instructions reference by index. Items with a negative offset live in
//! the cross-file shared blob instead, at the bitwise complement of the
//! stored offset.

use crate::cursor::ByteCursor;
use crate::error::{DecompileError, Result};
use crate::unpack::ChunkDecompressor;
use log::debug;

const RECORD_SIZE: usize = 10;

/// One resource descriptor of an extension table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalItem {
    /// Negative means the item lives in the shared blob at `!offset`
    pub offset: i32,
    pub size: u16,
    pub width: u16,
    pub height: u16,
    pub packed: bool,
}

/// Parsed extension table plus the blob its item offsets point into
#[derive(Debug, Clone, Default)]
pub struct ExtTable {
    pub items: Vec<ExternalItem>,
    pub data: Vec<u8>,
}

impl ExtTable {
    /// Parse a whole EXT file
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cur = ByteCursor::new(bytes);
        let count = cur.read_i16()?.max(0) as usize;
        cur.skip(1)?;

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = cur.read_i32()?;
            let size = cur.read_u16()?;
            let width = cur.read_u16()?;
            let height = cur.read_u16()?;
            items.push(ExternalItem {
                offset,
                size,
                width: width & 0x7FFF,
                height,
                packed: width & 0x8000 != 0,
            });
        }

        let data_start = 3 + count * RECORD_SIZE;
        debug!("EXT table: {} items, data at {:#x}", count, data_start);
        Ok(ExtTable {
            items,
            data: bytes[data_start..].to_vec(),
        })
    }

    pub fn get(&self, index: i32) -> Result<&ExternalItem> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.items.get(i))
            .ok_or(DecompileError::MissingExtItem(index))
    }
}

/// Fetch the bytes of extension item `index`, decompressing packed items
pub fn resolve_item(
    table: &ExtTable,
    index: i32,
    shared: Option<&[u8]>,
    decompressor: &dyn ChunkDecompressor,
) -> Result<Vec<u8>> {
    let item = table.get(index)?;
    let (blob, start) = if item.offset < 0 {
        let blob = shared.ok_or(DecompileError::MissingSharedBlob)?;
        debug!("item {} refers to shared blob at {:#x}", index, !item.offset);
        (blob, !item.offset as usize)
    } else {
        (table.data.as_slice(), item.offset as usize)
    };

    let mut cur = ByteCursor::new(blob);
    cur.seek(start)?;
    if item.packed {
        let unpacked_size = cur.read_u32()? as usize;
        let rest = cur.read_exact(cur.remaining())?;
        decompressor.decompress(rest, unpacked_size)
    } else {
        Ok(cur.read_exact(item.size as usize)?.to_vec())
    }
}
