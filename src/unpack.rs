//! Chunk decompression for packed auxiliary blobs

use crate::cursor::ByteCursor;
use crate::error::Result;

const RING_SIZE: usize = 4096;
const RING_START: usize = 4078;

/// Decompresses a packed chunk into exactly `expected_size` bytes
pub trait ChunkDecompressor {
    fn decompress(&self, packed: &[u8], expected_size: usize) -> Result<Vec<u8>>;
}

/// The engine's LZSS variant: 4 KiB ring buffer primed with spaces,
/// one flag byte per eight tokens, 12-bit offsets and 4-bit lengths.
#[derive(Debug, Default, Clone, Copy)]
pub struct LzssUnpacker;

impl ChunkDecompressor for LzssUnpacker {
    fn decompress(&self, packed: &[u8], expected_size: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(expected_size);
        if expected_size == 0 {
            return Ok(out);
        }

        let mut src = ByteCursor::new(packed);
        let mut ring = [0x20u8; RING_SIZE];
        let mut ring_pos = RING_START;
        let mut flags: u16 = 0;

        loop {
            flags >>= 1;
            if flags & 0x0100 == 0 {
                flags = src.read_u8()? as u16 | 0xFF00;
            }

            if flags & 1 != 0 {
                let byte = src.read_u8()?;
                out.push(byte);
                ring[ring_pos] = byte;
                ring_pos = (ring_pos + 1) % RING_SIZE;
                if out.len() == expected_size {
                    return Ok(out);
                }
            } else {
                let lo = src.read_u8()? as usize;
                let hi = src.read_u8()? as usize;
                let offset = lo | ((hi & 0xF0) << 4);
                let length = (hi & 0x0F) + 3;
                for i in 0..length {
                    let byte = ring[(offset + i) % RING_SIZE];
                    out.push(byte);
                    if out.len() == expected_size {
                        return Ok(out);
                    }
                    ring[ring_pos] = byte;
                    ring_pos = (ring_pos + 1) % RING_SIZE;
                }
            }
        }
    }
}
