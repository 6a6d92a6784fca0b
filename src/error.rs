use thiserror::Error;

/// Errors raised while decompiling a TOT script
///
/// Every variant is fatal for the file being decoded. Recoverable
/// conditions (unknown expression tokens, trailing block padding) are
/// logged instead and never reach this type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecompileError {
    #[error("Truncated read at offset {offset}: wanted {wanted} bytes, {available} available")]
    Truncated {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    #[error("Expression nested deeper than {limit} levels at offset {offset}")]
    ExpressionTooDeep { offset: usize, limit: usize },

    #[error("Missing opcode {dense:#04x} (raw byte {raw:#04x})")]
    MissingOpcode { raw: u8, dense: u8 },

    #[error("Missing video op {0:#04x} = {0}")]
    MissingVideoOp(u8),

    #[error("Missing goblin op {0:#06x} = {0}")]
    MissingGoblinOp(u16),

    #[error("Opcode {0} is known but not supported yet")]
    NotYetSupported(String),

    #[error("Invalid block type {block_type} at offset {offset}")]
    InvalidBlockType { offset: usize, block_type: u8 },

    #[error("Block size mismatch: expected {expected} bytes, consumed {actual}")]
    BlockSizeMismatch { expected: usize, actual: usize },

    #[error("Item references the shared blob but none was loaded")]
    MissingSharedBlob,

    #[error("Instruction needs an extension table but none was loaded")]
    MissingExtTable,

    #[error("Extension item {0} does not exist")]
    MissingExtItem(i32),

    #[error("Unknown palette mode {0}")]
    UnknownPaletteMode(u8),

    #[error("Unsupported script version {0}")]
    UnsupportedVersion(u8),

    #[error("Duplicate key {key:#x} in {table} opcode table")]
    DuplicateOpcode { table: &'static str, key: u16 },

    #[error("Invalid TOT header: {0}")]
    InvalidHeader(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for DecompileError {
    fn from(err: std::io::Error) -> Self {
        DecompileError::Io(err.to_string())
    }
}

/// Result type for decompiler operations
pub type Result<T> = std::result::Result<T, DecompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_mismatch_reports_expected_first() {
        let err = DecompileError::BlockSizeMismatch {
            expected: 12,
            actual: 14,
        };
        assert_eq!(
            err.to_string(),
            "Block size mismatch: expected 12 bytes, consumed 14"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DecompileError = io.into();
        assert!(matches!(err, DecompileError::Io(ref msg) if msg.contains("gone")));
    }
}
