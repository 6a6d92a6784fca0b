//! Per-file decoding state and the trace it produces

use crate::error::{DecompileError, Result};
use crate::ext::{self, ExtTable};
use crate::opcode_tables::{InstructionSets, OpTable};
use crate::texts::TextTable;
use crate::unpack::{ChunkDecompressor, LzssUnpacker};

/// Scripts are stored after a fixed 128-byte header; trace offsets are file offsets
pub const CODE_BASE: usize = 128;

static LZSS: LzssUnpacker = LzssUnpacker;

/// Everything one script decode reads and writes
///
/// A context lives exactly as long as the decode of one file. It owns the
/// trace being produced and the list of subroutine offsets discovered by
/// call instructions; the side tables it borrows are read-only.
pub struct DecodeContext<'a> {
    pub version: u8,
    pub sets: &'a InstructionSets,
    pub table: &'a OpTable<u8>,
    pub language: Option<String>,
    pub texts: &'a TextTable,
    pub ext: Option<&'a ExtTable>,
    pub shared: Option<&'a [u8]>,
    pub decompressor: &'a dyn ChunkDecompressor,
    /// Call targets in discovery order, as absolute file offsets
    pub functions: Vec<usize>,
    trace: String,
    indent: usize,
    offset: usize,
    pub(crate) cmd_count: usize,
    pub(crate) counter: usize,
}

impl<'a> DecodeContext<'a> {
    pub fn new(sets: &'a InstructionSets, version: u8, texts: &'a TextTable) -> Result<Self> {
        Ok(DecodeContext {
            version,
            sets,
            table: sets.version(version)?,
            language: None,
            texts,
            ext: None,
            shared: None,
            decompressor: &LZSS,
            functions: Vec::new(),
            trace: String::new(),
            indent: 0,
            offset: 0,
            cmd_count: 0,
            counter: 0,
        })
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_ext(mut self, ext: Option<&'a ExtTable>) -> Self {
        self.ext = ext;
        self
    }

    pub fn with_shared(mut self, shared: Option<&'a [u8]>) -> Self {
        self.shared = shared;
        self
    }

    pub fn with_decompressor(mut self, decompressor: &'a dyn ChunkDecompressor) -> Self {
        self.decompressor = decompressor;
        self
    }

    /// Set the code offset reported by the following trace lines
    pub fn mark(&mut self, code_offset: usize) {
        self.offset = code_offset;
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.indent
    }

    /// Append one trace line at the current offset and nesting depth
    pub fn emit(&mut self, text: &str) {
        self.trace.push_str(&format!(
            "[{:08}]:{} {}\n",
            CODE_BASE + self.offset,
            "    ".repeat(self.indent),
            text
        ));
    }

    /// Emit an operation name followed by its space-separated operands
    pub fn emit_op(&mut self, name: &str, operands: &[String]) {
        let mut line = name.to_string();
        for operand in operands {
            line.push(' ');
            line.push_str(operand);
        }
        self.emit(&line);
    }

    /// Append raw text, outside the offset/indent line layout
    pub fn push_raw(&mut self, text: &str) {
        self.trace.push_str(text);
    }

    pub fn trace(&self) -> &str {
        &self.trace
    }

    pub fn into_trace(self) -> String {
        self.trace
    }

    /// Fetch the bytes of an extension item of the current file
    pub fn ext_item(&self, index: i32) -> Result<Vec<u8>> {
        let table = self.ext.ok_or(DecompileError::MissingExtTable)?;
        ext::resolve_item(table, index, self.shared, self.decompressor)
    }

    /// Text annotation for print operations
    pub fn text_hint(&self, id: u16) -> String {
        self.texts.hint(id, self.language.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode_tables::instruction_sets;

    #[test]
    fn test_emit_layout() {
        let texts = TextTable::default();
        let mut ctx = DecodeContext::new(instruction_sets().unwrap(), 49, &texts).unwrap();
        ctx.mark(4);
        ctx.emit("sub_132 {");
        ctx.indent();
        ctx.emit_op("o1_keyFunc", &["3".to_string()]);
        ctx.dedent();
        ctx.dedent();
        assert_eq!(ctx.depth(), 0);
        assert_eq!(
            ctx.trace(),
            "[00000132]: sub_132 {\n[00000132]:     o1_keyFunc 3\n"
        );
    }

    #[test]
    fn test_missing_ext_table() {
        let texts = TextTable::default();
        let ctx = DecodeContext::new(instruction_sets().unwrap(), 50, &texts).unwrap();
        assert_eq!(
            ctx.ext_item(0).unwrap_err(),
            DecompileError::MissingExtTable
        );
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let texts = TextTable::default();
        let result = DecodeContext::new(instruction_sets().unwrap(), 47, &texts);
        assert!(result.is_err());
    }
}
