//! Text table used to annotate print operations
//!
//! Texts come from the project's TSV export: a `FILE` column followed by one
//! column per language, every value double-quoted with `""` as the escaped
//! quote. The rows belonging to one script are numbered from 0 in file order,
//! which is the id print instructions refer to. Without an export, the
//! texts embedded in the script file are used under the `INT` column.

use crate::cursor::ByteCursor;
use crate::error::{DecompileError, Result};
use indexmap::IndexMap;
use log::{debug, warn};

/// Per-language strings of one text id
pub type Translations = IndexMap<String, String>;

/// Column of the texts embedded in the script file itself
pub const EMBEDDED_LANGUAGE: &str = "INT";

const ITEM_END: u8 = 1;
const ITEM_MOVE: u8 = 2;
const ITEM_COLOR: u8 = 3;
const ITEM_VARIABLE: u8 = 0xBA;
/// Box coordinates and background color ahead of the drawing commands
const ITEM_PREAMBLE: usize = 9;

#[derive(Debug, Clone, Default)]
pub struct TextTable {
    entries: Vec<Translations>,
}

impl TextTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, texts: Translations) {
        self.entries.push(texts);
    }

    pub fn get(&self, id: u16) -> Option<&Translations> {
        self.entries.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the annotation for text `id`
    ///
    /// With a language, the quoted string of that language (empty when the
    /// column is missing). Without, every non-empty `LANG: "text"` pair.
    pub fn hint(&self, id: u16, language: Option<&str>) -> String {
        let Some(texts) = self.get(id) else {
            warn!("no text with id {}", id);
            return format!("<no text {}>", id);
        };

        match language {
            Some(lang) => format!("\"{}\"", texts.get(lang).map(String::as_str).unwrap_or("")),
            None => texts
                .iter()
                .filter(|(_, text)| !text.is_empty())
                .map(|(lang, text)| format!("{}: \"{}\"", lang, text))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Load the text section embedded in a script file
    ///
    /// The section starts with an item count (low 14 bits) and one
    /// `{offset, size}` pair of u16 per item, offsets relative to the
    /// section start.
    pub fn from_embedded(data: &[u8]) -> Result<Self> {
        let mut cur = ByteCursor::new(data);
        let count = (cur.read_u16()? & 0x3FFF) as usize;
        let mut index = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = cur.read_u16()? as usize;
            let size = cur.read_u16()? as usize;
            index.push((offset, size));
        }

        let mut table = TextTable::new();
        for (id, (offset, size)) in index.into_iter().enumerate() {
            let text = match data.get(offset..offset + size) {
                Some(item) => render_item(item),
                None => {
                    if size != 0 {
                        warn!("embedded text {} lies outside the text section", id);
                    }
                    String::new()
                }
            };
            let mut row = Translations::new();
            row.insert(EMBEDDED_LANGUAGE.to_string(), text);
            table.push(row);
        }
        debug!("{} embedded texts", table.len());
        Ok(table)
    }

    /// Load the rows of `file_name` from a text TSV export
    pub fn from_tsv(content: &str, file_name: &str) -> Result<Self> {
        let mut rows = parse_tsv(content)?.into_iter();
        let header = rows
            .next()
            .ok_or_else(|| DecompileError::Config("empty text table".to_string()))?;
        if header.first().map(String::as_str) != Some("FILE") {
            return Err(DecompileError::Config(
                "text table must start with a FILE column".to_string(),
            ));
        }
        let languages = &header[1..];

        let mut table = TextTable::new();
        for row in rows {
            let Some((file, values)) = row.split_first() else {
                continue;
            };
            if !file.eq_ignore_ascii_case(file_name) {
                continue;
            }
            let texts = languages
                .iter()
                .zip(values.iter())
                .map(|(lang, text)| (lang.clone(), text.clone()))
                .collect();
            table.push(texts);
        }
        debug!("{} texts for {}", table.len(), file_name);
        Ok(table)
    }
}

/// Printable text of one embedded item; drawing commands are dropped
fn render_item(item: &[u8]) -> String {
    let mut text = String::new();
    let mut pos = ITEM_PREAMBLE;
    while let Some(&byte) = item.get(pos) {
        match byte {
            ITEM_END => break,
            ITEM_COLOR => pos += 2,
            ITEM_MOVE => {
                if !text.is_empty() && !text.ends_with(' ') {
                    text.push(' ');
                }
                pos += 5;
            }
            ITEM_VARIABLE => {
                text.push_str("{var}");
                pos += 1;
            }
            _ => {
                text.push(cp437_char(byte));
                pos += 1;
            }
        }
    }
    text
}

/// Split tab-separated records, honouring double-quoted fields
fn parse_tsv(content: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => quoted = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => quoted = true,
            '\t' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if quoted {
        return Err(DecompileError::Config(
            "unterminated quoted field in text table".to_string(),
        ));
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

/// Decode one byte of inline script text (DOS code page 437)
pub fn cp437_char(byte: u8) -> char {
    if byte < 0x80 {
        byte as char
    } else {
        CP437_HIGH[(byte - 0x80) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "FILE\tANG\tFRA\n\
                       INTRO.TOT\t\"Hello\"\t\"Bonjour\"\n\
                       OTHER.TOT\t\"Skip\"\t\"\"\n\
                       INTRO.TOT\t\"Say \"\"hi\"\"\"\t\"\"\n";

    #[test]
    fn test_rows_are_numbered_per_file() {
        let table = TextTable::from_tsv(TSV, "intro.tot").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap()["FRA"], "Bonjour");
        assert_eq!(table.get(1).unwrap()["ANG"], "Say \"hi\"");
    }

    #[test]
    fn test_hint_with_language() {
        let table = TextTable::from_tsv(TSV, "INTRO.TOT").unwrap();
        assert_eq!(table.hint(0, Some("ANG")), "\"Hello\"");
        assert_eq!(table.hint(1, Some("FRA")), "\"\"");
        assert_eq!(table.hint(0, Some("ISR")), "\"\"");
    }

    #[test]
    fn test_hint_without_language_skips_empty() {
        let table = TextTable::from_tsv(TSV, "INTRO.TOT").unwrap();
        assert_eq!(table.hint(0, None), "ANG: \"Hello\", FRA: \"Bonjour\"");
        assert_eq!(table.hint(1, None), "ANG: \"Say \"hi\"\"");
    }

    #[test]
    fn test_unknown_id() {
        let table = TextTable::new();
        assert_eq!(table.hint(7, None), "<no text 7>");
    }

    #[test]
    fn test_quoted_tab_and_newline() {
        let rows = parse_tsv("FILE\tANG\r\nA.TOT\t\"a\tb\nc\"\n").unwrap();
        assert_eq!(rows[1], vec!["A.TOT".to_string(), "a\tb\nc".to_string()]);
        assert!(parse_tsv("\"open").is_err());
    }

    #[test]
    fn test_missing_file_column() {
        assert!(TextTable::from_tsv("ANG\tFRA\n", "A.TOT").is_err());
    }

    fn embedded_item(commands: &[u8]) -> Vec<u8> {
        let mut item = vec![0; ITEM_PREAMBLE];
        item.extend_from_slice(commands);
        item
    }

    #[test]
    fn test_embedded_texts() {
        let first = embedded_item(b"Hi\x02\x00\x00\x08\x00you\xBA\x01trailer");
        let second = embedded_item(b"\x03\x1FOK\x82\x01");
        let mut data = vec![3, 0];
        let first_at = 2 + 3 * 4;
        let second_at = first_at + first.len();
        for (offset, size) in [(first_at, first.len()), (second_at, second.len()), (0x4000, 20)] {
            data.extend_from_slice(&(offset as u16).to_le_bytes());
            data.extend_from_slice(&(size as u16).to_le_bytes());
        }
        data.extend_from_slice(&first);
        data.extend_from_slice(&second);

        let table = TextTable::from_embedded(&data).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.hint(0, Some(EMBEDDED_LANGUAGE)), "\"Hi you{var}\"");
        assert_eq!(table.hint(1, None), "INT: \"OKé\"");
        assert_eq!(table.hint(2, Some(EMBEDDED_LANGUAGE)), "\"\"");
    }

    #[test]
    fn test_truncated_embedded_index() {
        assert!(TextTable::from_embedded(&[2, 0, 4, 0]).is_err());
    }

    #[test]
    fn test_cp437() {
        assert_eq!(cp437_char(b'A'), 'A');
        assert_eq!(cp437_char(0x82), 'é');
        assert_eq!(cp437_char(0xA2), 'ó');
        assert_eq!(cp437_char(0xFF), '\u{a0}');
    }
}
