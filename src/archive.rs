//! Access to the files of a game
//!
//! The decompiler only needs name-pattern search and whole-entry reads, so
//! the game is seen through two small traits. [`GameDir`] is the plain
//! directory implementation; tests provide in-memory ones.

use crate::error::{DecompileError, Result};
use glob::{MatchOptions, Pattern};
use indexmap::IndexSet;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

pub trait ArchiveEntry {
    fn name(&self) -> &str;
    fn read_bytes(&self) -> Result<Vec<u8>>;

    /// Name of the sibling entry with the extension replaced
    fn with_suffix(&self, suffix: &str) -> String {
        let name = self.name();
        let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        format!("{}{}", stem, suffix)
    }
}

pub trait Archive {
    type Entry: ArchiveEntry;

    /// Entries matching any of `patterns`, as `(pattern, entry)` pairs
    ///
    /// Results come in pattern order, then name order; an entry matched by
    /// several patterns is reported once, under the first.
    fn search(&self, patterns: &[String]) -> Result<Vec<(String, Self::Entry)>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    name: String,
    path: PathBuf,
}

impl FileEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArchiveEntry for FileEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }
}

/// Game files laid out in one directory, matched case-insensitively
#[derive(Debug, Clone)]
pub struct GameDir {
    root: PathBuf,
}

impl GameDir {
    pub fn open(root: impl AsRef<Path>) -> Result<GameDir> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(DecompileError::Io(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(GameDir { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl Archive for GameDir {
    type Entry = FileEntry;

    fn search(&self, patterns: &[String]) -> Result<Vec<(String, FileEntry)>> {
        let root = Pattern::escape(&self.root.to_string_lossy());
        let mut seen = IndexSet::new();
        let mut found = Vec::new();

        for pattern in patterns {
            let full = format!("{}/{}", root, pattern);
            let mut matches: Vec<PathBuf> = glob::glob_with(&full, MATCH_OPTIONS)
                .map_err(|e| DecompileError::Config(format!("bad pattern {}: {}", pattern, e)))?
                .flatten()
                .filter(|path| path.is_file())
                .collect();
            matches.sort();
            debug!("{} matched {} files", pattern, matches.len());

            for path in matches {
                if !seen.insert(path.clone()) {
                    continue;
                }
                let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                    continue;
                };
                found.push((pattern.clone(), FileEntry { name, path }));
            }
        }
        Ok(found)
    }
}
