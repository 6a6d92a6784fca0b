//! Run configuration, read from `boozook.toml`
//!
//! Every key is optional. Command-line flags are applied on top with
//! [`Config::merge_overrides`].

use crate::error::{DecompileError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "boozook.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Text table column used for print annotations
    pub language: Option<String>,
    /// Decode only the header entry points and the subroutines they call
    pub exported_only: bool,
    pub output_dir: PathBuf,
    /// Patterns locating the shared extension blob
    pub shared_blob_patterns: Vec<String>,
    /// Text table TSV export
    pub texts: Option<PathBuf>,
    pub log_level: String,
    /// Force an engine version instead of the header byte
    pub version: Option<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            language: None,
            exported_only: false,
            output_dir: PathBuf::from("scripts"),
            shared_blob_patterns: vec!["COMMUN.EX*".to_string()],
            texts: None,
            log_level: "warn".to_string(),
            version: None,
        }
    }
}

/// Values given on the command line; `None` keeps the file value
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub language: Option<String>,
    pub exported_only: bool,
    pub output_dir: Option<PathBuf>,
    pub texts: Option<PathBuf>,
    pub version: Option<u8>,
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Config> {
        toml::from_str(content).map_err(|e| DecompileError::Config(e.to_string()))
    }

    /// Read `path`, or the default file when present, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Config::default());
                }
                default
            }
        };
        debug!("reading configuration from {}", path.display());
        let content = fs::read_to_string(&path)
            .map_err(|e| DecompileError::Config(format!("{}: {}", path.display(), e)))?;
        Config::from_toml(&content)
    }

    pub fn merge_overrides(mut self, overrides: Overrides) -> Config {
        if overrides.language.is_some() {
            self.language = overrides.language;
        }
        self.exported_only |= overrides.exported_only;
        if let Some(dir) = overrides.output_dir {
            self.output_dir = dir;
        }
        if overrides.texts.is_some() {
            self.texts = overrides.texts;
        }
        if overrides.version.is_some() {
            self.version = overrides.version;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file() {
        let config = Config::from_toml(
            "language = \"FRA\"\nexported_only = true\nshared_blob_patterns = [\"COMMUN.EX1\"]\n",
        )
        .unwrap();
        assert_eq!(config.language.as_deref(), Some("FRA"));
        assert!(config.exported_only);
        assert_eq!(config.shared_blob_patterns, vec!["COMMUN.EX1".to_string()]);
        assert_eq!(config.output_dir, PathBuf::from("scripts"));
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(Config::from_toml("langauge = \"FRA\"").is_err());
    }

    #[test]
    fn test_overrides_win() {
        let config = Config::from_toml("language = \"FRA\"\nversion = 50\n")
            .unwrap()
            .merge_overrides(Overrides {
                language: Some("ANG".to_string()),
                output_dir: Some(PathBuf::from("out")),
                ..Overrides::default()
            });
        assert_eq!(config.language.as_deref(), Some("ANG"));
        assert_eq!(config.version, Some(50));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert!(!config.exported_only);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "log_level = \"debug\"\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().log_level, "debug");
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
