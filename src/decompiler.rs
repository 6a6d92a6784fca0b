//! Script walking and the batch driver
//!
//! [`decompile_script`] turns the code segment of one file into a trace.
//! [`Decompiler`] runs it over every script of a game, isolating failures
//! so one broken file does not stop the batch.

use crate::archive::{Archive, ArchiveEntry};
use crate::block::{decode_block, ReturnContext};
use crate::config::Config;
use crate::context::{DecodeContext, CODE_BASE};
use crate::cursor::ByteCursor;
use crate::error::{DecompileError, Result};
use crate::ext::ExtTable;
use crate::opcode_tables::{instruction_sets, InstructionSets};
use crate::texts::TextTable;
use crate::tot::{TotFile, NO_FUNCTION};
use indexmap::IndexSet;
use log::{debug, error, info, warn};
use std::fs;
use std::path::PathBuf;

/// Which parts of the code segment get decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Every block from offset 0 to the end of the code
    AllBytes,
    /// Header entry points and every subroutine they reach through calls
    Exported,
}

impl WalkMode {
    pub fn from_exported(exported: bool) -> WalkMode {
        if exported {
            WalkMode::Exported
        } else {
            WalkMode::AllBytes
        }
    }
}

fn decode_sub(ctx: &mut DecodeContext, cur: &mut ByteCursor) -> Result<()> {
    let start = cur.position();
    ctx.mark(start);
    ctx.emit(&format!("sub_{} {{", start + CODE_BASE));
    decode_block(ctx, cur, ReturnContext::Handler)?;
    ctx.mark(cur.position());
    ctx.emit("}");
    ctx.push_raw("\n");
    Ok(())
}

/// Decode a code segment into the context's trace
///
/// `entries` are the header entry offsets (file offsets, already filtered);
/// they are listed on the first trace line and seed the exported walk.
pub fn decompile_script(
    ctx: &mut DecodeContext,
    code: &[u8],
    entries: &[u16],
    mode: WalkMode,
) -> Result<()> {
    ctx.push_raw(&format!("{:?}\n", entries));
    let mut cur = ByteCursor::new(code);

    match mode {
        WalkMode::AllBytes => {
            while cur.position() + 1 < code.len() {
                decode_sub(ctx, &mut cur)?;
            }
        }
        WalkMode::Exported => {
            ctx.functions = entries.iter().map(|&f| f as usize).collect();
            let mut seen = IndexSet::new();
            let mut next = 0;
            while let Some(&func) = ctx.functions.get(next) {
                next += 1;
                if !seen.insert(func) {
                    continue;
                }
                if func < CODE_BASE {
                    warn!("ignoring subroutine offset {} inside the header", func);
                    continue;
                }
                if func - CODE_BASE >= code.len() {
                    warn!("subroutine offset {} is past the end of the code", func);
                    continue;
                }
                cur.seek(func - CODE_BASE)?;
                decode_sub(ctx, &mut cur)?;
            }
            debug!("decoded {} subroutines", seen.len());
        }
    }
    Ok(())
}

/// Outcome of one script of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub name: String,
    pub output: PathBuf,
    pub error: Option<DecompileError>,
}

impl FileReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Decompiler<'c> {
    config: &'c Config,
    sets: &'static InstructionSets,
    shared: Option<Vec<u8>>,
    text_source: Option<String>,
    last_version: Option<u8>,
}

impl<'c> Decompiler<'c> {
    pub fn new(config: &'c Config) -> Result<Decompiler<'c>> {
        let text_source = match &config.texts {
            Some(path) => Some(fs::read_to_string(path).map_err(|e| {
                DecompileError::Config(format!("text table {}: {}", path.display(), e))
            })?),
            None => None,
        };
        Ok(Decompiler {
            config,
            sets: instruction_sets()?,
            shared: None,
            text_source,
            last_version: None,
        })
    }

    /// Load the first shared blob found in the game
    pub fn load_shared<A: Archive>(&mut self, game: &A) -> Result<()> {
        let found = game.search(&self.config.shared_blob_patterns)?;
        if found.len() > 1 {
            warn!(
                "{} shared blobs found, using {}",
                found.len(),
                found[0].1.name()
            );
        }
        if let Some((_, entry)) = found.first() {
            debug!("shared blob {}", entry.name());
            self.shared = Some(entry.read_bytes()?);
        }
        Ok(())
    }

    fn texts_for(&self, name: &str, embedded: &[u8]) -> Result<TextTable> {
        if let Some(content) = &self.text_source {
            return TextTable::from_tsv(content, name);
        }
        if embedded.is_empty() {
            return Ok(TextTable::new());
        }
        TextTable::from_embedded(embedded).or_else(|err| {
            warn!("{}: unreadable embedded texts: {}", name, err);
            Ok(TextTable::new())
        })
    }

    fn select_version(&mut self, name: &str, header_version: u8) -> u8 {
        if let Some(previous) = self.last_version {
            if previous != header_version {
                warn!(
                    "script version mismatch: {} has {}, previous script had {}",
                    name, header_version, previous
                );
            }
        }
        self.last_version = Some(header_version);
        let version = self.config.version.unwrap_or(header_version);
        info!("script version {}", version);
        version
    }

    fn decode_entry<A: Archive>(
        &mut self,
        game: &A,
        entry: &A::Entry,
        trace: &mut String,
    ) -> Result<()> {
        let bytes = entry.read_bytes()?;
        let tot = TotFile::parse(&bytes)?;
        debug!("{}\n{}", entry.name(), tot.header);

        let ext = match game.search(&[entry.with_suffix(".EXT")])?.first() {
            Some((_, ext_entry)) => Some(ExtTable::parse(&ext_entry.read_bytes()?)?),
            None => None,
        };
        let texts = self.texts_for(entry.name(), &tot.texts)?;
        let version = self.select_version(entry.name(), tot.header.version);

        for &f in &tot.header.functions {
            if f != NO_FUNCTION && f != 0 && (f as usize) < CODE_BASE {
                warn!("{}: ignoring entry offset {} inside the header", entry.name(), f);
            }
        }
        let entries: Vec<u16> = tot.header.exported().collect();

        let mut ctx = DecodeContext::new(self.sets, version, &texts)?
            .with_language(self.config.language.clone())
            .with_ext(ext.as_ref())
            .with_shared(self.shared.as_deref());
        let mode = WalkMode::from_exported(self.config.exported_only);
        let result = decompile_script(&mut ctx, &tot.code, &entries, mode);
        *trace = ctx.into_trace();
        result
    }

    /// Decompile one script and write its trace, whatever the outcome
    pub fn decompile_entry<A: Archive>(&mut self, game: &A, entry: &A::Entry) -> FileReport {
        info!("Decompiling {}...", entry.name());
        let mut trace = String::new();
        let error = self.decode_entry(game, entry, &mut trace).err();
        if let Some(err) = &error {
            error!("{}: {}", entry.name(), err);
            trace.push_str(&format!("!! decompilation aborted: {}\n", err));
        }

        let output = self
            .config
            .output_dir
            .join(format!("{}.txt", entry.name()));
        let error = match fs::write(&output, &trace) {
            Ok(()) => error,
            Err(e) => {
                error!("cannot write {}: {}", output.display(), e);
                error.or_else(|| Some(e.into()))
            }
        };

        FileReport {
            name: entry.name().to_string(),
            output,
            error,
        }
    }

    /// Decompile every script matching `patterns`
    pub fn run<A: Archive>(&mut self, game: &A, patterns: &[String]) -> Result<Vec<FileReport>> {
        fs::create_dir_all(&self.config.output_dir)?;
        self.load_shared(game)?;

        let scripts = game.search(patterns)?;
        if scripts.is_empty() {
            warn!("no script matches {:?}", patterns);
        }
        Ok(scripts
            .iter()
            .map(|(_, entry)| self.decompile_entry(game, entry))
            .collect())
    }
}
