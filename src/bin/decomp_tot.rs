use boozook::archive::GameDir;
use boozook::config::{Config, Overrides};
use boozook::Decompiler;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

/// Decompile TOT scripts of a Gob engine game into text traces
#[derive(Parser, Debug)]
#[command(name = "decomp-tot", version)]
struct Args {
    /// Game directory to work on
    game_dir: PathBuf,

    /// Script name patterns
    #[arg(default_values_t = vec!["*.TOT".to_string()])]
    patterns: Vec<String>,

    /// Text table language used to annotate print operations
    #[arg(long)]
    lang: Option<String>,

    /// Only decode exported functions and what they call
    #[arg(long)]
    exported: bool,

    /// Text table TSV export
    #[arg(long)]
    texts: Option<PathBuf>,

    /// Output directory for the traces
    #[arg(long)]
    output: Option<PathBuf>,

    /// Force a script version instead of reading it from the header
    #[arg(long = "script-version", value_parser = clap::value_parser!(u8).range(48..=52))]
    script_version: Option<u8>,

    /// Configuration file (default: boozook.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Re-encode scripts from traces (not implemented)
    #[arg(long, hide = true)]
    rebuild: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?.merge_overrides(Overrides {
        language: args.lang,
        exported_only: args.exported,
        output_dir: args.output,
        texts: args.texts,
        version: args.script_version,
    });

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    if args.rebuild {
        return Err("recompiling scripts is not implemented".into());
    }

    let game = GameDir::open(&args.game_dir)?;
    let mut decompiler = Decompiler::new(&config)?;
    let reports = decompiler.run(&game, &args.patterns)?;

    let failed: Vec<_> = reports.iter().filter(|r| !r.is_ok()).collect();
    info!(
        "{} scripts decompiled into {}, {} failed",
        reports.len(),
        config.output_dir.display(),
        failed.len()
    );
    for report in &failed {
        if let Some(err) = &report.error {
            error!("{}: {}", report.name, err);
        }
    }

    if !failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
