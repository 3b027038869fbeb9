use std::path::PathBuf;

use clap::Parser;

/// bindredir - generate .NET binding redirects from the assemblies on disk
#[derive(Debug, Parser)]
#[command(name = "bindredir", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file to rewrite (created if missing).
    #[arg(value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Merge mode. The literal `overwrite` rewrites matched redirects;
    /// anything else (or absence) keeps existing redirects untouched.
    #[arg(value_name = "MODE")]
    pub mode: Option<String>,

    /// Directory to scan for assemblies. Defaults to the config's directory.
    #[arg(value_name = "DIR")]
    pub search_dir: Option<PathBuf>,

    #[command(flatten)]
    pub global: GlobalOptions,
}

impl Cli {
    pub fn keep_existing(&self) -> bool {
        self.mode.as_deref() != Some("overwrite")
    }
}

/// Options shared across all invocations.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit the run summary as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}
