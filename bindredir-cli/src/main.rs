mod app;
mod output;

use std::path::Path;

use anyhow::Context;
use bindredir::{rewrite_redirects, CilExtractor};
use clap::{CommandFactory, Parser};

use crate::app::Cli;
use crate::output::{display_summary, print_output, ConsoleReporter, SummaryReport};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // Show bindredir info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("bindredir", level)
            .filter_module("bindredir_cli", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    let Some(config) = cli.config.as_deref() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let parent;
    let search_dir = match cli.search_dir.as_deref() {
        Some(dir) => dir,
        None => {
            parent = config.parent().map(Path::to_path_buf);
            match parent.as_deref() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            }
        }
    };

    let summary = rewrite_redirects(
        config,
        cli.keep_existing(),
        search_dir,
        &CilExtractor,
        &mut ConsoleReporter,
    )
    .with_context(|| format!("failed to rewrite '{}'", config.display()))?;

    let report = SummaryReport::new(config, search_dir, summary);
    print_output(&report, &cli.global, display_summary)
}
