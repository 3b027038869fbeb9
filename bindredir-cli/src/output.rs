use std::path::Path;

use bindredir::{MergeAction, Reporter, ScanEvent, Summary};
use log::{debug, info, warn};
use serde::Serialize;

use crate::app::GlobalOptions;

/// Print `data` as JSON (if `--json`) or call `display_fn` for human-readable output.
pub fn print_output<T: Serialize>(
    data: &T,
    opts: &GlobalOptions,
    display_fn: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(data)?;
        println!("{json}");
    } else {
        display_fn(data);
    }
    Ok(())
}

/// Serializable view of one run, for `--json`.
#[derive(Serialize)]
pub struct SummaryReport {
    pub config: String,
    pub searched: String,
    pub scanned: usize,
    pub no_identity: usize,
    pub unreadable: usize,
    pub unsigned: usize,
    pub kept: usize,
    pub updated: usize,
    pub inserted: usize,
}

impl SummaryReport {
    pub fn new(config: &Path, searched: &Path, summary: Summary) -> Self {
        SummaryReport {
            config: config.display().to_string(),
            searched: searched.display().to_string(),
            scanned: summary.scanned,
            no_identity: summary.no_identity,
            unreadable: summary.unreadable,
            unsigned: summary.unsigned,
            kept: summary.kept,
            updated: summary.updated,
            inserted: summary.inserted,
        }
    }
}

/// Print the human-readable closing summary.
pub fn display_summary(report: &SummaryReport) {
    println!(
        "{}: scanned {} assemblies under {}",
        report.config, report.scanned, report.searched
    );
    println!(
        "  {} inserted, {} updated, {} kept, {} unsigned, {} without identity, {} unreadable",
        report.inserted,
        report.updated,
        report.kept,
        report.unsigned,
        report.no_identity,
        report.unreadable
    );
}

/// Streams per-file outcomes through the logger as the scan progresses.
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&mut self, event: &ScanEvent<'_>) {
        match event {
            ScanEvent::Ignored { path } => {
                debug!("{}: not an assembly candidate, ignored", path.display());
            }
            ScanEvent::NoIdentity { path } => {
                info!("Ignoring '{}': no assembly identity", path.display());
            }
            ScanEvent::Unreadable { path, error } => {
                warn!("Ignoring '{}': {}", path.display(), error);
            }
            ScanEvent::Unsigned { path, identity } => {
                info!(
                    "{}: '{}' is not strong-named, skipped",
                    path.display(),
                    identity.name
                );
            }
            ScanEvent::Merged {
                path,
                identity,
                action,
            } => {
                let verb = match action {
                    MergeAction::Skipped => "kept existing redirect for",
                    MergeAction::Updated => "updated redirect to",
                    MergeAction::Inserted => "added redirect to",
                };
                info!(
                    "{}: {} '{}' {}",
                    path.display(),
                    verb,
                    identity.name,
                    identity.version
                );
            }
        }
    }
}
