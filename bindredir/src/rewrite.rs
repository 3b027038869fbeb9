//! The scan-and-rewrite driver.
//!
//! One run: load or create the configuration document, walk the search root,
//! extract identities, merge each signed one into the policy tree, then save
//! the document once. Per-file problems, read failures included, are
//! reported and skipped; only the directory walk and the policy document
//! itself can abort the run.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    metadata::identity::{AssemblyIdentity, IdentityExtractor},
    policy::{apply, find_match, Document, MergeAction, PolicyTree, XmlElement},
    Error, Result,
};

/// One observable outcome while scanning.
pub enum ScanEvent<'a> {
    /// A file the extractor does not apply to (wrong extension)
    Ignored {
        /// The skipped file
        path: &'a Path,
    },
    /// A candidate file carried no assembly identity (native binary,
    /// netmodule, malformed metadata)
    NoIdentity {
        /// The skipped file
        path: &'a Path,
    },
    /// A candidate file could not be read; the walk continues without it
    Unreadable {
        /// The skipped file
        path: &'a Path,
        /// The failure that made the file unreadable
        error: &'a Error,
    },
    /// A managed assembly without a public key; excluded from policy
    Unsigned {
        /// The skipped file
        path: &'a Path,
        /// The unsigned identity
        identity: &'a AssemblyIdentity,
    },
    /// A signed assembly was merged into the tree
    Merged {
        /// The merged file
        path: &'a Path,
        /// The discovered identity
        identity: &'a AssemblyIdentity,
        /// What the merge did to the tree
        action: MergeAction,
    },
}

/// Sink for scan events; the driver itself stays silent.
pub trait Reporter {
    /// Called once per candidate file, after its outcome is known.
    fn report(&mut self, event: &ScanEvent<'_>);
}

/// A reporter that discards everything.
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&mut self, _: &ScanEvent<'_>) {}
}

/// Counters for one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Candidate files examined (extension filter passed)
    pub scanned: usize,
    /// Files without an extractable identity
    pub no_identity: usize,
    /// Files that could not be read
    pub unreadable: usize,
    /// Unsigned assemblies excluded from policy
    pub unsigned: usize,
    /// Entries left untouched under keep-existing
    pub kept: usize,
    /// Entries whose redirect was (re)written
    pub updated: usize,
    /// Entries newly appended
    pub inserted: usize,
}

/// Scans `search_dir` and rewrites the redirect list in `config`.
///
/// A missing configuration file starts from a fresh `<configuration>`
/// document. The search walk is recursive and sorted by file name, so runs
/// are deterministic. The document is saved exactly once, atomically, after
/// the walk completes.
///
/// # Errors
/// Returns an error if the existing document is malformed, the directory
/// walk fails, or the save fails. Per-file extraction failures are reported
/// and skipped; the walk continues and the document is still saved.
pub fn rewrite_redirects(
    config: &Path,
    keep_existing: bool,
    search_dir: &Path,
    extractor: &dyn IdentityExtractor,
    reporter: &mut dyn Reporter,
) -> Result<Summary> {
    let doc = if config.exists() {
        Document::load(config)?
    } else {
        Document::new(XmlElement::new("configuration"))
    };

    let mut tree = PolicyTree::new(doc)?;
    tree.ensure_ancestors();

    let mut files = Vec::new();
    collect_files(search_dir, &mut files)?;

    let mut summary = Summary::default();
    for path in &files {
        if !extractor.applies_to(path) {
            reporter.report(&ScanEvent::Ignored { path });
            continue;
        }
        summary.scanned += 1;

        let identity = match extractor.extract(path) {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                summary.no_identity += 1;
                reporter.report(&ScanEvent::NoIdentity { path });
                continue;
            }
            Err(error) => {
                summary.unreadable += 1;
                reporter.report(&ScanEvent::Unreadable {
                    path,
                    error: &error,
                });
                continue;
            }
        };

        if !identity.is_signed() {
            summary.unsigned += 1;
            reporter.report(&ScanEvent::Unsigned {
                path,
                identity: &identity,
            });
            continue;
        }

        let existing = find_match(&tree, &identity);
        let action = apply(&mut tree, &identity, existing, keep_existing)?;
        match action {
            MergeAction::Skipped => summary.kept += 1,
            MergeAction::Updated => summary.updated += 1,
            MergeAction::Inserted => summary.inserted += 1,
        }
        reporter.report(&ScanEvent::Merged {
            path,
            identity: &identity,
            action,
        });
    }

    tree.into_document().save(config)?;
    Ok(summary)
}

/// Depth-first walk over regular files, sorted by name at every level.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        entries.push(entry?);
    }
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}
