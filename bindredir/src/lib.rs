#![doc(html_no_source)]
#![deny(missing_docs)]

//! # bindredir
//!
//! Generates .NET assembly binding redirects from the assemblies actually
//! present on disk. The library scans a directory tree for managed PE
//! images, reads each assembly's strong-name identity straight out of its
//! ECMA-335 metadata (no Windows, no .NET runtime required), and merges one
//! `bindingRedirect` per signed assembly into an XML configuration document,
//! leaving every unrelated part of the document untouched.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use bindredir::{rewrite_redirects, CilExtractor, NullReporter};
//!
//! let summary = rewrite_redirects(
//!     Path::new("App.config"),
//!     true, // keep existing redirects
//!     Path::new("bin"),
//!     &CilExtractor,
//!     &mut NullReporter,
//! )?;
//! println!("{} redirects added", summary.inserted);
//! # Ok::<(), bindredir::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - memory-mapped PE access and RVA translation
//! - [`metadata`] - CIL metadata parsing down to the Assembly table, and
//!   [`AssemblyIdentity`] extraction
//! - [`policy`] - the preserved XML document, the [`PolicyTree`], matcher
//!   and merge engine
//! - [`rewrite`] - the scan-and-rewrite driver
//!
//! The identity source is pluggable through [`IdentityExtractor`], so the
//! driver and the policy core can be exercised without real PE files.

pub(crate) mod error;
pub mod file;
pub mod metadata;
pub mod policy;
pub mod rewrite;

pub(crate) use error::malformed_error;

pub use error::Error;

/// The common result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

pub use file::File;
pub use metadata::identity::{
    public_key_token, AssemblyIdentity, AssemblyVersion, CilExtractor, IdentityExtractor,
};
pub use policy::{
    apply, find_match, Document, EntryHandle, EntryKey, MergeAction, PolicyTree, XmlElement,
    XmlNode, ASM_NS, WIDE_OLD_VERSION,
};
pub use rewrite::{rewrite_redirects, NullReporter, Reporter, ScanEvent, Summary};
