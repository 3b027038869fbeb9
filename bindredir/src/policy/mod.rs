//! Binding-redirect policy: the preserved XML document, the entry tree, the
//! matcher and the merge engine.

pub mod document;
pub mod matcher;
pub mod merge;
pub mod tree;

pub use document::{Document, XmlDecl, XmlElement, XmlNode};
pub use matcher::{find_match, EntryKey};
pub use merge::{apply, MergeAction, WIDE_OLD_VERSION};
pub use tree::{EntryHandle, PolicyTree, ASM_NS};
