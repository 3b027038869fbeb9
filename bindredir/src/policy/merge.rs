//! Idempotent merge of discovered identities into the policy tree.

use crate::{
    malformed_error,
    metadata::identity::AssemblyIdentity,
    policy::{
        document::XmlElement,
        tree::{EntryHandle, PolicyTree},
    },
    Result,
};

/// The catch-all source range: every requestable version gets redirected.
pub const WIDE_OLD_VERSION: &str = "0.0.0.0-65535.65535.65535.65535";

/// What [`apply`] did to the tree for one identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeAction {
    /// An existing redirect was kept untouched
    Skipped,
    /// An existing entry got its redirect (re)written
    Updated,
    /// A new entry was appended
    Inserted,
}

/// Merges one identity into the tree.
///
/// `existing` is the matcher's verdict for this identity. Under
/// `keep_existing`, an entry that already carries a `bindingRedirect` child
/// is left alone; an entry without one counts as insertable and gets the
/// redirect written, reported as `Updated`.
///
/// # Errors
/// Returns an error for unsigned identities or a stale handle.
pub fn apply(
    tree: &mut PolicyTree,
    identity: &AssemblyIdentity,
    existing: Option<EntryHandle>,
    keep_existing: bool,
) -> Result<MergeAction> {
    match existing {
        Some(handle) => {
            let Some(entry) = tree.entry_mut(handle) else {
                return Err(malformed_error!(
                    "Stale policy entry handle - {}",
                    identity.name
                ));
            };

            if keep_existing && entry.child_element("bindingRedirect").is_some() {
                return Ok(MergeAction::Skipped);
            }

            set_redirect(entry, identity);
            Ok(MergeAction::Updated)
        }
        None => {
            let handle = tree.insert_entry(identity)?;
            let Some(entry) = tree.entry_mut(handle) else {
                return Err(malformed_error!(
                    "Stale policy entry handle - {}",
                    identity.name
                ));
            };

            set_redirect(entry, identity);
            Ok(MergeAction::Inserted)
        }
    }
}

/// Writes the redirect range on an entry, reusing an existing
/// `bindingRedirect` child or appending one.
fn set_redirect(entry: &mut XmlElement, identity: &AssemblyIdentity) {
    let new_version = identity.version.to_string();

    match entry.child_element_mut("bindingRedirect") {
        Some(redirect) => {
            redirect.set_attr("oldVersion", WIDE_OLD_VERSION);
            redirect.set_attr("newVersion", new_version);
        }
        None => {
            let mut redirect = XmlElement::new("bindingRedirect");
            redirect.set_attr("oldVersion", WIDE_OLD_VERSION);
            redirect.set_attr("newVersion", new_version);
            entry.push_element(redirect);
        }
    }
}
