//! Matching discovered identities against existing policy entries.
//!
//! An entry key is the strong-name triple a redirect is keyed on: simple
//! name, lowercase public-key token hex, and normalized culture. Version is
//! deliberately not part of the key; the redirect's purpose is to retarget
//! whatever version a consumer asks for.

use crate::{
    metadata::identity::AssemblyIdentity,
    policy::{
        document::XmlElement,
        tree::{EntryHandle, PolicyTree},
    },
};

/// The lookup key of a policy entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntryKey {
    /// Simple assembly name, compared verbatim
    pub name: String,
    /// Public-key token as 16 lowercase hex characters
    pub token: String,
    /// Culture, `None` for neutral
    pub culture: Option<String>,
}

impl EntryKey {
    /// Builds the key for a discovered identity, or `None` if it is
    /// unsigned. Unsigned assemblies never take part in binding policy.
    #[must_use]
    pub fn for_identity(identity: &AssemblyIdentity) -> Option<EntryKey> {
        let token = identity.token_hex()?;
        Some(EntryKey {
            name: identity.name.clone(),
            token,
            culture: normalize_culture(identity.culture.as_deref()),
        })
    }

    /// Reads the key off an existing `dependentAssembly` element, or `None`
    /// if it has no usable `assemblyIdentity` child.
    #[must_use]
    pub(crate) fn for_entry(entry: &XmlElement) -> Option<EntryKey> {
        let ident = entry.child_element("assemblyIdentity")?;
        let name = ident.attr("name")?.to_string();
        let token = ident.attr("publicKeyToken")?.to_ascii_lowercase();

        Some(EntryKey {
            name,
            token,
            culture: normalize_culture(ident.attr("culture")),
        })
    }
}

/// Normalizes a culture value: an absent, empty or explicit "neutral"
/// culture all mean culture-neutral.
pub(crate) fn normalize_culture(culture: Option<&str>) -> Option<String> {
    match culture {
        Some(value) if !value.is_empty() && !value.eq_ignore_ascii_case("neutral") => {
            Some(value.to_string())
        }
        _ => None,
    }
}

/// Finds the entry matching a discovered identity, if any.
///
/// Unsigned identities match nothing. With the uniqueness invariant held by
/// the tree index, the first structural match is the only one.
#[must_use]
pub fn find_match(tree: &PolicyTree, identity: &AssemblyIdentity) -> Option<EntryHandle> {
    let key = EntryKey::for_identity(identity)?;
    tree.find_entry(&key)
}
