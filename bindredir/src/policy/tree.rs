//! The policy tree: `dependentAssembly` entries under the fixed ancestor
//! chain `configuration/runtime/assemblyBinding`.
//!
//! The tree wraps a preserved [`Document`] and keeps a key-to-position index
//! over the entries so lookups stay O(1) while every unrelated node in the
//! document is left untouched. Entries are only appended or updated in place,
//! never removed, so recorded positions stay valid across mutations.

use std::collections::HashMap;

use crate::{
    malformed_error,
    metadata::identity::AssemblyIdentity,
    policy::{
        document::{Document, XmlElement, XmlNode},
        matcher::EntryKey,
    },
    Result,
};

/// The binding-policy XML namespace.
pub const ASM_NS: &str = "urn:schemas-microsoft-com:asm.v1";

/// An opaque reference to a `dependentAssembly` entry.
///
/// Handles index into the `assemblyBinding` child list and remain valid for
/// the lifetime of the tree, since entries are never removed or reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryHandle(pub(crate) usize);

/// Namespace declarations of one element, as (prefix, uri) pairs.
///
/// The default namespace is recorded under the empty prefix; `xmlns=""`
/// undeclares it with an empty uri.
type NsDecls = Vec<(String, String)>;

fn ns_decls(element: &XmlElement) -> NsDecls {
    element
        .attributes
        .iter()
        .filter_map(|(key, value)| {
            if key == "xmlns" {
                Some((String::new(), value.clone()))
            } else {
                key.strip_prefix("xmlns:")
                    .map(|prefix| (prefix.to_string(), value.clone()))
            }
        })
        .collect()
}

/// Resolves the namespace of a qualified name against a scope of declaration
/// frames, innermost last.
fn effective_ns(name: &str, scope: &[NsDecls]) -> Option<String> {
    let prefix = match name.split_once(':') {
        Some((prefix, _)) => prefix,
        None => "",
    };

    for decls in scope.iter().rev() {
        for (declared, uri) in decls.iter().rev() {
            if declared == prefix {
                if uri.is_empty() {
                    return None;
                }
                return Some(uri.clone());
            }
        }
    }
    None
}

/// Finds the index of the first child element with the given local name and
/// namespace.
fn find_child(
    parent: &XmlElement,
    local: &str,
    namespace: Option<&str>,
    scope: &[NsDecls],
) -> Option<usize> {
    for (index, node) in parent.children.iter().enumerate() {
        let XmlNode::Element(element) = node else {
            continue;
        };
        if element.local_name() != local {
            continue;
        }

        let mut child_scope = scope.to_vec();
        child_scope.push(ns_decls(element));
        if effective_ns(&element.name, &child_scope).as_deref() == namespace {
            return Some(index);
        }
    }
    None
}

/// A policy document with located ancestors and an entry index.
pub struct PolicyTree {
    doc: Document,
    runtime: Option<usize>,
    binding: Option<usize>,
    index: HashMap<EntryKey, EntryHandle>,
}

impl PolicyTree {
    /// Wraps a document, locating the ancestor chain and indexing any
    /// existing entries. Missing levels of the chain stay absent until
    /// [`PolicyTree::ensure_ancestors`] runs.
    ///
    /// # Errors
    /// Returns an error if the root element is not a namespace-free
    /// `<configuration>`.
    pub fn new(doc: Document) -> Result<PolicyTree> {
        let root_decls = ns_decls(&doc.root);
        if doc.root.local_name() != "configuration"
            || effective_ns(&doc.root.name, &[root_decls]).is_some()
        {
            return Err(malformed_error!(
                "Root element is not <configuration> - <{}>",
                doc.root.name
            ));
        }

        let mut tree = PolicyTree {
            doc,
            runtime: None,
            binding: None,
            index: HashMap::new(),
        };
        tree.locate();
        Ok(tree)
    }

    /// Locates `runtime` and `assemblyBinding` and builds the entry index.
    fn locate(&mut self) {
        let root_decls = ns_decls(&self.doc.root);

        let Some(runtime_index) = find_child(
            &self.doc.root,
            "runtime",
            None,
            std::slice::from_ref(&root_decls),
        ) else {
            return;
        };
        self.runtime = Some(runtime_index);

        let Some(XmlNode::Element(runtime)) = self.doc.root.children.get(runtime_index) else {
            return;
        };
        let scope = vec![root_decls, ns_decls(runtime)];
        let Some(binding_index) = find_child(runtime, "assemblyBinding", Some(ASM_NS), &scope)
        else {
            return;
        };
        self.binding = Some(binding_index);

        let Some(XmlNode::Element(binding)) = runtime.children.get(binding_index) else {
            return;
        };
        let mut scope = scope;
        scope.push(ns_decls(binding));

        for (index, node) in binding.children.iter().enumerate() {
            let XmlNode::Element(element) = node else {
                continue;
            };
            if element.local_name() != "dependentAssembly" {
                continue;
            }

            let mut entry_scope = scope.clone();
            entry_scope.push(ns_decls(element));
            if effective_ns(&element.name, &entry_scope).as_deref() != Some(ASM_NS) {
                continue;
            }

            if let Some(key) = EntryKey::for_entry(element) {
                // First match wins when duplicates exist
                self.index.entry(key).or_insert(EntryHandle(index));
            }
        }
    }

    /// Idempotently creates any missing level of the ancestor chain.
    ///
    /// Existing siblings are untouched; a created `assemblyBinding` carries
    /// the policy namespace as its default namespace.
    pub fn ensure_ancestors(&mut self) {
        if self.runtime.is_none() {
            self.doc.root.push_element(XmlElement::new("runtime"));
            self.runtime = Some(self.doc.root.children.len() - 1);
        }

        if self.binding.is_none() {
            let Some(runtime_index) = self.runtime else {
                return;
            };
            let Some(XmlNode::Element(runtime)) = self.doc.root.children.get_mut(runtime_index)
            else {
                return;
            };

            let mut binding = XmlElement::new("assemblyBinding");
            binding.set_attr("xmlns", ASM_NS);
            runtime.push_element(binding);
            self.binding = Some(runtime.children.len() - 1);
        }
    }

    fn binding_element(&self) -> Option<&XmlElement> {
        let runtime_index = self.runtime?;
        let binding_index = self.binding?;

        let XmlNode::Element(runtime) = self.doc.root.children.get(runtime_index)? else {
            return None;
        };
        let XmlNode::Element(binding) = runtime.children.get(binding_index)? else {
            return None;
        };
        Some(binding)
    }

    fn binding_element_mut(&mut self) -> Option<&mut XmlElement> {
        let runtime_index = self.runtime?;
        let binding_index = self.binding?;

        let XmlNode::Element(runtime) = self.doc.root.children.get_mut(runtime_index)? else {
            return None;
        };
        let XmlNode::Element(binding) = runtime.children.get_mut(binding_index)? else {
            return None;
        };
        Some(binding)
    }

    /// Looks up an entry by key.
    #[must_use]
    pub fn find_entry(&self, key: &EntryKey) -> Option<EntryHandle> {
        self.index.get(key).copied()
    }

    /// Returns the entry element behind a handle.
    #[must_use]
    pub fn entry(&self, handle: EntryHandle) -> Option<&XmlElement> {
        match self.binding_element()?.children.get(handle.0)? {
            XmlNode::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Mutable variant of [`PolicyTree::entry`].
    pub fn entry_mut(&mut self, handle: EntryHandle) -> Option<&mut XmlElement> {
        match self.binding_element_mut()?.children.get_mut(handle.0)? {
            XmlNode::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Returns the number of indexed entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Appends a fresh `dependentAssembly` entry for the identity, creating
    /// missing ancestors first. The entry holds only the `assemblyIdentity`
    /// element; the culture attribute is omitted for neutral assemblies.
    ///
    /// # Errors
    /// Returns an error for unsigned identities, which never enter a policy.
    pub fn insert_entry(&mut self, identity: &AssemblyIdentity) -> Result<EntryHandle> {
        let Some(key) = EntryKey::for_identity(identity) else {
            return Err(malformed_error!(
                "Unsigned assembly cannot enter the policy - {}",
                identity.name
            ));
        };

        self.ensure_ancestors();

        let mut ident = XmlElement::new("assemblyIdentity");
        ident.set_attr("name", identity.name.as_str());
        ident.set_attr("publicKeyToken", key.token.as_str());
        if let Some(culture) = &key.culture {
            ident.set_attr("culture", culture.as_str());
        }

        let mut entry = XmlElement::new("dependentAssembly");
        entry.push_element(ident);

        let Some(binding) = self.binding_element_mut() else {
            return Err(malformed_error!("Policy ancestors could not be created"));
        };
        binding.push_element(entry);
        let handle = EntryHandle(binding.children.len() - 1);

        self.index.entry(key).or_insert(handle);
        Ok(handle)
    }

    /// Borrows the underlying document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Unwraps the tree back into its document for saving.
    #[must_use]
    pub fn into_document(self) -> Document {
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::identity::AssemblyVersion;

    fn signed(name: &str, culture: Option<&str>) -> AssemblyIdentity {
        AssemblyIdentity {
            name: name.to_string(),
            version: AssemblyVersion::new(1, 0, 0, 0),
            culture: culture.map(str::to_string),
            public_key_token: Some([0xAA, 0xBB, 0xCC, 0xDD, 0x00, 0x11, 0x22, 0x33]),
        }
    }

    #[test]
    fn rejects_foreign_root() {
        let doc = Document::parse("<settings/>").unwrap();
        assert!(PolicyTree::new(doc).is_err());

        let doc = Document::parse("<configuration xmlns=\"urn:other\"/>").unwrap();
        assert!(PolicyTree::new(doc).is_err());
    }

    #[test]
    fn ensure_ancestors_is_idempotent() {
        let doc = Document::parse("<configuration><appSettings/></configuration>").unwrap();
        let mut tree = PolicyTree::new(doc).unwrap();

        tree.ensure_ancestors();
        tree.ensure_ancestors();

        let rendered = tree.into_document().render().unwrap();
        assert_eq!(rendered.matches("<runtime>").count(), 1);
        assert_eq!(
            rendered
                .matches("<assemblyBinding xmlns=\"urn:schemas-microsoft-com:asm.v1\"")
                .count(),
            1
        );
        // Unrelated sibling survives
        assert!(rendered.contains("<appSettings/>"));
    }

    #[test]
    fn locates_existing_entries() {
        let doc = Document::parse(
            r#"<configuration>
  <runtime>
    <assemblyBinding xmlns="urn:schemas-microsoft-com:asm.v1">
      <dependentAssembly>
        <assemblyIdentity name="Lib" publicKeyToken="AABBCCDD00112233" />
        <bindingRedirect oldVersion="0.0.0.0-1.0.0.0" newVersion="1.0.0.0" />
      </dependentAssembly>
    </assemblyBinding>
  </runtime>
</configuration>"#,
        )
        .unwrap();

        let tree = PolicyTree::new(doc).unwrap();
        assert_eq!(tree.entry_count(), 1);

        let key = EntryKey::for_identity(&signed("Lib", None)).unwrap();
        let handle = tree.find_entry(&key).unwrap();
        let entry = tree.entry(handle).unwrap();
        assert!(entry.child_element("bindingRedirect").is_some());
    }

    #[test]
    fn resolves_prefixed_namespace() {
        let doc = Document::parse(
            r#"<configuration>
  <runtime>
    <asm:assemblyBinding xmlns:asm="urn:schemas-microsoft-com:asm.v1">
      <asm:dependentAssembly>
        <assemblyIdentity name="Lib" publicKeyToken="aabbccdd00112233" />
      </asm:dependentAssembly>
    </asm:assemblyBinding>
  </runtime>
</configuration>"#,
        )
        .unwrap();

        let tree = PolicyTree::new(doc).unwrap();
        assert_eq!(tree.entry_count(), 1);
    }

    #[test]
    fn ignores_binding_in_wrong_namespace() {
        let doc = Document::parse(
            r#"<configuration>
  <runtime>
    <assemblyBinding xmlns="urn:unrelated">
      <dependentAssembly>
        <assemblyIdentity name="Lib" publicKeyToken="aabbccdd00112233" />
      </dependentAssembly>
    </assemblyBinding>
  </runtime>
</configuration>"#,
        )
        .unwrap();

        let tree = PolicyTree::new(doc).unwrap();
        assert_eq!(tree.entry_count(), 0);
    }

    #[test]
    fn insert_entry_omits_neutral_culture() {
        let doc = Document::new(XmlElement::new("configuration"));
        let mut tree = PolicyTree::new(doc).unwrap();

        let handle = tree.insert_entry(&signed("Lib", None)).unwrap();
        let ident = tree
            .entry(handle)
            .unwrap()
            .child_element("assemblyIdentity")
            .unwrap();

        assert_eq!(ident.attr("name"), Some("Lib"));
        assert_eq!(ident.attr("publicKeyToken"), Some("aabbccdd00112233"));
        assert_eq!(ident.attr("culture"), None);
    }

    #[test]
    fn insert_entry_writes_culture() {
        let doc = Document::new(XmlElement::new("configuration"));
        let mut tree = PolicyTree::new(doc).unwrap();

        let handle = tree.insert_entry(&signed("Lib.de", Some("de-DE"))).unwrap();
        let ident = tree
            .entry(handle)
            .unwrap()
            .child_element("assemblyIdentity")
            .unwrap();

        assert_eq!(ident.attr("culture"), Some("de-DE"));
    }

    #[test]
    fn insert_entry_rejects_unsigned() {
        let doc = Document::new(XmlElement::new("configuration"));
        let mut tree = PolicyTree::new(doc).unwrap();

        let mut identity = signed("Lib", None);
        identity.public_key_token = None;

        assert!(tree.insert_entry(&identity).is_err());
    }

    #[test]
    fn duplicate_entries_first_match_wins() {
        let doc = Document::parse(
            r#"<configuration>
  <runtime>
    <assemblyBinding xmlns="urn:schemas-microsoft-com:asm.v1">
      <dependentAssembly>
        <assemblyIdentity name="Lib" publicKeyToken="aabbccdd00112233" />
        <bindingRedirect oldVersion="0.0.0.0-1.0.0.0" newVersion="1.0.0.0" />
      </dependentAssembly>
      <dependentAssembly>
        <assemblyIdentity name="Lib" publicKeyToken="aabbccdd00112233" />
        <bindingRedirect oldVersion="0.0.0.0-2.0.0.0" newVersion="2.0.0.0" />
      </dependentAssembly>
    </assemblyBinding>
  </runtime>
</configuration>"#,
        )
        .unwrap();

        let tree = PolicyTree::new(doc).unwrap();
        let key = EntryKey::for_identity(&signed("Lib", None)).unwrap();
        let handle = tree.find_entry(&key).unwrap();
        let redirect = tree
            .entry(handle)
            .unwrap()
            .child_element("bindingRedirect")
            .unwrap();

        assert_eq!(redirect.attr("newVersion"), Some("1.0.0.0"));
    }
}
