//! A small preserved XML tree over `quick-xml`.
//!
//! Configuration documents are loaded into an owned node tree, mutated in
//! place, and written back with two-space indentation. Comments, CDATA,
//! processing instructions and unknown elements survive a load/save cycle;
//! insignificant whitespace between elements is re-derived from the tree
//! structure on save, the same way `XDocument` handles it.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::{malformed_error, Result};

/// A node in the document tree.
#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    /// An element with attributes and children
    Element(XmlElement),
    /// Unescaped character data
    Text(String),
    /// A comment, stored with its raw content
    Comment(String),
    /// A CDATA section, stored with its raw content
    CData(String),
    /// A processing instruction, stored with its raw content
    Pi(String),
    /// A DOCTYPE declaration, stored with its raw content
    DocType(String),
}

/// An element with its attributes and child nodes, in document order.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `assemblyBinding` or `asm:assemblyBinding`
    pub name: String,
    /// Attributes in document order, including `xmlns` declarations
    pub attributes: Vec<(String, String)>,
    /// Child nodes in document order
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an element with no attributes or children.
    pub fn new(name: impl Into<String>) -> Self {
        XmlElement {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Returns the name with any namespace prefix stripped.
    #[must_use]
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// Returns the value of the named attribute, if present.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute, replacing an existing value or appending a new one.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Appends a child element.
    pub fn push_element(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    /// Iterates the element children, skipping text and comments.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Returns the first child element with the given local name.
    ///
    /// The comparison strips namespace prefixes; callers resolve namespaces
    /// before descending into a subtree.
    #[must_use]
    pub fn child_element(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|element| element.local_name() == local)
    }

    /// Mutable variant of [`XmlElement::child_element`].
    pub fn child_element_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(element) if element.local_name() == local => Some(element),
            _ => None,
        })
    }
}

/// Strips a namespace prefix from a qualified name.
#[must_use]
pub fn local_name(name: &str) -> &str {
    match name.split_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}

/// The XML declaration of a document.
#[derive(Clone, Debug, PartialEq)]
pub struct XmlDecl {
    /// XML version, normally "1.0"
    pub version: String,
    /// Declared encoding, if any
    pub encoding: Option<String>,
    /// Standalone flag, if any
    pub standalone: Option<String>,
}

impl Default for XmlDecl {
    fn default() -> Self {
        XmlDecl {
            version: "1.0".to_string(),
            encoding: Some("utf-8".to_string()),
            standalone: None,
        }
    }
}

/// A parsed XML document: declaration, prolog, one root element, epilog.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// The declaration; a default one is written if the source had none
    pub decl: XmlDecl,
    /// Comments and processing instructions before the root element
    pub prolog: Vec<XmlNode>,
    /// The root element
    pub root: XmlElement,
    /// Comments and processing instructions after the root element
    pub epilog: Vec<XmlNode>,
}

impl Document {
    /// Creates a fresh document around the given root element.
    #[must_use]
    pub fn new(root: XmlElement) -> Self {
        Document {
            decl: XmlDecl::default(),
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Parses a document from text.
    ///
    /// # Errors
    /// Returns an error if the text is not well-formed XML or has no root
    /// element.
    pub fn parse(text: &str) -> Result<Document> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut reader = Reader::from_str(text);
        let mut builder = TreeBuilder::default();

        loop {
            match reader.read_event().map_err(quick_xml::Error::from)? {
                Event::Decl(event) => {
                    let version = event.version().map_err(quick_xml::Error::from)?;
                    let encoding = event.encoding().transpose().map_err(quick_xml::Error::from)?;
                    let standalone = event
                        .standalone()
                        .transpose()
                        .map_err(quick_xml::Error::from)?;

                    builder.decl = Some(XmlDecl {
                        version: String::from_utf8_lossy(&version).into_owned(),
                        encoding: encoding.map(|e| String::from_utf8_lossy(&e).into_owned()),
                        standalone: standalone.map(|s| String::from_utf8_lossy(&s).into_owned()),
                    });
                }
                Event::Start(event) => {
                    builder.flush_text();
                    let element = read_element(&event)?;
                    builder.stack.push(element);
                }
                Event::Empty(event) => {
                    builder.flush_text();
                    let element = read_element(&event)?;
                    builder.push_node(XmlNode::Element(element))?;
                }
                Event::End(_) => {
                    builder.flush_text();
                    let Some(element) = builder.stack.pop() else {
                        return Err(malformed_error!("Unmatched closing tag"));
                    };
                    builder.push_node(XmlNode::Element(element))?;
                }
                Event::Text(event) => {
                    // Expands character and predefined entity references
                    let text = event.unescape().map_err(quick_xml::Error::from)?;
                    builder.pending_text.push_str(&text);
                }
                Event::CData(event) => {
                    builder.flush_text();
                    builder.push_node(XmlNode::CData(
                        String::from_utf8_lossy(event.as_ref()).into_owned(),
                    ))?;
                }
                Event::Comment(event) => {
                    builder.flush_text();
                    builder.push_node(XmlNode::Comment(
                        String::from_utf8_lossy(event.as_ref()).into_owned(),
                    ))?;
                }
                Event::PI(event) => {
                    builder.flush_text();
                    builder.push_node(XmlNode::Pi(
                        String::from_utf8_lossy(event.as_ref()).into_owned(),
                    ))?;
                }
                Event::DocType(event) => {
                    builder.flush_text();
                    builder.push_node(XmlNode::DocType(
                        String::from_utf8_lossy(event.as_ref()).into_owned(),
                    ))?;
                }
                Event::Eof => break,
            }
        }

        if !builder.stack.is_empty() {
            return Err(malformed_error!("Unclosed element at end of document"));
        }

        let Some(root) = builder.root else {
            return Err(malformed_error!("Document has no root element"));
        };

        Ok(Document {
            decl: builder.decl.unwrap_or_default(),
            prolog: builder.prolog,
            root,
            epilog: builder.epilog,
        })
    }

    /// Loads and parses a document from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not well-formed XML.
    pub fn load(path: &Path) -> Result<Document> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Renders the document as indented XML text.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn render(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new(
            &self.decl.version,
            self.decl.encoding.as_deref(),
            self.decl.standalone.as_deref(),
        )))?;

        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        for node in &self.epilog {
            write_node(&mut writer, node)?;
        }

        match String::from_utf8(writer.into_inner()) {
            Ok(text) => Ok(text),
            Err(_) => Err(malformed_error!("Rendered document is not valid UTF-8")),
        }
    }

    /// Writes the document to disk atomically (temp file + rename).
    ///
    /// # Errors
    /// Returns an error if rendering or any file operation fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = self.render()?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, text.as_bytes())?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Incremental state while replaying reader events into a tree.
#[derive(Default)]
struct TreeBuilder {
    decl: Option<XmlDecl>,
    prolog: Vec<XmlNode>,
    root: Option<XmlElement>,
    epilog: Vec<XmlNode>,
    stack: Vec<XmlElement>,
    pending_text: String,
}

impl TreeBuilder {
    /// Attaches a completed node to the innermost open element, or to the
    /// document level when no element is open.
    fn push_node(&mut self, node: XmlNode) -> Result<()> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
            return Ok(());
        }

        match node {
            XmlNode::Element(element) => {
                if self.root.is_some() {
                    return Err(malformed_error!(
                        "Multiple root elements - <{}>",
                        element.name
                    ));
                }
                self.root = Some(element);
            }
            other => {
                if self.root.is_none() {
                    self.prolog.push(other);
                } else {
                    self.epilog.push(other);
                }
            }
        }
        Ok(())
    }

    /// Emits accumulated character data as a text node, dropping runs that
    /// are whitespace only (inter-element indentation).
    fn flush_text(&mut self) {
        if self.pending_text.trim().is_empty() {
            self.pending_text.clear();
            return;
        }

        let text = std::mem::take(&mut self.pending_text);
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(XmlNode::Text(text));
        }
    }
}

fn read_element(event: &BytesStart<'_>) -> Result<XmlElement> {
    let name = match std::str::from_utf8(event.name().as_ref()) {
        Ok(name) => name.to_string(),
        Err(_) => return Err(malformed_error!("Element name is not valid UTF-8")),
    };

    let mut element = XmlElement::new(name);
    for attribute in event.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = match std::str::from_utf8(attribute.key.as_ref()) {
            Ok(key) => key.to_string(),
            Err(_) => return Err(malformed_error!("Attribute name is not valid UTF-8")),
        };
        let value = attribute
            .unescape_value()
            .map_err(quick_xml::Error::from)?
            .into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<()> {
    match node {
        XmlNode::Element(element) => write_element(writer, element)?,
        XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        XmlNode::Comment(text) => {
            writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?;
        }
        XmlNode::CData(text) => writer.write_event(Event::CData(BytesCData::new(text.as_str())))?,
        XmlNode::Pi(text) => writer.write_event(Event::PI(BytesPI::new(text.as_str())))?,
        XmlNode::DocType(text) => {
            writer.write_event(Event::DocType(BytesText::from_escaped(text.as_str())))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let doc = Document::parse(
            r#"<?xml version="1.0" encoding="utf-8"?>
<configuration>
  <appSettings>
    <add key="a" value="1" />
  </appSettings>
</configuration>"#,
        )
        .unwrap();

        assert_eq!(doc.decl.version, "1.0");
        assert_eq!(doc.decl.encoding.as_deref(), Some("utf-8"));
        assert_eq!(doc.root.name, "configuration");

        let settings = doc.root.child_element("appSettings").unwrap();
        let add = settings.child_element("add").unwrap();
        assert_eq!(add.attr("key"), Some("a"));
        assert_eq!(add.attr("value"), Some("1"));
    }

    #[test]
    fn parse_without_decl() {
        let doc = Document::parse("<configuration><runtime/></configuration>").unwrap();

        assert_eq!(doc.decl, XmlDecl::default());
        assert!(doc.root.child_element("runtime").is_some());
    }

    #[test]
    fn parse_no_root() {
        assert!(Document::parse("<?xml version=\"1.0\"?>").is_err());
        assert!(Document::parse("").is_err());
    }

    #[test]
    fn parse_unclosed() {
        assert!(Document::parse("<configuration><runtime>").is_err());
    }

    #[test]
    fn roundtrip_preserves_unrelated_content() {
        let source = r#"<?xml version="1.0" encoding="utf-8"?>
<configuration>
  <!-- build servers overwrite this section -->
  <appSettings>
    <add key="greeting" value="a &amp; b"/>
  </appSettings>
  <runtime/>
</configuration>"#;

        let doc = Document::parse(source).unwrap();
        let rendered = doc.render().unwrap();
        let reparsed = Document::parse(&rendered).unwrap();

        assert_eq!(doc, reparsed);
        assert!(rendered.contains("<!-- build servers overwrite this section -->"));
        assert!(rendered.contains("a &amp; b"));
    }

    #[test]
    fn attribute_escaping_roundtrip() {
        let mut root = XmlElement::new("configuration");
        let mut child = XmlElement::new("add");
        child.set_attr("value", "x < \"y\" & z");
        root.push_element(child);

        let rendered = Document::new(root).render().unwrap();
        let reparsed = Document::parse(&rendered).unwrap();

        assert_eq!(
            reparsed.root.child_element("add").unwrap().attr("value"),
            Some("x < \"y\" & z")
        );
    }

    #[test]
    fn text_content_roundtrip() {
        let doc = Document::parse("<a><b>1 &lt; 2</b></a>").unwrap();
        let b = doc.root.child_element("b").unwrap();
        assert_eq!(b.children, vec![XmlNode::Text("1 < 2".to_string())]);

        let rendered = doc.render().unwrap();
        assert!(rendered.contains("<b>1 &lt; 2</b>"));
    }

    #[test]
    fn entity_references_expand_in_text() {
        let doc = Document::parse("<a><b>x &amp; y &#233; &apos;z&apos;</b></a>").unwrap();
        let b = doc.root.child_element("b").unwrap();

        assert_eq!(
            b.children,
            vec![XmlNode::Text("x & y \u{e9} 'z'".to_string())]
        );
    }

    #[test]
    fn set_attr_replaces() {
        let mut element = XmlElement::new("bindingRedirect");
        element.set_attr("newVersion", "1.0.0.0");
        element.set_attr("newVersion", "2.0.0.0");

        assert_eq!(element.attributes.len(), 1);
        assert_eq!(element.attr("newVersion"), Some("2.0.0.0"));
    }

    #[test]
    fn local_name_strips_prefix() {
        assert_eq!(local_name("asm:assemblyBinding"), "assemblyBinding");
        assert_eq!(local_name("runtime"), "runtime");
    }

    #[test]
    fn fresh_document_has_decl() {
        let rendered = Document::new(XmlElement::new("configuration"))
            .render()
            .unwrap();

        assert!(rendered.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(rendered.contains("<configuration/>"));
    }
}
