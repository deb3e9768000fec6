//! # Label Templates
//!
//! A label template is an SVG document whose addressable elements (`text`,
//! `rect`, `image` carrying an `id`) act as typed fields that are resolved to
//! concrete values at render time.
//!
//! ## Modules
//!
//! - [`extract`]: scans a template for fields and their default values
//! - [`render`]: mutates a working copy of the document per field type
//! - [`date`]: date format token substitution
//! - [`measure`]: injected text-measurement capability for autosizing
//!
//! ## Document Model
//!
//! Rendering never mutates a [`Template`]. Each render parses the template
//! markup into an owned [`Document`] — an arena of elements plus an index
//! from field id to node handle — mutates that working copy through the
//! index, and serializes it back to SVG for compositing.

pub mod date;
pub mod extract;
pub mod measure;
pub mod render;

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::EtiquetaError;

/// Identity of the built-in system template that always exists and cannot be
/// deleted.
pub const DEFAULT_TEMPLATE_ID: &str = "default_no_template";

// ============================================================================
// FIELD METADATA
// ============================================================================

/// The type of a template field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Free text, possibly multi-line, optionally autosized
    #[default]
    Text,
    /// A date value formatted through [`date::format_date`]
    Date,
    /// A QR symbol replacing a rectangular placeholder
    Qr,
    /// A raster image substituted into an image placeholder
    Image,
}

/// QR error-correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QrEcLevel {
    L,
    #[default]
    M,
    Q,
    H,
}

impl QrEcLevel {
    /// Parse the `data-qr-error-correction` attribute value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "L" => Some(QrEcLevel::L),
            "M" => Some(QrEcLevel::M),
            "Q" => Some(QrEcLevel::Q),
            "H" => Some(QrEcLevel::H),
            _ => None,
        }
    }
}

/// Metadata for one addressable field in a template.
///
/// Option fields only carry meaning for their corresponding [`FieldKind`],
/// mirroring the `data-*` attributes they are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// Element id, unique within the template
    pub id: String,
    pub kind: FieldKind,
    /// Optional display label (`data-label`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Hideable without affecting other fields (`data-optional`)
    #[serde(default)]
    pub optional: bool,
    /// QR version 1–40; `None` selects automatically (`data-qr-version`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_version: Option<u8>,
    /// QR error-correction level, defaults to M (`data-qr-error-correction`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_ec_level: Option<QrEcLevel>,
    /// Date format tokens (`data-date-format`), defaults to `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    /// Target image width in user units (`data-image-width`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u32>,
    /// Target image height in user units (`data-image-height`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u32>,
}

impl FieldMetadata {
    /// A plain text field with no options.
    pub fn text(id: impl Into<String>) -> Self {
        FieldMetadata {
            id: id.into(),
            kind: FieldKind::Text,
            label: None,
            optional: false,
            qr_version: None,
            qr_ec_level: None,
            date_format: None,
            image_width: None,
            image_height: None,
        }
    }
}

// ============================================================================
// TEMPLATE
// ============================================================================

/// A stored label template: markup plus field metadata and current values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    /// The SVG template document
    pub svg: String,
    /// Field metadata in document order
    pub fields: Vec<FieldMetadata>,
    /// Current field values; image fields hold a data-URL-encoded bitmap
    pub values: BTreeMap<String, String>,
    /// Creation time, epoch milliseconds (0 for the system template)
    pub created_at: i64,
    /// Last time this template was printed, epoch milliseconds
    pub last_used_at: i64,
}

impl Template {
    /// Build a template from SVG markup, extracting fields and defaults.
    ///
    /// A document with zero addressable elements is an invalid template.
    pub fn from_svg(
        id: impl Into<String>,
        name: impl Into<String>,
        svg: impl Into<String>,
    ) -> Result<Self, EtiquetaError> {
        let svg = svg.into();
        let doc = Document::parse(&svg)?;
        let extracted = extract::extract_fields(&doc);
        if extracted.fields.is_empty() {
            return Err(EtiquetaError::TemplateParse(
                "template has no addressable fields".into(),
            ));
        }
        let now = chrono::Utc::now().timestamp_millis();
        Ok(Template {
            id: id.into(),
            name: name.into(),
            svg,
            fields: extracted.fields,
            values: extracted.defaults,
            created_at: now,
            last_used_at: now,
        })
    }

    /// Look up field metadata by id.
    pub fn field(&self, id: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Check the value-map invariant: every value id has metadata.
    pub fn validate_values(&self) -> Result<(), EtiquetaError> {
        for id in self.values.keys() {
            if self.field(id).is_none() {
                return Err(EtiquetaError::TemplateParse(format!(
                    "value for unknown field '{id}'"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// OWNED DOCUMENT TREE
// ============================================================================

/// Handle to an element inside a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Child slot of an element: a nested element or a text run.
#[derive(Debug, Clone)]
pub enum Child {
    Element(NodeId),
    Text(String),
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<Child>,
    parent: Option<NodeId>,
}

/// An owned, mutable XML element tree with an id → node index.
///
/// The parse is immutable (the source string is left untouched); all
/// mutation happens on this working copy through [`NodeId`] handles, never
/// via ambient lookup.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<ElementData>,
    root: NodeId,
    index: HashMap<String, NodeId>,
    /// Namespace declarations (prefix, uri) re-emitted on the root element.
    namespaces: Vec<(Option<String>, String)>,
}

impl Document {
    /// Parse SVG markup into an owned tree.
    pub fn parse(svg: &str) -> Result<Self, EtiquetaError> {
        let parsed = roxmltree::Document::parse(svg)
            .map_err(|e| EtiquetaError::TemplateParse(e.to_string()))?;

        let mut doc = Document {
            nodes: Vec::new(),
            root: NodeId(0),
            index: HashMap::new(),
            namespaces: Vec::new(),
        };
        let root = doc.convert(parsed.root_element(), None);
        doc.root = root;

        for ns in parsed.root_element().namespaces() {
            doc.namespaces
                .push((ns.name().map(str::to_string), ns.uri().to_string()));
        }
        Ok(doc)
    }

    fn convert(&mut self, node: roxmltree::Node, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ElementData {
            tag: qualified_tag(&node),
            attrs: node
                .attributes()
                .map(|a| (qualified_attr(&node, &a), a.value().to_string()))
                .collect(),
            children: Vec::new(),
            parent,
        });

        if let Some(elem_id) = node.attribute("id") {
            self.index.entry(elem_id.to_string()).or_insert(id);
        }

        let mut children = Vec::new();
        for child in node.children() {
            if child.is_element() {
                children.push(Child::Element(self.convert(child, Some(id))));
            } else if child.is_text() {
                if let Some(text) = child.text() {
                    children.push(Child::Text(text.to_string()));
                }
            }
        }
        self.nodes[id.0].children = children;
        id
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Resolve a field id to its node handle.
    pub fn get(&self, id: &str) -> Option<NodeId> {
        self.index.get(id).copied()
    }

    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node.0]
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse a numeric attribute, tolerating a trailing unit suffix.
    pub fn attr_f32(&self, node: NodeId, name: &str) -> Option<f32> {
        let raw = self.attr(node, name)?;
        let digits: &str = raw.trim().trim_end_matches(|c: char| c.is_ascii_alphabetic());
        digits.parse().ok()
    }

    /// Set (or append) an attribute, preserving attribute order.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        let attrs = &mut self.nodes[node.0].attrs;
        match attrs.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => attrs.push((name.to_string(), value)),
        }
    }

    pub fn children(&self, node: NodeId) -> &[Child] {
        &self.nodes[node.0].children
    }

    /// Direct and nested child elements with the given tag, document order.
    pub fn descendants_with_tag(&self, node: NodeId, tag: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(node, tag, &mut out);
        out
    }

    fn collect_descendants(&self, node: NodeId, tag: &str, out: &mut Vec<NodeId>) {
        for child in &self.nodes[node.0].children {
            if let Child::Element(id) = child {
                if self.nodes[id.0].tag == tag {
                    out.push(*id);
                }
                self.collect_descendants(*id, tag, out);
            }
        }
    }

    /// Every element in document order, starting at the root.
    pub fn elements(&self) -> Vec<NodeId> {
        let mut out = vec![self.root];
        let mut i = 0;
        while i < out.len() {
            let node = out[i];
            // Insert children right after their parent to keep document order
            let children: Vec<NodeId> = self.nodes[node.0]
                .children
                .iter()
                .filter_map(|c| match c {
                    Child::Element(id) => Some(*id),
                    Child::Text(_) => None,
                })
                .collect();
            out.splice(i + 1..i + 1, children);
            i += 1;
        }
        out
    }

    /// Concatenated text of the element and its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.append_text(node, &mut out);
        out
    }

    fn append_text(&self, node: NodeId, out: &mut String) {
        for child in &self.nodes[node.0].children {
            match child {
                Child::Text(t) => out.push_str(t),
                Child::Element(id) => self.append_text(*id, out),
            }
        }
    }

    /// Replace all children with a single text run.
    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) {
        self.nodes[node.0].children = vec![Child::Text(text.into())];
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ElementData {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            parent: None,
        });
        id
    }

    /// Append a detached element as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(Child::Element(child));
        if let Some(elem_id) = self.attr(child, "id").map(str::to_string) {
            self.index.entry(elem_id).or_insert(child);
        }
    }

    /// Remove every child element (text runs included).
    pub fn clear_children(&mut self, node: NodeId) {
        self.nodes[node.0].children.clear();
    }

    /// Detach an element from the tree and drop it from the id index.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent {
            self.nodes[parent.0]
                .children
                .retain(|c| !matches!(c, Child::Element(id) if *id == node));
        }
        self.nodes[node.0].parent = None;
        self.index.retain(|_, id| *id != node);
    }

    /// Serialize back to SVG markup.
    pub fn to_svg(&self) -> String {
        let mut out = String::new();
        self.write_element(self.root, true, &mut out);
        out
    }

    fn write_element(&self, node: NodeId, is_root: bool, out: &mut String) {
        let data = &self.nodes[node.0];
        let _ = write!(out, "<{}", data.tag);
        if is_root {
            for (prefix, uri) in &self.namespaces {
                match prefix {
                    Some(p) => {
                        let _ = write!(out, " xmlns:{}=\"{}\"", p, escape_attr(uri));
                    }
                    None => {
                        let _ = write!(out, " xmlns=\"{}\"", escape_attr(uri));
                    }
                }
            }
        }
        for (name, value) in &data.attrs {
            let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
        }
        if data.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &data.children {
            match child {
                Child::Text(t) => out.push_str(&escape_text(t)),
                Child::Element(id) => self.write_element(*id, false, out),
            }
        }
        let _ = write!(out, "</{}>", data.tag);
    }
}

/// Serialized tag name, restoring the prefix for non-default namespaces.
fn qualified_tag(node: &roxmltree::Node) -> String {
    let name = node.tag_name();
    match name.namespace() {
        Some(uri) => match node.lookup_prefix(uri) {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, name.name()),
            _ => name.name().to_string(),
        },
        None => name.name().to_string(),
    }
}

/// Serialized attribute name, restoring the prefix for namespaced attributes.
fn qualified_attr(node: &roxmltree::Node, attr: &roxmltree::Attribute) -> String {
    match attr.namespace() {
        Some(uri) => match node.lookup_prefix(uri) {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, attr.name()),
            _ => attr.name().to_string(),
        },
        None => attr.name().to_string(),
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Format a float attribute without trailing `.0` noise.
pub(crate) fn fmt_num(value: f32) -> String {
    if value.fract() == 0.0 && value.abs() < 1e7 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 50">
 <text id="Title" x="10" y="20" font-size="12">Hello</text>
 <rect id="Code" data-field-type="qr" x="5" y="5" width="40" height="40"/>
</svg>"#;

    #[test]
    fn test_parse_indexes_ids() {
        let doc = Document::parse(SIMPLE).unwrap();
        let title = doc.get("Title").unwrap();
        assert_eq!(doc.tag(title), "text");
        assert_eq!(doc.attr(title, "font-size"), Some("12"));
        assert!(doc.get("Missing").is_none());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            Document::parse("<svg"),
            Err(EtiquetaError::TemplateParse(_))
        ));
    }

    #[test]
    fn test_text_content_joins_descendants() {
        let doc = Document::parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><text id="T"><tspan>a</tspan><tspan>b</tspan></text></svg>"#,
        )
        .unwrap();
        assert_eq!(doc.text_content(doc.get("T").unwrap()), "ab");
    }

    #[test]
    fn test_set_attr_replaces_and_appends() {
        let mut doc = Document::parse(SIMPLE).unwrap();
        let title = doc.get("Title").unwrap();
        doc.set_attr(title, "font-size", "9");
        doc.set_attr(title, "font-weight", "bold");
        assert_eq!(doc.attr(title, "font-size"), Some("9"));
        assert_eq!(doc.attr(title, "font-weight"), Some("bold"));
    }

    #[test]
    fn test_remove_detaches_and_unindexes() {
        let mut doc = Document::parse(SIMPLE).unwrap();
        let code = doc.get("Code").unwrap();
        doc.remove(code);
        assert!(doc.get("Code").is_none());
        assert!(!doc.to_svg().contains("rect"));
    }

    #[test]
    fn test_roundtrip_preserves_structure() {
        let doc = Document::parse(SIMPLE).unwrap();
        let svg = doc.to_svg();
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(svg.contains("<text id=\"Title\" x=\"10\" y=\"20\" font-size=\"12\">Hello</text>"));
        // Serialized output parses again
        let again = Document::parse(&svg).unwrap();
        assert!(again.get("Title").is_some());
    }

    #[test]
    fn test_roundtrip_escapes_special_chars() {
        let mut doc = Document::parse(SIMPLE).unwrap();
        let title = doc.get("Title").unwrap();
        doc.set_text(title, "a<b & \"c\"");
        let svg = doc.to_svg();
        assert!(svg.contains("a&lt;b &amp; \"c\""));
        let again = Document::parse(&svg).unwrap();
        assert_eq!(doc.text_content(title), again.text_content(again.get("Title").unwrap()));
    }

    #[test]
    fn test_attr_f32_tolerates_units() {
        let doc = Document::parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><text id="T" font-size="32px" x="4.5">x</text></svg>"#,
        )
        .unwrap();
        let t = doc.get("T").unwrap();
        assert_eq!(doc.attr_f32(t, "font-size"), Some(32.0));
        assert_eq!(doc.attr_f32(t, "x"), Some(4.5));
        assert_eq!(doc.attr_f32(t, "y"), None);
    }

    #[test]
    fn test_elements_document_order() {
        let doc = Document::parse(SIMPLE).unwrap();
        let tags: Vec<&str> = doc.elements().iter().map(|n| doc.tag(*n)).collect();
        assert_eq!(tags, vec!["svg", "text", "rect"]);
    }

    #[test]
    fn test_template_requires_fields() {
        let err = Template::from_svg(
            "t1",
            "Empty",
            r#"<svg xmlns="http://www.w3.org/2000/svg"><circle r="5"/></svg>"#,
        )
        .unwrap_err();
        assert!(matches!(err, EtiquetaError::TemplateParse(_)));
    }

    #[test]
    fn test_template_value_invariant() {
        let mut template = Template::from_svg("t1", "Simple", SIMPLE).unwrap();
        template.validate_values().unwrap();
        template.values.insert("ghost".into(), "x".into());
        assert!(template.validate_values().is_err());
    }

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(32.0), "32");
        assert_eq!(fmt_num(-4.0), "-4");
        assert_eq!(fmt_num(12.5), "12.5");
    }
}
