//! Field extraction: scan a template document for addressable elements.
//!
//! An element is addressable when it carries an `id` and is one of the
//! allowed kinds: a text container (`text`), a rectangular placeholder
//! (`rect`) or an image placeholder (`image`). The declared field type comes
//! from `data-field-type`; untyped elements are text fields.

use std::collections::BTreeMap;

use super::{Document, FieldKind, FieldMetadata, QrEcLevel};

/// Element tags that can host a field.
const ADDRESSABLE_TAGS: &[&str] = &["text", "rect", "image"];

/// Result of scanning a template: metadata in document order plus the
/// default value for each field.
#[derive(Debug, Default)]
pub struct ExtractedFields {
    pub fields: Vec<FieldMetadata>,
    pub defaults: BTreeMap<String, String>,
}

/// Scan `doc` for addressable elements.
///
/// Returns an empty set when the document contains none — the caller must
/// treat that as an invalid template.
pub fn extract_fields(doc: &Document) -> ExtractedFields {
    let mut out = ExtractedFields::default();

    for node in doc.elements() {
        if !ADDRESSABLE_TAGS.contains(&doc.tag(node)) {
            continue;
        }
        let Some(id) = doc.attr(node, "id").filter(|id| !id.is_empty()) else {
            continue;
        };
        // First occurrence of an id wins, like getElementById
        if out.defaults.contains_key(id) {
            continue;
        }

        let metadata = read_metadata(doc, node, id);
        let default = default_value(doc, node, metadata.kind);
        out.defaults.insert(id.to_string(), default);
        out.fields.push(metadata);
    }
    out
}

fn read_metadata(doc: &Document, node: super::NodeId, id: &str) -> FieldMetadata {
    let kind = match doc.attr(node, "data-field-type") {
        Some("date") => FieldKind::Date,
        Some("qr") => FieldKind::Qr,
        Some("image") => FieldKind::Image,
        _ => FieldKind::Text,
    };

    let mut metadata = FieldMetadata {
        id: id.to_string(),
        kind,
        label: doc.attr(node, "data-label").map(str::to_string),
        optional: doc.attr(node, "data-optional") == Some("true"),
        ..FieldMetadata::text(id)
    };

    match kind {
        FieldKind::Qr => {
            metadata.qr_version = doc
                .attr(node, "data-qr-version")
                .and_then(|v| v.parse().ok())
                .filter(|v| (1..=40).contains(v));
            metadata.qr_ec_level = Some(
                doc.attr(node, "data-qr-error-correction")
                    .and_then(QrEcLevel::parse)
                    .unwrap_or_default(),
            );
        }
        FieldKind::Date => {
            metadata.date_format = Some(
                doc.attr(node, "data-date-format")
                    .unwrap_or("YYYY-MM-DD")
                    .to_string(),
            );
        }
        FieldKind::Image => {
            metadata.image_width = doc
                .attr(node, "data-image-width")
                .and_then(|v| v.parse().ok());
            metadata.image_height = doc
                .attr(node, "data-image-height")
                .and_then(|v| v.parse().ok());
        }
        FieldKind::Text => {}
    }
    metadata
}

/// Default value for a freshly extracted field.
///
/// Dates default to the current calendar date; QR and image fields start
/// empty; text fields keep the element's literal content with sub-lines
/// joined by newline.
fn default_value(doc: &Document, node: super::NodeId, kind: FieldKind) -> String {
    match kind {
        FieldKind::Date => chrono::Local::now().date_naive().format("%Y-%m-%d").to_string(),
        FieldKind::Qr | FieldKind::Image => String::new(),
        FieldKind::Text => {
            let tspans = doc.descendants_with_tag(node, "tspan");
            if tspans.is_empty() {
                doc.text_content(node)
            } else {
                tspans
                    .iter()
                    .map(|t| doc.text_content(*t))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(svg: &str) -> Document {
        Document::parse(svg).unwrap()
    }

    #[test]
    fn test_extracts_in_document_order() {
        let doc = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
 <text id="A">one</text>
 <rect id="B" data-field-type="qr" width="10" height="10"/>
 <image id="C" data-field-type="image" href="x.png" width="8" height="8"/>
 <text id="D" data-field-type="date" data-date-format="DD/MM/YYYY">x</text>
</svg>"#,
        );
        let extracted = extract_fields(&doc);
        let ids: Vec<&str> = extracted.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
        assert_eq!(extracted.fields[0].kind, FieldKind::Text);
        assert_eq!(extracted.fields[1].kind, FieldKind::Qr);
        assert_eq!(extracted.fields[2].kind, FieldKind::Image);
        assert_eq!(extracted.fields[3].kind, FieldKind::Date);
    }

    #[test]
    fn test_untyped_defaults_to_text() {
        let doc = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><text id="T" data-field-type="mystery">v</text></svg>"#,
        );
        assert_eq!(extract_fields(&doc).fields[0].kind, FieldKind::Text);
    }

    #[test]
    fn test_ignores_unaddressable_elements() {
        let doc = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
 <circle id="Dot" r="4"/>
 <text>anonymous</text>
</svg>"#,
        );
        let extracted = extract_fields(&doc);
        assert!(extracted.fields.is_empty());
        assert!(extracted.defaults.is_empty());
    }

    #[test]
    fn test_text_default_joins_tspans_with_newline() {
        let doc = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
 <text id="T"><tspan x="0" y="10">Line 1</tspan><tspan x="0" y="20">Line 2</tspan></text>
</svg>"#,
        );
        assert_eq!(extract_fields(&doc).defaults["T"], "Line 1\nLine 2");
    }

    #[test]
    fn test_text_default_without_tspans() {
        let doc =
            parse(r#"<svg xmlns="http://www.w3.org/2000/svg"><text id="T">Plain</text></svg>"#);
        assert_eq!(extract_fields(&doc).defaults["T"], "Plain");
    }

    #[test]
    fn test_qr_and_image_default_empty() {
        let doc = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
 <rect id="Q" data-field-type="qr"/>
 <image id="I" data-field-type="image"/>
</svg>"#,
        );
        let extracted = extract_fields(&doc);
        assert_eq!(extracted.defaults["Q"], "");
        assert_eq!(extracted.defaults["I"], "");
    }

    #[test]
    fn test_date_defaults_to_today() {
        let doc = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><text id="D" data-field-type="date">x</text></svg>"#,
        );
        let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(extract_fields(&doc).defaults["D"], today);
    }

    #[test]
    fn test_qr_options() {
        let doc = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
 <rect id="Q" data-field-type="qr" data-qr-version="7" data-qr-error-correction="H"/>
 <rect id="Auto" data-field-type="qr" data-qr-version="auto"/>
</svg>"#,
        );
        let extracted = extract_fields(&doc);
        assert_eq!(extracted.fields[0].qr_version, Some(7));
        assert_eq!(extracted.fields[0].qr_ec_level, Some(QrEcLevel::H));
        assert_eq!(extracted.fields[1].qr_version, None);
        assert_eq!(extracted.fields[1].qr_ec_level, Some(QrEcLevel::M));
    }

    #[test]
    fn test_label_and_optional() {
        let doc = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
 <text id="T" data-label="Product name" data-optional="true">v</text>
</svg>"#,
        );
        let field = &extract_fields(&doc).fields[0];
        assert_eq!(field.label.as_deref(), Some("Product name"));
        assert!(field.optional);
    }

    #[test]
    fn test_image_target_dimensions() {
        let doc = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
 <image id="I" data-field-type="image" data-image-width="120" data-image-height="80"/>
</svg>"#,
        );
        let field = &extract_fields(&doc).fields[0];
        assert_eq!(field.image_width, Some(120));
        assert_eq!(field.image_height, Some(80));
    }
}
