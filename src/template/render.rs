//! Field rendering: resolve field values into a working document copy.
//!
//! Dispatches each supplied field id by its declared kind:
//!
//! - **text** — rebuilds sub-lines, runs the autosize search, recenters
//!   vertically-anchored blocks
//! - **date** — formats the value through [`date`](super::date), then follows
//!   the text path
//! - **qr** — replaces the rectangular placeholder with a vector module group
//!   occupying the same bounding box
//! - **image** — substitutes the placeholder's bitmap source
//!
//! A field that fails to render is logged and skipped; the other fields and
//! the rest of the document are unaffected. The source template string is
//! never mutated — everything happens on the parsed working copy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use qrcode::{EcLevel, QrCode, Version};

use super::date;
use super::measure::TextMeasurer;
use super::{fmt_num, Document, FieldKind, FieldMetadata, NodeId, QrEcLevel};
use crate::error::EtiquetaError;

/// Autosize floor in points.
const MIN_FONT_SIZE: f32 = 8.0;
/// Binary-search convergence tolerance in points.
const FONT_SIZE_TOLERANCE: f32 = 0.5;
/// Declared size assumed when a text element carries none.
const DEFAULT_FONT_SIZE: f32 = 32.0;
/// Line advance as a multiple of font size when the template declares none.
const DEFAULT_LINE_ADVANCE: f32 = 1.25;

/// Render field values into a fresh working copy of `svg`.
///
/// `hidden` ids are removed from the renderable tree before compositing,
/// independent of their type. Returns the mutated document, serialized.
pub fn render_document(
    svg: &str,
    fields: &[FieldMetadata],
    values: &BTreeMap<String, String>,
    hidden: &BTreeSet<String>,
    measurer: &dyn TextMeasurer,
) -> Result<String, EtiquetaError> {
    let mut doc = Document::parse(svg)?;

    for field in fields {
        if hidden.contains(&field.id) {
            if let Some(node) = doc.get(&field.id) {
                doc.remove(node);
            }
            continue;
        }
        let Some(value) = values.get(&field.id) else {
            continue;
        };
        if let Err(e) = apply_field(&mut doc, field, value, measurer) {
            log::warn!("skipping field '{}': {}", field.id, e);
        }
    }

    Ok(doc.to_svg())
}

fn apply_field(
    doc: &mut Document,
    field: &FieldMetadata,
    value: &str,
    measurer: &dyn TextMeasurer,
) -> Result<(), EtiquetaError> {
    let Some(node) = doc.get(&field.id) else {
        return Ok(());
    };

    match field.kind {
        FieldKind::Qr => update_qr(doc, field, node, value),
        FieldKind::Image => {
            update_image(doc, field, node, value);
            Ok(())
        }
        FieldKind::Date => {
            let format = field.date_format.as_deref().unwrap_or("YYYY-MM-DD");
            let formatted = date::format_date(value, format);
            if doc.tag(node) == "text" {
                update_text(doc, node, &formatted, measurer);
            }
            Ok(())
        }
        FieldKind::Text => {
            if doc.tag(node) == "text" {
                update_text(doc, node, value, measurer);
            }
            Ok(())
        }
    }
}

// ============================================================================
// TEXT
// ============================================================================

fn parse_weight(value: Option<&str>) -> u16 {
    match value {
        Some("bold") => 700,
        Some(other) => other.parse().unwrap_or(400),
        None => 400,
    }
}

/// Rewrite a text element's content, autosizing and re-laying-out sub-lines.
fn update_text(doc: &mut Document, node: NodeId, value: &str, measurer: &dyn TextMeasurer) {
    let original_size = doc.attr_f32(node, "font-size").unwrap_or(DEFAULT_FONT_SIZE);
    let autosize_max = doc.attr_f32(node, "data-autosize-max-width");
    let family = doc
        .attr(node, "font-family")
        .unwrap_or("sans-serif")
        .to_string();
    let weight = parse_weight(doc.attr(node, "font-weight"));
    let middle = doc.attr(node, "dominant-baseline") == Some("middle");

    let tspans = doc.descendants_with_tag(node, "tspan");

    if tspans.is_empty() {
        if let Some(max_width) = autosize_max {
            let size = fit_font_size(value, max_width, original_size, &family, weight, measurer);
            doc.set_attr(node, "font-size", fmt_num(size));
        }
        doc.set_text(node, value);
        return;
    }

    let lines: Vec<&str> = value.split('\n').collect();

    // The search runs against the single longest rendered line; the result
    // applies uniformly to all lines.
    let mut size = original_size;
    if let Some(max_width) = autosize_max {
        let longest = lines
            .iter()
            .max_by_key(|l| l.chars().count())
            .copied()
            .unwrap_or("");
        size = fit_font_size(longest, max_width, original_size, &family, weight, measurer);
        doc.set_attr(node, "font-size", fmt_num(size));
    }

    // Positioning strategy of the original first sub-line: relative advance
    // (dy) or absolute line positions (y).
    let first = tspans[0];
    let uses_dy = doc.attr(first, "dy").is_some();
    let base_x = doc
        .attr(first, "x")
        .or_else(|| doc.attr(node, "x"))
        .unwrap_or("0")
        .to_string();
    let base_y = doc
        .attr_f32(first, "y")
        .or_else(|| doc.attr_f32(node, "y"))
        .unwrap_or(0.0);
    let style = doc.attr(first, "style").map(str::to_string);

    let line_spacing = if uses_dy {
        tspans
            .get(1)
            .and_then(|t| doc.attr_f32(*t, "dy"))
            .filter(|dy| *dy != 0.0)
            .unwrap_or(size * DEFAULT_LINE_ADVANCE)
    } else if tspans.len() > 1 {
        let y0 = doc.attr_f32(tspans[0], "y").unwrap_or(0.0);
        let y1 = doc.attr_f32(tspans[1], "y").unwrap_or(0.0);
        y1 - y0
    } else {
        size * DEFAULT_LINE_ADVANCE
    };

    // A vertically centered anchor stays centered: shift the block up by
    // half its total height.
    let vertical_offset = if middle && lines.len() > 1 {
        -((lines.len() - 1) as f32) * line_spacing / 2.0
    } else {
        0.0
    };

    for tspan in &tspans {
        doc.remove(*tspan);
    }
    for (i, line) in lines.iter().enumerate() {
        let tspan = doc.create_element("tspan");
        doc.set_attr(tspan, "x", base_x.clone());
        if uses_dy {
            let dy = if i == 0 { vertical_offset } else { line_spacing };
            doc.set_attr(tspan, "dy", fmt_num(dy));
        } else {
            let y = base_y + vertical_offset + i as f32 * line_spacing;
            doc.set_attr(tspan, "y", fmt_num(y));
        }
        if let Some(style) = &style {
            doc.set_attr(tspan, "style", style.clone());
        }
        doc.set_text(tspan, *line);
        doc.append_child(node, tspan);
    }
}

/// Binary-search the largest font size whose measured width fits `max_width`.
///
/// Bounds: [`MIN_FONT_SIZE`] … the declared size; converges within
/// [`FONT_SIZE_TOLERANCE`]; the result is floored to an integer. Measurement
/// failure falls back to the declared size.
fn fit_font_size(
    text: &str,
    max_width: f32,
    original_size: f32,
    family: &str,
    weight: u16,
    measurer: &dyn TextMeasurer,
) -> f32 {
    if text.is_empty() {
        return original_size;
    }
    let Some(width) = measurer.measure(text, original_size, family, weight) else {
        log::warn!("font measurement unavailable, keeping {original_size}pt");
        return original_size;
    };
    if width <= max_width {
        return original_size;
    }

    let mut lo = MIN_FONT_SIZE;
    let mut hi = original_size.max(MIN_FONT_SIZE);
    while hi - lo > FONT_SIZE_TOLERANCE {
        let mid = (lo + hi) / 2.0;
        match measurer.measure(text, mid, family, weight) {
            None => return original_size,
            Some(w) if w > max_width => hi = mid,
            Some(_) => lo = mid,
        }
    }
    lo.floor()
}

// ============================================================================
// QR
// ============================================================================

/// Replace a QR placeholder with a vector module group in the same bounding
/// box. An empty value leaves the placeholder absent from the output with no
/// image emitted.
fn update_qr(
    doc: &mut Document,
    field: &FieldMetadata,
    node: NodeId,
    value: &str,
) -> Result<(), EtiquetaError> {
    let x = doc.attr_f32(node, "x").unwrap_or(0.0);
    let y = doc.attr_f32(node, "y").unwrap_or(0.0);
    let width = doc.attr_f32(node, "width").unwrap_or(100.0);
    let height = doc.attr_f32(node, "height").unwrap_or(100.0);

    doc.remove(node);
    if value.is_empty() {
        return Ok(());
    }

    let ec = match field.qr_ec_level.unwrap_or_default() {
        QrEcLevel::L => EcLevel::L,
        QrEcLevel::M => EcLevel::M,
        QrEcLevel::Q => EcLevel::Q,
        QrEcLevel::H => EcLevel::H,
    };
    let code = match field.qr_version {
        Some(v) => QrCode::with_version(value, Version::Normal(v as i16), ec),
        None => QrCode::with_error_correction_level(value, ec),
    }
    .map_err(|e| EtiquetaError::FieldRender {
        field: field.id.clone(),
        reason: format!("QR encoding failed: {e}"),
    })?;

    // One unit square per dark module; the group transform maps the module
    // grid onto the placeholder's box with zero margin.
    let modules = code.width();
    let mut path_data = String::new();
    for my in 0..modules {
        for mx in 0..modules {
            if code[(mx, my)] == qrcode::Color::Dark {
                let _ = write!(path_data, "M{mx} {my}h1v1h-1z");
            }
        }
    }

    let group = doc.create_element("g");
    doc.set_attr(group, "id", field.id.clone());
    doc.set_attr(
        group,
        "transform",
        format!(
            "translate({} {}) scale({} {})",
            fmt_num(x),
            fmt_num(y),
            width / modules as f32,
            height / modules as f32
        ),
    );
    let path = doc.create_element("path");
    doc.set_attr(path, "d", path_data);
    doc.set_attr(path, "fill", "#000000");
    doc.append_child(group, path);

    let root = doc.root();
    doc.append_child(root, group);
    Ok(())
}

// ============================================================================
// IMAGE
// ============================================================================

/// Point an image placeholder's bitmap source at the supplied payload.
/// Empty or missing values leave the element unchanged.
fn update_image(doc: &mut Document, field: &FieldMetadata, node: NodeId, value: &str) {
    if value.is_empty() || doc.tag(node) != "image" {
        return;
    }
    let href_attr = if doc.attr(node, "xlink:href").is_some() {
        "xlink:href"
    } else {
        "href"
    };
    doc.set_attr(node, href_attr, value);
    if let Some(w) = field.image_width {
        doc.set_attr(node, "width", w.to_string());
    }
    if let Some(h) = field.image_height {
        doc.set_attr(node, "height", h.to_string());
    }
}

// ============================================================================
// TESTS
// ============================================================================
