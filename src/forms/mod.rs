//! AcroForm-aware actions
//!
//! Cross-object mutations that keep the field tree, widget annotations,
//! page `/Annots`, catalog `/AcroForm` and default resources consistent.
//! Field types are a tagged variant, not trait objects; the shared helpers
//! here borrow the [`Document`] explicitly.

pub mod add;
pub mod appearance;
pub mod clear;
pub mod field;
pub mod remove;
pub mod update;

pub use add::AddFieldOptions;
pub use clear::FieldSelector;
pub use field::{Field, FieldFlags, FieldKind, FieldPosition, FieldType, FieldValue};

use crate::document::Document;
use crate::parser::ObjectId;
use crate::scan;

/// The default appearance every field we author carries; `/DR` guarantees
/// the `/Helv` it names.
pub(crate) const DEFAULT_DA: &[u8] = b"(/Helv 0 Tf 0 g)";

/// Every widget belonging to a field: children via `/Parent`, or — lacking
/// a parent — widgets sharing the field's `/T`. The field object itself is
/// not included even when it is a flat merged field-widget.
pub(crate) fn widgets_of_field(
    doc: &mut Document,
    field_id: ObjectId,
    name: &str,
) -> Vec<(ObjectId, Vec<u8>)> {
    let mut out = Vec::new();
    doc.each_current_object(|id, body| {
        if id.number == field_id.number || !scan::is_widget(body) {
            return;
        }
        let belongs = match scan::ref_value(body, "Parent") {
            Some(parent) => parent.number == field_id.number,
            None => scan::string_value(body, "T").as_deref() == Some(name),
        };
        if belongs {
            out.push((id, body.to_vec()));
        }
    });
    out
}

/// The page a widget sits on: its `/P` when present, otherwise the first
/// page whose `/Annots` carries the widget.
pub(crate) fn page_of_widget(doc: &mut Document, widget_id: ObjectId, body: &[u8]) -> Option<ObjectId> {
    if let Some(page) = scan::ref_value(body, "P") {
        return Some(page);
    }
    let pages = doc.page_ids();
    pages
        .into_iter()
        .find(|&page| doc.annots_refs_of_page(page).iter().any(|r| r.number == widget_id.number))
}
