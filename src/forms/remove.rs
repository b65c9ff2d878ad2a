//! RemoveField action
//!
//! Detaches a field from the form: its widgets leave their pages'
//! `/Annots`, its reference leaves `/AcroForm/Fields`, and the field object
//! is tombstoned with `/T ()` so enumeration skips it from now on.

use super::{page_of_widget, widgets_of_field};
use crate::document::Document;
use crate::scan;

pub(crate) fn remove_field(doc: &mut Document, name: &str) -> bool {
    let Some(field) = doc.find_field(name) else {
        return false;
    };
    let sink = doc.sink();

    // The widget set: children plus the field itself when it is flat.
    let mut widgets = widgets_of_field(doc, field.id, &field.name);
    if scan::is_widget(&field.body) {
        widgets.push((field.id, field.body.clone()));
    }

    for (widget_id, widget_body) in &widgets {
        let removed = match page_of_widget(doc, *widget_id, widget_body) {
            Some(page) => doc.page_annots_remove(page, *widget_id),
            None => false,
        };
        if !removed {
            // /P was missing or stale: scan every page.
            for page in doc.page_ids() {
                if doc.page_annots_remove(page, *widget_id) {
                    break;
                }
            }
        }
    }

    doc.acroform_fields_remove(field.id);

    let tombstoned = scan::upsert_key_value(&field.body, "T", b"()", &*sink);
    doc.push_patch(field.id, tombstoned);
    true
}
