//! UpdateField action
//!
//! Rewrites `/V` on a field and every widget descending from it, keeps
//! button `/AS` states in step with the value, strips stale appearance
//! streams from multiline fields, and handles renames.

use super::appearance;
use super::field::{FieldType, FieldValue};
use super::widgets_of_field;
use crate::document::Document;
use crate::scan;

pub(crate) fn update_field(
    doc: &mut Document,
    name: &str,
    value: &FieldValue,
    new_name: Option<&str>,
) -> bool {
    let Some(field) = doc.find_field(name) else {
        return false;
    };
    let sink = doc.sink();

    // Signature values that decode to an image become an appearance
    // stream; a failed decode falls through to the textual path.
    if field.field_type == FieldType::Signature {
        if let FieldValue::Text(text) = value {
            if let Some(payload) = appearance::decode_image_payload(text) {
                let widget = widgets_of_field(doc, field.id, &field.name)
                    .into_iter()
                    .next()
                    .or_else(|| {
                        scan::is_widget(&field.body).then(|| (field.id, field.body.clone()))
                    });
                if let Some((widget_id, widget_body)) = widget {
                    match appearance::apply_signature_appearance(
                        doc,
                        widget_id,
                        &widget_body,
                        &payload,
                    ) {
                        Ok(()) => {
                            doc.set_need_appearances();
                            return true;
                        }
                        Err(err) => {
                            sink.warn(&format!("signature appearance failed: {err}"));
                        }
                    }
                }
            }
        }
    }

    let is_button = field.field_type == FieldType::Button;
    let value_token: Vec<u8> = if is_button {
        scan::appearance_choice(value.is_on()).as_bytes().to_vec()
    } else {
        scan::encode_pdf_string(&value.as_text())
    };
    let multiline = scan::is_multiline_field(&field.body);
    let name_token = new_name.map(scan::encode_pdf_string);

    // The field object itself; a flat merged field-widget also carries the
    // widget-side state.
    let mut body = scan::upsert_key_value(&field.body, "V", &value_token, &*sink);
    if is_button && scan::has_on_off_appearance(&body) {
        body = scan::upsert_key_value(&body, "AS", &value_token, &*sink);
    }
    if multiline {
        body = scan::remove_appearance_stream(&body, &*sink);
    }
    if let Some(token) = &name_token {
        body = scan::upsert_key_value(&body, "T", token, &*sink);
    }
    doc.push_patch(field.id, body);

    for (widget_id, widget_body) in widgets_of_field(doc, field.id, &field.name) {
        let mut body = scan::upsert_key_value(&widget_body, "V", &value_token, &*sink);
        if is_button && scan::has_on_off_appearance(&body) {
            body = scan::upsert_key_value(&body, "AS", &value_token, &*sink);
        }
        if multiline {
            body = scan::remove_appearance_stream(&body, &*sink);
        }
        if let Some(token) = &name_token {
            if scan::find_key(&body, "T").is_some() {
                body = scan::replace_key_value(&body, "T", token, &*sink);
            }
        }
        doc.push_patch(widget_id, body);
    }

    doc.set_need_appearances();
    true
}
