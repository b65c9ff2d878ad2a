//! AddField action
//!
//! Allocates a field dictionary and a widget annotation, then threads the
//! new references through everything that must stay consistent: the
//! AcroForm `/Fields` array, `/NeedAppearances`, default resources, the
//! target page's `/Annots`, and — for check boxes — a synthesized `/Yes`
//! and `/Off` appearance pair.

use super::appearance;
use super::field::{Field, FieldFlags, FieldKind, FieldPosition, FieldType, FieldValue};
use super::DEFAULT_DA;
use crate::document::Document;
use crate::error::{FormError, Result};
use crate::parser::ObjectId;
use crate::scan::{self, format_real, PdfValue};

/// Options for [`Document::add_field`].
///
/// Note: adding a field strips `/XFA` from the AcroForm unconditionally —
/// we are authoring AcroForm, and a stale XFA copy would shadow it in
/// hybrid viewers.
#[derive(Debug)]
pub struct AddFieldOptions {
    pub value: Option<FieldValue>,
    pub kind: FieldKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// 1-indexed page.
    pub page: u32,
    /// Radio groups: widgets added under the same group id share one field.
    pub group_id: Option<String>,
    /// Radio groups: whether this widget is the selected one.
    pub selected: bool,
    /// Additional PDF keys for the field dictionary.
    pub metadata: Vec<(String, PdfValue)>,
}

impl Default for AddFieldOptions {
    fn default() -> Self {
        Self {
            value: None,
            kind: FieldKind::Text,
            x: 100.0,
            y: 500.0,
            width: 100.0,
            height: 20.0,
            page: 1,
            group_id: None,
            selected: false,
            metadata: Vec::new(),
        }
    }
}

pub(crate) fn add_field(
    doc: &mut Document,
    name: &str,
    opts: AddFieldOptions,
) -> Result<Option<Field>> {
    if name.trim().is_empty() {
        return Ok(None);
    }
    let pages = doc.page_ids();
    if opts.page == 0 || opts.page as usize > pages.len() {
        return Err(FormError::InvalidPageNumber(opts.page));
    }
    let page_id = pages[opts.page as usize - 1];

    if matches!(opts.kind, FieldKind::Radio) {
        if let Some(group_name) = opts.group_id.clone() {
            return Ok(Some(add_radio_widget(doc, name, &group_name, &opts, page_id)?));
        }
    }

    let field_type = opts.kind.field_type();
    let flags = field_flags(&opts);

    // A signature whose value is an image payload gets an appearance
    // stream instead of a textual /V.
    let image_payload = match (&field_type, &opts.value) {
        (FieldType::Signature, Some(FieldValue::Text(text))) => {
            appearance::decode_image_payload(text)
        }
        _ => None,
    };

    let field_id = doc.alloc_id();
    let widget_id = doc.alloc_id();

    let value_token = if image_payload.is_some() {
        None
    } else {
        value_token_for(&field_type, opts.value.as_ref())
    };

    let rect = [opts.x, opts.y, opts.x + opts.width, opts.y + opts.height];
    let field_body = render_field_dict(name, &field_type, flags, value_token.as_deref(), &opts);
    let widget_body = render_widget_dict(field_id, page_id, &field_type, rect, value_token.as_deref());
    doc.push_patch(field_id, field_body);
    doc.push_patch(widget_id, widget_body);

    patch_acroform_for_add(doc, field_id);
    doc.page_annots_add(page_id, widget_id);

    // Check boxes (button with the radio flag clear, not a pushbutton)
    // get a drawn check so they render even without NeedAppearances.
    let is_checkbox = field_type == FieldType::Button
        && !flags.contains(FieldFlags::RADIO)
        && !flags.contains(FieldFlags::PUSHBUTTON);
    if is_checkbox {
        attach_checkbox_appearance(doc, widget_id, &opts, value_token.as_deref());
    }

    if let Some(payload) = image_payload {
        let widget_body = doc.current_body(widget_id).unwrap_or_default();
        if let Err(err) =
            appearance::apply_signature_appearance(doc, widget_id, &widget_body, &payload)
        {
            // Decode failure falls back to a textual value.
            doc.sink().warn(&format!("signature appearance failed: {err}"));
            if let Some(FieldValue::Text(text)) = &opts.value {
                let sink = doc.sink();
                let body = doc.current_body(field_id).unwrap_or_default();
                let token = scan::encode_pdf_string(text);
                doc.push_patch(field_id, scan::upsert_key_value(&body, "V", &token, &*sink));
            }
        }
    }

    let value = opts.value.as_ref().map(|v| match field_type {
        FieldType::Button => {
            if v.is_on() { "Yes" } else { "Off" }.to_string()
        }
        _ => scan::transliterate_to_ascii(&v.as_text()),
    });

    Ok(Some(Field {
        name: name.to_string(),
        value,
        field_type,
        id: field_id,
        position: Some(FieldPosition {
            x: opts.x,
            y: opts.y,
            width: opts.width,
            height: opts.height,
            page: opts.page,
        }),
    }))
}

/// Radio widgets share one group field. The first call creates the group;
/// later calls with the same `group_id` append a kid widget. On-state
/// names are the kid's index within the group (`/0`, `/1`, …).
fn add_radio_widget(
    doc: &mut Document,
    _option_name: &str,
    group_name: &str,
    opts: &AddFieldOptions,
    page_id: ObjectId,
) -> Result<Field> {
    let sink = doc.sink();
    let rect = [opts.x, opts.y, opts.x + opts.width, opts.y + opts.height];

    let (group_id, group_body, kid_index) = match doc.find_field(group_name) {
        Some(found) => {
            let kids = scan::value_token(&found.body, "Kids")
                .map(|t| scan::refs_in_array(t).len())
                .unwrap_or(0);
            (found.id, found.body, kids)
        }
        None => {
            let id = doc.alloc_id();
            let flags = field_flags(opts);
            let body = format!(
                "<< /FT /Btn /T {} /Ff {} /V /Off /DA {} /Kids [] >>",
                String::from_utf8_lossy(&scan::encode_pdf_string(group_name)),
                flags.bits(),
                String::from_utf8_lossy(DEFAULT_DA),
            )
            .into_bytes();
            doc.push_patch(id, body.clone());
            patch_acroform_for_add(doc, id);
            (id, body, 0)
        }
    };

    let widget_id = doc.alloc_id();
    let on_state = format!("/{kid_index}");
    let as_token = if opts.selected { on_state.clone() } else { "/Off".to_string() };
    let widget_body = format!(
        "<< /Type /Annot /Subtype /Widget /Parent {} /P {} /FT /Btn /Rect [{} {} {} {}] /F 4 /AS {} >>",
        group_id.to_ref_token(),
        page_id.to_ref_token(),
        format_real(rect[0]),
        format_real(rect[1]),
        format_real(rect[2]),
        format_real(rect[3]),
        as_token,
    )
    .into_bytes();
    doc.push_patch(widget_id, widget_body);

    let mut body = scan::add_ref_to_inline_array(&group_body, "Kids", widget_id, &*sink);
    if opts.selected {
        body = scan::upsert_key_value(&body, "V", on_state.as_bytes(), &*sink);
    }
    doc.push_patch(group_id, body);
    doc.page_annots_add(page_id, widget_id);
    doc.set_need_appearances();

    Ok(Field {
        name: group_name.to_string(),
        value: Some(if opts.selected {
            kid_index.to_string()
        } else {
            "Off".to_string()
        }),
        field_type: FieldType::Button,
        id: group_id,
        position: Some(FieldPosition {
            x: opts.x,
            y: opts.y,
            width: opts.width,
            height: opts.height,
            page: opts.page,
        }),
    })
}

/// `/Ff`: caller metadata wins, radio groups default to Radio +
/// NoToggleToOff (49152), everything else to 0.
fn field_flags(opts: &AddFieldOptions) -> FieldFlags {
    for (key, value) in &opts.metadata {
        if key == "Ff" {
            if let PdfValue::Integer(bits) = value {
                return FieldFlags::from_bits_truncate(*bits as u32);
            }
        }
    }
    if matches!(opts.kind, FieldKind::Radio) {
        FieldFlags::RADIO | FieldFlags::NO_TOGGLE_TO_OFF
    } else {
        FieldFlags::empty()
    }
}

/// The `/V` token for a new field: buttons normalize to `/Yes`/`/Off`
/// (default off), everything else encodes the given text.
fn value_token_for(field_type: &FieldType, value: Option<&FieldValue>) -> Option<Vec<u8>> {
    match field_type {
        FieldType::Button => {
            let on = value.map(|v| v.is_on()).unwrap_or(false);
            Some(scan::appearance_choice(on).as_bytes().to_vec())
        }
        _ => value.map(|v| scan::encode_pdf_string(&v.as_text())),
    }
}

fn render_field_dict(
    name: &str,
    field_type: &FieldType,
    flags: FieldFlags,
    value_token: Option<&[u8]>,
    opts: &AddFieldOptions,
) -> Vec<u8> {
    let mut dict = format!(
        "<< /FT /{} /T {} /Ff {} /DA {}",
        field_type.pdf_name(),
        String::from_utf8_lossy(&scan::encode_pdf_string(name)),
        flags.bits(),
        String::from_utf8_lossy(DEFAULT_DA),
    );
    if let Some(token) = value_token {
        dict.push_str(" /V ");
        dict.push_str(&String::from_utf8_lossy(token));
    }
    for (key, value) in &opts.metadata {
        if key == "Ff" {
            continue; // already folded into the flags word
        }
        dict.push(' ');
        dict.push_str(&scan::format_pdf_key(key));
        dict.push(' ');
        dict.push_str(&scan::format_pdf_value(value));
    }
    dict.push_str(" >>");
    dict.into_bytes()
}

fn render_widget_dict(
    parent: ObjectId,
    page: ObjectId,
    field_type: &FieldType,
    rect: [f64; 4],
    value_token: Option<&[u8]>,
) -> Vec<u8> {
    let mut dict = format!(
        "<< /Type /Annot /Subtype /Widget /Parent {} /P {} /FT /{} /Rect [{} {} {} {}] /F 4 /DA {}",
        parent.to_ref_token(),
        page.to_ref_token(),
        field_type.pdf_name(),
        format_real(rect[0]),
        format_real(rect[1]),
        format_real(rect[2]),
        format_real(rect[3]),
        String::from_utf8_lossy(DEFAULT_DA),
    );
    if let Some(token) = value_token {
        dict.push_str(" /V ");
        dict.push_str(&String::from_utf8_lossy(token));
    }
    dict.push_str(" >>");
    dict.into_bytes()
}

/// AcroForm bookkeeping for a new field: member of `/Fields`, viewers told
/// to regenerate appearances, `/XFA` dropped, `/DR` guaranteeing `/Helv`.
fn patch_acroform_for_add(doc: &mut Document, field_id: ObjectId) {
    doc.acroform_fields_add(field_id);
    doc.set_need_appearances();

    let sink = doc.sink();
    if let Some((slot, fragment)) = doc.acroform() {
        if scan::find_key(&fragment, "XFA").is_some() {
            let patched = scan::remove_key_value(&fragment, "XFA", &*sink);
            doc.write_acroform(slot, patched);
        }
    }
    ensure_default_resources(doc);
}

/// Make sure `/AcroForm/DR/Font/Helv` exists, allocating the Type1
/// Helvetica object when absent.
fn ensure_default_resources(doc: &mut Document) {
    let sink = doc.sink();
    let Some((slot, fragment)) = doc.acroform() else {
        return;
    };

    match scan::value_token(&fragment, "DR") {
        None => {
            let font_id = alloc_helv_font(doc);
            let dr = format!("<< /Font << /Helv {} >> >>", font_id.to_ref_token());
            let patched = scan::upsert_key_value(&fragment, "DR", dr.as_bytes(), &*sink);
            doc.write_acroform(slot, patched);
        }
        Some(token) if token == b"<<" => {
            let Some(span) = scan::value_full_span(&fragment, "DR") else {
                return;
            };
            let dr = fragment[span.clone()].to_vec();
            if let Some(new_dr) = ensure_helv_in_dr(doc, &dr) {
                let mut patched = fragment.clone();
                patched.splice(span, new_dr);
                doc.write_acroform(slot, patched);
            }
        }
        Some(token) => {
            // Indirect /DR object
            let Some(dr_id) = scan::parse_ref_token(token) else {
                return;
            };
            let Some(dr) = doc.current_body(dr_id) else {
                return;
            };
            if let Some(new_dr) = ensure_helv_in_dr(doc, &dr) {
                doc.push_patch(dr_id, new_dr);
            }
        }
    }
}

/// Returns the rewritten `/DR` fragment when `/Font/Helv` was missing,
/// `None` when it is already there.
fn ensure_helv_in_dr(doc: &mut Document, dr: &[u8]) -> Option<Vec<u8>> {
    let sink = doc.sink();
    match scan::value_token(dr, "Font") {
        None => {
            let font_id = alloc_helv_font(doc);
            let font = format!("<< /Helv {} >>", font_id.to_ref_token());
            Some(scan::upsert_key_value(dr, "Font", font.as_bytes(), &*sink))
        }
        Some(token) if token == b"<<" => {
            let span = scan::value_full_span(dr, "Font")?;
            let font = &dr[span.clone()];
            if scan::find_key(font, "Helv").is_some() {
                return None;
            }
            let font_id = alloc_helv_font(doc);
            let new_font =
                scan::upsert_key_value(font, "Helv", font_id.to_ref_token().as_bytes(), &*sink);
            let mut patched = dr.to_vec();
            patched.splice(span, new_font);
            Some(patched)
        }
        Some(token) => {
            // Indirect font dictionary: patch it in place, /DR unchanged.
            let font_id = scan::parse_ref_token(token)?;
            let font = doc.current_body(font_id)?;
            if scan::find_key(&font, "Helv").is_some() {
                return None;
            }
            let helv_id = alloc_helv_font(doc);
            let patched =
                scan::upsert_key_value(&font, "Helv", helv_id.to_ref_token().as_bytes(), &*sink);
            doc.push_patch(font_id, patched);
            None
        }
    }
}

fn alloc_helv_font(doc: &mut Document) -> ObjectId {
    let id = doc.alloc_id();
    doc.push_patch(
        id,
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec(),
    );
    id
}

/// Attach the synthesized `/Yes`-`/Off` pair and point `/AS` at the
/// normalized state.
fn attach_checkbox_appearance(
    doc: &mut Document,
    widget_id: ObjectId,
    opts: &AddFieldOptions,
    value_token: Option<&[u8]>,
) {
    let sink = doc.sink();
    let (yes, off) = appearance::checkbox_appearance(doc, opts.width, opts.height);
    let Some(body) = doc.current_body(widget_id) else {
        return;
    };
    let ap = format!(
        "<< /N << /Yes {} /Off {} >> >>",
        yes.to_ref_token(),
        off.to_ref_token()
    );
    let mut patched = scan::upsert_key_value(&body, "AP", ap.as_bytes(), &*sink);
    let state: &[u8] = match value_token {
        Some(b"/Yes") => b"/Yes",
        _ => b"/Off",
    };
    patched = scan::upsert_key_value(&patched, "AS", state, &*sink);
    doc.push_patch(widget_id, patched);
}
