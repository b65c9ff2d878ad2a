//! Field operations: value updates with transliteration, check-box state
//! binding, renames, removal, and enumeration stability.

mod common;

use common::{build_pdf, checkbox_pdf, count_occurrences, minimal_form_pdf, text_field_pdf};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use oxidize_forms::{scan, AddFieldOptions, Document, FieldKind, FieldValue};

#[test]
fn test_transliteration_round_trip() {
    let mut doc = Document::from_bytes(text_field_pdf()).unwrap();
    assert!(doc.update_field("Name", "María Valentina"));
    let written = doc.write().unwrap();

    // The value serializes as an ASCII literal, not a UTF-16BE hex string.
    assert!(scan::find_bytes(&written, b"(Maria Valentina)").is_some());
    assert_eq!(count_occurrences(&written, b"<FEFF"), 0);

    let mut reopened = Document::from_bytes(written).unwrap();
    assert_eq!(
        reopened.field("Name").unwrap().value(),
        Some("Maria Valentina")
    );
}

#[test]
fn test_checkbox_toggle() {
    let mut doc = Document::from_bytes(checkbox_pdf()).unwrap();
    assert!(doc.update_field("Agree", true));
    let written = doc.write().unwrap();

    let mut reopened = Document::from_bytes(written).unwrap();
    assert_eq!(reopened.field("Agree").unwrap().value(), Some("Yes"));
    // The widget's /AS follows the value.
    let widget_at = scan::rfind_bytes(reopened.bytes(), b"6 0 obj").unwrap();
    let widget = &reopened.bytes()[widget_at..];
    assert_eq!(scan::value_token(widget, "AS").unwrap(), b"/Yes");

    assert!(reopened.update_field("Agree", false));
    let written = reopened.write().unwrap();
    let mut reopened = Document::from_bytes(written).unwrap();
    assert_eq!(reopened.field("Agree").unwrap().value(), Some("Off"));
    let widget_at = scan::rfind_bytes(reopened.bytes(), b"6 0 obj").unwrap();
    let widget = &reopened.bytes()[widget_at..];
    assert_eq!(scan::value_token(widget, "AS").unwrap(), b"/Off");
}

#[test]
fn test_rename_transitivity() {
    let mut doc = Document::from_bytes(text_field_pdf()).unwrap();
    assert!(doc.update_field_named("Name", "value", Some("FullName")));
    let written = doc.write().unwrap();

    let mut reopened = Document::from_bytes(written).unwrap();
    let names: Vec<String> = reopened
        .list_fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    assert!(names.contains(&"FullName".to_string()));
    assert!(!names.contains(&"Name".to_string()));
    assert_eq!(reopened.field("FullName").unwrap().value(), Some("value"));
}

#[test]
fn test_add_then_remove_is_neutral_under_flatten() {
    let mut doc = Document::from_bytes(text_field_pdf()).unwrap();
    let before: Vec<(String, Option<String>)> = doc
        .list_fields()
        .iter()
        .map(|f| (f.name().to_string(), f.value().map(String::from)))
        .collect();

    doc.add_field("Temporary", AddFieldOptions::default())
        .unwrap()
        .expect("field should be created");
    assert!(doc.remove_field("Temporary"));
    let flattened = doc.flatten().unwrap();

    let mut reopened = Document::from_bytes(flattened).unwrap();
    let after: Vec<(String, Option<String>)> = reopened
        .list_fields()
        .iter()
        .map(|f| (f.name().to_string(), f.value().map(String::from)))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn test_enumeration_is_stable() {
    let mut doc = Document::from_bytes(common::three_field_pdf()).unwrap();
    let first = doc.list_fields();
    let second = doc.list_fields();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    // One entry per name
    let mut names: Vec<&str> = first.iter().map(|f| f.name()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), 3);
}

#[test]
fn test_duplicate_names_keep_lowest_object_number() {
    let pdf = build_pdf(&[
        (1, b"<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>".to_vec()),
        (2, b"<< /Type /Pages /Kids [4 0 R] /Count 1 >>".to_vec()),
        (3, b"<< /Fields [5 0 R 6 0 R] >>".to_vec()),
        (
            4,
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>".to_vec(),
        ),
        (5, b"<< /FT /Tx /T (Twin) /V (low) >>".to_vec()),
        (6, b"<< /FT /Tx /T (Twin) /V (high) >>".to_vec()),
    ]);
    let mut doc = Document::from_bytes(pdf).unwrap();
    let fields = doc.list_fields();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].object_number(), 5);
    assert_eq!(fields[0].value(), Some("low"));
}

#[test]
fn test_unknown_field_operations_return_false() {
    let mut doc = Document::from_bytes(minimal_form_pdf()).unwrap();
    assert!(!doc.update_field("Nobody", "x"));
    assert!(!doc.remove_field("Nobody"));
}

#[test]
fn test_add_with_empty_name_returns_none() {
    let mut doc = Document::from_bytes(minimal_form_pdf()).unwrap();
    let added = doc.add_field("", AddFieldOptions::default()).unwrap();
    assert!(added.is_none());
    let added = doc.add_field("   ", AddFieldOptions::default()).unwrap();
    assert!(added.is_none());
}

#[test]
fn test_hex_utf16_field_name() {
    // /T as a UTF-16BE hex string with BOM: FEFF 004E 0061 006D 0065 = "Name"
    let pdf = build_pdf(&[
        (1, b"<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>".to_vec()),
        (2, b"<< /Type /Pages /Kids [4 0 R] /Count 1 >>".to_vec()),
        (3, b"<< /Fields [5 0 R] >>".to_vec()),
        (
            4,
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>".to_vec(),
        ),
        (5, b"<< /FT /Tx /T <FEFF004E0061006D0065> /V (v) >>".to_vec()),
    ]);
    let mut doc = Document::from_bytes(pdf).unwrap();
    let fields = doc.list_fields();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name(), "Name");
    assert!(doc.update_field("Name", "updated"));
}

#[test]
fn test_widget_without_p_finds_its_page() {
    let pdf = build_pdf(&[
        (1, b"<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>".to_vec()),
        (2, b"<< /Type /Pages /Kids [4 0 R] /Count 1 >>".to_vec()),
        (3, b"<< /Fields [5 0 R] >>".to_vec()),
        (
            4,
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [6 0 R] >>".to_vec(),
        ),
        (5, b"<< /FT /Tx /T (NoP) >>".to_vec()),
        (
            6,
            b"<< /Type /Annot /Subtype /Widget /Parent 5 0 R /Rect [10 20 40 60] /F 4 >>".to_vec(),
        ),
    ]);
    let mut doc = Document::from_bytes(pdf).unwrap();
    let field = doc.field("NoP").unwrap();
    assert_eq!(field.page(), Some(1));
    assert_eq!(field.x(), Some(10.0));
    assert_eq!(field.height(), Some(40.0));

    // Removal still prunes the page's /Annots via the full scan.
    assert!(doc.remove_field("NoP"));
    assert!(doc.page_annotations(1).unwrap().is_empty());
}

#[test]
fn test_add_checkbox_synthesizes_appearance() {
    let mut doc = Document::from_bytes(minimal_form_pdf()).unwrap();
    doc.add_field(
        "Agree",
        AddFieldOptions {
            kind: FieldKind::Checkbox,
            value: Some(FieldValue::Bool(true)),
            ..Default::default()
        },
    )
    .unwrap()
    .expect("field should be created");
    let written = doc.write().unwrap();

    // The widget carries the /Yes-/Off pair and points /AS at /Yes.
    assert!(scan::find_bytes(&written, b"/AP").is_some());
    assert!(scan::find_bytes(&written, b"/Yes").is_some());
    assert!(scan::find_bytes(&written, b"/Off").is_some());

    let mut reopened = Document::from_bytes(written).unwrap();
    let field = reopened.field("Agree").unwrap();
    assert!(field.is_button_field());
    assert_eq!(field.value(), Some("Yes"));
}

#[test]
fn test_radio_group_shares_one_field() {
    let mut doc = Document::from_bytes(minimal_form_pdf()).unwrap();
    for (option, selected) in [("small", false), ("medium", true), ("large", false)] {
        doc.add_field(
            option,
            AddFieldOptions {
                kind: FieldKind::Radio,
                group_id: Some("size".to_string()),
                selected,
                ..Default::default()
            },
        )
        .unwrap()
        .expect("radio widget should be created");
    }
    let written = doc.write().unwrap();

    let mut reopened = Document::from_bytes(written).unwrap();
    let fields = reopened.list_fields();
    assert_eq!(fields.len(), 1, "one group field for three widgets");
    assert_eq!(fields[0].name(), "size");
    assert!(fields[0].is_button_field());
    // Three widgets on the page, one per option.
    assert_eq!(reopened.page_annotations(1).unwrap().len(), 3);
    // The selected kid's index is the group value.
    assert_eq!(fields[0].value(), Some("1"));
}

#[test]
fn test_multiline_update_strips_appearance() {
    let pdf = build_pdf(&[
        (1, b"<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>".to_vec()),
        (2, b"<< /Type /Pages /Kids [4 0 R] /Count 1 >>".to_vec()),
        (3, b"<< /Fields [5 0 R] >>".to_vec()),
        (
            4,
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [6 0 R] >>".to_vec(),
        ),
        (5, b"<< /FT /Tx /T (Notes) /Ff 4096 /V (old) >>".to_vec()),
        (
            6,
            b"<< /Type /Annot /Subtype /Widget /Parent 5 0 R /P 4 0 R /Rect [10 10 300 90] /AP << /N 9 0 R >> >>"
                .to_vec(),
        ),
    ]);
    let mut doc = Document::from_bytes(pdf).unwrap();
    assert!(doc.update_field("Notes", "line one\nline two"));
    let written = doc.write().unwrap();

    // The revised widget body has no /AP; the viewer must relayout.
    let widget_at = scan::rfind_bytes(&written, b"6 0 obj").unwrap();
    let widget = &written[widget_at..];
    let endobj = scan::find_bytes(widget, b"endobj").unwrap();
    assert!(scan::find_key(&widget[..endobj], "AP").is_none());
}

#[test]
fn test_signature_image_update_builds_appearance() {
    let pdf = build_pdf(&[
        (1, b"<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>".to_vec()),
        (2, b"<< /Type /Pages /Kids [4 0 R] /Count 1 >>".to_vec()),
        (3, b"<< /Fields [5 0 R] >>".to_vec()),
        (
            4,
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [6 0 R] >>".to_vec(),
        ),
        (5, b"<< /FT /Sig /T (SigField) >>".to_vec()),
        (
            6,
            b"<< /Type /Annot /Subtype /Widget /Parent 5 0 R /P 4 0 R /Rect [100 100 300 150] /F 4 >>"
                .to_vec(),
        ),
    ]);

    // 2x1 PNG with one semi-transparent pixel -> needs a soft mask.
    let png = png_fixture();
    let data_uri = format!("data:image/png;base64,{}", BASE64.encode(&png));

    let mut doc = Document::from_bytes(pdf).unwrap();
    assert!(doc.update_field("SigField", data_uri.as_str()));
    let written = doc.write().unwrap();

    assert!(scan::find_bytes(&written, b"/Im1 Do").is_some());
    assert!(scan::find_bytes(&written, b"/SMask").is_some());
    // The widget gained an /AP pointing at the form XObject.
    let widget_at = scan::rfind_bytes(&written, b"6 0 obj").unwrap();
    assert!(scan::find_key(&written[widget_at..], "AP").is_some());
}

#[test]
fn test_signature_text_value_falls_back_to_string() {
    let pdf = build_pdf(&[
        (1, b"<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>".to_vec()),
        (2, b"<< /Type /Pages /Kids [4 0 R] /Count 1 >>".to_vec()),
        (3, b"<< /Fields [5 0 R] >>".to_vec()),
        (
            4,
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>".to_vec(),
        ),
        (5, b"<< /FT /Sig /T (SigField) >>".to_vec()),
    ]);
    let mut doc = Document::from_bytes(pdf).unwrap();
    assert!(doc.update_field("SigField", "John Hancock"));
    let written = doc.write().unwrap();
    assert!(scan::find_bytes(&written, b"(John Hancock)").is_some());
}

/// 2x1 RGBA PNG, second pixel half-transparent, built chunk by chunk.
fn png_fixture() -> Vec<u8> {
    fn chunk(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&2u32.to_be_bytes());
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);
    let filtered = [0u8, 255, 0, 0, 255, 0, 255, 0, 128];
    let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend_from_slice(&chunk(b"IHDR", &ihdr));
    png.extend_from_slice(&chunk(
        b"IDAT",
        &oxidize_forms::parser::filters::flate_encode(&filtered),
    ));
    png.extend_from_slice(&chunk(b"IEND", &[]));
    png
}
