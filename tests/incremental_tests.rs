//! Incremental-update serialization: append-only revisions, xref chaining,
//! and resolution of revised objects across reopen.

mod common;

use common::{build_pdf, count_occurrences, minimal_form_pdf, three_page_pdf};
use oxidize_forms::parser::resolver::find_startxref;
use oxidize_forms::parser::{filters, object_stream};
use oxidize_forms::{scan, AddFieldOptions, Document, FieldValue, FormError};

#[test]
fn test_write_without_changes_is_identity() {
    let original = minimal_form_pdf();
    let mut doc = Document::from_bytes(original.clone()).unwrap();
    let written = doc.write().unwrap();
    assert_eq!(written, original);
}

#[test]
fn test_add_text_field_then_list() {
    // Scenario: add a field, write incrementally, reopen, enumerate.
    let original = minimal_form_pdf();
    let mut doc = Document::from_bytes(original.clone()).unwrap();
    let added = doc
        .add_field(
            "Name",
            AddFieldOptions {
                value: Some(FieldValue::Text("John Doe".into())),
                x: 100.0,
                y: 500.0,
                width: 200.0,
                height: 20.0,
                page: 1,
                ..Default::default()
            },
        )
        .unwrap()
        .expect("field should be created");
    assert_eq!(added.name(), "Name");

    let written = doc.write().unwrap();
    assert!(written.starts_with(b"%PDF-"));
    assert!(written.ends_with(b"%%EOF\n"));
    // The original revision survives byte-identical.
    assert_eq!(&written[..original.len()], &original[..]);

    let mut reopened = Document::from_bytes(written).unwrap();
    let fields = reopened.list_fields();
    assert_eq!(fields.len(), 1);
    let field = &fields[0];
    assert_eq!(field.name(), "Name");
    assert!(field.is_text_field());
    assert_eq!(field.value(), Some("John Doe"));
    assert_eq!(field.page(), Some(1));
    assert_eq!(field.x(), Some(100.0));
    assert_eq!(field.y(), Some(500.0));
    assert_eq!(field.width(), Some(200.0));
    assert_eq!(field.height(), Some(20.0));

    // Exactly one field ref and one widget ref.
    assert_eq!(reopened.acroform_field_refs().len(), 1);
    assert_eq!(reopened.page_annotations(1).unwrap().len(), 1);
}

#[test]
fn test_incremental_chain_prev_and_size() {
    let original = minimal_form_pdf();
    let old_startxref = find_startxref(&original).unwrap();

    let mut doc = Document::from_bytes(original.clone()).unwrap();
    doc.add_field("A", AddFieldOptions::default()).unwrap();
    let written = doc.write().unwrap();

    let appended = &written[original.len()..];
    let trailer_at = scan::find_bytes(appended, b"trailer").unwrap();
    let trailer = &appended[trailer_at..];
    assert_eq!(scan::int_value(trailer, "Prev").unwrap() as u64, old_startxref);

    // /Size covers every allocated object number.
    let new_startxref = find_startxref(&written).unwrap();
    assert!(new_startxref > old_startxref);
    let size = scan::int_value(trailer, "Size").unwrap();
    let mut reopened = Document::from_bytes(written).unwrap();
    let max_ref = reopened
        .list_fields()
        .iter()
        .map(|f| f.object_number())
        .max()
        .unwrap();
    assert!(size > max_ref as i64);
}

#[test]
fn test_multi_page_placement() {
    let mut doc = Document::from_bytes(three_page_pdf()).unwrap();
    doc.add_field(
        "F2",
        AddFieldOptions {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
            page: 2,
            ..Default::default()
        },
    )
    .unwrap()
    .expect("field should be created");

    let written = doc.write().unwrap();
    let mut reopened = Document::from_bytes(written).unwrap();

    let field = reopened.field("F2").expect("F2 should exist");
    assert_eq!(field.page(), Some(2));

    assert!(reopened.page_annotations(1).unwrap().is_empty());
    assert_eq!(reopened.page_annotations(2).unwrap().len(), 1);
    assert!(reopened.page_annotations(3).unwrap().is_empty());
}

#[test]
fn test_add_to_missing_page_raises() {
    let mut doc = Document::from_bytes(minimal_form_pdf()).unwrap();
    let result = doc.add_field(
        "X",
        AddFieldOptions {
            page: 9,
            ..Default::default()
        },
    );
    match result {
        Err(FormError::InvalidPageNumber(9)) => {}
        other => panic!("expected InvalidPageNumber, got {other:?}"),
    }
}

#[test]
fn test_field_in_object_stream_resolves_and_updates() {
    // The field object 7 lives compressed inside container 5; the xref is
    // a stream (object 6) with a type-2 entry for it.
    let mut out: Vec<u8> = b"%PDF-1.6\n".to_vec();
    let mut offsets = std::collections::HashMap::new();
    let plain: Vec<(u32, Vec<u8>)> = vec![
        (1, b"<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>".to_vec()),
        (2, b"<< /Type /Pages /Kids [4 0 R] /Count 1 >>".to_vec()),
        (3, b"<< /Fields [7 0 R] >>".to_vec()),
        (
            4,
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>".to_vec(),
        ),
        (
            5,
            object_stream::build_object_stream(&[(
                7,
                b"<< /FT /Tx /T (Inner) /V (old) >>".to_vec(),
            )]),
        ),
    ];
    for (number, body) in &plain {
        offsets.insert(*number, out.len() as u64);
        out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let mut rows: Vec<u8> = Vec::new();
    let mut push_row = |t: u8, f2: u64, f3: u64| {
        rows.push(t);
        rows.extend_from_slice(&(f2 as u32).to_be_bytes());
        rows.extend_from_slice(&(f3 as u16).to_be_bytes());
    };
    push_row(0, 0, 65535);
    for number in 1..=5u32 {
        push_row(1, offsets[&number], 0);
    }
    let xref_at = out.len() as u64;
    push_row(1, xref_at, 0); // object 6: the xref stream itself
    push_row(2, 5, 0); // object 7: container 5, slot 0
    let compressed = filters::flate_encode(&rows);
    out.extend_from_slice(
        format!(
            "6 0 obj\n<< /Type /XRef /Size 8 /W [1 4 2] /Root 1 0 R /Filter /FlateDecode /Length {} >>\nstream\n",
            compressed.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&compressed);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    out.extend_from_slice(format!("startxref\n{xref_at}\n%%EOF\n").as_bytes());

    let mut doc = Document::from_bytes(out).unwrap();
    let fields = doc.list_fields();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name(), "Inner");
    assert_eq!(fields[0].value(), Some("old"));
    assert_eq!(fields[0].object_number(), 7);

    assert!(doc.update_field("Inner", "new"));
    let written = doc.write().unwrap();

    // The revision carries object 7 as a standalone body now.
    assert!(scan::find_bytes(&written, b"7 0 obj").is_some());
    let mut reopened = Document::from_bytes(written).unwrap();
    let field = reopened.field("Inner").unwrap();
    assert_eq!(field.value(), Some("new"));
}

#[test]
fn test_multipart_wrapped_input() {
    let mut wrapped = Vec::new();
    wrapped.extend_from_slice(
        b"------WebKitFormBoundary7MA4YWxk\r\nContent-Disposition: form-data; name=\"file\"\r\nContent-Type: application/pdf\r\n\r\n",
    );
    wrapped.extend_from_slice(&minimal_form_pdf());
    wrapped.extend_from_slice(b"\r\n------WebKitFormBoundary7MA4YWxk--\r\n");

    let mut doc = Document::from_bytes(wrapped).unwrap();
    assert!(doc.bytes().starts_with(b"%PDF-"));
    assert!(doc.list_fields().is_empty());
    assert_eq!(doc.list_pages().len(), 1);
}

#[test]
fn test_trailer_without_root_raises() {
    let pdf = build_pdf(&[(1, b"<< /Type /Catalog >>".to_vec())]);
    let broken: Vec<u8> = {
        let pos = scan::find_bytes(&pdf, b"/Root").unwrap();
        let mut bytes = pdf.clone();
        bytes[pos..pos + 5].copy_from_slice(b"/Roof");
        bytes
    };
    match Document::from_bytes(broken) {
        Err(FormError::MalformedDocument(_)) => {}
        other => panic!("expected MalformedDocument, got {other:?}"),
    }
}

#[test]
fn test_repeated_updates_collapse_to_last_write() {
    let original = common::text_field_pdf();
    let mut doc = Document::from_bytes(original).unwrap();
    assert!(doc.update_field("Name", "first"));
    assert!(doc.update_field("Name", "second"));
    assert!(doc.update_field("Name", "third"));
    let written = doc.write().unwrap();

    // One appended body for the field object, carrying the last value.
    let appended_at = scan::rfind_bytes(&written, b"5 0 obj").unwrap();
    assert!(scan::find_bytes(&written[appended_at..], b"(third)").is_some());
    assert_eq!(count_occurrences(&written, b"(second)"), 0);

    let mut reopened = Document::from_bytes(written).unwrap();
    assert_eq!(reopened.field("Name").unwrap().value(), Some("third"));
}
