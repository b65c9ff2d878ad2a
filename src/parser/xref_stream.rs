//! Cross-reference stream parser (ISO 32000-1 Section 7.5.8)
//!
//! An xref stream is an ordinary stream object whose dictionary carries
//! `/Type /XRef`, `/W` field widths and optional `/Index` subsections. The
//! trailer keys (`/Size`, `/Root`, `/Prev`, …) live in the same dictionary.

use super::filters;
use super::xref::{XrefEntry, XrefSection};
use crate::error::{FormError, Result};
use crate::scan;
use std::ops::Range;

/// Parse an xref stream whose dictionary spans `dict` and whose raw stream
/// payload is `payload`. Returns the section with the dictionary itself as
/// the trailer span.
pub fn parse_xref_stream(
    data: &[u8],
    dict_span: Range<usize>,
    payload: &[u8],
) -> Result<XrefSection> {
    let dict = &data[dict_span.clone()];
    if scan::name_value(dict, "Type").as_deref() != Some("XRef") {
        return Err(FormError::MalformedDocument(
            "xref stream lacks /Type /XRef".to_string(),
        ));
    }

    let decoded = filters::decode_stream(dict, payload)?;

    let widths = field_widths(dict)?;
    let size = scan::int_value(dict, "Size")
        .ok_or_else(|| FormError::MalformedDocument("xref stream lacks /Size".to_string()))?;
    let index = subsections(dict, size as u32)?;

    let entry_len: usize = widths.iter().sum();
    if entry_len == 0 {
        return Err(FormError::MalformedDocument(
            "xref stream /W sums to zero".to_string(),
        ));
    }

    let mut entries = Vec::new();
    let mut cursor = 0;
    for (first, count) in index {
        for i in 0..count {
            if cursor + entry_len > decoded.len() {
                return Err(FormError::MalformedDocument(
                    "xref stream data truncated".to_string(),
                ));
            }
            let field1 = read_field(&decoded[cursor..], widths[0], 1);
            cursor += widths[0];
            let field2 = read_field(&decoded[cursor..], widths[1], 0);
            cursor += widths[1];
            let field3 = read_field(&decoded[cursor..], widths[2], 0);
            cursor += widths[2];

            let number = first + i;
            let entry = match field1 {
                0 => (number, field3 as u16, XrefEntry::Free),
                1 => (
                    number,
                    field3 as u16,
                    XrefEntry::InFile { offset: field2 },
                ),
                2 => (
                    number,
                    0,
                    XrefEntry::InObjStm {
                        container: field2 as u32,
                        index: field3 as u32,
                    },
                ),
                // Unknown types are treated as free for compatibility.
                _ => (number, 0, XrefEntry::Free),
            };
            entries.push(entry);
        }
    }

    Ok(XrefSection {
        entries,
        trailer: dict_span,
    })
}

/// `/W [w1 w2 w3]`. A zero-width first field defaults the type to 1.
fn field_widths(dict: &[u8]) -> Result<[usize; 3]> {
    let token = scan::value_token(dict, "W")
        .ok_or_else(|| FormError::MalformedDocument("xref stream lacks /W".to_string()))?;
    if token.first() != Some(&b'[') {
        return Err(FormError::MalformedDocument("/W is not an array".to_string()));
    }
    let inner = std::str::from_utf8(&token[1..token.len() - 1])
        .map_err(|_| FormError::MalformedDocument("/W is not ASCII".to_string()))?;
    let values: Vec<usize> = inner
        .split_ascii_whitespace()
        .filter_map(|t| t.parse().ok())
        .collect();
    if values.len() != 3 {
        return Err(FormError::MalformedDocument(format!(
            "/W has {} elements, expected 3",
            values.len()
        )));
    }
    Ok([values[0], values[1], values[2]])
}

/// `/Index [first count …]`, defaulting to a single `[0 Size]` subsection.
fn subsections(dict: &[u8], size: u32) -> Result<Vec<(u32, u32)>> {
    let Some(token) = scan::value_token(dict, "Index") else {
        return Ok(vec![(0, size)]);
    };
    if token.first() != Some(&b'[') {
        return Err(FormError::MalformedDocument("/Index is not an array".to_string()));
    }
    let inner = std::str::from_utf8(&token[1..token.len() - 1])
        .map_err(|_| FormError::MalformedDocument("/Index is not ASCII".to_string()))?;
    let values: Vec<u32> = inner
        .split_ascii_whitespace()
        .filter_map(|t| t.parse().ok())
        .collect();
    if values.len() % 2 != 0 {
        return Err(FormError::MalformedDocument(
            "/Index has an odd element count".to_string(),
        ));
    }
    Ok(values.chunks(2).map(|pair| (pair[0], pair[1])).collect())
}

/// Big-endian field of `width` bytes; a zero-width field yields `default`.
fn read_field(data: &[u8], width: usize, default: u64) -> u64 {
    if width == 0 {
        return default;
    }
    let mut value = 0u64;
    for &byte in data.iter().take(width) {
        value = (value << 8) | byte as u64;
    }
    value
}
