//! Incremental-update writer
//!
//! Appends revised objects after the original bytes — which are preserved
//! verbatim — followed by a classic xref section and a trailer whose
//! `/Prev` chains back to the previous `startxref`. A document updated this
//! way keeps its full revision history.

use super::Patch;
use crate::error::Result;
use crate::parser::resolver::find_startxref;
use crate::parser::xref::{read_integer, skip_ws};
use crate::scan;

/// Append `patches` to `original` as a new revision. An empty patch list
/// returns the input unchanged.
pub fn append_update(original: &[u8], patches: &[Patch]) -> Result<Vec<u8>> {
    if patches.is_empty() {
        return Ok(original.to_vec());
    }

    let prev = find_startxref(original)?;
    let prev_trailer = previous_trailer_dict(original, prev as usize);

    let max_in_file = max_object_number(original);
    let max_in_patches = patches.iter().map(|p| p.id.number).max().unwrap_or(0);
    let max_obj = max_in_file.max(max_in_patches);

    let mut out = original.to_vec();
    if out.last() != Some(&b'\n') {
        out.push(b'\n');
    }

    // Emit each revised object, recording where its header lands.
    let mut offsets: Vec<(u32, u16, u64)> = Vec::with_capacity(patches.len());
    for patch in patches {
        offsets.push((patch.id.number, patch.id.generation, out.len() as u64));
        out.extend_from_slice(patch.id.to_header().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&patch.body);
        if patch.body.last() != Some(&b'\n') {
            out.push(b'\n');
        }
        out.extend_from_slice(b"endobj\n");
    }

    offsets.sort_by_key(|&(number, generation, _)| (number, generation));
    debug_assert!(!offsets.is_empty(), "xref table must not be empty");

    let xref_at = out.len() as u64;
    out.extend_from_slice(b"xref\n");
    let mut i = 0;
    while i < offsets.len() {
        let mut j = i + 1;
        while j < offsets.len() && offsets[j].0 == offsets[j - 1].0 + 1 {
            j += 1;
        }
        out.extend_from_slice(format!("{} {}\n", offsets[i].0, j - i).as_bytes());
        for &(_, generation, offset) in &offsets[i..j] {
            out.extend_from_slice(format!("{offset:010} {generation:05} n \n").as_bytes());
        }
        i = j;
    }

    // Carry the previous /Size forward so the new one never understates it.
    let prev_size = prev_trailer
        .as_deref()
        .and_then(|t| scan::int_value(t, "Size"))
        .unwrap_or(0);
    let size = (max_obj as i64 + 1)
        .max(max_in_patches as i64 + 1)
        .max(prev_size);

    out.extend_from_slice(b"trailer\n<< /Size ");
    out.extend_from_slice(size.to_string().as_bytes());
    out.extend_from_slice(format!(" /Prev {prev}").as_bytes());
    if let Some(root) = prev_trailer.as_deref().and_then(|t| scan::value_token(t, "Root")) {
        out.extend_from_slice(b" /Root ");
        out.extend_from_slice(root);
    }
    out.extend_from_slice(b" >>\nstartxref\n");
    out.extend_from_slice(xref_at.to_string().as_bytes());
    out.extend_from_slice(b"\n%%EOF\n");
    Ok(out)
}

/// The previous revision's trailer dictionary: the dictionary after the
/// last `trailer` keyword, or the xref-stream dictionary at `prev` when the
/// document has no classic trailer.
fn previous_trailer_dict(original: &[u8], prev: usize) -> Option<Vec<u8>> {
    if let Some(kw) = scan::rfind_bytes(original, b"trailer") {
        let mut pos = kw + b"trailer".len();
        skip_ws(original, &mut pos);
        if let Some(span) = scan::balanced_dict_span(original, pos) {
            return Some(original[span].to_vec());
        }
    }
    // Xref-stream document: the trailer keys live in the stream dictionary.
    let open = prev + scan::find_bytes(original.get(prev..)?, b"<<")?;
    let span = scan::balanced_dict_span(original, open)?;
    Some(original[span].to_vec())
}

/// Largest object number appearing in a `N G obj` header.
fn max_object_number(data: &[u8]) -> u32 {
    let mut max = 0u32;
    let mut pos = 0;
    while pos < data.len() {
        if data[pos].is_ascii_digit() && (pos == 0 || !data[pos - 1].is_ascii_digit()) {
            let mut cursor = pos;
            if let Some(number) = read_integer(data, &mut cursor) {
                let ws1 = cursor;
                skip_ws(data, &mut cursor);
                if cursor > ws1 && read_integer(data, &mut cursor).is_some() {
                    let ws2 = cursor;
                    skip_ws(data, &mut cursor);
                    if cursor > ws2 && data.get(cursor..cursor + 3) == Some(b"obj".as_slice()) {
                        max = max.max(number as u32);
                        pos = cursor + 3;
                        continue;
                    }
                }
            }
        }
        pos += 1;
    }
    max
}
