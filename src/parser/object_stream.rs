//! Object stream (`ObjStm`) codec (ISO 32000-1 Section 7.5.7)
//!
//! A decompressed object-stream container is a header of `N` whitespace-
//! separated `(object number, offset)` pairs followed by the concatenated
//! object bodies, with `/First` giving the byte offset of the first body.

use super::xref::{read_integer, skip_ws};
use super::ObjectId;
use crate::error::{FormError, Result};
use crate::parser::filters;
use std::ops::Range;

/// Decompressed container contents: the buffer plus one `(id, span)` slot
/// per member object.
#[derive(Debug)]
pub struct ObjStmSlots {
    pub data: Vec<u8>,
    pub slots: Vec<(ObjectId, Range<usize>)>,
}

/// Parse a decompressed container body into its slot table.
///
/// Objects inside a stream always have generation 0.
pub fn parse_object_stream(decoded: &[u8], n: usize, first: usize) -> Result<Vec<(ObjectId, Range<usize>)>> {
    if first > decoded.len() {
        return Err(FormError::MalformedDocument(format!(
            "/First {first} beyond container of {} bytes",
            decoded.len()
        )));
    }
    let header = &decoded[..first];
    let mut pos = 0;
    let mut pairs = Vec::with_capacity(n);
    for _ in 0..n {
        skip_ws(header, &mut pos);
        let number = read_integer(header, &mut pos).ok_or_else(|| {
            FormError::MalformedDocument("short object stream header".to_string())
        })?;
        skip_ws(header, &mut pos);
        let offset = read_integer(header, &mut pos).ok_or_else(|| {
            FormError::MalformedDocument("short object stream header".to_string())
        })?;
        pairs.push((number as u32, offset as usize));
    }

    let mut slots = Vec::with_capacity(n);
    for (i, &(number, offset)) in pairs.iter().enumerate() {
        let start = first + offset;
        let end = match pairs.get(i + 1) {
            Some(&(_, next_offset)) => first + next_offset,
            None => decoded.len(),
        };
        if start > end || end > decoded.len() {
            return Err(FormError::MalformedDocument(format!(
                "object stream slot {i} out of bounds"
            )));
        }
        slots.push((ObjectId::new(number, 0), start..end));
    }
    Ok(slots)
}

/// Build a complete `ObjStm` object body (dictionary plus Flate-compressed
/// stream) from sorted member bodies. The inverse of
/// [`parse_object_stream`]; used by the rewrite path and exercised by tests.
pub fn build_object_stream(members: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut header = String::new();
    let mut bodies = Vec::new();
    for (number, body) in members {
        header.push_str(&format!("{} {} ", number, bodies.len()));
        bodies.extend_from_slice(body);
        bodies.push(b'\n');
    }
    header.push('\n');

    let first = header.len();
    let mut payload = header.into_bytes();
    payload.extend_from_slice(&bodies);
    let compressed = filters::flate_encode(&payload);

    let mut out = format!(
        "<< /Type /ObjStm /N {} /First {} /Filter /FlateDecode /Length {} >>\nstream\n",
        members.len(),
        first,
        compressed.len()
    )
    .into_bytes();
    out.extend_from_slice(&compressed);
    out.extend_from_slice(b"\nendstream");
    out
}
