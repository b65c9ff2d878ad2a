//! Lexical utilities on PDF dictionary and array fragments
//!
//! Everything here operates on a byte slice holding a single dictionary
//! (`<< … >>`) or array (`[ … ]`) fragment and never parses the whole
//! document. Edits are position-preserving: the original bytes are reused
//! wherever possible so formatting and unrelated entries survive unchanged.
//! An edit that would break the `<< … >>` structure is abandoned — the input
//! comes back untouched and a warning goes to the diagnostic sink.
//!
//! Reference matching (`N G R`) uses a hand-written scanner with
//! word-boundary checks rather than a regex; the patterns deliberately stay
//! textual so untrusted nested dictionaries never get parsed.

pub mod strings;
pub mod translit;

pub use strings::{
    decode_pdf_name, decode_pdf_string, encode_pdf_name, encode_pdf_string, format_pdf_key,
    format_pdf_value, format_real, PdfValue,
};
pub use translit::transliterate_to_ascii;

use crate::diagnostics::DiagnosticSink;
use crate::parser::ObjectId;
use std::ops::Range;

/// PDF whitespace per ISO 32000-1 Table 1.
pub(crate) fn is_ws(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

/// PDF delimiter characters per ISO 32000-1 Table 2.
pub(crate) fn is_delim(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(byte: u8) -> bool {
    !is_ws(byte) && !is_delim(byte)
}

/// Locate `/key` with delimiter lookahead: the byte after the key must be
/// whitespace or one of `( < [ / >`, so `/T` never matches inside `/TU`.
/// Returns the position of the leading slash.
pub fn find_key(dict: &[u8], key: &str) -> Option<usize> {
    let needle = key.as_bytes();
    let mut pos = 0;
    while pos + 1 + needle.len() <= dict.len() {
        if dict[pos] == b'/' && &dict[pos + 1..pos + 1 + needle.len()] == needle {
            let after = pos + 1 + needle.len();
            match dict.get(after) {
                None => return Some(pos),
                Some(&b) if is_ws(b) || matches!(b, b'(' | b'<' | b'[' | b'/' | b'>') => {
                    return Some(pos)
                }
                _ => {}
            }
        }
        pos += 1;
    }
    None
}

/// Check for a standalone name token `/name` anywhere in `bytes`.
pub fn has_name_token(bytes: &[u8], name: &str) -> bool {
    find_key(bytes, name).is_some()
}

/// Span of the value token following `/key`, per the first-byte rules:
/// literal string, hex string, array, name, or atom. For a nested dictionary
/// the span covers only the two-byte `<<` sentinel; callers needing the full
/// dictionary use [`value_full_span`].
pub fn value_span(dict: &[u8], key: &str) -> Option<Range<usize>> {
    let key_pos = find_key(dict, key)?;
    let mut start = key_pos + 1 + key.len();
    while start < dict.len() && is_ws(dict[start]) {
        start += 1;
    }
    if start >= dict.len() {
        return None;
    }
    Some(token_span_at(dict, start))
}

/// Like [`value_span`], but a nested dictionary value spans the whole
/// balanced `<< … >>` region instead of the sentinel.
pub fn value_full_span(dict: &[u8], key: &str) -> Option<Range<usize>> {
    let span = value_span(dict, key)?;
    if dict[span.start..].starts_with(b"<<") {
        return balanced_dict_span(dict, span.start);
    }
    Some(span)
}

/// The value token bytes following `/key` (nested dictionaries yield `<<`).
pub fn value_token<'a>(dict: &'a [u8], key: &str) -> Option<&'a [u8]> {
    value_span(dict, key).map(|span| &dict[span])
}

/// The full value bytes following `/key`, nested dictionaries included.
pub fn value_full_token<'a>(dict: &'a [u8], key: &str) -> Option<&'a [u8]> {
    value_full_span(dict, key).map(|span| &dict[span])
}

/// Compute the span of a single value token starting at `start`.
fn token_span_at(bytes: &[u8], start: usize) -> Range<usize> {
    match bytes[start] {
        b'(' => {
            let mut depth = 0u32;
            let mut i = start;
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' => i += 1, // skip escaped byte
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            return start..i + 1;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            start..bytes.len()
        }
        b'<' if bytes.get(start + 1) == Some(&b'<') => start..start + 2,
        b'<' => {
            let mut i = start + 1;
            while i < bytes.len() && bytes[i] != b'>' {
                i += 1;
            }
            start..(i + 1).min(bytes.len())
        }
        b'[' => {
            let mut depth = 0i32;
            let mut i = start;
            while i < bytes.len() {
                match bytes[i] {
                    b'[' => depth += 1,
                    b']' => {
                        depth -= 1;
                        if depth == 0 {
                            return start..i + 1;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            start..bytes.len()
        }
        b'/' => {
            let mut i = start + 1;
            while i < bytes.len() && is_regular(bytes[i]) {
                i += 1;
            }
            start..i
        }
        _ => {
            let mut i = start;
            while i < bytes.len() && is_regular(bytes[i]) && bytes[i] != b'%' {
                i += 1;
            }
            let atom_end = i;
            // An integer may be the head of an `N G R` reference.
            if bytes[start..atom_end].iter().all(|b| b.is_ascii_digit()) && atom_end > start {
                if let Some(ref_end) = reference_tail(bytes, atom_end) {
                    return start..ref_end;
                }
            }
            start..atom_end
        }
    }
}

/// After an integer token ending at `from`, match `ws+ digits ws+ R` with a
/// boundary after the `R`. Returns the end of the reference.
fn reference_tail(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    let mut saw_ws = false;
    while i < bytes.len() && is_ws(bytes[i]) {
        i += 1;
        saw_ws = true;
    }
    if !saw_ws {
        return None;
    }
    let gen_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == gen_start {
        return None;
    }
    saw_ws = false;
    while i < bytes.len() && is_ws(bytes[i]) {
        i += 1;
        saw_ws = true;
    }
    if !saw_ws || i >= bytes.len() || bytes[i] != b'R' {
        return None;
    }
    match bytes.get(i + 1) {
        None => Some(i + 1),
        Some(&b) if is_ws(b) || is_delim(b) => Some(i + 1),
        _ => None,
    }
}

/// Balanced `<< … >>` span starting at `open` (which must point at `<<`).
pub fn balanced_dict_span(bytes: &[u8], open: usize) -> Option<Range<usize>> {
    if !bytes[open..].starts_with(b"<<") {
        return None;
    }
    let mut depth = 0i32;
    let mut i = open;
    while i + 1 < bytes.len() + 1 {
        if bytes[i..].starts_with(b"<<") {
            depth += 1;
            i += 2;
        } else if bytes[i..].starts_with(b">>") {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return Some(open..i);
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Replace the value of `/key` with `token`. The key must exist; the edit is
/// abandoned (input returned unchanged, warning emitted) if the result no
/// longer holds a `<< … >>` structure.
pub fn replace_key_value(
    dict: &[u8],
    key: &str,
    token: &[u8],
    sink: &dyn DiagnosticSink,
) -> Vec<u8> {
    let Some(span) = value_full_span(dict, key) else {
        sink.warn(&format!("replace: key /{key} not found in dictionary"));
        return dict.to_vec();
    };
    let mut out = Vec::with_capacity(dict.len() + token.len());
    out.extend_from_slice(&dict[..span.start]);
    out.extend_from_slice(token);
    out.extend_from_slice(&dict[span.end..]);
    if !structurally_sound(&out) {
        sink.warn(&format!("replace: edit of /{key} would corrupt dictionary"));
        return dict.to_vec();
    }
    out
}

/// Replace the value of `/key` when present, insert `/key token` right after
/// the opening `<<` otherwise.
pub fn upsert_key_value(
    dict: &[u8],
    key: &str,
    token: &[u8],
    sink: &dyn DiagnosticSink,
) -> Vec<u8> {
    if find_key(dict, key).is_some() {
        return replace_key_value(dict, key, token, sink);
    }
    let Some(open) = find_bytes(dict, b"<<") else {
        sink.warn(&format!("upsert: no dictionary to insert /{key} into"));
        return dict.to_vec();
    };
    let mut out = Vec::with_capacity(dict.len() + key.len() + token.len() + 3);
    out.extend_from_slice(&dict[..open + 2]);
    out.extend_from_slice(b" /");
    out.extend_from_slice(key.as_bytes());
    out.push(b' ');
    out.extend_from_slice(token);
    out.extend_from_slice(&dict[open + 2..]);
    out
}

/// Delete `/key` and its value (nested dictionary values included).
pub fn remove_key_value(dict: &[u8], key: &str, sink: &dyn DiagnosticSink) -> Vec<u8> {
    let Some(key_pos) = find_key(dict, key) else {
        return dict.to_vec();
    };
    let Some(span) = value_full_span(dict, key) else {
        return dict.to_vec();
    };
    let mut end = span.end;
    // Eat one run of trailing whitespace so no double gap is left behind.
    while end < dict.len() && is_ws(dict[end]) {
        end += 1;
    }
    let mut out = Vec::with_capacity(dict.len());
    out.extend_from_slice(&dict[..key_pos]);
    out.extend_from_slice(&dict[end..]);
    if !structurally_sound(&out) {
        sink.warn(&format!("remove: edit of /{key} would corrupt dictionary"));
        return dict.to_vec();
    }
    out
}

/// Delete the `/AP` entry and its (possibly nested) dictionary value.
pub fn remove_appearance_stream(dict: &[u8], sink: &dyn DiagnosticSink) -> Vec<u8> {
    remove_key_value(dict, "AP", sink)
}

fn structurally_sound(dict: &[u8]) -> bool {
    find_bytes(dict, b"<<").is_some() && find_bytes(dict, b">>").is_some()
}

/// First occurrence of `needle` in `haystack`.
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Last occurrence of `needle` in `haystack`.
pub fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Append `N G R` inside a `[ … ]` fragment, before the closing bracket.
/// Unbalanced input comes back unchanged.
pub fn add_ref_to_array(array: &[u8], id: ObjectId) -> Vec<u8> {
    let Some(open) = array.iter().position(|&b| b == b'[') else {
        return array.to_vec();
    };
    let span = token_span_at(array, open);
    if span.end == 0 || array.get(span.end - 1) != Some(&b']') {
        return array.to_vec();
    }
    let close = span.end - 1;
    let mut out = Vec::with_capacity(array.len() + 12);
    out.extend_from_slice(&array[..close]);
    if close > 0 && !is_ws(array[close - 1]) && array[close - 1] != b'[' {
        out.push(b' ');
    }
    out.extend_from_slice(id.to_ref_token().as_bytes());
    out.extend_from_slice(&array[close..]);
    out
}

/// Remove every word-bounded `N G R` occurrence from an array fragment.
pub fn remove_ref_from_array(array: &[u8], id: ObjectId) -> Vec<u8> {
    let mut out = Vec::with_capacity(array.len());
    let mut pos = 0;
    while pos < array.len() {
        if let Some(end) = match_ref_at(array, pos, id) {
            // Swallow following whitespace run so entries stay separated.
            let mut next = end;
            while next < array.len() && is_ws(array[next]) {
                next += 1;
            }
            pos = next;
            continue;
        }
        out.push(array[pos]);
        pos += 1;
    }
    out
}

/// True when a word-bounded `N G R` occurrence exists in the fragment.
pub fn array_contains_ref(array: &[u8], id: ObjectId) -> bool {
    (0..array.len()).any(|pos| match_ref_at(array, pos, id).is_some())
}

/// Match `N G R` at `pos` with word boundaries on both sides.
fn match_ref_at(bytes: &[u8], pos: usize, id: ObjectId) -> Option<usize> {
    if pos > 0 && bytes[pos - 1].is_ascii_alphanumeric() {
        return None;
    }
    let num = id.number.to_string();
    if !bytes[pos..].starts_with(num.as_bytes()) {
        return None;
    }
    let mut i = pos + num.len();
    if i < bytes.len() && bytes[i].is_ascii_digit() {
        return None; // longer number
    }
    let mut saw_ws = false;
    while i < bytes.len() && is_ws(bytes[i]) {
        i += 1;
        saw_ws = true;
    }
    if !saw_ws {
        return None;
    }
    let gen = id.generation.to_string();
    if !bytes[i..].starts_with(gen.as_bytes()) {
        return None;
    }
    i += gen.len();
    if i < bytes.len() && bytes[i].is_ascii_digit() {
        return None;
    }
    saw_ws = false;
    while i < bytes.len() && is_ws(bytes[i]) {
        i += 1;
        saw_ws = true;
    }
    if !saw_ws || i >= bytes.len() || bytes[i] != b'R' {
        return None;
    }
    i += 1;
    match bytes.get(i) {
        None => Some(i),
        Some(&b) if !b.is_ascii_alphanumeric() => Some(i),
        _ => None,
    }
}

/// [`add_ref_to_array`] lifted to an array stored inline under `/key`.
pub fn add_ref_to_inline_array(
    dict: &[u8],
    key: &str,
    id: ObjectId,
    sink: &dyn DiagnosticSink,
) -> Vec<u8> {
    let Some(span) = value_span(dict, key) else {
        sink.warn(&format!("add ref: key /{key} not found"));
        return dict.to_vec();
    };
    if dict[span.start] != b'[' {
        sink.warn(&format!("add ref: /{key} does not hold an inline array"));
        return dict.to_vec();
    }
    let new_array = add_ref_to_array(&dict[span.clone()], id);
    let mut out = Vec::with_capacity(dict.len() + 12);
    out.extend_from_slice(&dict[..span.start]);
    out.extend_from_slice(&new_array);
    out.extend_from_slice(&dict[span.end..]);
    out
}

/// [`remove_ref_from_array`] lifted to an array stored inline under `/key`.
pub fn remove_ref_from_inline_array(
    dict: &[u8],
    key: &str,
    id: ObjectId,
    sink: &dyn DiagnosticSink,
) -> Vec<u8> {
    let Some(span) = value_span(dict, key) else {
        return dict.to_vec();
    };
    if dict[span.start] != b'[' {
        sink.warn(&format!("remove ref: /{key} does not hold an inline array"));
        return dict.to_vec();
    }
    let new_array = remove_ref_from_array(&dict[span.clone()], id);
    let mut out = Vec::with_capacity(dict.len());
    out.extend_from_slice(&dict[..span.start]);
    out.extend_from_slice(&new_array);
    out.extend_from_slice(&dict[span.end..]);
    out
}

/// Parse a `N G R` token.
pub fn parse_ref_token(token: &[u8]) -> Option<ObjectId> {
    let text = std::str::from_utf8(token).ok()?;
    let mut parts = text.split_ascii_whitespace();
    let number: u32 = parts.next()?.parse().ok()?;
    let generation: u16 = parts.next()?.parse().ok()?;
    if parts.next()? != "R" || parts.next().is_some() {
        return None;
    }
    Some(ObjectId::new(number, generation))
}

/// The reference value of `/key`, when its value is a `N G R` token.
pub fn ref_value(dict: &[u8], key: &str) -> Option<ObjectId> {
    parse_ref_token(value_token(dict, key)?)
}

/// The integer value of `/key`.
pub fn int_value(dict: &[u8], key: &str) -> Option<i64> {
    let token = value_token(dict, key)?;
    std::str::from_utf8(token).ok()?.trim().parse().ok()
}

/// The name value of `/key`, decoded (`/Tx` yields `Tx`).
pub fn name_value(dict: &[u8], key: &str) -> Option<String> {
    let token = value_token(dict, key)?;
    if token.first() != Some(&b'/') {
        return None;
    }
    decode_pdf_name(token)
}

/// The string value of `/key` (literal or hex), decoded.
pub fn string_value(dict: &[u8], key: &str) -> Option<String> {
    decode_pdf_string(value_token(dict, key)?)
}

/// Every `N G R` reference inside an array fragment, in order.
pub fn refs_in_array(array: &[u8]) -> Vec<ObjectId> {
    let mut refs = Vec::new();
    let mut pos = 0;
    while pos < array.len() {
        if array[pos].is_ascii_digit() && (pos == 0 || !array[pos - 1].is_ascii_alphanumeric()) {
            let span = token_span_at(array, pos);
            if let Some(id) = parse_ref_token(&array[span.clone()]) {
                refs.push(id);
                pos = span.end;
                continue;
            }
        }
        pos += 1;
    }
    refs
}

/// Iterator over every balanced `<< … >>` region in `bytes`, at arbitrary
/// nesting depth. Regions are emitted as they close, innermost first.
pub fn each_dictionary(bytes: &[u8]) -> Dictionaries<'_> {
    Dictionaries {
        bytes,
        pos: 0,
        stack: Vec::new(),
    }
}

pub struct Dictionaries<'a> {
    bytes: &'a [u8],
    pos: usize,
    stack: Vec<usize>,
}

impl<'a> Iterator for Dictionaries<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos..].starts_with(b"<<") {
                self.stack.push(self.pos);
                self.pos += 2;
            } else if self.bytes[self.pos..].starts_with(b">>") {
                self.pos += 2;
                if let Some(start) = self.stack.pop() {
                    return Some(&self.bytes[start..self.pos]);
                }
            } else {
                self.pos += 1;
            }
        }
        None
    }
}

/// Replace every `stream … endstream` payload with nothing, keeping the
/// keywords, so dictionary scanning cannot wander into stream bytes.
pub fn strip_stream_bodies(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut pos = 0;
    while pos < bytes.len() {
        if let Some(kw) = find_bytes(&bytes[pos..], b"stream") {
            let kw_abs = pos + kw;
            let after_kw = kw_abs + b"stream".len();
            // Require the keyword itself, not the tail of `endstream`.
            let standalone = (kw_abs == 0 || !bytes[kw_abs - 1].is_ascii_alphanumeric())
                && bytes
                    .get(after_kw)
                    .map(|&b| b == b'\r' || b == b'\n')
                    .unwrap_or(false);
            if !standalone {
                out.extend_from_slice(&bytes[pos..after_kw]);
                pos = after_kw;
                continue;
            }
            out.extend_from_slice(&bytes[pos..after_kw]);
            out.push(b'\n');
            match find_bytes(&bytes[after_kw..], b"endstream") {
                Some(end) => {
                    pos = after_kw + end;
                }
                None => {
                    pos = bytes.len();
                }
            }
        } else {
            out.extend_from_slice(&bytes[pos..]);
            break;
        }
    }
    out
}

/// A widget annotation: `/Subtype` followed by `/Widget`.
pub fn is_widget(body: &[u8]) -> bool {
    let mut from = 0;
    while let Some(pos) = find_key(&body[from..], "Subtype") {
        let abs = from + pos;
        let mut i = abs + "/Subtype".len();
        while i < body.len() && is_ws(body[i]) {
            i += 1;
        }
        if body[i..].starts_with(b"/Widget") {
            let after = i + b"/Widget".len();
            match body.get(after) {
                None => return true,
                Some(&b) if is_ws(b) || is_delim(b) => return true,
                _ => {}
            }
        }
        from = abs + 1;
    }
    false
}

/// A page object: `/Type /Page`, excluding `/Pages`.
pub fn is_page(body: &[u8]) -> bool {
    let mut from = 0;
    while let Some(pos) = find_key(&body[from..], "Type") {
        let abs = from + pos;
        let mut i = abs + "/Type".len();
        while i < body.len() && is_ws(body[i]) {
            i += 1;
        }
        if body[i..].starts_with(b"/Page") {
            match body.get(i + b"/Page".len()) {
                None => return true,
                Some(&b) if !b.is_ascii_alphanumeric() => return true,
                _ => {}
            }
        }
        from = abs + 1;
    }
    false
}

/// Field-flag bit 0x1000 (multiline text).
pub fn is_multiline_field(body: &[u8]) -> bool {
    int_value(body, "Ff").map(|ff| ff & 0x1000 != 0).unwrap_or(false)
}

/// Extract a 4-number box array (`/MediaBox`, `/Rect`, …).
pub fn parse_box(body: &[u8], key: &str) -> Option<[f64; 4]> {
    let token = value_token(body, key)?;
    if token.first() != Some(&b'[') {
        return None;
    }
    let inner = &token[1..token.len().saturating_sub(1)];
    let text = std::str::from_utf8(inner).ok()?;
    let mut numbers = text
        .split_ascii_whitespace()
        .filter_map(|t| t.parse::<f64>().ok());
    Some([numbers.next()?, numbers.next()?, numbers.next()?, numbers.next()?])
}

/// Normalized on/off appearance state for a button widget.
pub fn appearance_choice(on: bool) -> &'static str {
    if on {
        "/Yes"
    } else {
        "/Off"
    }
}

/// Whether a button body carries the synthesized `/Yes`-`/Off` appearance
/// pair under `/AP`.
pub fn has_on_off_appearance(body: &[u8]) -> bool {
    find_key(body, "AP").is_some()
        && find_key(body, "Yes").is_some()
        && find_key(body, "Off").is_some()
}
