//! Object resolver
//!
//! Walks the xref chain from `startxref` back through `/Prev`, building a
//! per-object map of the latest revision, then locates raw object bodies on
//! demand: straight from the file, or from a lazily decompressed object
//! stream. The byte buffer is shared with the owning document, never copied.

use super::object_stream::{self, ObjStmSlots};
use super::xref::{self, XrefEntry};
use super::xref_stream;
use super::{ObjectId, ParseOptions};
use crate::diagnostics::DiagnosticSink;
use crate::error::{FormError, Result};
use crate::scan;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug)]
pub struct Resolver {
    data: Arc<[u8]>,
    /// Latest-revision entry per object number.
    entries: HashMap<u32, (u16, XrefEntry)>,
    /// Offset reported by the newest `startxref`.
    startxref: u64,
    /// Raw bytes of the newest trailer dictionary.
    trailer: Vec<u8>,
    root: ObjectId,
    info: Option<ObjectId>,
    /// Largest `/Size` observed along the chain.
    size_hint: i64,
    objstm_cache: HashMap<u32, ObjStmSlots>,
}

impl Resolver {
    /// Build a resolver over a frozen byte buffer.
    ///
    /// Raises `MalformedDocument` when `startxref` cannot be found or no
    /// catalog is reachable from the trailer.
    pub fn new(data: Arc<[u8]>, options: &ParseOptions, sink: &dyn DiagnosticSink) -> Result<Self> {
        let startxref = find_startxref(&data)?;

        let mut entries: HashMap<u32, (u16, XrefEntry)> = HashMap::new();
        let mut trailer: Option<Vec<u8>> = None;
        let mut size_hint = 0i64;

        let mut pending = vec![startxref as usize];
        let mut visited = HashSet::new();
        let mut chain_ok = true;

        while let Some(mut offset) = pending.pop() {
            if !visited.insert(offset) {
                continue; // cycle in /Prev chain
            }
            xref::skip_ws(&data, &mut offset);
            let section = if data.get(offset..offset + 4) == Some(b"xref".as_slice()) {
                xref::parse_classic_section(&data, offset)
            } else {
                parse_stream_section(&data, offset)
            };
            let section = match section {
                Ok(section) => section,
                Err(err) => {
                    if options.recover_xref {
                        sink.warn(&format!(
                            "xref section at {offset} unreadable ({err}); rebuilding by scan"
                        ));
                        chain_ok = false;
                        break;
                    }
                    return Err(err);
                }
            };

            // First-seen wins: the chain is walked newest-first, so a later
            // revision shadows every earlier entry for the same number.
            for (number, generation, entry) in section.entries {
                entries.entry(number).or_insert((generation, entry));
            }

            let dict = &data[section.trailer.clone()];
            if let Some(size) = scan::int_value(dict, "Size") {
                size_hint = size_hint.max(size);
            }
            if trailer.is_none() {
                trailer = Some(dict.to_vec());
            }
            if let Some(prev) = scan::int_value(dict, "Prev") {
                pending.push(prev as usize);
            }
            // Hybrid-reference files point at a supplementary xref stream;
            // pushed last so it shadows /Prev for overlapping numbers.
            if let Some(xref_stm) = scan::int_value(dict, "XRefStm") {
                pending.push(xref_stm as usize);
            }
        }

        if !chain_ok {
            rebuild_by_scan(&data, &mut entries);
            if trailer.is_none() {
                trailer = find_trailer_by_scan(&data);
            }
        }

        let trailer = trailer.ok_or_else(|| {
            FormError::MalformedDocument("no trailer dictionary found".to_string())
        })?;

        let root = match scan::ref_value(&trailer, "Root") {
            Some(root) => root,
            None => {
                return Err(FormError::MalformedDocument(
                    "trailer lacks /Root catalog reference".to_string(),
                ))
            }
        };
        let info = scan::ref_value(&trailer, "Info");

        Ok(Self {
            data,
            entries,
            startxref,
            trailer,
            root,
            info,
            size_hint,
            objstm_cache: HashMap::new(),
        })
    }

    /// The catalog reference from the newest trailer.
    pub fn root_id(&self) -> ObjectId {
        self.root
    }

    /// `/Info` reference, when the trailer carries one.
    pub fn info_id(&self) -> Option<ObjectId> {
        self.info
    }

    /// Raw bytes of the newest trailer dictionary.
    pub fn trailer_dict(&self) -> &[u8] {
        &self.trailer
    }

    /// Offset the newest `startxref` points at.
    pub fn startxref(&self) -> u64 {
        self.startxref
    }

    /// Largest `/Size` seen along the revision chain.
    pub fn size_hint(&self) -> i64 {
        self.size_hint
    }

    /// Largest object number with an xref entry.
    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().copied().max().unwrap_or(0)
    }

    /// The xref entry for an object number.
    pub fn entry(&self, number: u32) -> Option<&(u16, XrefEntry)> {
        self.entries.get(&number)
    }

    /// Every indexed object number, ascending.
    pub fn object_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self.entries.keys().copied().collect();
        numbers.sort_unstable();
        numbers
    }

    /// Whether `id` resolves to a live (non-free) object.
    pub fn contains(&self, id: ObjectId) -> bool {
        matches!(
            self.entries.get(&id.number),
            Some((_, entry)) if *entry != XrefEntry::Free
        )
    }

    /// Drop every decompressed object-stream container. Must run before the
    /// underlying buffer is replaced.
    pub fn clear_object_stream_cache(&mut self) {
        self.objstm_cache.clear();
    }

    /// The raw body bytes of `id`: between the `N G obj` header and
    /// `endobj` for file-resident objects, or the container slot for
    /// object-stream residents.
    pub fn object_body(&mut self, id: ObjectId) -> Option<&[u8]> {
        let (_, entry) = *self.entries.get(&id.number)?;
        match entry {
            XrefEntry::Free => None,
            XrefEntry::InFile { offset } => {
                let span = self.file_body_span(id, offset as usize)?;
                Some(&self.data[span])
            }
            XrefEntry::InObjStm { container, index } => {
                self.ensure_container(container)?;
                let slots = self.objstm_cache.get(&container)?;
                let (slot_id, range) = slots.slots.get(index as usize)?;
                // The slot table is authoritative; tolerate index drift by
                // falling back to a search for the object number.
                if slot_id.number == id.number {
                    Some(&slots.data[range.clone()])
                } else {
                    let (_, range) = slots
                        .slots
                        .iter()
                        .find(|(sid, _)| sid.number == id.number)?;
                    Some(&slots.data[range.clone()])
                }
            }
        }
    }

    /// Visit every live object of the latest revision in object-number
    /// order. Earlier-revision bodies are suppressed by the entry map.
    pub fn for_each_object(&mut self, mut f: impl FnMut(ObjectId, &[u8])) {
        let mut numbers: Vec<u32> = self.entries.keys().copied().collect();
        numbers.sort_unstable();
        for number in numbers {
            let (generation, entry) = self.entries[&number];
            if entry == XrefEntry::Free {
                continue;
            }
            let id = ObjectId::new(number, generation);
            // A body can legitimately be absent (corrupt entry); skip it.
            let Some(body) = self.object_body(id) else {
                continue;
            };
            // Narrow the borrow: hand out the slice, then move on.
            f(id, body);
        }
    }

    /// Locate the body span for a file-resident object, resyncing by a
    /// whole-file header scan when the recorded offset is stale.
    fn file_body_span(&self, id: ObjectId, offset: usize) -> Option<Range<usize>> {
        if let Some(span) = body_span_at(&self.data, offset, id) {
            return Some(span);
        }
        let found = scan_for_header(&self.data, id)?;
        body_span_at(&self.data, found, id)
    }

    /// Decompress and index an object-stream container on first use.
    fn ensure_container(&mut self, container: u32) -> Option<()> {
        if self.objstm_cache.contains_key(&container) {
            return Some(());
        }
        let (generation, entry) = *self.entries.get(&container)?;
        let XrefEntry::InFile { offset } = entry else {
            return None; // containers cannot nest
        };
        let data = Arc::clone(&self.data);
        let span = body_span_at(&data, offset as usize, ObjectId::new(container, generation))
            .or_else(|| {
                let found = scan_for_header(&data, ObjectId::new(container, generation))?;
                body_span_at(&data, found, ObjectId::new(container, generation))
            })?;
        let body = &data[span];

        let dict_span = scan::balanced_dict_span(body, body.iter().position(|&b| b == b'<')?)?;
        let dict = &body[dict_span.clone()];
        if scan::name_value(dict, "Type").as_deref() != Some("ObjStm") {
            return None;
        }
        let n = scan::int_value(dict, "N")? as usize;
        let first = scan::int_value(dict, "First")? as usize;
        let payload = stream_payload(body)?;
        let decoded = super::filters::decode_stream(dict, payload).ok()?;
        let slots = object_stream::parse_object_stream(&decoded, n, first).ok()?;
        self.objstm_cache
            .insert(container, ObjStmSlots { data: decoded, slots });
        Some(())
    }
}

/// Find the offset reported by the last `startxref` in the buffer.
pub fn find_startxref(data: &[u8]) -> Result<u64> {
    let pos = scan::rfind_bytes(data, b"startxref").ok_or_else(|| {
        FormError::MalformedDocument("startxref keyword not found".to_string())
    })?;
    let mut cursor = pos + b"startxref".len();
    xref::skip_ws(data, &mut cursor);
    xref::read_integer(data, &mut cursor).ok_or_else(|| {
        FormError::MalformedDocument("startxref not followed by an offset".to_string())
    })
}

/// Strip multipart/form-data wrapping: everything before the first `%PDF-`
/// and after the last `%%EOF`. Returns `None` when the input is not wrapped.
pub fn strip_multipart(data: &[u8]) -> Option<Range<usize>> {
    if data.starts_with(b"%PDF-") {
        return None;
    }
    let start = scan::find_bytes(data, b"%PDF-")?;
    let eof = scan::rfind_bytes(data, b"%%EOF")?;
    if eof < start {
        return None;
    }
    let mut end = eof + b"%%EOF".len();
    // Keep a single trailing EOL with the document.
    if data.get(end) == Some(&b'\r') {
        end += 1;
    }
    if data.get(end) == Some(&b'\n') {
        end += 1;
    }
    Some(start..end)
}

/// Parse the xref section at `offset` as an xref stream object.
fn parse_stream_section(data: &[u8], offset: usize) -> Result<xref::XrefSection> {
    let (id, _) = parse_object_header(data, offset).ok_or_else(|| {
        FormError::MalformedDocument(format!("no object header at xref offset {offset}"))
    })?;
    let span = body_span_at(data, offset, id).ok_or_else(|| {
        FormError::MalformedDocument(format!("unterminated xref stream object {id}"))
    })?;
    let body = &data[span.clone()];
    let dict_rel = scan::balanced_dict_span(body, body.iter().position(|&b| b == b'<').unwrap_or(0))
        .ok_or_else(|| {
            FormError::MalformedDocument("xref stream object has no dictionary".to_string())
        })?;
    let dict_span = span.start + dict_rel.start..span.start + dict_rel.end;
    let payload = stream_payload(body).ok_or_else(|| {
        FormError::MalformedDocument("xref stream object has no stream".to_string())
    })?;
    xref_stream::parse_xref_stream(data, dict_span, payload)
}

/// Parse `N G obj` at `offset`; returns the id and the body start.
fn parse_object_header(data: &[u8], offset: usize) -> Option<(ObjectId, usize)> {
    let mut pos = offset;
    xref::skip_ws(data, &mut pos);
    let number = xref::read_integer(data, &mut pos)?;
    xref::skip_ws(data, &mut pos);
    let generation = xref::read_integer(data, &mut pos)?;
    xref::skip_ws(data, &mut pos);
    if data.get(pos..pos + 3) != Some(b"obj".as_slice()) {
        return None;
    }
    pos += 3;
    // Skip one EOL after the keyword; the body keeps any further whitespace.
    if data.get(pos) == Some(&b'\r') {
        pos += 1;
    }
    if data.get(pos) == Some(&b'\n') {
        pos += 1;
    }
    Some((ObjectId::new(number as u32, generation as u16), pos))
}

/// Body span of the object headed at `offset`, `stream` payloads skipped
/// when hunting for `endobj`. Returns `None` if the header does not match
/// `id` or no `endobj` terminates the object.
fn body_span_at(data: &[u8], offset: usize, id: ObjectId) -> Option<Range<usize>> {
    let (found, body_start) = parse_object_header(data, offset)?;
    if found.number != id.number {
        return None;
    }
    let mut cursor = body_start;
    loop {
        let rest = &data[cursor..];
        let endobj = scan::find_bytes(rest, b"endobj")?;
        // A stream payload before that endobj swallows it.
        match find_stream_keyword(&rest[..endobj]) {
            Some(stream_pos) => {
                let after_stream = cursor + stream_pos;
                let endstream = scan::find_bytes(&data[after_stream..], b"endstream")?;
                cursor = after_stream + endstream + b"endstream".len();
            }
            None => {
                let mut end = cursor + endobj;
                // Trim the EOL separating body from keyword.
                while end > body_start && scan::is_ws(data[end - 1]) {
                    end -= 1;
                }
                return Some(body_start..end);
            }
        }
    }
}

/// Position of a standalone `stream` keyword (not the tail of `endstream`).
fn find_stream_keyword(bytes: &[u8]) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = scan::find_bytes(&bytes[from..], b"stream") {
        let abs = from + pos;
        let preceded_ok = abs == 0 || !bytes[abs - 1].is_ascii_alphanumeric();
        let followed_ok = matches!(bytes.get(abs + 6), Some(&b'\r') | Some(&b'\n') | None);
        if preceded_ok && followed_ok {
            return Some(abs);
        }
        from = abs + 1;
    }
    None
}

/// Raw stream payload of an object body: bytes between the `stream` EOL and
/// `endstream`. Keyword boundaries are trusted over `/Length`.
pub(crate) fn stream_payload(body: &[u8]) -> Option<&[u8]> {
    let kw = find_stream_keyword(body)?;
    let mut start = kw + b"stream".len();
    if body.get(start) == Some(&b'\r') {
        start += 1;
    }
    if body.get(start) == Some(&b'\n') {
        start += 1;
    }
    let end = scan::rfind_bytes(body, b"endstream")?;
    let mut end = end;
    // ISO 32000-1 puts an EOL before endstream; strip one if present.
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
    }
    if end > start && body[end - 1] == b'\r' {
        end -= 1;
    }
    (end >= start).then(|| &body[start..end])
}

/// Whole-file scan for the header of a specific object.
fn scan_for_header(data: &[u8], id: ObjectId) -> Option<usize> {
    let needle = format!("{} {} obj", id.number, id.generation);
    let mut from = 0;
    while let Some(pos) = scan::find_bytes(&data[from..], needle.as_bytes()) {
        let abs = from + pos;
        let boundary = abs == 0 || !data[abs - 1].is_ascii_digit();
        if boundary {
            return Some(abs);
        }
        from = abs + 1;
    }
    None
}

/// Rebuild an approximate xref by scanning for every `N G obj` header.
/// Later headers for the same number win (they belong to newer revisions).
fn rebuild_by_scan(data: &[u8], entries: &mut HashMap<u32, (u16, XrefEntry)>) {
    entries.clear();
    let mut pos = 0;
    while pos < data.len() {
        if data[pos].is_ascii_digit() && (pos == 0 || !data[pos - 1].is_ascii_digit()) {
            if let Some((id, _)) = parse_object_header(data, pos) {
                // Confirm the keyword actually sits here, not further along.
                let mut check = pos;
                xref::skip_ws(data, &mut check);
                if let Some(header_end) = header_end_at(data, check) {
                    entries.insert(
                        id.number,
                        (id.generation, XrefEntry::InFile { offset: pos as u64 }),
                    );
                    pos = header_end;
                    continue;
                }
            }
        }
        pos += 1;
    }
}

/// End offset of a `N G obj` header starting exactly at `pos`, or None.
fn header_end_at(data: &[u8], pos: usize) -> Option<usize> {
    let mut cursor = pos;
    xref::read_integer(data, &mut cursor)?;
    if cursor == pos {
        return None;
    }
    let ws1 = cursor;
    xref::skip_ws(data, &mut cursor);
    if cursor == ws1 {
        return None;
    }
    xref::read_integer(data, &mut cursor)?;
    let ws2 = cursor;
    xref::skip_ws(data, &mut cursor);
    if cursor == ws2 {
        return None;
    }
    if data.get(cursor..cursor + 3) == Some(b"obj".as_slice()) {
        Some(cursor + 3)
    } else {
        None
    }
}

/// Last-resort trailer recovery: the last dictionary carrying `/Root`.
fn find_trailer_by_scan(data: &[u8]) -> Option<Vec<u8>> {
    let mut found = None;
    for dict in scan::each_dictionary(data) {
        if scan::ref_value(dict, "Root").is_some() {
            found = Some(dict.to_vec());
        }
    }
    found
}
