//! Document orchestrator
//!
//! Owns the frozen byte buffer, the resolver built over it and the queue of
//! pending object patches. High-level operations (field enumeration, add,
//! update, remove, serialization) are coordinated here; the byte-level work
//! happens in the scan, parser and writer layers.

use crate::diagnostics::{DiagnosticSink, LogSink};
use crate::error::{FormError, Result};
use crate::forms::field::{Field, FieldPosition, FieldType, FieldValue};
use crate::forms::{add, clear, remove, update, AddFieldOptions, FieldSelector};
use crate::parser::resolver::strip_multipart;
use crate::parser::{ObjectId, ParseOptions, Resolver, XrefEntry};
use crate::scan;
use crate::writer::rewrite::{self, RewritePlan};
use crate::writer::{dedup_last_wins, incremental, Patch};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

/// The page boxes read during [`Document::list_pages`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PageBoxes {
    pub media: Option<[f64; 4]>,
    pub crop: Option<[f64; 4]>,
    pub art: Option<[f64; 4]>,
    pub bleed: Option<[f64; 4]>,
    pub trim: Option<[f64; 4]>,
}

/// A page descriptor: 1-indexed number, size from the effective `/MediaBox`
/// and the raw boxes.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: u32,
    pub width: f64,
    pub height: f64,
    pub id: ObjectId,
    pub boxes: PageBoxes,
}

/// Where the catalog keeps its AcroForm dictionary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum AcroFormSlot {
    /// An indirect object of its own.
    Object(ObjectId),
    /// Inline inside the catalog dictionary.
    Inline,
}

/// A field located for mutation: its reference and current body.
#[derive(Debug, Clone)]
pub(crate) struct LocatedField {
    pub id: ObjectId,
    pub body: Vec<u8>,
    pub name: String,
    pub field_type: FieldType,
}

/// An in-memory PDF document open for form editing.
pub struct Document {
    raw: Arc<[u8]>,
    resolver: Resolver,
    patches: Vec<Patch>,
    options: ParseOptions,
    sink: Rc<dyn DiagnosticSink>,
    next_number: u32,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("raw_len", &self.raw.len())
            .field("patch_count", &self.patches.len())
            .field("options", &self.options)
            .field("next_number", &self.next_number)
            .finish()
    }
}

impl Document {
    /// Open a document from a file path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    /// Open a document from an in-memory buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(bytes, ParseOptions::default(), Rc::new(LogSink))
    }

    /// Open with explicit parse options and diagnostic sink.
    pub fn from_bytes_with(
        bytes: Vec<u8>,
        options: ParseOptions,
        sink: Rc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        let bytes = if options.strip_multipart {
            match strip_multipart(&bytes) {
                Some(range) => {
                    sink.warn("stripped multipart/form-data wrapping");
                    bytes[range].to_vec()
                }
                None => bytes,
            }
        } else {
            bytes
        };
        let raw: Arc<[u8]> = bytes.into();
        let resolver = Resolver::new(Arc::clone(&raw), &options, &*sink)?;
        Ok(Self {
            raw,
            resolver,
            patches: Vec::new(),
            options,
            sink,
            next_number: 0,
        })
    }

    /// The current serialized bytes (not including pending patches).
    pub fn bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Whether mutations are queued but not yet written.
    pub fn has_pending_changes(&self) -> bool {
        !self.patches.is_empty()
    }

    // ---- enumeration ----------------------------------------------------

    /// Enumerate every form field, one entry per name.
    ///
    /// When several same-name widgets exist without `/Parent`, the lowest
    /// object number wins. Repeated calls return equal sequences.
    pub fn list_fields(&mut self) -> Vec<Field> {
        self.collect_fields().into_iter().map(|(field, _)| field).collect()
    }

    /// Look up a single field by name.
    pub fn field(&mut self, name: &str) -> Option<Field> {
        self.collect_fields()
            .into_iter()
            .map(|(field, _)| field)
            .find(|field| field.name() == name)
    }

    /// Enumerate pages in document order with their boxes.
    pub fn list_pages(&mut self) -> Vec<Page> {
        let ids = self.page_ids();
        let mut pages = Vec::with_capacity(ids.len());
        let mut inherited: HashMap<u32, PageBoxes> = HashMap::new();
        // Inheritance: /MediaBox and /CropBox may live on /Pages ancestors.
        // Walk the parent chain lazily per page.
        for (index, &id) in ids.iter().enumerate() {
            let Some(body) = self.current_body(id) else {
                continue;
            };
            let mut boxes = PageBoxes {
                media: scan::parse_box(&body, "MediaBox"),
                crop: scan::parse_box(&body, "CropBox"),
                art: scan::parse_box(&body, "ArtBox"),
                bleed: scan::parse_box(&body, "BleedBox"),
                trim: scan::parse_box(&body, "TrimBox"),
            };
            if boxes.media.is_none() || boxes.crop.is_none() {
                let parent_boxes = self.inherited_boxes(&body, &mut inherited);
                boxes.media = boxes.media.or(parent_boxes.media);
                boxes.crop = boxes.crop.or(parent_boxes.crop);
            }
            let media = boxes.media.unwrap_or([0.0, 0.0, 612.0, 792.0]);
            pages.push(Page {
                number: index as u32 + 1,
                width: media[2] - media[0],
                height: media[3] - media[1],
                id,
                boxes,
            });
        }
        pages
    }

    /// Annotation references on a 1-indexed page.
    pub fn page_annotations(&mut self, page: u32) -> Result<Vec<ObjectId>> {
        let ids = self.page_ids();
        let id = ids
            .get(page.checked_sub(1).unwrap_or(u32::MAX) as usize)
            .copied()
            .ok_or(FormError::InvalidPageNumber(page))?;
        Ok(self.annots_refs_of_page(id))
    }

    /// The members of `/AcroForm/Fields`, inline or indirect.
    pub fn acroform_field_refs(&mut self) -> Vec<ObjectId> {
        let Some((_, fragment)) = self.acroform() else {
            return Vec::new();
        };
        match scan::value_token(&fragment, "Fields") {
            Some(token) if token.first() == Some(&b'[') => scan::refs_in_array(token),
            Some(token) => scan::parse_ref_token(token)
                .and_then(|id| self.current_body(id))
                .map(|body| scan::refs_in_array(&body))
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    // ---- mutation -------------------------------------------------------

    /// Add a new field with a widget annotation.
    ///
    /// Returns `Ok(None)` for an empty name; raises `InvalidPageNumber` when
    /// the requested page does not exist.
    pub fn add_field(&mut self, name: &str, opts: AddFieldOptions) -> Result<Option<Field>> {
        add::add_field(self, name, opts)
    }

    /// Set a field's value. Returns false for an unknown name.
    pub fn update_field(&mut self, name: &str, value: impl Into<FieldValue>) -> bool {
        self.update_field_named(name, value, None)
    }

    /// Set a field's value and optionally rename it.
    pub fn update_field_named(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
        new_name: Option<&str>,
    ) -> bool {
        update::update_field(self, name, &value.into(), new_name)
    }

    /// Remove a field and its widgets from the form. Returns false for an
    /// unknown name.
    pub fn remove_field(&mut self, name: &str) -> bool {
        remove::remove_field(self, name)
    }

    // ---- serialization --------------------------------------------------

    /// Apply pending patches as an incremental update and return the new
    /// bytes. With an empty queue this is the identity.
    pub fn write(&mut self) -> Result<Vec<u8>> {
        if self.patches.is_empty() {
            return Ok(self.raw.to_vec());
        }
        let patches = dedup_last_wins(std::mem::take(&mut self.patches));
        let bytes = incremental::append_update(&self.raw, &patches)?;
        self.replace_bytes(bytes)?;
        Ok(self.raw.to_vec())
    }

    /// Write to a file, optionally flattening to a single revision.
    pub fn write_to<P: AsRef<Path>>(&mut self, path: P, flatten: bool) -> Result<()> {
        let bytes = if flatten {
            self.flatten_in_place()?;
            self.raw.to_vec()
        } else {
            self.write()?
        };
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Re-emit the document as a single revision, discarding the
    /// incremental chain. Pending patches are applied first.
    pub fn flatten(&mut self) -> Result<Vec<u8>> {
        self.write()?;
        let plan = self.build_rewrite_plan(&HashSet::new())?;
        Ok(rewrite::write_document(&plan))
    }

    /// [`flatten`](Self::flatten), replacing this document's bytes.
    pub fn flatten_in_place(&mut self) -> Result<&mut Self> {
        let bytes = self.flatten()?;
        self.replace_bytes(bytes)?;
        Ok(self)
    }

    /// Rewrite the document keeping only the fields the selector keeps;
    /// their widgets, page `/Annots` entries and `/Fields` members go with
    /// them.
    pub fn clear(&mut self, selector: &FieldSelector) -> Result<Vec<u8>> {
        clear::clear_document(self, selector)
    }

    /// [`clear`](Self::clear), replacing this document's bytes.
    pub fn clear_in_place(&mut self, selector: &FieldSelector) -> Result<&mut Self> {
        let bytes = clear::clear_document(self, selector)?;
        self.replace_bytes(bytes)?;
        Ok(self)
    }

    // ---- crate-internal plumbing ---------------------------------------

    pub(crate) fn sink(&self) -> Rc<dyn DiagnosticSink> {
        Rc::clone(&self.sink)
    }

    pub(crate) fn root_id(&self) -> ObjectId {
        self.resolver.root_id()
    }

    /// The body `id` currently has: the latest queued patch, or the
    /// resolved object.
    pub(crate) fn current_body(&mut self, id: ObjectId) -> Option<Vec<u8>> {
        if let Some(patch) = self.patches.iter().rev().find(|p| p.id.number == id.number) {
            return Some(patch.body.clone());
        }
        self.resolver.object_body(id).map(|body| body.to_vec())
    }

    /// Queue a full-body revision for `id`.
    pub(crate) fn push_patch(&mut self, id: ObjectId, body: Vec<u8>) {
        self.patches.push(Patch { id, body });
    }

    /// Allocate a fresh object number past everything in the file and the
    /// patch queue.
    pub(crate) fn alloc_id(&mut self) -> ObjectId {
        let in_patches = self.patches.iter().map(|p| p.id.number).max().unwrap_or(0);
        let next = self
            .resolver
            .max_object_number()
            .max(in_patches)
            .max(self.next_number)
            + 1;
        self.next_number = next;
        ObjectId::new(next, 0)
    }

    /// Visit every object as it currently stands: queued patches override
    /// resolved bodies, and patch-only (new) objects are included.
    pub(crate) fn each_current_object(&mut self, mut f: impl FnMut(ObjectId, &[u8])) {
        let mut numbers = self.resolver.object_numbers();
        for patch in &self.patches {
            if !numbers.contains(&patch.id.number) {
                numbers.push(patch.id.number);
            }
        }
        numbers.sort_unstable();
        numbers.dedup();

        for number in numbers {
            if let Some(patch) = self.patches.iter().rev().find(|p| p.id.number == number) {
                f(patch.id, &patch.body);
                continue;
            }
            let Some(&(generation, entry)) = self.resolver.entry(number) else {
                continue;
            };
            if entry == XrefEntry::Free {
                continue;
            }
            let id = ObjectId::new(number, generation);
            if let Some(body) = self.resolver.object_body(id) {
                f(id, body);
            }
        }
    }

    /// Page object ids in document order (depth-first `/Kids` traversal).
    pub(crate) fn page_ids(&mut self) -> Vec<ObjectId> {
        let root = self.resolver.root_id();
        let mut pages = Vec::new();
        let Some(catalog) = self.current_body(root) else {
            return pages;
        };
        let Some(tree_root) = scan::ref_value(&catalog, "Pages") else {
            // Damaged catalog: fall back to number order.
            self.each_current_object(|id, body| {
                if scan::is_page(body) {
                    pages.push(id);
                }
            });
            return pages;
        };

        let mut stack = vec![tree_root];
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            if !visited.insert(id.number) {
                continue;
            }
            let Some(body) = self.current_body(id) else {
                continue;
            };
            if scan::is_page(&body) {
                pages.push(id);
            } else if let Some(kids) = scan::value_token(&body, "Kids") {
                if kids.first() == Some(&b'[') {
                    // Reverse for depth-first left-to-right order.
                    for kid in scan::refs_in_array(kids).into_iter().rev() {
                        stack.push(kid);
                    }
                }
            }
        }
        pages
    }

    /// The widget references in a page's `/Annots`, inline or indirect.
    pub(crate) fn annots_refs_of_page(&mut self, page_id: ObjectId) -> Vec<ObjectId> {
        let Some(body) = self.current_body(page_id) else {
            return Vec::new();
        };
        let Some(token) = scan::value_token(&body, "Annots") else {
            return Vec::new();
        };
        if token.first() == Some(&b'[') {
            return scan::refs_in_array(token);
        }
        if let Some(array_id) = scan::parse_ref_token(token) {
            if let Some(array_body) = self.current_body(array_id) {
                return scan::refs_in_array(&array_body);
            }
        }
        Vec::new()
    }

    /// Add a widget reference to a page's `/Annots`, creating the array
    /// when missing and following an indirect array when present.
    pub(crate) fn page_annots_add(&mut self, page_id: ObjectId, widget: ObjectId) -> bool {
        let sink = self.sink();
        let Some(body) = self.current_body(page_id) else {
            return false;
        };
        match scan::value_token(&body, "Annots") {
            None => {
                let token = format!("[{}]", widget.to_ref_token());
                let patched = scan::upsert_key_value(&body, "Annots", token.as_bytes(), &*sink);
                self.push_patch(page_id, patched);
            }
            Some(token) if token.first() == Some(&b'[') => {
                let patched = scan::add_ref_to_inline_array(&body, "Annots", widget, &*sink);
                self.push_patch(page_id, patched);
            }
            Some(token) => {
                let Some(array_id) = scan::parse_ref_token(token) else {
                    return false;
                };
                let Some(array_body) = self.current_body(array_id) else {
                    return false;
                };
                let patched = scan::add_ref_to_array(&array_body, widget);
                self.push_patch(array_id, patched);
            }
        }
        true
    }

    /// Remove a widget reference from a page's `/Annots`.
    pub(crate) fn page_annots_remove(&mut self, page_id: ObjectId, widget: ObjectId) -> bool {
        let sink = self.sink();
        let Some(body) = self.current_body(page_id) else {
            return false;
        };
        match scan::value_token(&body, "Annots") {
            None => false,
            Some(token) if token.first() == Some(&b'[') => {
                if !scan::array_contains_ref(token, widget) {
                    return false;
                }
                let patched = scan::remove_ref_from_inline_array(&body, "Annots", widget, &*sink);
                self.push_patch(page_id, patched);
                true
            }
            Some(token) => {
                let Some(array_id) = scan::parse_ref_token(token) else {
                    return false;
                };
                let Some(array_body) = self.current_body(array_id) else {
                    return false;
                };
                if !scan::array_contains_ref(&array_body, widget) {
                    return false;
                }
                let patched = scan::remove_ref_from_array(&array_body, widget);
                self.push_patch(array_id, patched);
                true
            }
        }
    }

    /// Locate the AcroForm dictionary: `(slot, fragment)`.
    pub(crate) fn acroform(&mut self) -> Option<(AcroFormSlot, Vec<u8>)> {
        let root = self.resolver.root_id();
        let catalog = self.current_body(root)?;
        let token = scan::value_token(&catalog, "AcroForm")?;
        if token == b"<<" {
            let span = scan::value_full_span(&catalog, "AcroForm")?;
            return Some((AcroFormSlot::Inline, catalog[span].to_vec()));
        }
        let id = scan::parse_ref_token(token)?;
        let body = self.current_body(id)?;
        Some((AcroFormSlot::Object(id), body))
    }

    /// Locate the AcroForm dictionary, creating an empty one when the
    /// catalog has none.
    pub(crate) fn ensure_acroform(&mut self) -> (AcroFormSlot, Vec<u8>) {
        if let Some(found) = self.acroform() {
            return found;
        }
        let sink = self.sink();
        let id = self.alloc_id();
        let body = b"<< /Fields [] >>".to_vec();
        self.push_patch(id, body.clone());
        let root = self.resolver.root_id();
        if let Some(catalog) = self.current_body(root) {
            let patched = scan::upsert_key_value(
                &catalog,
                "AcroForm",
                id.to_ref_token().as_bytes(),
                &*sink,
            );
            self.push_patch(root, patched);
        }
        (AcroFormSlot::Object(id), body)
    }

    /// Write back an AcroForm fragment to wherever it lives.
    pub(crate) fn write_acroform(&mut self, slot: AcroFormSlot, fragment: Vec<u8>) {
        match slot {
            AcroFormSlot::Object(id) => self.push_patch(id, fragment),
            AcroFormSlot::Inline => {
                let sink = self.sink();
                let root = self.resolver.root_id();
                let Some(catalog) = self.current_body(root) else {
                    return;
                };
                let patched = scan::replace_key_value(&catalog, "AcroForm", &fragment, &*sink);
                self.push_patch(root, patched);
            }
        }
    }

    /// Add a field reference to `/AcroForm/Fields` (inline or indirect).
    pub(crate) fn acroform_fields_add(&mut self, field_id: ObjectId) {
        let sink = self.sink();
        let (slot, fragment) = self.ensure_acroform();
        match scan::value_token(&fragment, "Fields") {
            None => {
                let token = format!("[{}]", field_id.to_ref_token());
                let patched =
                    scan::upsert_key_value(&fragment, "Fields", token.as_bytes(), &*sink);
                self.write_acroform(slot, patched);
            }
            Some(token) if token.first() == Some(&b'[') => {
                let patched = scan::add_ref_to_inline_array(&fragment, "Fields", field_id, &*sink);
                self.write_acroform(slot, patched);
            }
            Some(token) => {
                if let Some(array_id) = scan::parse_ref_token(token) {
                    if let Some(array_body) = self.current_body(array_id) {
                        let patched = scan::add_ref_to_array(&array_body, field_id);
                        self.push_patch(array_id, patched);
                    }
                }
            }
        }
    }

    /// Remove a field reference from `/AcroForm/Fields`.
    pub(crate) fn acroform_fields_remove(&mut self, field_id: ObjectId) {
        let sink = self.sink();
        let Some((slot, fragment)) = self.acroform() else {
            return;
        };
        match scan::value_token(&fragment, "Fields") {
            Some(token) if token.first() == Some(&b'[') => {
                let patched =
                    scan::remove_ref_from_inline_array(&fragment, "Fields", field_id, &*sink);
                self.write_acroform(slot, patched);
            }
            Some(token) => {
                if let Some(array_id) = scan::parse_ref_token(token) {
                    if let Some(array_body) = self.current_body(array_id) {
                        let patched = scan::remove_ref_from_array(&array_body, field_id);
                        self.push_patch(array_id, patched);
                    }
                }
            }
            None => {}
        }
    }

    /// Force `/AcroForm/NeedAppearances true` so viewers regenerate
    /// appearance streams from the values we set.
    pub(crate) fn set_need_appearances(&mut self) {
        let sink = self.sink();
        let (slot, fragment) = self.ensure_acroform();
        let patched = scan::upsert_key_value(&fragment, "NeedAppearances", b"true", &*sink);
        if patched != fragment {
            self.write_acroform(slot, patched);
        }
    }

    /// Locate a field for mutation, queued patches included. Lowest object
    /// number wins among same-name candidates.
    pub(crate) fn find_field(&mut self, name: &str) -> Option<LocatedField> {
        self.collect_fields()
            .into_iter()
            .find(|(field, _)| field.name() == name)
            .map(|(field, body)| LocatedField {
                id: field.id,
                name: field.name.clone(),
                field_type: field.field_type,
                body,
            })
    }

    /// Shared enumeration pass: every field with its current body.
    fn collect_fields(&mut self) -> Vec<(Field, Vec<u8>)> {
        struct WidgetInfo {
            id: ObjectId,
            rect: Option<[f64; 4]>,
            page_ref: Option<ObjectId>,
            parent: Option<ObjectId>,
            name: Option<String>,
        }

        let mut widgets: Vec<WidgetInfo> = Vec::new();
        let mut candidates: Vec<(ObjectId, Vec<u8>)> = Vec::new();
        self.each_current_object(|id, body| {
            if scan::is_widget(body) {
                widgets.push(WidgetInfo {
                    id,
                    rect: scan::parse_box(body, "Rect"),
                    page_ref: scan::ref_value(body, "P"),
                    parent: scan::ref_value(body, "Parent"),
                    name: scan::string_value(body, "T"),
                });
            }
            if scan::find_key(body, "T").is_some() && looks_like_field(body) {
                candidates.push((id, body.to_vec()));
            }
        });

        if candidates.is_empty() {
            self.fallback_field_scan(&mut candidates);
        }

        let page_ids = self.page_ids();
        // Widgets lacking /P: find their page through every /Annots array.
        let mut annots_page: HashMap<u32, u32> = HashMap::new();
        for (index, &page_id) in page_ids.iter().enumerate() {
            for annot in self.annots_refs_of_page(page_id) {
                annots_page.entry(annot.number).or_insert(index as u32 + 1);
            }
        }
        let page_number_of = |id: ObjectId| -> Option<u32> {
            page_ids
                .iter()
                .position(|&p| p.number == id.number)
                .map(|i| i as u32 + 1)
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut fields = Vec::new();
        for (id, body) in candidates {
            let Some(name) = scan::string_value(&body, "T") else {
                continue;
            };
            if name.is_empty() || !seen.insert(name.clone()) {
                continue;
            }

            let value = scan::value_token(&body, "V").and_then(decode_value_token);
            let field_type = scan::name_value(&body, "FT")
                .filter(|ft| !ft.is_empty())
                .map(|ft| FieldType::from_name(&ft))
                .unwrap_or(FieldType::Text);

            // Widget lookup: by parent ref first, by name second, by the
            // field itself when it is a flat merged field-widget.
            let widget = widgets
                .iter()
                .filter(|w| w.parent == Some(id))
                .min_by_key(|w| w.id.number)
                .or_else(|| {
                    widgets
                        .iter()
                        .filter(|w| w.parent.is_none() && w.name.as_deref() == Some(&name))
                        .min_by_key(|w| w.id.number)
                })
                .or_else(|| widgets.iter().find(|w| w.id == id));

            let position = widget.and_then(|w| {
                let rect = w.rect?;
                let page = w
                    .page_ref
                    .and_then(page_number_of)
                    .or_else(|| annots_page.get(&w.id.number).copied())
                    .unwrap_or(1);
                Some(FieldPosition {
                    x: rect[0],
                    y: rect[1],
                    width: rect[2] - rect[0],
                    height: rect[3] - rect[1],
                    page,
                })
            });

            fields.push((
                Field {
                    name,
                    value,
                    field_type,
                    id,
                    position,
                },
                body,
            ));
        }
        fields
    }

    /// Enumeration fallback: when the xref-driven pass finds nothing, scan
    /// raw bytes (stream payloads elided) for field-shaped dictionaries.
    fn fallback_field_scan(&mut self, candidates: &mut Vec<(ObjectId, Vec<u8>)>) {
        let stripped = scan::strip_stream_bodies(&self.raw);
        let base = stripped.as_ptr() as usize;
        for dict in scan::each_dictionary(&stripped) {
            if scan::find_key(dict, "T").is_none() || !looks_like_field(dict) {
                continue;
            }
            let offset = dict.as_ptr() as usize - base;
            let Some(id) = enclosing_object_id(&stripped, offset) else {
                continue;
            };
            if candidates.iter().any(|(cid, _)| cid.number == id.number) {
                continue;
            }
            self.sink
                .warn(&format!("field object {id} recovered by raw scan"));
            candidates.push((id, dict.to_vec()));
        }
    }

    /// Rewrite plan: every live object except exclusions, object-stream
    /// containers and xref streams, with dead references pruned from page
    /// `/Annots` and `/AcroForm/Fields`.
    pub(crate) fn build_rewrite_plan(&mut self, exclude: &HashSet<u32>) -> Result<RewritePlan> {
        let mut plan = RewritePlan::default();
        self.resolver.clear_object_stream_cache();

        let mut objects: Vec<(ObjectId, Vec<u8>)> = Vec::new();
        self.each_current_object(|id, body| {
            if exclude.contains(&id.number) {
                return;
            }
            match scan::name_value(body, "Type").as_deref() {
                // Containers are re-emitted as their standalone members;
                // the classic table we write replaces any xref stream.
                Some("ObjStm") | Some("XRef") => return,
                _ => {}
            }
            objects.push((id, body.to_vec()));
        });

        let live: HashSet<u32> = objects.iter().map(|(id, _)| id.number).collect();

        // Prune references to dropped or dangling objects from every page
        // /Annots and every /Fields array, inline or indirect.
        let sink = self.sink();
        let mut indirect_arrays: Vec<u32> = Vec::new();
        for (_, body) in &mut objects {
            let is_page = scan::is_page(body);
            let holds_fields = scan::find_key(body, "Fields").is_some();
            if is_page {
                prune_refs_under_key(body, "Annots", &live, &mut indirect_arrays, &*sink);
            } else if holds_fields {
                prune_refs_under_key(body, "Fields", &live, &mut indirect_arrays, &*sink);
            }
        }
        for array_number in indirect_arrays {
            if let Some((_, body)) = objects.iter_mut().find(|(id, _)| id.number == array_number) {
                let dead: Vec<ObjectId> = scan::refs_in_array(body)
                    .into_iter()
                    .filter(|id| !live.contains(&id.number))
                    .collect();
                for id in dead {
                    *body = scan::remove_ref_from_array(body, id);
                }
            }
        }

        for (id, body) in objects {
            plan.objects.insert(id.number, (id.generation, body));
        }

        let root = self.resolver.root_id();
        if !plan.objects.contains_key(&root.number) {
            return Err(FormError::MalformedDocument(
                "catalog missing from rewrite set".to_string(),
            ));
        }
        plan.root = Some(root);
        plan.info = self
            .resolver
            .info_id()
            .filter(|info| plan.objects.contains_key(&info.number));
        Ok(plan)
    }

    /// Freeze new bytes: clear caches, rebuild the resolver, drop patches.
    pub(crate) fn replace_bytes(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.resolver.clear_object_stream_cache();
        let raw: Arc<[u8]> = bytes.into();
        self.resolver = Resolver::new(Arc::clone(&raw), &self.options, &*self.sink)?;
        self.raw = raw;
        self.patches.clear();
        self.next_number = 0;
        Ok(())
    }

    fn inherited_boxes(
        &mut self,
        body: &[u8],
        cache: &mut HashMap<u32, PageBoxes>,
    ) -> PageBoxes {
        let mut boxes = PageBoxes::default();
        let mut parent = scan::ref_value(body, "Parent");
        let mut hops = 0;
        while let Some(id) = parent {
            if hops > 64 {
                break; // defend against a cyclic tree
            }
            hops += 1;
            if let Some(cached) = cache.get(&id.number) {
                boxes.media = boxes.media.or(cached.media);
                boxes.crop = boxes.crop.or(cached.crop);
                break;
            }
            let Some(node) = self.current_body(id) else {
                break;
            };
            let node_boxes = PageBoxes {
                media: scan::parse_box(&node, "MediaBox"),
                crop: scan::parse_box(&node, "CropBox"),
                ..Default::default()
            };
            cache.insert(id.number, node_boxes);
            boxes.media = boxes.media.or(node_boxes.media);
            boxes.crop = boxes.crop.or(node_boxes.crop);
            if boxes.media.is_some() && boxes.crop.is_some() {
                break;
            }
            parent = scan::ref_value(&node, "Parent");
        }
        boxes
    }
}

/// Field candidate test: a `/T` holder with any of `/FT`, widget subtype,
/// `/Kids` or `/Parent`.
fn looks_like_field(body: &[u8]) -> bool {
    scan::find_key(body, "FT").is_some()
        || scan::is_widget(body)
        || scan::find_key(body, "Kids").is_some()
        || scan::find_key(body, "Parent").is_some()
}

/// Decode a `/V` token: names and strings become text, scalars pass
/// through, structured values read as absent.
fn decode_value_token(token: &[u8]) -> Option<String> {
    match token.first()? {
        b'/' => scan::decode_pdf_name(token),
        b'(' => scan::decode_pdf_string(token),
        b'<' if token.get(1) == Some(&b'<') => None,
        b'<' => scan::decode_pdf_string(token),
        b'[' => None,
        _ => {
            let text = std::str::from_utf8(token).ok()?.trim().to_string();
            (!text.is_empty()).then_some(text)
        }
    }
}

/// Walk backward from `pos` to the `N G obj` header of the enclosing
/// object.
fn enclosing_object_id(data: &[u8], pos: usize) -> Option<ObjectId> {
    let upto = &data[..pos];
    let mut from = scan::rfind_bytes(upto, b"obj")?;
    loop {
        // Require the keyword, preceded by generation and object numbers.
        let mut cursor = from;
        let ok = (|| {
            while cursor > 0 && scan::is_ws(data[cursor - 1]) {
                cursor -= 1;
            }
            let gen_end = cursor;
            while cursor > 0 && data[cursor - 1].is_ascii_digit() {
                cursor -= 1;
            }
            let gen_start = cursor;
            if gen_start == gen_end {
                return None;
            }
            while cursor > 0 && scan::is_ws(data[cursor - 1]) {
                cursor -= 1;
            }
            let num_end = cursor;
            while cursor > 0 && data[cursor - 1].is_ascii_digit() {
                cursor -= 1;
            }
            let num_start = cursor;
            if num_start == num_end {
                return None;
            }
            let number: u32 = std::str::from_utf8(&data[num_start..num_end]).ok()?.parse().ok()?;
            let generation: u16 =
                std::str::from_utf8(&data[gen_start..gen_end]).ok()?.parse().ok()?;
            Some(ObjectId::new(number, generation))
        })();
        if let Some(id) = ok {
            return Some(id);
        }
        if from == 0 {
            return None;
        }
        from = scan::rfind_bytes(&data[..from], b"obj")?;
    }
}

fn prune_refs_under_key(
    body: &mut Vec<u8>,
    key: &str,
    live: &HashSet<u32>,
    indirect_arrays: &mut Vec<u32>,
    sink: &dyn DiagnosticSink,
) {
    let Some(token) = scan::value_token(body, key) else {
        return;
    };
    if token.first() == Some(&b'[') {
        let dead: Vec<ObjectId> = scan::refs_in_array(token)
            .into_iter()
            .filter(|id| !live.contains(&id.number))
            .collect();
        let mut patched = body.clone();
        for id in dead {
            patched = scan::remove_ref_from_inline_array(&patched, key, id, sink);
        }
        *body = patched;
    } else if let Some(array_id) = scan::parse_ref_token(token) {
        if live.contains(&array_id.number) {
            // The array object itself is pruned in a second pass.
            indirect_arrays.push(array_id.number);
        }
    }
}
