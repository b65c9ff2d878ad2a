//! # oxidize-forms
//!
//! An in-memory editor for the interactive-form (AcroForm) subsystem of
//! PDF. Given a complete document, it enumerates form fields, adds fields
//! with widget annotations, updates values (with value-to-appearance
//! binding for check boxes, radio buttons and signature images), renames
//! and removes fields, and serializes either as an incremental update —
//! the original bytes preserved verbatim — or as a rewritten
//! single-revision document.
//!
//! The object layer underneath is byte-precise: classic xref tables, xref
//! streams and compressed object streams are resolved to raw body slices,
//! and every mutation is a positional edit on a dictionary fragment. The
//! document is never reparsed into an object tree and unrelated bytes are
//! never reformatted.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use oxidize_forms::{AddFieldOptions, Document, FieldValue, Result};
//!
//! fn main() -> Result<()> {
//!     let mut doc = Document::open("form.pdf")?;
//!
//!     for field in doc.list_fields() {
//!         println!("{}: {:?}", field.name(), field.value());
//!     }
//!
//!     let _ = doc.add_field(
//!         "Name",
//!         AddFieldOptions {
//!             value: Some(FieldValue::Text("John Doe".into())),
//!             x: 100.0,
//!             y: 500.0,
//!             width: 200.0,
//!             height: 20.0,
//!             ..Default::default()
//!         },
//!     )?;
//!     doc.update_field("Agree", true);
//!
//!     doc.write_to("filled.pdf", false)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Serialization modes
//!
//! - [`Document::write`] appends an incremental update; prior revisions
//!   survive byte-identical.
//! - [`Document::flatten`] re-emits a single revision.
//! - [`Document::clear`] re-emits with only a chosen subset of fields.
//!
//! A `Document` is single-threaded; after a `write` the frozen buffer and
//! resolver are safe to share read-only.

pub mod diagnostics;
pub mod document;
pub mod error;
pub mod forms;
pub mod image;
pub mod parser;
pub mod scan;
pub mod writer;

pub use diagnostics::{DiagnosticSink, LogSink, NullSink, RecordingSink};
pub use document::{Document, Page, PageBoxes};
pub use error::{FormError, Result};
pub use forms::{
    AddFieldOptions, Field, FieldFlags, FieldKind, FieldPosition, FieldSelector, FieldType,
    FieldValue,
};
pub use parser::{ObjectId, ParseOptions};
