//! Form field model
//!
//! [`Field`] is a snapshot descriptor produced by enumeration — name, value,
//! type, object reference and widget position — not a live view. Mutations
//! go through the owning [`Document`], passed explicitly to the convenience
//! methods.

use crate::document::Document;
use crate::parser::ObjectId;
use bitflags::bitflags;

bitflags! {
    /// Field flags per ISO 32000-1 Table 221 / 226 / 228.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FieldFlags: u32 {
        const READ_ONLY        = 1;
        const REQUIRED         = 1 << 1;
        const NO_EXPORT        = 1 << 2;
        const MULTILINE        = 1 << 12;
        const PASSWORD         = 1 << 13;
        const NO_TOGGLE_TO_OFF = 1 << 14;
        const RADIO            = 1 << 15;
        const PUSHBUTTON       = 1 << 16;
        const COMBO            = 1 << 17;
    }
}

/// The four AcroForm field types, tagged rather than trait-dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Button,
    Choice,
    Signature,
}

impl FieldType {
    /// The `/FT` name without the slash.
    pub fn pdf_name(self) -> &'static str {
        match self {
            FieldType::Text => "Tx",
            FieldType::Button => "Btn",
            FieldType::Choice => "Ch",
            FieldType::Signature => "Sig",
        }
    }

    /// Parse an `/FT` name. An unknown or absent type reads as text.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Btn" => FieldType::Button,
            "Ch" => FieldType::Choice,
            "Sig" => FieldType::Signature,
            _ => FieldType::Text,
        }
    }
}

/// Caller intent for `add_field`, lowered onto [`FieldType`] plus flag bits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldKind {
    #[default]
    Text,
    Button,
    Checkbox,
    Radio,
    Choice,
    Signature,
    /// A raw `/FT` name for callers that know what they are doing.
    Name(String),
}

impl FieldKind {
    pub(crate) fn field_type(&self) -> FieldType {
        match self {
            FieldKind::Text => FieldType::Text,
            FieldKind::Button | FieldKind::Checkbox | FieldKind::Radio => FieldType::Button,
            FieldKind::Choice => FieldType::Choice,
            FieldKind::Signature => FieldType::Signature,
            FieldKind::Name(name) => FieldType::from_name(name),
        }
    }
}

/// A value handed to `add_field`/`update_field`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
}

impl FieldValue {
    /// Button normalization: `true` and `"Yes"` switch on; `false`, `"Off"`,
    /// `"false"` and the empty string switch off.
    pub(crate) fn is_on(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Text(t) => !t.is_empty() && t != "Off" && t != "false",
        }
    }

    pub(crate) fn as_text(&self) -> String {
        match self {
            FieldValue::Text(t) => t.clone(),
            FieldValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// On-page placement of a field's widget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldPosition {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// 1-indexed page number.
    pub page: u32,
}

/// Immutable field descriptor returned by [`Document::list_fields`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) value: Option<String>,
    pub(crate) field_type: FieldType,
    pub(crate) id: ObjectId,
    pub(crate) position: Option<FieldPosition>,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn object_number(&self) -> u32 {
        self.id.number
    }

    pub fn generation(&self) -> u16 {
        self.id.generation
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Whether the descriptor points at a real object.
    pub fn has_valid_ref(&self) -> bool {
        self.id.number > 0
    }

    pub fn x(&self) -> Option<f64> {
        self.position.map(|p| p.x)
    }

    pub fn y(&self) -> Option<f64> {
        self.position.map(|p| p.y)
    }

    pub fn width(&self) -> Option<f64> {
        self.position.map(|p| p.width)
    }

    pub fn height(&self) -> Option<f64> {
        self.position.map(|p| p.height)
    }

    /// 1-indexed page the widget sits on.
    pub fn page(&self) -> Option<u32> {
        self.position.map(|p| p.page)
    }

    pub fn is_text_field(&self) -> bool {
        self.field_type == FieldType::Text
    }

    pub fn is_button_field(&self) -> bool {
        self.field_type == FieldType::Button
    }

    pub fn is_choice_field(&self) -> bool {
        self.field_type == FieldType::Choice
    }

    pub fn is_signature_field(&self) -> bool {
        self.field_type == FieldType::Signature
    }

    /// Update this field's value in `doc`. Returns false when the field no
    /// longer exists there.
    pub fn update(&self, doc: &mut Document, value: impl Into<FieldValue>) -> bool {
        doc.update_field(&self.name, value)
    }

    /// Update and rename in one step.
    pub fn update_renaming(
        &self,
        doc: &mut Document,
        value: impl Into<FieldValue>,
        new_name: &str,
    ) -> bool {
        doc.update_field_named(&self.name, value, Some(new_name))
    }

    /// Remove this field from `doc`.
    pub fn remove(&self, doc: &mut Document) -> bool {
        doc.remove_field(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_names() {
        assert_eq!(FieldType::Text.pdf_name(), "Tx");
        assert_eq!(FieldType::Button.pdf_name(), "Btn");
        assert_eq!(FieldType::Choice.pdf_name(), "Ch");
        assert_eq!(FieldType::Signature.pdf_name(), "Sig");
        assert_eq!(FieldType::from_name("Sig"), FieldType::Signature);
        // Unknown types read as text
        assert_eq!(FieldType::from_name("Nope"), FieldType::Text);
    }

    #[test]
    fn test_field_kind_lowering() {
        assert_eq!(FieldKind::Checkbox.field_type(), FieldType::Button);
        assert_eq!(FieldKind::Radio.field_type(), FieldType::Button);
        assert_eq!(FieldKind::Name("Ch".into()).field_type(), FieldType::Choice);
    }

    #[test]
    fn test_value_normalization() {
        assert!(FieldValue::from(true).is_on());
        assert!(FieldValue::from("Yes").is_on());
        assert!(FieldValue::from("anything").is_on());
        assert!(!FieldValue::from(false).is_on());
        assert!(!FieldValue::from("Off").is_on());
        assert!(!FieldValue::from("").is_on());
    }

    #[test]
    fn test_flags_bits() {
        let radio_group = FieldFlags::RADIO | FieldFlags::NO_TOGGLE_TO_OFF;
        assert_eq!(radio_group.bits(), 49152);
        assert_eq!(FieldFlags::MULTILINE.bits(), 0x1000);
    }

    #[test]
    fn test_field_accessors() {
        let field = Field {
            name: "Name".to_string(),
            value: Some("John".to_string()),
            field_type: FieldType::Text,
            id: ObjectId::new(7, 0),
            position: Some(FieldPosition {
                x: 100.0,
                y: 500.0,
                width: 200.0,
                height: 20.0,
                page: 1,
            }),
        };
        assert_eq!(field.name(), "Name");
        assert_eq!(field.value(), Some("John"));
        assert!(field.is_text_field());
        assert!(field.has_valid_ref());
        assert_eq!(field.object_number(), 7);
        assert_eq!(field.page(), Some(1));
        assert_eq!(field.width(), Some(200.0));
    }
}
