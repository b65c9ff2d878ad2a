//! Appearance-stream synthesis
//!
//! Two producers: the check-mark pair attached to new check boxes, and the
//! image appearance bound to signature fields whose value carries a JPEG or
//! PNG payload (raw base64 or a `data:` URI).

use crate::document::Document;
use crate::error::Result;
use crate::image::{self, ImageFormat};
use crate::parser::filters;
use crate::parser::ObjectId;
use crate::scan::{self, format_real};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Build the `/Yes` and `/Off` form XObjects for a check box of the given
/// size. `/Yes` draws a three-vertex check scaled to the rectangle; `/Off`
/// is an empty stream.
pub(crate) fn checkbox_appearance(
    doc: &mut Document,
    width: f64,
    height: f64,
) -> (ObjectId, ObjectId) {
    let check = format!(
        "{} {} m\n{} {} l\n{} {} l\nS",
        format_real(width * 0.20),
        format_real(height * 0.55),
        format_real(width * 0.45),
        format_real(height * 0.25),
        format_real(width * 0.80),
        format_real(height * 0.80),
    );
    let yes = doc.alloc_id();
    doc.push_patch(yes, form_xobject(check.as_bytes(), width, height, None));
    let off = doc.alloc_id();
    doc.push_patch(off, form_xobject(b"", width, height, None));
    (yes, off)
}

/// Wrap a content stream as a Form XObject body.
fn form_xobject(content: &[u8], width: f64, height: f64, resources: Option<&str>) -> Vec<u8> {
    let mut dict = format!(
        "<< /Type /XObject /Subtype /Form /BBox [0 0 {} {}]",
        format_real(width),
        format_real(height)
    );
    if let Some(resources) = resources {
        dict.push_str(" /Resources ");
        dict.push_str(resources);
    }
    dict.push_str(&format!(" /Length {} >>", content.len()));
    let mut out = dict.into_bytes();
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(content);
    out.extend_from_slice(b"\nendstream");
    out
}

/// Decode a signature value into image bytes: strips a
/// `data:image/…;base64,` prefix, forgives whitespace, and only accepts
/// payloads whose magic bytes identify a JPEG or PNG.
pub(crate) fn decode_image_payload(value: &str) -> Option<Vec<u8>> {
    let body = match value.strip_prefix("data:") {
        Some(rest) => rest.split_once("base64,")?.1,
        None => value,
    };
    if body.len() < 16 {
        return None;
    }
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = BASE64.decode(compact.as_bytes()).ok()?;
    image::sniff_format(&decoded)?;
    Some(decoded)
}

/// Build the image appearance for a signature widget and attach it via
/// `/AP /N`. The image keeps its aspect ratio, scaled to fit the widget
/// rectangle and centered.
pub(crate) fn apply_signature_appearance(
    doc: &mut Document,
    widget_id: ObjectId,
    widget_body: &[u8],
    payload: &[u8],
) -> Result<()> {
    let rect = scan::parse_box(widget_body, "Rect").unwrap_or([0.0, 0.0, 200.0, 50.0]);
    let field_w = (rect[2] - rect[0]).abs().max(1.0);
    let field_h = (rect[3] - rect[1]).abs().max(1.0);

    let image_id = doc.alloc_id();
    let (img_w, img_h) = match image::sniff_format(payload) {
        Some(ImageFormat::Jpeg) => {
            let (w, h) = image::jpeg_dimensions(payload)?;
            doc.push_patch(image_id, jpeg_xobject(payload, w, h));
            (w, h)
        }
        Some(ImageFormat::Png) => {
            let decoded = image::decode_png(payload)?;
            let smask_id = decoded.alpha.as_ref().map(|alpha| {
                let id = doc.alloc_id();
                doc.push_patch(
                    id,
                    gray_xobject(alpha, decoded.width, decoded.height),
                );
                id
            });
            doc.push_patch(
                image_id,
                rgb_xobject(&decoded.rgb, decoded.width, decoded.height, smask_id),
            );
            (decoded.width, decoded.height)
        }
        None => {
            return Err(crate::error::FormError::AppearanceDecodeFailure(
                "payload is neither JPEG nor PNG".to_string(),
            ))
        }
    };

    let scale = (field_w / img_w as f64).min(field_h / img_h as f64);
    let scaled_w = img_w as f64 * scale;
    let scaled_h = img_h as f64 * scale;
    let tx = (field_w - scaled_w) / 2.0;
    let ty = (field_h - scaled_h) / 2.0;

    let content = format!(
        "q\n1 0 0 1 {} {} cm\n{} 0 0 {} 0 0 cm\n/Im1 Do\nQ",
        format_real(tx),
        format_real(ty),
        format_real(scaled_w),
        format_real(scaled_h),
    );
    let resources = format!("<< /XObject << /Im1 {} >> >>", image_id.to_ref_token());
    let form_id = doc.alloc_id();
    doc.push_patch(
        form_id,
        form_xobject(content.as_bytes(), field_w, field_h, Some(&resources)),
    );

    let sink = doc.sink();
    let ap = format!("<< /N {} >>", form_id.to_ref_token());
    let patched = scan::upsert_key_value(widget_body, "AP", ap.as_bytes(), &*sink);
    doc.push_patch(widget_id, patched);
    Ok(())
}

fn jpeg_xobject(payload: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut out = format!(
        "<< /Type /XObject /Subtype /Image /Width {width} /Height {height} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>",
        payload.len()
    )
    .into_bytes();
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\nendstream");
    out
}

fn rgb_xobject(rgb: &[u8], width: u32, height: u32, smask: Option<ObjectId>) -> Vec<u8> {
    let compressed = filters::flate_encode(rgb);
    let mut dict = format!(
        "<< /Type /XObject /Subtype /Image /Width {width} /Height {height} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /FlateDecode"
    );
    if let Some(smask) = smask {
        dict.push_str(&format!(" /SMask {}", smask.to_ref_token()));
    }
    dict.push_str(&format!(" /Length {} >>", compressed.len()));
    let mut out = dict.into_bytes();
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(&compressed);
    out.extend_from_slice(b"\nendstream");
    out
}

fn gray_xobject(gray: &[u8], width: u32, height: u32) -> Vec<u8> {
    let compressed = filters::flate_encode(gray);
    let mut out = format!(
        "<< /Type /XObject /Subtype /Image /Width {width} /Height {height} /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /FlateDecode /Length {} >>",
        compressed.len()
    )
    .into_bytes();
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(&compressed);
    out.extend_from_slice(b"\nendstream");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_uri_payload() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let uri = format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg));
        assert_eq!(decode_image_payload(&uri).unwrap(), jpeg);
    }

    #[test]
    fn test_decode_raw_base64_payload() {
        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13, b'I', b'H', b'D', b'R'];
        let encoded = BASE64.encode(png_header);
        assert_eq!(decode_image_payload(&encoded).unwrap(), png_header);
    }

    #[test]
    fn test_rejects_non_image_payloads() {
        assert!(decode_image_payload("John Hancock").is_none());
        assert!(decode_image_payload(&BASE64.encode(b"just some text here ok")).is_none());
        assert!(decode_image_payload("").is_none());
    }

    #[test]
    fn test_form_xobject_shape() {
        let body = form_xobject(b"0 0 m 5 5 l S", 10.0, 20.0, None);
        assert!(body.starts_with(b"<< /Type /XObject /Subtype /Form /BBox [0 0 10 20]"));
        assert!(scan::find_bytes(&body, b"stream\n0 0 m 5 5 l S\nendstream").is_some());
    }
}
