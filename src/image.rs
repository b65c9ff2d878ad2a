//! Image sniffing and decoding for signature appearances
//!
//! JPEG is passed through to the PDF untouched (`/DCTDecode`); only the
//! frame header is scanned for dimensions. PNG is decoded to raw RGB rows —
//! baseline 8-bit gray, RGB, palette and alpha variants — with the alpha
//! channel split out for a `/SMask` when any pixel is not fully opaque.

use crate::error::{FormError, Result};
use crate::parser::filters;

/// Sniffed payload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

/// Identify a payload by magic bytes.
pub fn sniff_format(data: &[u8]) -> Option<ImageFormat> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageFormat::Jpeg)
    } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some(ImageFormat::Png)
    } else {
        None
    }
}

/// Scan JPEG markers for the SOF0/SOF1/SOF2 frame header and return
/// `(width, height)`.
pub fn jpeg_dimensions(data: &[u8]) -> Result<(u32, u32)> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return Err(FormError::AppearanceDecodeFailure(
            "not a JPEG payload".to_string(),
        ));
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            return Err(FormError::AppearanceDecodeFailure(
                "invalid JPEG marker".to_string(),
            ));
        }
        let marker = data[pos + 1];
        pos += 2;

        // Padding bytes before a marker
        if marker == 0xFF {
            pos -= 1;
            continue;
        }

        match marker {
            // SOF0 (baseline), SOF1 (extended sequential), SOF2 (progressive)
            0xC0 | 0xC1 | 0xC2 => {
                if pos + 7 > data.len() {
                    return Err(FormError::AppearanceDecodeFailure(
                        "truncated JPEG frame header".to_string(),
                    ));
                }
                let height = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as u32;
                let width = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
                if width == 0 || height == 0 {
                    return Err(FormError::AppearanceDecodeFailure(
                        "JPEG frame has zero dimension".to_string(),
                    ));
                }
                return Ok((width, height));
            }
            // Standalone markers without a length field
            0xD8 | 0x01 | 0xD0..=0xD7 => {}
            0xD9 => break, // EOI before any frame header
            _ => {
                if pos + 1 >= data.len() {
                    break;
                }
                let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
                if length < 2 {
                    return Err(FormError::AppearanceDecodeFailure(
                        "bad JPEG segment length".to_string(),
                    ));
                }
                pos += length;
            }
        }
    }
    Err(FormError::AppearanceDecodeFailure(
        "no JPEG frame header found".to_string(),
    ))
}

/// A PNG decoded to raw 8-bit RGB rows.
#[derive(Debug)]
pub struct DecodedPng {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    /// Per-pixel alpha, present only when some pixel is not fully opaque.
    pub alpha: Option<Vec<u8>>,
}

/// Decode a baseline PNG: 8-bit depth, color types 0 (gray), 2 (RGB),
/// 3 (palette), 4 (gray+alpha) and 6 (RGBA), no interlacing.
pub fn decode_png(data: &[u8]) -> Result<DecodedPng> {
    const SIGNATURE_LEN: usize = 8;
    const IHDR_LEN: usize = 13;
    if data.len() < SIGNATURE_LEN + 8 + IHDR_LEN {
        return Err(FormError::AppearanceDecodeFailure(
            "PNG shorter than IHDR".to_string(),
        ));
    }
    if sniff_format(data) != Some(ImageFormat::Png) {
        return Err(FormError::AppearanceDecodeFailure(
            "not a PNG payload".to_string(),
        ));
    }

    let mut width = 0u32;
    let mut height = 0u32;
    let mut bit_depth = 0u8;
    let mut color_type = 0u8;
    let mut palette: Vec<[u8; 3]> = Vec::new();
    let mut trns: Vec<u8> = Vec::new();
    let mut idat: Vec<u8> = Vec::new();

    let mut pos = SIGNATURE_LEN;
    while pos + 8 <= data.len() {
        let length = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
            as usize;
        let kind = &data[pos + 4..pos + 8];
        let body_start = pos + 8;
        let body_end = body_start + length;
        if body_end + 4 > data.len() {
            return Err(FormError::AppearanceDecodeFailure(
                "truncated PNG chunk".to_string(),
            ));
        }
        let body = &data[body_start..body_end];
        match kind {
            b"IHDR" => {
                if length < IHDR_LEN {
                    return Err(FormError::AppearanceDecodeFailure(
                        "short IHDR chunk".to_string(),
                    ));
                }
                width = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                height = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
                bit_depth = body[8];
                color_type = body[9];
                let interlace = body[12];
                if bit_depth != 8 {
                    return Err(FormError::AppearanceDecodeFailure(format!(
                        "unsupported PNG bit depth {bit_depth}"
                    )));
                }
                if interlace != 0 {
                    return Err(FormError::AppearanceDecodeFailure(
                        "interlaced PNG not supported".to_string(),
                    ));
                }
            }
            b"PLTE" => {
                palette = body.chunks(3).filter(|c| c.len() == 3).map(|c| [c[0], c[1], c[2]]).collect();
            }
            b"tRNS" => trns = body.to_vec(),
            b"IDAT" => idat.extend_from_slice(body),
            b"IEND" => break,
            _ => {}
        }
        pos = body_end + 4; // skip CRC
    }

    if width == 0 || height == 0 || idat.is_empty() {
        return Err(FormError::AppearanceDecodeFailure(
            "PNG missing IHDR or IDAT".to_string(),
        ));
    }

    let channels: usize = match color_type {
        0 => 1, // gray
        2 => 3, // RGB
        3 => 1, // palette index
        4 => 2, // gray + alpha
        6 => 4, // RGBA
        other => {
            return Err(FormError::AppearanceDecodeFailure(format!(
                "unsupported PNG color type {other}"
            )))
        }
    };

    let raw = filters::flate_decode(&idat)
        .map_err(|e| FormError::AppearanceDecodeFailure(format!("PNG inflate failed: {e}")))?;
    let unfiltered =
        filters::undo_png_predictor(&raw, channels, 8, width as usize).map_err(|e| {
            FormError::AppearanceDecodeFailure(format!("PNG unfilter failed: {e}"))
        })?;

    let row_len = width as usize * channels;
    let expected = row_len * height as usize;
    if unfiltered.len() < expected {
        return Err(FormError::AppearanceDecodeFailure(
            "PNG pixel data truncated".to_string(),
        ));
    }

    let pixel_count = width as usize * height as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);
    for row in 0..height as usize {
        let line = &unfiltered[row * row_len..(row + 1) * row_len];
        for px in line.chunks(channels) {
            match color_type {
                0 => {
                    rgb.extend_from_slice(&[px[0], px[0], px[0]]);
                    alpha.push(255);
                }
                2 => {
                    rgb.extend_from_slice(&[px[0], px[1], px[2]]);
                    alpha.push(255);
                }
                3 => {
                    let index = px[0] as usize;
                    let entry = palette.get(index).ok_or_else(|| {
                        FormError::AppearanceDecodeFailure(format!(
                            "palette index {index} out of range"
                        ))
                    })?;
                    rgb.extend_from_slice(entry);
                    alpha.push(trns.get(index).copied().unwrap_or(255));
                }
                4 => {
                    rgb.extend_from_slice(&[px[0], px[0], px[0]]);
                    alpha.push(px[1]);
                }
                6 => {
                    rgb.extend_from_slice(&[px[0], px[1], px[2]]);
                    alpha.push(px[3]);
                }
                _ => unreachable!(),
            }
        }
    }

    let alpha = if alpha.iter().any(|&a| a < 255) {
        Some(alpha)
    } else {
        None
    };

    Ok(DecodedPng {
        width,
        height,
        rgb,
        alpha,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal PNG in memory: correct chunk framing, zlib IDAT.
    pub(crate) fn build_png(
        width: u32,
        height: u32,
        color_type: u8,
        pixels: &[u8],
        palette: Option<&[u8]>,
        trns: Option<&[u8]>,
    ) -> Vec<u8> {
        fn chunk(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
            let mut out = Vec::with_capacity(body.len() + 12);
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(kind);
            out.extend_from_slice(body);
            // CRC is unchecked by the decoder
            out.extend_from_slice(&[0, 0, 0, 0]);
            out
        }

        let channels: usize = match color_type {
            0 | 3 => 1,
            2 => 3,
            4 => 2,
            6 => 4,
            _ => panic!("bad color type"),
        };
        let row_len = width as usize * channels;
        let mut filtered = Vec::new();
        for row in pixels.chunks(row_len) {
            filtered.push(0u8); // filter type None
            filtered.extend_from_slice(row);
        }

        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&width.to_be_bytes());
        ihdr.extend_from_slice(&height.to_be_bytes());
        ihdr.extend_from_slice(&[8, color_type, 0, 0, 0]);

        let mut out = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        out.extend_from_slice(&chunk(b"IHDR", &ihdr));
        if let Some(plte) = palette {
            out.extend_from_slice(&chunk(b"PLTE", plte));
        }
        if let Some(t) = trns {
            out.extend_from_slice(&chunk(b"tRNS", t));
        }
        out.extend_from_slice(&chunk(b"IDAT", &filters::flate_encode(&filtered)));
        out.extend_from_slice(&chunk(b"IEND", &[]));
        out
    }

    #[test]
    fn test_sniff_formats() {
        assert_eq!(sniff_format(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        let png = build_png(1, 1, 2, &[1, 2, 3], None, None);
        assert_eq!(sniff_format(&png), Some(ImageFormat::Png));
        assert_eq!(sniff_format(b"GIF89a"), None);
    }

    #[test]
    fn test_jpeg_dimensions_sof0() {
        // SOI, APP0 (16 bytes), SOF0 with height 10 width 20
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        jpeg.extend_from_slice(&[0u8; 14]);
        jpeg.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x0A, 0x00, 0x14, 0x03]);
        let (width, height) = jpeg_dimensions(&jpeg).unwrap();
        assert_eq!((width, height), (20, 10));
    }

    #[test]
    fn test_jpeg_progressive_sof2() {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[0xFF, 0xC2, 0x00, 0x11, 0x08, 0x01, 0x00, 0x02, 0x00, 0x03]);
        let (width, height) = jpeg_dimensions(&jpeg).unwrap();
        assert_eq!((width, height), (512, 256));
    }

    #[test]
    fn test_jpeg_without_frame_is_error() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xD9];
        assert!(jpeg_dimensions(&jpeg).is_err());
    }

    #[test]
    fn test_decode_rgb_png() {
        let pixels = [255, 0, 0, 0, 255, 0, 0, 0, 255, 10, 20, 30];
        let png = build_png(2, 2, 2, &pixels, None, None);
        let decoded = decode_png(&png).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 2));
        assert_eq!(decoded.rgb, pixels);
        assert!(decoded.alpha.is_none());
    }

    #[test]
    fn test_decode_rgba_png_splits_alpha() {
        let pixels = [255, 0, 0, 255, 0, 255, 0, 128];
        let png = build_png(2, 1, 6, &pixels, None, None);
        let decoded = decode_png(&png).unwrap();
        assert_eq!(decoded.rgb, vec![255, 0, 0, 0, 255, 0]);
        assert_eq!(decoded.alpha.unwrap(), vec![255, 128]);
    }

    #[test]
    fn test_decode_opaque_rgba_has_no_mask() {
        let pixels = [1, 2, 3, 255, 4, 5, 6, 255];
        let png = build_png(2, 1, 6, &pixels, None, None);
        let decoded = decode_png(&png).unwrap();
        assert!(decoded.alpha.is_none());
    }

    #[test]
    fn test_decode_palette_png_with_transparency() {
        let palette = [255, 0, 0, 0, 0, 255];
        let trns = [255u8, 0];
        let pixels = [0u8, 1];
        let png = build_png(2, 1, 3, &pixels, Some(&palette), Some(&trns));
        let decoded = decode_png(&png).unwrap();
        assert_eq!(decoded.rgb, vec![255, 0, 0, 0, 0, 255]);
        assert_eq!(decoded.alpha.unwrap(), vec![255, 0]);
    }

    #[test]
    fn test_decode_gray_png() {
        let png = build_png(2, 1, 0, &[0, 200], None, None);
        let decoded = decode_png(&png).unwrap();
        assert_eq!(decoded.rgb, vec![0, 0, 0, 200, 200, 200]);
    }

    #[test]
    fn test_short_png_raises() {
        match decode_png(&[0x89, 0x50, 0x4E, 0x47]) {
            Err(FormError::AppearanceDecodeFailure(msg)) => {
                assert!(msg.contains("IHDR"), "{msg}");
            }
            other => panic!("expected AppearanceDecodeFailure, got {other:?}"),
        }
    }
}
