//! Stream filters
//!
//! FlateDecode with optional PNG predictor columns (ISO 32000-1 Section
//! 7.4.4), plus the Flate encoder used when emitting new streams. Anything
//! outside `{FlateDecode, DCTDecode passthrough}` is an unsupported filter.

use crate::error::{FormError, Result};
use crate::scan;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Decompress zlib/deflate data.
pub fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| FormError::MalformedDocument(format!("flate decode error: {e}")))?;
    Ok(out)
}

/// Compress data with zlib/deflate.
pub fn flate_encode(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing to a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

/// Decode stream data according to the stream dictionary's `/Filter` and
/// `/DecodeParms`. A missing filter returns the data as-is; `FlateDecode`
/// decompresses and undoes a PNG predictor when `/Predictor >= 10`.
pub fn decode_stream(dict: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let filter = match scan::value_token(dict, "Filter") {
        None => return Ok(data.to_vec()),
        Some(token) => filter_name(token)?,
    };

    match filter.as_deref() {
        None => Ok(data.to_vec()),
        Some("FlateDecode") => {
            let decoded = flate_decode(data)?;
            apply_decode_parms(dict, decoded)
        }
        Some(other) => Err(FormError::UnsupportedFilter(other.to_string())),
    }
}

/// Resolve `/Filter` to a single filter name. An empty array means no
/// filter; a multi-element cascade is unsupported.
fn filter_name(token: &[u8]) -> Result<Option<String>> {
    if token.first() == Some(&b'/') {
        return Ok(scan::decode_pdf_name(token));
    }
    if token.first() == Some(&b'[') {
        let inner = &token[1..token.len().saturating_sub(1)];
        let names: Vec<&str> = std::str::from_utf8(inner)
            .unwrap_or("")
            .split_ascii_whitespace()
            .collect();
        return match names.len() {
            0 => Ok(None),
            1 => Ok(Some(names[0].trim_start_matches('/').to_string())),
            _ => Err(FormError::UnsupportedFilter(format!(
                "filter cascade {}",
                names.join(" ")
            ))),
        };
    }
    Err(FormError::UnsupportedFilter(
        String::from_utf8_lossy(token).into_owned(),
    ))
}

fn apply_decode_parms(dict: &[u8], data: Vec<u8>) -> Result<Vec<u8>> {
    let Some(parms) = scan::value_full_token(dict, "DecodeParms")
        .or_else(|| scan::value_full_token(dict, "DP"))
    else {
        return Ok(data);
    };
    let predictor = scan::int_value(parms, "Predictor").unwrap_or(1);
    match predictor {
        1 => Ok(data),
        p if p >= 10 => {
            let colors = scan::int_value(parms, "Colors").unwrap_or(1) as usize;
            let bpc = scan::int_value(parms, "BitsPerComponent").unwrap_or(8) as usize;
            let columns = scan::int_value(parms, "Columns").unwrap_or(1) as usize;
            undo_png_predictor(&data, colors, bpc, columns)
        }
        p => Err(FormError::UnsupportedFilter(format!("predictor {p}"))),
    }
}

/// Undo per-row PNG filtering (predictors 10-15). Each row is prefixed with
/// a filter-type byte; rows are `columns * colors * bpc/8` bytes wide.
pub fn undo_png_predictor(
    data: &[u8],
    colors: usize,
    bits_per_component: usize,
    columns: usize,
) -> Result<Vec<u8>> {
    let bpp = (colors * bits_per_component).div_ceil(8).max(1);
    let row_len = (columns * colors * bits_per_component).div_ceil(8);
    if row_len == 0 {
        return Err(FormError::MalformedDocument(
            "predictor row length is zero".to_string(),
        ));
    }
    let stride = row_len + 1;
    let rows = data.len() / stride;
    let mut out = Vec::with_capacity(rows * row_len);
    let mut prev_row = vec![0u8; row_len];

    for chunk in data.chunks(stride) {
        if chunk.len() < stride {
            break; // trailing partial row
        }
        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();
        match filter_type {
            0 => {}
            1 => {
                for i in bpp..row_len {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_len {
                    row[i] = row[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                    let up = prev_row[i] as u16;
                    row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let up = prev_row[i];
                    let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    row[i] = row[i].wrapping_add(paeth(left, up, up_left));
                }
            }
            other => {
                return Err(FormError::MalformedDocument(format!(
                    "unknown PNG filter type {other}"
                )))
            }
        }
        out.extend_from_slice(&row);
        prev_row = row;
    }
    Ok(out)
}

/// Paeth predictor function from the PNG specification.
pub(crate) fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = left as i16 + up as i16 - up_left as i16;
    let pa = (p - left as i16).abs();
    let pb = (p - up as i16).abs();
    let pc = (p - up_left as i16).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flate_round_trip() {
        let original = b"BT /Helv 12 Tf (Hello) Tj ET".repeat(10);
        let compressed = flate_encode(&original);
        assert!(compressed.len() < original.len());
        assert_eq!(flate_decode(&compressed).unwrap(), original);
    }

    #[test]
    fn test_decode_stream_no_filter() {
        let dict = b"<< /Length 4 >>";
        assert_eq!(decode_stream(dict, b"data").unwrap(), b"data");
    }

    #[test]
    fn test_decode_stream_flate() {
        let payload = b"0 1 r 0 2 r";
        let compressed = flate_encode(payload);
        let dict = b"<< /Filter /FlateDecode >>";
        assert_eq!(decode_stream(dict, &compressed).unwrap(), payload);
    }

    #[test]
    fn test_decode_stream_array_filter() {
        let payload = b"xyz";
        let compressed = flate_encode(payload);
        let dict = b"<< /Filter [/FlateDecode] >>";
        assert_eq!(decode_stream(dict, &compressed).unwrap(), payload);
    }

    #[test]
    fn test_unsupported_filter_raises() {
        let dict = b"<< /Filter /JPXDecode >>";
        match decode_stream(dict, b"") {
            Err(FormError::UnsupportedFilter(name)) => assert_eq!(name, "JPXDecode"),
            other => panic!("expected UnsupportedFilter, got {other:?}"),
        }
    }

    #[test]
    fn test_png_predictor_up_rows() {
        // Two rows of 4 bytes, filter type 2 (Up): second row adds the first.
        let filtered = [2u8, 1, 2, 3, 4, 2, 1, 1, 1, 1];
        let out = undo_png_predictor(&filtered, 1, 8, 4).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 2, 3, 4, 5]);
    }

    #[test]
    fn test_png_predictor_sub_row() {
        let filtered = [1u8, 10, 5, 5, 5];
        let out = undo_png_predictor(&filtered, 1, 8, 4).unwrap();
        assert_eq!(out, vec![10, 15, 20, 25]);
    }

    #[test]
    fn test_predictor_12_stream() {
        // Predictor 12 = PNG Up, the common case for xref streams.
        let rows: Vec<u8> = vec![
            vec![2u8, 1, 0, 10, 0],
            vec![2u8, 0, 0, 10, 0], // delta row: decodes to 1 0 20 0
        ]
        .concat();
        let compressed = flate_encode(&rows);
        let dict = b"<< /Filter /FlateDecode /DecodeParms << /Predictor 12 /Columns 4 >> >>";
        let out = decode_stream(dict, &compressed).unwrap();
        assert_eq!(out, vec![1, 0, 10, 0, 1, 0, 20, 0]);
    }

    #[test]
    fn test_paeth_prefers_closest() {
        assert_eq!(paeth(1, 10, 10), 1);
        assert_eq!(paeth(10, 1, 10), 1);
    }
}
