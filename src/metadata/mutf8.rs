//! Modified UTF-8 text codec
//!
//! Metadata strings are stored as a sequence of UTF-16 code units, each
//! written with one to three bytes:
//!
//! ```text
//! U+0001 ..= U+007F           0xxxxxxx
//! U+0000, U+0080 ..= U+07FF   110xxxxx 10xxxxxx
//! U+0800 ..= U+FFFF           1110xxxx 10xxxxxx 10xxxxxx
//! ```
//!
//! NUL never appears as a single zero byte, and characters outside the
//! Basic Multilingual Plane are written as two surrogate code units of three
//! bytes each. This is not interchangeable with standard UTF-8.

use crate::error::{PadError, Result};

/// Number of bytes `s` occupies once encoded
pub fn encoded_len(s: &str) -> usize {
    s.encode_utf16().map(unit_len).sum()
}

fn unit_len(unit: u16) -> usize {
    match unit {
        0x0001..=0x007F => 1,
        0x0000 | 0x0080..=0x07FF => 2,
        _ => 3,
    }
}

/// Encode a string
pub fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(s));
    encode_into(s, &mut out);
    out
}

/// Append the encoding of `s` to `out`
pub fn encode_into(s: &str, out: &mut Vec<u8>) {
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (0x1F & (unit >> 6)) as u8);
                out.push(0x80 | (0x3F & unit) as u8);
            }
            _ => {
                out.push(0xE0 | (0x0F & (unit >> 12)) as u8);
                out.push(0x80 | (0x3F & (unit >> 6)) as u8);
                out.push(0x80 | (0x3F & unit) as u8);
            }
        }
    }
}

/// Decode a complete byte string
///
/// Fails on a truncated group, a continuation byte that is not `10xxxxxx`,
/// a leading byte of the form `1111xxxx` or `10xxxxxx`, and on unpaired
/// surrogates (which cannot be represented in a Rust `String`).
pub fn decode(bytes: &[u8]) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut pos = 0;

    while pos < bytes.len() {
        let a = bytes[pos];

        if a & 0b1000_0000 == 0 {
            units.push(a as u16);
            pos += 1;
        } else if a & 0b1110_0000 == 0b1100_0000 {
            let b = continuation(bytes, pos + 1)?;
            units.push((((a & 0x1F) as u16) << 6) | (b & 0x3F) as u16);
            pos += 2;
        } else if a & 0b1111_0000 == 0b1110_0000 {
            let b = continuation(bytes, pos + 1)?;
            let c = continuation(bytes, pos + 2)?;
            units.push(
                (((a & 0x0F) as u16) << 12) | (((b & 0x3F) as u16) << 6) | (c & 0x3F) as u16,
            );
            pos += 3;
        } else {
            return Err(PadError::CorruptedMetadata(format!(
                "Invalid leading byte 0x{:02X} at position {}",
                a, pos
            )));
        }
    }

    String::from_utf16(&units)
        .map_err(|e| PadError::CorruptedMetadata(format!("Invalid surrogate sequence: {}", e)))
}

fn continuation(bytes: &[u8], pos: usize) -> Result<u8> {
    match bytes.get(pos) {
        Some(&b) if b & 0b1100_0000 == 0b1000_0000 => Ok(b),
        Some(&b) => Err(PadError::CorruptedMetadata(format!(
            "Invalid continuation byte 0x{:02X} at position {}",
            b, pos
        ))),
        None => Err(PadError::CorruptedMetadata(format!(
            "Truncated character at position {}",
            pos
        ))),
    }
}
