// SPDX-License-Identifier: LGPL-3.0-only

//! Byte-slice helpers shared by the binary and textual protocols.

use std::fmt;
use std::ops::Deref;

/// Wrapper for a slice of bytes that prints as an escaped string.
///
/// Server replies are raw bytes and may contain anything; this keeps log
/// records single-line and readable.
///
/// # Examples
///
/// ```rust
/// # use hlds_protocol::types::Str;
/// let s = format!("{}", Str(b"\xff\xffrcon\n"));
/// assert_eq!(s, "\\xff\\xffrcon\\n");
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Str<T>(pub T);

impl<T> fmt::Debug for Str<T>
where
    T: AsRef<[u8]>,
{
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "\"{}\"", self)
    }
}

impl<T> fmt::Display for Str<T>
where
    T: AsRef<[u8]>,
{
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        for &c in self.0.as_ref() {
            match c {
                b'\n' => write!(fmt, "\\n")?,
                b'\t' => write!(fmt, "\\t")?,
                b'\\' => write!(fmt, "\\\\")?,
                _ if c.is_ascii_graphic() || c == b' ' => {
                    write!(fmt, "{}", c as char)?;
                }
                _ => write!(fmt, "\\x{:02x}", c)?,
            }
        }
        Ok(())
    }
}

impl<T> Deref for Str<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Decodes wire text as one char per byte.
///
/// Game servers predate any notion of encodings; strings on the wire are
/// single-byte and the widening to `char` is lossless either way. UTF-8
/// decoding is deliberately not attempted here.
pub fn decode_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Inverse of [`decode_text`]; chars above `U+00FF` become `b'?'`.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u32::from(c).try_into().unwrap_or(b'?'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_byte_round_trip() {
        let raw: Vec<u8> = (0..=255).collect();
        assert_eq!(encode_text(&decode_text(&raw)), raw);
    }

    #[test]
    fn encode_replaces_wide_chars() {
        assert_eq!(encode_text("a\u{30C4}b"), b"a?b");
    }
}
