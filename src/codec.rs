use thiserror::Error;

/// How a byte range inside the image encodes its text.
///
/// The encoding decides the default pad byte and which bytes around the
/// slot are off-limits. The codec never touches those surrounding bytes;
/// it only produces a replacement of exactly the slot length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Opaque bytes (machine code, resource tables). No charset rules.
    RawBytes,
    /// C-style string. The terminator lives one byte past the slot and is
    /// never rewritten, so the pad must stay visible text: padding with
    /// `0x00` would truncate display inside the slot.
    NullTerminated,
    /// Pascal-style string. The count byte immediately before the slot is
    /// never rewritten, so trailing pad bytes are rendered as part of the
    /// string; space is the only pad that reads as blank.
    LengthPrefixed,
}

impl Encoding {
    /// Default pad byte: space for visible text, null for raw patches.
    pub fn default_pad(&self) -> u8 {
        match self {
            Encoding::RawBytes => 0x00,
            Encoding::NullTerminated | Encoding::LengthPrefixed => b' ',
        }
    }

    /// Whether replacements must pass the printable-ASCII charset check.
    pub fn is_text(&self) -> bool {
        !matches!(self, Encoding::RawBytes)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("replacement is {len} bytes but the slot holds only {slot_len}")]
    TooLong { len: usize, slot_len: usize },

    #[error("byte 0x{byte:02X} at index {index} is outside printable ASCII (0x20-0x7E)")]
    NonPrintable { byte: u8, index: usize },
}

/// Reject any byte outside printable 7-bit ASCII.
///
/// The target format has no codepage or multi-byte support; accented
/// characters must be transliterated by the patch author ("ae" for a-e
/// ligatures and so on), not smuggled in as extended bytes.
pub fn charset_check(text: &str) -> Result<(), CodecError> {
    for (index, byte) in text.bytes().enumerate() {
        if !(0x20..=0x7E).contains(&byte) {
            return Err(CodecError::NonPrintable { byte, index });
        }
    }
    Ok(())
}

/// Encode `text` into the exact byte sequence legal for a slot.
///
/// Charset is checked before any length handling. A text longer than the
/// slot is an error; a shorter one is right-padded with `pad` (or the
/// encoding's default) until it fills the slot. The result always has
/// length `slot_len`.
pub fn encode(
    text: &str,
    slot_len: usize,
    encoding: Encoding,
    pad: Option<u8>,
) -> Result<Vec<u8>, CodecError> {
    if encoding.is_text() {
        charset_check(text)?;
    }

    let bytes = text.as_bytes();
    if bytes.len() > slot_len {
        return Err(CodecError::TooLong {
            len: bytes.len(),
            slot_len,
        });
    }

    let pad = pad.unwrap_or_else(|| encoding.default_pad());
    let mut out = Vec::with_capacity(slot_len);
    out.extend_from_slice(bytes);
    out.resize(slot_len, pad);
    Ok(out)
}
