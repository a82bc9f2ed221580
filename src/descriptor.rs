use crate::codec::{self, CodecError, Encoding};
use std::fmt;
use thiserror::Error;

/// One unit of patch intent: where to write, what must be there first,
/// and what to write instead.
///
/// A descriptor is immutable once built. The text constructor finalizes
/// padding through the codec so that `expected` and `replacement` have the
/// same length; the raw constructor leaves length reconciliation to the
/// caller and the patcher reports any shortfall instead of fixing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchDescriptor {
    id: String,
    offset: usize,
    expected: Vec<u8>,
    replacement: Vec<u8>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("replacement ({replacement_len} bytes) is longer than expected ({expected_len} bytes)")]
    ReplacementTooLong {
        expected_len: usize,
        replacement_len: usize,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl PatchDescriptor {
    /// Build a descriptor from raw byte sequences.
    ///
    /// A replacement longer than the expected range can never be applied
    /// and is rejected here; a shorter one is allowed through so that the
    /// patcher can surface it as a per-descriptor outcome.
    pub fn raw(
        id: impl Into<String>,
        offset: usize,
        expected: Vec<u8>,
        replacement: Vec<u8>,
    ) -> Result<Self, DescriptorError> {
        if replacement.len() > expected.len() {
            return Err(DescriptorError::ReplacementTooLong {
                expected_len: expected.len(),
                replacement_len: replacement.len(),
            });
        }
        Ok(Self {
            id: id.into(),
            offset,
            expected,
            replacement,
        })
    }

    /// Build a descriptor from replacement text, padding it to the slot.
    ///
    /// The slot length is `expected.len()`; the codec runs the charset
    /// check and right-pads, so the resulting descriptor always satisfies
    /// the equal-length invariant.
    pub fn text(
        id: impl Into<String>,
        offset: usize,
        expected: Vec<u8>,
        replacement_text: &str,
        encoding: Encoding,
        pad: Option<u8>,
    ) -> Result<Self, DescriptorError> {
        let replacement = codec::encode(replacement_text, expected.len(), encoding, pad)?;
        Ok(Self {
            id: id.into(),
            offset,
            expected,
            replacement,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn expected(&self) -> &[u8] {
        &self.expected
    }

    pub fn replacement(&self) -> &[u8] {
        &self.replacement
    }
}

/// Per-descriptor result. Never discarded silently: every descriptor in a
/// run produces exactly one outcome in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOutcome should be checked for success/skip"]
pub enum PatchOutcome {
    /// Pre-image matched and the range was overwritten.
    Applied,
    /// Pre-image bytes differ from `expected`; the image was left untouched.
    SkippedMismatch { expected: Vec<u8>, actual: Vec<u8> },
    /// Replacement length does not equal the expected length; padding was
    /// never finalized. The image was left untouched.
    SkippedTooLong {
        expected_len: usize,
        replacement_len: usize,
    },
    /// The target range falls outside the image. The image was left untouched.
    SkippedOutOfRange {
        offset: usize,
        len: usize,
        image_len: usize,
    },
}

impl PatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PatchOutcome::Applied)
    }
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOutcome::Applied => write!(f, "applied"),
            PatchOutcome::SkippedMismatch { expected, actual } => {
                write!(
                    f,
                    "pre-image mismatch: expected {}, found {}",
                    ByteDump(expected),
                    ByteDump(actual)
                )
            }
            PatchOutcome::SkippedTooLong {
                expected_len,
                replacement_len,
            } => write!(
                f,
                "length mismatch: slot is {expected_len} bytes, replacement is {replacement_len}"
            ),
            PatchOutcome::SkippedOutOfRange {
                offset,
                len,
                image_len,
            } => write!(
                f,
                "range [0x{offset:04X}, 0x{:04X}) is outside the {image_len}-byte image",
                offset + len
            ),
        }
    }
}

/// Printable-ASCII-or-hex rendering of a byte sequence for reports.
struct ByteDump<'a>(&'a [u8]);

impl fmt::Display for ByteDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for &b in self.0 {
            if (0x20..=0x7E).contains(&b) {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02X}")?;
            }
        }
        write!(f, "\"")
    }
}

/// Ordered record of one patch run: one `(descriptor id, outcome)` entry
/// per descriptor, in application order. Created fresh per run and
/// immutable once returned; the caller uses it to gate persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchReport should be inspected before persisting the image"]
pub struct PatchReport {
    entries: Vec<(String, PatchOutcome)>,
}

impl PatchReport {
    pub(crate) fn new(entries: Vec<(String, PatchOutcome)>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, PatchOutcome)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn applied(&self) -> usize {
        self.entries.iter().filter(|(_, o)| o.is_applied()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &(String, PatchOutcome)> {
        self.entries.iter().filter(|(_, o)| !o.is_applied())
    }

    /// The usual acceptance bar for persisting the patched image.
    pub fn all_applied(&self) -> bool {
        self.entries.iter().all(|(_, o)| o.is_applied())
    }

    /// Lowered acceptance bar: at least one descriptor landed.
    pub fn any_applied(&self) -> bool {
        self.entries.iter().any(|(_, o)| o.is_applied())
    }
}
