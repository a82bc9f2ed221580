use crate::descriptor::{PatchDescriptor, PatchOutcome, PatchReport};
use crate::image::{FormatSpec, Image, StructuralError};

/// Applies a batch of descriptors to an image with fail-closed,
/// at-most-one-pass semantics.
///
/// The patcher makes no padding decisions and never searches for offsets;
/// it only validates and writes. Per descriptor it reads the pre-image,
/// compares it against `expected`, and overwrites the range only on an
/// exact match. A mismatch leaves the range bit-identical to the input:
/// the pre-image check is the defense against a stale offset table or a
/// different build of the source image at the same nominal offsets.
#[derive(Debug, Clone)]
pub struct VerifyingPatcher {
    format: FormatSpec,
}

impl VerifyingPatcher {
    pub fn new(format: FormatSpec) -> Self {
        Self { format }
    }

    /// Apply `descriptors` in order against `image`.
    ///
    /// Structural prechecks run before any write and abort the whole run
    /// on failure. Per-descriptor failures never stop the batch; each
    /// descriptor produces exactly one outcome in the report so a single
    /// run surfaces every problem in the set. After the batch, the length
    /// and both header markers are re-checked as a net against a
    /// descriptor whose range strayed into header bytes.
    pub fn apply(
        &self,
        image: &mut Image,
        descriptors: &[PatchDescriptor],
    ) -> Result<PatchReport, StructuralError> {
        self.format.precheck(image)?;
        let input_len = image.len();

        let mut entries = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let outcome = apply_one(image, descriptor);
            entries.push((descriptor.id().to_string(), outcome));
        }

        self.format.postcheck(input_len, image)?;
        Ok(PatchReport::new(entries))
    }
}

fn apply_one(image: &mut Image, descriptor: &PatchDescriptor) -> PatchOutcome {
    let offset = descriptor.offset();
    let expected = descriptor.expected();
    let end = match offset.checked_add(expected.len()) {
        Some(end) if end <= image.len() => end,
        _ => {
            return PatchOutcome::SkippedOutOfRange {
                offset,
                len: expected.len(),
                image_len: image.len(),
            }
        }
    };

    let actual = &image.as_bytes()[offset..end];
    if actual != expected {
        return PatchOutcome::SkippedMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        };
    }

    // Sizes must already be reconciled by the codec; the patcher only
    // validates, it never pads or truncates.
    if descriptor.replacement().len() != expected.len() {
        return PatchOutcome::SkippedTooLong {
            expected_len: expected.len(),
            replacement_len: descriptor.replacement().len(),
        };
    }

    image.bytes_mut()[offset..end].copy_from_slice(descriptor.replacement());
    PatchOutcome::Applied
}

/// Result of offset discovery over the image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateOutcome {
    /// Exactly one occurrence, at this offset.
    Unique(usize),
    NotFound,
    /// More than one occurrence; patching any of them would be a guess.
    Ambiguous { count: usize },
}

/// Find a byte pattern in the image.
///
/// Offset discovery is layered on top of the patcher, not inside it: the
/// discovered offset feeds a normal descriptor, so the same pre-image
/// check still guards the write. A pattern that appears more than once is
/// reported as ambiguous rather than silently patched at its first
/// occurrence.
pub fn locate(haystack: &[u8], needle: &[u8]) -> LocateOutcome {
    if needle.is_empty() || needle.len() > haystack.len() {
        return LocateOutcome::NotFound;
    }

    let mut found = None;
    let mut count = 0usize;
    for (offset, window) in haystack.windows(needle.len()).enumerate() {
        if window == needle {
            count += 1;
            if found.is_none() {
                found = Some(offset);
            }
        }
    }

    match (found, count) {
        (Some(offset), 1) => LocateOutcome::Unique(offset),
        (Some(_), count) => LocateOutcome::Ambiguous { count },
        (None, _) => LocateOutcome::NotFound,
    }
}
