//! Property tests for the engine's central invariants: length
//! preservation, no-write-on-mismatch, and charset rejection.

use nepatch::{codec, Encoding, FormatSpec, Image, PatchDescriptor, VerifyingPatcher};
use proptest::prelude::*;

const NE_OFFSET: usize = 0x400;
const IMAGE_LEN: usize = 0x600;

fn base_image() -> Image {
    let mut bytes = vec![0u8; IMAGE_LEN];
    bytes[0] = b'M';
    bytes[1] = b'Z';
    bytes[NE_OFFSET] = b'N';
    bytes[NE_OFFSET + 1] = b'E';
    Image::from_bytes(bytes)
}

/// Slot content somewhere in the payload area, past both markers.
fn slot() -> impl Strategy<Value = (usize, Vec<u8>)> {
    (0usize..0x100, proptest::collection::vec(any::<u8>(), 1..32))
        .prop_map(|(rel, bytes)| (NE_OFFSET + 2 + rel, bytes))
}

proptest! {
    #[test]
    fn patched_image_always_keeps_its_length((offset, expected) in slot()) {
        let mut image = base_image();
        let input_len = image.len();
        image_write(&mut image, offset, &expected);

        let replacement = vec![b'x'; expected.len()];
        let descriptor = PatchDescriptor::raw("p", offset, expected, replacement).unwrap();

        let patcher = VerifyingPatcher::new(FormatSpec::ne());
        let report = patcher.apply(&mut image, &[descriptor]).unwrap();

        prop_assert!(report.all_applied());
        prop_assert_eq!(image.len(), input_len);
    }

    #[test]
    fn mismatch_never_mutates_any_byte(
        (offset, mut expected) in slot(),
        flip in 0usize..32,
    ) {
        let mut image = base_image();
        image_write(&mut image, offset, &expected);
        let pristine = image.clone();

        // Corrupt the expectation so it cannot match.
        let idx = flip % expected.len();
        expected[idx] = expected[idx].wrapping_add(1);

        let replacement = vec![b'x'; expected.len()];
        let descriptor = PatchDescriptor::raw("p", offset, expected, replacement).unwrap();

        let patcher = VerifyingPatcher::new(FormatSpec::ne());
        let report = patcher.apply(&mut image, &[descriptor]).unwrap();

        prop_assert_eq!(report.applied(), 0);
        prop_assert_eq!(image, pristine);
    }

    #[test]
    fn encode_result_always_fills_the_slot(
        text in "[ -~]{0,16}",
        extra in 0usize..16,
    ) {
        let slot_len = text.len() + extra;
        let out = codec::encode(&text, slot_len, Encoding::NullTerminated, None).unwrap();
        prop_assert_eq!(out.len(), slot_len);
        prop_assert!(out.starts_with(text.as_bytes()));
        prop_assert!(out[text.len()..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn non_printable_replacement_is_always_rejected(
        prefix in "[ -~]{0,8}",
        bad in prop::char::range('\u{7f}', '\u{ff}'),
        suffix in "[ -~]{0,8}",
    ) {
        let text = format!("{prefix}{bad}{suffix}");
        let result = codec::encode(&text, 64, Encoding::LengthPrefixed, None);
        prop_assert!(result.is_err());
    }

    #[test]
    fn applied_range_reads_back_as_replacement((offset, expected) in slot()) {
        let mut image = base_image();
        image_write(&mut image, offset, &expected);

        let replacement: Vec<u8> = expected.iter().map(|b| b.wrapping_add(1)).collect();
        let descriptor =
            PatchDescriptor::raw("p", offset, expected.clone(), replacement.clone()).unwrap();

        let patcher = VerifyingPatcher::new(FormatSpec::ne());
        let report = patcher.apply(&mut image, &[descriptor]).unwrap();

        prop_assert!(report.all_applied());
        prop_assert_eq!(&image.as_bytes()[offset..offset + expected.len()], &replacement[..]);
    }
}

/// Test-only helper: rebuild the image with `bytes` spliced in at `offset`.
fn image_write(image: &mut Image, offset: usize, bytes: &[u8]) {
    let mut all = image.as_bytes().to_vec();
    all[offset..offset + bytes.len()].copy_from_slice(bytes);
    *image = Image::from_bytes(all);
}
