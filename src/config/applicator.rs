//! Patch-set application: resolve locations, build descriptors, run the
//! verifying patcher, and report per-patch results.
//!
//! Resolution failures (pattern not found, replacement too long, bad
//! charset) are per-patch and never abort the batch; only a structural
//! failure of the source image does. All search locations resolve against
//! the pristine source bytes, so the order of patches in the file cannot
//! change what a later search finds.

use crate::config::schema::{decode_hex, Location, PatchDefinition, PatchSet};
use crate::descriptor::{DescriptorError, PatchDescriptor, PatchOutcome};
use crate::image::{FormatSpec, Image, StructuralError};
use crate::patcher::{locate, LocateOutcome, VerifyingPatcher};
use thiserror::Error;

/// Why a patch never made it to the patcher.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("search pattern {pattern:?} not found in image")]
    SearchNotFound { pattern: String },

    #[error("search pattern {pattern:?} occurs {count} times in image (expected exactly 1)")]
    SearchAmbiguous { pattern: String, count: usize },

    #[error("invalid patch definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

/// Outcome of applying one patch set to one working copy of the image.
#[derive(Debug)]
#[must_use = "PatchSetRun should be inspected before persisting the image"]
pub struct PatchSetRun {
    /// The patched working copy. Persist only after checking the results.
    pub image: Image,
    /// One entry per patch definition, in file order.
    pub results: Vec<(String, Result<PatchOutcome, ApplicationError>)>,
}

impl PatchSetRun {
    pub fn applied(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, Ok(o) if o.is_applied()))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.applied()
    }

    /// The usual acceptance bar for persisting the output.
    pub fn all_applied(&self) -> bool {
        self.failed() == 0
    }

    pub fn any_applied(&self) -> bool {
        self.applied() > 0
    }
}

/// Apply a patch set to a fresh working copy of `source`.
///
/// The source is never mutated; independent patch sets against the same
/// source are therefore free to run in parallel over their own copies.
pub fn apply_patch_set(set: &PatchSet, source: &Image) -> Result<PatchSetRun, StructuralError> {
    let format = set
        .format
        .as_ref()
        .map(|f| f.to_format_spec())
        .unwrap_or_else(FormatSpec::ne);

    // Resolve every definition before any write, against pristine bytes.
    let mut resolved: Vec<(String, Result<PatchDescriptor, ApplicationError>)> = Vec::new();
    for patch in &set.patches {
        let descriptor = build_descriptor(patch, source);
        resolved.push((patch.id.clone(), descriptor));
    }

    let mut image = source.clone();
    let descriptors: Vec<PatchDescriptor> = resolved
        .iter()
        .filter_map(|(_, r)| r.as_ref().ok().cloned())
        .collect();

    let patcher = VerifyingPatcher::new(format);
    let report = patcher.apply(&mut image, &descriptors)?;

    // Merge patcher outcomes back into file order.
    let mut outcomes = report.iter();
    let results = resolved
        .into_iter()
        .map(|(id, r)| match r {
            Ok(_) => {
                let (_, outcome) = outcomes
                    .next()
                    .expect("patcher reports one outcome per descriptor");
                (id, Ok(outcome.clone()))
            }
            Err(e) => (id, Err(e)),
        })
        .collect();

    Ok(PatchSetRun { image, results })
}

/// Read-only variant: same reporting, the working copy is discarded.
pub fn check_patch_set(
    set: &PatchSet,
    source: &Image,
) -> Result<Vec<(String, Result<PatchOutcome, ApplicationError>)>, StructuralError> {
    let run = apply_patch_set(set, source)?;
    Ok(run.results)
}

fn build_descriptor(
    patch: &PatchDefinition,
    source: &Image,
) -> Result<PatchDescriptor, ApplicationError> {
    let (offset, expected) = resolve_location(patch, source)?;

    match (&patch.replacement, &patch.replacement_hex) {
        (Some(text), None) => Ok(PatchDescriptor::text(
            &patch.id,
            offset,
            expected,
            text,
            patch.encoding.into(),
            patch.pad,
        )?),
        (None, Some(hex)) => {
            let replacement = decode_hex(hex).ok_or_else(|| ApplicationError::InvalidDefinition {
                reason: format!("replacement_hex is not valid hex: {hex:?}"),
            })?;
            Ok(PatchDescriptor::raw(&patch.id, offset, expected, replacement)?)
        }
        _ => Err(ApplicationError::InvalidDefinition {
            reason: "exactly one of replacement and replacement_hex must be set".to_string(),
        }),
    }
}

fn resolve_location(
    patch: &PatchDefinition,
    source: &Image,
) -> Result<(usize, Vec<u8>), ApplicationError> {
    let expected = match (&patch.expected, &patch.expected_hex) {
        (Some(text), None) => Some(text.as_bytes().to_vec()),
        (None, Some(hex)) => Some(decode_hex(hex).ok_or_else(|| {
            ApplicationError::InvalidDefinition {
                reason: format!("expected_hex is not valid hex: {hex:?}"),
            }
        })?),
        (None, None) => None,
        (Some(_), Some(_)) => {
            return Err(ApplicationError::InvalidDefinition {
                reason: "expected and expected_hex cannot both be set".to_string(),
            })
        }
    };

    match &patch.at {
        Location::Offset { offset } => {
            let expected = expected.ok_or_else(|| ApplicationError::InvalidDefinition {
                reason: "offset location requires expected or expected_hex".to_string(),
            })?;
            Ok((*offset, expected))
        }
        Location::Search { search, skip } => {
            let needle = search.as_bytes();
            match locate(source.as_bytes(), needle) {
                LocateOutcome::Unique(found) => {
                    // Sets built in code bypass `PatchSet::validate`, so the
                    // skip bound is re-checked here as a per-patch error.
                    let tail = needle.get(*skip..).filter(|tail| !tail.is_empty()).ok_or_else(
                        || ApplicationError::InvalidDefinition {
                            reason: format!(
                                "skip ({skip}) must be smaller than the search pattern ({} bytes)",
                                needle.len()
                            ),
                        },
                    )?;
                    let offset = found.checked_add(*skip).ok_or_else(|| {
                        ApplicationError::InvalidDefinition {
                            reason: format!("patch offset overflows: {found} + {skip}"),
                        }
                    })?;
                    // The searched bytes past `skip` double as the
                    // pre-image unless the definition narrows it.
                    let expected = expected.unwrap_or_else(|| tail.to_vec());
                    Ok((offset, expected))
                }
                LocateOutcome::NotFound => Err(ApplicationError::SearchNotFound {
                    pattern: search.clone(),
                }),
                LocateOutcome::Ambiguous { count } => Err(ApplicationError::SearchAmbiguous {
                    pattern: search.clone(),
                    count,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_from_str;
    use crate::image::synthetic_ne;

    const PAYLOAD: usize = 0x480;

    fn image_with_payload(payload: &[u8]) -> Image {
        let mut bytes = synthetic_ne(0x500).as_bytes().to_vec();
        bytes[PAYLOAD..PAYLOAD + payload.len()].copy_from_slice(payload);
        Image::from_bytes(bytes)
    }

    #[test]
    fn test_apply_offset_patch() {
        let source = image_with_payload(b"AAAAHELLO!");
        let toml = format!(
            r#"
[[patches]]
id = "greeting"
at = {{ type = "offset", offset = {} }}
expected = "HELLO"
replacement = "HI"
encoding = "null-terminated"
"#,
            PAYLOAD + 4
        );
        let set = load_from_str(&toml).unwrap();

        let run = apply_patch_set(&set, &source).unwrap();
        assert!(run.all_applied());
        assert_eq!(&run.image.as_bytes()[PAYLOAD..PAYLOAD + 10], b"AAAAHI   !");
        // Source untouched.
        assert_eq!(&source.as_bytes()[PAYLOAD..PAYLOAD + 10], b"AAAAHELLO!");
    }

    #[test]
    fn test_apply_search_patch() {
        let source = image_with_payload(b"..Tie Game..");
        let toml = r#"
[[patches]]
id = "tie"
at = { type = "search", search = "Tie Game" }
replacement = "Uafgjort"
encoding = "length-prefixed"
"#;
        let set = load_from_str(toml).unwrap();

        let run = apply_patch_set(&set, &source).unwrap();
        assert!(run.all_applied());
        assert_eq!(
            &run.image.as_bytes()[PAYLOAD..PAYLOAD + 12],
            b"..Uafgjort.."
        );
    }

    #[test]
    fn test_search_skip_leaves_count_byte() {
        let source = image_with_payload(b"XYZ\x04Pass");
        let toml = r#"
[[patches]]
id = "pass"
at = { type = "search", search = "\u0004Pass", skip = 1 }
replacement = "Pas"
encoding = "length-prefixed"
"#;
        let set = load_from_str(toml).unwrap();

        let run = apply_patch_set(&set, &source).unwrap();
        assert!(run.all_applied());
        assert_eq!(run.image.as_bytes()[PAYLOAD + 3], 0x04);
        assert_eq!(&run.image.as_bytes()[PAYLOAD + 4..PAYLOAD + 8], b"Pas ");
    }

    #[test]
    fn test_skip_past_search_is_per_patch() {
        use crate::config::schema::EncodingTag;

        // Built in code, so PatchSet::validate never ran on it.
        let source = image_with_payload(b"XYZ\x04Pass");
        let set = PatchSet {
            patches: vec![PatchDefinition {
                id: "bad-skip".to_string(),
                at: Location::Search {
                    search: "Pass".to_string(),
                    skip: 10,
                },
                expected: None,
                expected_hex: None,
                replacement: Some("Pas".to_string()),
                replacement_hex: None,
                encoding: EncodingTag::LengthPrefixed,
                pad: None,
            }],
            ..Default::default()
        };

        let run = apply_patch_set(&set, &source).unwrap();
        assert!(matches!(
            run.results[0].1,
            Err(ApplicationError::InvalidDefinition { .. })
        ));
        assert_eq!(run.image, source);
    }

    #[test]
    fn test_search_not_found_is_per_patch() {
        let source = image_with_payload(b"AAAAHELLO!");
        let toml = format!(
            r#"
[[patches]]
id = "missing"
at = {{ type = "search", search = "Tie Game" }}
replacement = "Uafgjort"
encoding = "length-prefixed"

[[patches]]
id = "greeting"
at = {{ type = "offset", offset = {} }}
expected = "HELLO"
replacement = "HI"
encoding = "null-terminated"
"#,
            PAYLOAD + 4
        );
        let set = load_from_str(&toml).unwrap();

        let run = apply_patch_set(&set, &source).unwrap();
        assert_eq!(run.results.len(), 2);
        assert!(matches!(
            run.results[0].1,
            Err(ApplicationError::SearchNotFound { .. })
        ));
        assert!(matches!(run.results[1].1, Ok(ref o) if o.is_applied()));
        assert_eq!(&run.image.as_bytes()[PAYLOAD..PAYLOAD + 10], b"AAAAHI   !");
    }

    #[test]
    fn test_search_ambiguous_is_per_patch() {
        let source = image_with_payload(b"PassPass");
        let toml = r#"
[[patches]]
id = "pass"
at = { type = "search", search = "Pass" }
replacement = "Pas"
encoding = "length-prefixed"
"#;
        let set = load_from_str(toml).unwrap();

        let run = apply_patch_set(&set, &source).unwrap();
        assert!(matches!(
            run.results[0].1,
            Err(ApplicationError::SearchAmbiguous { count: 2, .. })
        ));
    }

    #[test]
    fn test_replacement_too_long_is_per_patch() {
        let source = image_with_payload(b"AAAAHELLO!");
        let toml = format!(
            r#"
[[patches]]
id = "overflow"
at = {{ type = "offset", offset = {} }}
expected = "HELLO"
replacement = "GODMORGEN"
encoding = "null-terminated"
"#,
            PAYLOAD + 4
        );
        let set = load_from_str(&toml).unwrap();

        let run = apply_patch_set(&set, &source).unwrap();
        assert!(matches!(
            run.results[0].1,
            Err(ApplicationError::Descriptor(_))
        ));
        assert_eq!(run.image, source);
    }

    #[test]
    fn test_raw_hex_patch() {
        let source = image_with_payload(b"\xC6\x40\x0F\x03rest");
        let toml = format!(
            r#"
[[patches]]
id = "corner"
at = {{ type = "offset", offset = {PAYLOAD} }}
expected_hex = "C6 40 0F 03"
replacement_hex = "C6 40 0B 03"
encoding = "raw-bytes"
"#
        );
        let set = load_from_str(&toml).unwrap();

        let run = apply_patch_set(&set, &source).unwrap();
        assert!(run.all_applied());
        assert_eq!(
            &run.image.as_bytes()[PAYLOAD..PAYLOAD + 4],
            &[0xC6, 0x40, 0x0B, 0x03]
        );
    }

    #[test]
    fn test_structural_failure_aborts() {
        let source = Image::from_bytes(b"garbage".to_vec());
        let toml = r#"
[[patches]]
id = "x"
at = { type = "search", search = "garbage" }
replacement = "zzz"
encoding = "null-terminated"
"#;
        let set = load_from_str(toml).unwrap();
        assert!(apply_patch_set(&set, &source).is_err());
    }
}
