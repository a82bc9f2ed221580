use crate::codec::Encoding;
use crate::image::FormatSpec;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchSet {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub format: Option<FormatOverride>,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// File name for the patched variant, e.g. "REVERSI_DA.EXE".
    #[serde(default)]
    pub output: Option<String>,
}

/// Structural expectations for the source image. Defaults to the NE
/// layout (MZ at 0, NE at 0x400) when the section is absent.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct FormatOverride {
    #[serde(default)]
    pub magic: Option<String>,
    #[serde(default)]
    pub secondary_magic: Option<String>,
    #[serde(default)]
    pub secondary_offset: Option<usize>,
    #[serde(default)]
    pub size: Option<usize>,
}

impl FormatOverride {
    pub fn to_format_spec(&self) -> FormatSpec {
        let mut spec = FormatSpec::ne();
        if let Some(magic) = &self.magic {
            spec.magic = magic.as_bytes().to_vec();
        }
        if let Some(secondary) = &self.secondary_magic {
            spec.secondary_magic = secondary.as_bytes().to_vec();
        }
        if let Some(offset) = self.secondary_offset {
            spec.secondary_offset = offset;
        }
        spec.expected_len = self.size;
        spec
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub at: Location,
    /// Pre-image text. Optional for search locations, where it defaults
    /// to the searched bytes.
    #[serde(default)]
    pub expected: Option<String>,
    /// Pre-image as hex, for non-text ranges.
    #[serde(default)]
    pub expected_hex: Option<String>,
    #[serde(default)]
    pub replacement: Option<String>,
    #[serde(default)]
    pub replacement_hex: Option<String>,
    pub encoding: EncodingTag,
    /// Pad byte override; defaults by encoding.
    #[serde(default)]
    pub pad: Option<u8>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Location {
    /// Fixed byte position in the image. TOML hex literals keep patch
    /// files readable: `offset = 0x3B61`.
    Offset { offset: usize },
    /// Unique-substring discovery over the image bytes.
    Search {
        search: String,
        /// Bytes of the match to skip before the patch range starts.
        /// Lets a search anchor on a length-prefix byte that must never
        /// be rewritten: `search = "\u0004Pass", skip = 1`.
        #[serde(default)]
        skip: usize,
    },
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EncodingTag {
    RawBytes,
    NullTerminated,
    LengthPrefixed,
}

impl From<EncodingTag> for Encoding {
    fn from(tag: EncodingTag) -> Self {
        match tag {
            EncodingTag::RawBytes => Encoding::RawBytes,
            EncodingTag::NullTerminated => Encoding::NullTerminated,
            EncodingTag::LengthPrefixed => Encoding::LengthPrefixed,
        }
    }
}

impl PatchSet {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        for patch in &self.patches {
            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            }

            match &patch.at {
                Location::Offset { .. } => {
                    if patch.expected.is_none() && patch.expected_hex.is_none() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: Some(patch.id.clone()),
                            field: "expected",
                        });
                    }
                }
                Location::Search { search, skip } => {
                    if search.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: Some(patch.id.clone()),
                            field: "at.search",
                        });
                    } else if *skip >= search.len() {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: Some(patch.id.clone()),
                            message: format!(
                                "skip ({skip}) must be smaller than the search pattern ({} bytes)",
                                search.len()
                            ),
                        });
                    }
                }
            }

            if patch.expected.is_some() && patch.expected_hex.is_some() {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(patch.id.clone()),
                    message: "expected and expected_hex cannot both be set".to_string(),
                });
            }

            match (&patch.replacement, &patch.replacement_hex) {
                (None, None) => issues.push(ValidationIssue::MissingField {
                    patch_id: Some(patch.id.clone()),
                    field: "replacement",
                }),
                (Some(_), Some(_)) => issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(patch.id.clone()),
                    message: "replacement and replacement_hex cannot both be set".to_string(),
                }),
                _ => {}
            }

            if patch.replacement_hex.is_some() && patch.encoding != EncodingTag::RawBytes {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(patch.id.clone()),
                    message: "replacement_hex requires encoding = \"raw-bytes\"".to_string(),
                });
            }

            for (field, value) in [
                ("expected_hex", &patch.expected_hex),
                ("replacement_hex", &patch.replacement_hex),
            ] {
                if let Some(value) = value {
                    if decode_hex(value).is_none() {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: Some(patch.id.clone()),
                            message: format!("{field} is not valid hex: {value:?}"),
                        });
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

/// Decode a hex string, ignoring interior spaces ("C6 40 0B 03").
pub(crate) fn decode_hex(input: &str) -> Option<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.len() % 2 != 0 {
        return None;
    }
    (0..compact.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&compact[i..i + 2], 16).ok())
        .collect()
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch set contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
