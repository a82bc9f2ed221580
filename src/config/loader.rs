use crate::config::schema::{PatchSet, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read patch set from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse patch set TOML: {0}")]
    Parse(#[from] toml_edit::de::Error),

    #[error("invalid patch set: {0}")]
    Invalid(#[from] ValidationError),

    /// A parse or validation failure tagged with the file it came from.
    /// String input has no path, so the tag is added by `load_from_path`
    /// after the fact.
    #[error("{path}: {source}")]
    InFile {
        path: PathBuf,
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    fn in_file(self, path: &Path) -> Self {
        match self {
            // Read errors already carry their path; never double-wrap.
            ConfigError::Read { .. } | ConfigError::InFile { .. } => self,
            other => ConfigError::InFile {
                path: path.to_path_buf(),
                source: Box::new(other),
            },
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchSet, ConfigError> {
    let set: PatchSet = toml_edit::de::from_str(input)?;
    set.validate()?;
    Ok(set)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchSet, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.in_file(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{EncodingTag, Location};

    #[test]
    fn test_load_minimal_patch_set() {
        let toml = r#"
[meta]
name = "danish"
description = "Danish translation"
output = "REVERSI_DA.EXE"

[format]
size = 15760

[[patches]]
id = "menu-game"
at = { type = "offset", offset = 0x3B61 }
expected = "&Game"
replacement = "&Spil"
encoding = "null-terminated"
"#;
        let set = load_from_str(toml).unwrap();
        assert_eq!(set.meta.name, "danish");
        assert_eq!(set.meta.output.as_deref(), Some("REVERSI_DA.EXE"));
        assert_eq!(set.format.as_ref().unwrap().size, Some(15760));
        assert_eq!(set.patches.len(), 1);
        assert!(matches!(
            set.patches[0].at,
            Location::Offset { offset: 0x3B61 }
        ));
        assert_eq!(set.patches[0].encoding, EncodingTag::NullTerminated);
    }

    #[test]
    fn test_load_search_location_with_skip() {
        let toml = r#"
[[patches]]
id = "string-pass"
expected = "Pass"
replacement = "Pas"
encoding = "length-prefixed"

[patches.at]
type = "search"
search = "\u0004Pass"
skip = 1
"#;
        let set = load_from_str(toml).unwrap();
        match &set.patches[0].at {
            Location::Search { search, skip } => {
                assert_eq!(search.as_bytes(), b"\x04Pass");
                assert_eq!(*skip, 1);
            }
            other => panic!("unexpected location: {other:?}"),
        }
    }

    #[test]
    fn test_load_raw_hex_patch() {
        let toml = r#"
[[patches]]
id = "corner-black-1-1"
at = { type = "offset", offset = 0x11E2 }
expected_hex = "C6 40 0F 03"
replacement_hex = "C6 40 0B 03"
encoding = "raw-bytes"
"#;
        let set = load_from_str(toml).unwrap();
        assert_eq!(set.patches[0].expected_hex.as_deref(), Some("C6 40 0F 03"));
    }

    #[test]
    fn test_load_rejects_invalid_set() {
        let toml = r#"
[[patches]]
id = "broken"
at = { type = "offset", offset = 16 }
encoding = "raw-bytes"
"#;
        let err = load_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let err = load_from_str("patches = not toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_missing_path() {
        let err = load_from_path("/nonexistent/patches.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "patches = not toml").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InFile { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
