//! Patch-set files: loading, validation, and application.
//!
//! A patch set is a TOML file describing one output variant of a source
//! image: metadata, an optional format override, and an ordered list of
//! patch definitions. This layer resolves search locations, builds
//! finalized descriptors through the codec, and runs the verifying
//! patcher; it is the only place where text from a file turns into bytes
//! aimed at an image.

pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{apply_patch_set, check_patch_set, ApplicationError, PatchSetRun};
pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    EncodingTag, FormatOverride, Location, Metadata, PatchDefinition, PatchSet, ValidationError,
    ValidationIssue,
};
