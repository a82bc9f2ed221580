//! nepatch: verified, in-place resource patcher for fixed-layout NE executables
//!
//! Rewrites selected byte ranges of a known-good executable image while
//! guaranteeing the output keeps the exact length and structural layout of
//! the input. The target format's internal offsets and segment tables are
//! never recomputed, so length-changing edits are forbidden by design.
//!
//! # Architecture
//!
//! All patching compiles down to a single primitive: a [`PatchDescriptor`]
//! applied by the [`VerifyingPatcher`]. Intelligence lives in descriptor
//! construction (codec padding, offset discovery, patch-set files), not in
//! the application logic.
//!
//! # Safety
//!
//! - No write unless the pre-image exactly matches the descriptor's
//!   expected bytes
//! - Structural prechecks (magic markers, total length) abort before any
//!   write; postchecks catch a descriptor that strayed into header bytes
//! - Per-descriptor failures are reported, never silently corrected
//! - Atomic file writes (tempfile + fsync + rename)
//!
//! # Example
//!
//! ```no_run
//! use nepatch::{Encoding, FormatSpec, Image, PatchDescriptor, VerifyingPatcher};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut image = Image::load("REVERSI.EXE")?;
//!
//! let descriptor = PatchDescriptor::text(
//!     "menu-game",
//!     0x3B61,
//!     b"&Game".to_vec(),
//!     "&Spil",
//!     Encoding::NullTerminated,
//!     None,
//! )?;
//!
//! let patcher = VerifyingPatcher::new(FormatSpec::ne());
//! let report = patcher.apply(&mut image, &[descriptor])?;
//!
//! if report.all_applied() {
//!     image.persist("REVERSI_DA.EXE")?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod image;
pub mod patcher;

// Re-exports
pub use assembler::{AssemblerError, DirAssembler, ImageAssembler, MtoolsAssembler};
pub use codec::{charset_check, encode, CodecError, Encoding};
pub use config::{
    apply_patch_set, check_patch_set, load_from_path, load_from_str, ApplicationError,
    ConfigError, PatchSet, PatchSetRun,
};
pub use descriptor::{DescriptorError, PatchDescriptor, PatchOutcome, PatchReport};
pub use image::{FormatSpec, Image, StructuralError};
pub use patcher::{locate, LocateOutcome, VerifyingPatcher};
