use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The NE header offset is fixed in the Windows 2.x images this tool
/// targets; the MZ field at 0x3C is not trusted.
const NE_HEADER_OFFSET: usize = 0x400;

/// An owned, fixed-length byte buffer holding one executable image.
///
/// The length never changes across any patch operation: there is no
/// insertion or deletion API, only same-position overwrites through the
/// patcher. The format's internal offsets and segment tables are never
/// recomputed, so any length change would corrupt the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    bytes: Vec<u8>,
}

impl Image {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Read an image from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StructuralError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| StructuralError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { bytes })
    }

    /// Write the image to disk atomically: tempfile + fsync + rename.
    ///
    /// Either the full image lands or the destination is untouched; a
    /// half-written executable is worse than no output at all.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), StructuralError> {
        let path = path.as_ref();
        atomic_write(path, &self.bytes).map_err(|source| StructuralError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable access is confined to the patcher.
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

fn atomic_write(path: &Path, content: &[u8]) -> Result<(), std::io::Error> {
    // Tempfile in the same directory so the rename stays on one filesystem.
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// The structural contract an image must satisfy before and after a run.
///
/// This is deliberately shallow: magic bytes, a secondary header marker at
/// a fixed position, and optionally the exact file length. Full NE
/// header/segment parsing is out of scope; a wrong-size or wrong-format
/// image invalidates every offset in a patch set, so failures here are
/// fatal for the whole run rather than per-descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    pub magic: Vec<u8>,
    pub secondary_magic: Vec<u8>,
    pub secondary_offset: usize,
    pub expected_len: Option<usize>,
}

#[derive(Error, Debug)]
pub enum StructuralError {
    #[error("bad magic at offset 0: expected {expected:02X?}, found {found:02X?}")]
    BadMagic { expected: Vec<u8>, found: Vec<u8> },

    #[error("bad secondary marker at 0x{offset:04X}: expected {expected:02X?}, found {found:02X?}")]
    BadSecondaryMagic {
        offset: usize,
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    #[error("image is {actual} bytes, expected {expected}")]
    WrongLength { expected: usize, actual: usize },

    #[error("image length changed during patching: {before} -> {after}")]
    LengthChanged { before: usize, after: usize },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FormatSpec {
    /// Windows 2.x NE executable: MZ stub at 0, NE header at 0x400.
    pub fn ne() -> Self {
        Self {
            magic: b"MZ".to_vec(),
            secondary_magic: b"NE".to_vec(),
            secondary_offset: NE_HEADER_OFFSET,
            expected_len: None,
        }
    }

    /// Require an exact total length in addition to the markers.
    pub fn with_expected_len(mut self, len: usize) -> Self {
        self.expected_len = Some(len);
        self
    }

    /// Verify the source image before any descriptor is considered.
    pub fn precheck(&self, image: &Image) -> Result<(), StructuralError> {
        if let Some(expected) = self.expected_len {
            if image.len() != expected {
                return Err(StructuralError::WrongLength {
                    expected,
                    actual: image.len(),
                });
            }
        }
        self.check_markers(image)
    }

    /// Re-verify after a run: the length must be unchanged by construction,
    /// and both markers must have survived. A marker overwritten here means
    /// a descriptor's target range included header bytes.
    pub fn postcheck(&self, input_len: usize, image: &Image) -> Result<(), StructuralError> {
        if image.len() != input_len {
            return Err(StructuralError::LengthChanged {
                before: input_len,
                after: image.len(),
            });
        }
        self.check_markers(image)
    }

    fn check_markers(&self, image: &Image) -> Result<(), StructuralError> {
        let bytes = image.as_bytes();

        let head = bytes.get(..self.magic.len()).unwrap_or(bytes);
        if head != self.magic.as_slice() {
            return Err(StructuralError::BadMagic {
                expected: self.magic.clone(),
                found: head.to_vec(),
            });
        }

        let marker = self
            .secondary_offset
            .checked_add(self.secondary_magic.len())
            .and_then(|end| bytes.get(self.secondary_offset..end))
            .unwrap_or(&[]);
        if marker != self.secondary_magic.as_slice() {
            return Err(StructuralError::BadSecondaryMagic {
                offset: self.secondary_offset,
                expected: self.secondary_magic.clone(),
                found: marker.to_vec(),
            });
        }

        Ok(())
    }
}

/// Minimal NE image for tests: MZ at 0, NE at 0x400, trailing payload.
#[cfg(test)]
pub(crate) fn synthetic_ne(total_len: usize) -> Image {
    assert!(total_len >= NE_HEADER_OFFSET + 2);
    let mut bytes = vec![0u8; total_len];
    bytes[0] = b'M';
    bytes[1] = b'Z';
    bytes[NE_HEADER_OFFSET] = b'N';
    bytes[NE_HEADER_OFFSET + 1] = b'E';
    Image::from_bytes(bytes)
}
