use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Destination for patched output variants.
///
/// The engine itself only produces in-memory images; where they end up
/// (a staging directory, a FAT floppy image) is a collaborator concern,
/// injected rather than hardcoded so the core stays free of shell
/// invocations and fixed paths.
pub trait ImageAssembler {
    fn add_file(&mut self, name: &str, bytes: &[u8]) -> Result<(), AssemblerError>;
}

#[derive(Error, Debug)]
pub enum AssemblerError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("mtools is not available: {0}")]
    MtoolsMissing(std::io::Error),

    #[error("mcopy failed for {name}: {stderr}")]
    MtoolsCopy { name: String, stderr: String },
}

/// Stages output files into a directory, atomically per file.
#[derive(Debug)]
pub struct DirAssembler {
    dir: PathBuf,
}

impl DirAssembler {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ImageAssembler for DirAssembler {
    fn add_file(&mut self, name: &str, bytes: &[u8]) -> Result<(), AssemblerError> {
        let path = self.dir.join(name);
        let io_err = |source| AssemblerError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(|source| AssemblerError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        temp.write_all(bytes).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Copies output files into a FAT disk image via mtools.
///
/// `mcopy -o` overwrites an existing entry, so re-running a patch build
/// refreshes the floppy contents in place.
#[derive(Debug)]
pub struct MtoolsAssembler {
    floppy: PathBuf,
}

impl MtoolsAssembler {
    pub fn new(floppy: impl Into<PathBuf>) -> Self {
        Self {
            floppy: floppy.into(),
        }
    }
}

impl ImageAssembler for MtoolsAssembler {
    fn add_file(&mut self, name: &str, bytes: &[u8]) -> Result<(), AssemblerError> {
        // mcopy reads from a file, so stage the bytes in a tempfile first.
        let mut temp = tempfile::NamedTempFile::new().map_err(|source| AssemblerError::Io {
            path: PathBuf::from(name),
            source,
        })?;
        temp.write_all(bytes).map_err(|source| AssemblerError::Io {
            path: PathBuf::from(name),
            source,
        })?;

        let output = Command::new("mcopy")
            .arg("-i")
            .arg(&self.floppy)
            .arg("-o")
            .arg(temp.path())
            .arg(format!("::{name}"))
            .output()
            .map_err(AssemblerError::MtoolsMissing)?;

        if !output.status.success() {
            return Err(AssemblerError::MtoolsCopy {
                name: name.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_assembler_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut assembler = DirAssembler::new(dir.path().join("out"));

        assembler.add_file("REVERSI_DA.EXE", b"MZ contents").unwrap();

        let written = fs::read(dir.path().join("out/REVERSI_DA.EXE")).unwrap();
        assert_eq!(written, b"MZ contents");
    }

    #[test]
    fn test_dir_assembler_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut assembler = DirAssembler::new(dir.path());

        assembler.add_file("a.exe", b"first").unwrap();
        assembler.add_file("a.exe", b"second").unwrap();

        let written = fs::read(dir.path().join("a.exe")).unwrap();
        assert_eq!(written, b"second");
    }
}
