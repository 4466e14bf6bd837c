//! Persistence of host-side shares as obfuscated files.
//!
//! The store is intentionally dumb: it writes and reads opaque blobs and
//! enforces no integrity of its own. Corruption shows up as a downstream
//! authentication failure in the session.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::security;

const CHUNK_PREFIX: &str = ".c_";
const CHUNK_DIR: &str = ".ursafe_chunks";

/// Platform-appropriate private directory for host shares.
pub fn host_share_dir() -> PathBuf {
    #[cfg(windows)]
    {
        let root = std::env::var_os("ProgramData")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData"));
        root.join(CHUNK_DIR)
    }
    #[cfg(not(windows))]
    {
        Path::new("/var/lib").join(CHUNK_DIR)
    }
}

/// Host share store rooted at a private directory.
#[derive(Debug, Clone)]
pub struct HostShareStore {
    dir: PathBuf,
}

impl HostShareStore {
    /// Store at the well-known per-OS location.
    pub fn system() -> Self {
        HostShareStore {
            dir: host_share_dir(),
        }
    }

    /// Store rooted at an explicit directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        HostShareStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write each share to `.c_{i}` (1-based), creating the directory
    /// owner-private. Existing files with the same names are overwritten.
    pub fn save(&self, shares: &[Vec<u8>]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(Error::HostIo)?;
        security::set_private_dir_permissions(&self.dir).map_err(Error::HostIo)?;
        for (i, share) in shares.iter().enumerate() {
            let path = self.chunk_path(i + 1);
            fs::write(&path, share).map_err(Error::HostIo)?;
            security::set_secure_permissions(&path).map_err(Error::HostIo)?;
        }
        debug!(count = shares.len(), dir = %self.dir.display(), "saved host shares");
        Ok(())
    }

    /// Read `.c_1..=.c_count`, silently skipping missing files. Order is
    /// preserved.
    pub fn load(&self, count: usize) -> Result<Vec<Vec<u8>>> {
        let mut shares = Vec::new();
        if !self.dir.is_dir() {
            return Ok(shares);
        }
        for i in 1..=count {
            match fs::read(self.chunk_path(i)) {
                Ok(bytes) => shares.push(bytes),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::HostIo(e)),
            }
        }
        Ok(shares)
    }

    /// Remove the share directory and everything in it.
    pub fn purge(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::HostIo(e)),
        }
    }

    fn chunk_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{CHUNK_PREFIX}{index}"))
    }
}
