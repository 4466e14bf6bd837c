//! The encrypted vault container and the on-medium layout.
//!
//! The container file is exactly `12-byte nonce || ciphertext+tag` with
//! no header or version byte; readers take the first 12 bytes and hand
//! the remainder to the AEAD.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use crate::crypto::{self, VaultKey, NONCE_SIZE};
use crate::error::{Error, Result};
use crate::security;

pub const URSAFE_DIR: &str = ".ursafe";
pub const VAULT_FILE: &str = "vault.enc";
pub const META_FILE: &str = "meta.json";
pub const LOG_FILE: &str = "logchain.json";

/// Resolved paths for one mounted vault.
#[derive(Debug, Clone)]
pub struct VaultLayout {
    pub mount: PathBuf,
    pub dir: PathBuf,
    pub vault_file: PathBuf,
    pub meta_file: PathBuf,
    pub log_file: PathBuf,
}

impl VaultLayout {
    pub fn at(mount: &Path) -> Self {
        let dir = mount.join(URSAFE_DIR);
        VaultLayout {
            mount: mount.to_path_buf(),
            vault_file: dir.join(VAULT_FILE),
            meta_file: dir.join(META_FILE),
            log_file: dir.join(LOG_FILE),
            dir,
        }
    }
}

/// Encrypt `plaintext` and atomically replace the container file:
/// write to a temp file in the same directory, fsync, then rename.
pub fn write_container(path: &Path, key: &VaultKey, plaintext: &[u8]) -> Result<()> {
    let (nonce, ciphertext) = crypto::aead_encrypt(key.expose(), plaintext)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(Error::medium)?;
    security::set_secure_permissions(tmp.path()).map_err(Error::medium)?;
    tmp.write_all(&nonce).map_err(Error::medium)?;
    tmp.write_all(&ciphertext).map_err(Error::medium)?;
    tmp.as_file_mut().sync_all().map_err(Error::medium)?;
    tmp.persist(path).map_err(|e| Error::medium(e.error))?;
    Ok(())
}

/// Read and decrypt the container.
///
/// Any authentication failure, truncation included, surfaces as
/// [`Error::WrongPinOrCorruptVault`]; the cause is deliberately not
/// distinguishable.
pub fn read_container(path: &Path, key: &VaultKey) -> Result<Zeroizing<Vec<u8>>> {
    let raw = fs::read(path).map_err(Error::medium)?;
    if raw.len() < NONCE_SIZE {
        return Err(Error::WrongPinOrCorruptVault);
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
    crypto::aead_decrypt(key.expose(), nonce, ciphertext).map_err(|e| match e {
        Error::DecryptionFailed => Error::WrongPinOrCorruptVault,
        other => other,
    })
}
