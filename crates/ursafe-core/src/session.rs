//! Vault session: the `Closed -> Unlocked -> Closed` state machine and
//! the one-shot operations an embedding shell calls.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;
use zeroize::Zeroizing;

use crate::container::{self, VaultLayout, URSAFE_DIR};
use crate::crypto::{self, VaultKey};
use crate::error::{Error, Result};
use crate::hostshare::HostShareStore;
use crate::logchain;
use crate::metadata::{Entries, Metadata};
use crate::shamir::{self, REQUIRED_SHARES, TOTAL_SHARES};
use crate::verify::{self, VerifyReason, VerifyReport};
use crate::IdentityProbe;

const SALT_SIZE: usize = 16;
const HOST_SECRET_SIZE: usize = 32;

enum State {
    Closed,
    Unlocked { key: VaultKey },
}

/// A vault session bound to one mount path, one identity probe and one
/// host share store. Holds the vault key only between a successful
/// unlock and the next save or lock.
pub struct VaultSession<P: IdentityProbe> {
    mount: PathBuf,
    probe: P,
    store: HostShareStore,
    state: State,
}

impl<P: IdentityProbe> VaultSession<P> {
    /// Session using the well-known per-OS host share directory.
    pub fn new(mount: impl Into<PathBuf>, probe: P) -> Self {
        Self::with_store(mount, probe, HostShareStore::system())
    }

    /// Session with an explicit host share store.
    pub fn with_store(mount: impl Into<PathBuf>, probe: P, store: HostShareStore) -> Self {
        VaultSession {
            mount: mount.into(),
            probe,
            store,
            state: State::Closed,
        }
    }

    pub fn mount(&self) -> &Path {
        &self.mount
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self.state, State::Unlocked { .. })
    }

    /// Run the verification protocol against this session's mount.
    pub fn verify(&self) -> VerifyReport {
        verify::verify(&self.mount, &self.probe)
    }

    /// Create a fresh vault on the medium. Fails if one already exists.
    pub fn initialize(&mut self, pin: &str) -> Result<()> {
        self.init_inner(pin, false)
    }

    /// Create a fresh vault, replacing an existing one. The caller is
    /// expected to have confirmed the overwrite with the user.
    pub fn initialize_overwrite(&mut self, pin: &str) -> Result<()> {
        self.init_inner(pin, true)
    }

    fn init_inner(&mut self, pin: &str, overwrite: bool) -> Result<()> {
        if !self.mount.is_dir() {
            return Err(Error::InvalidParameters(format!(
                "mount path does not exist: {}",
                self.mount.display()
            )));
        }
        let layout = VaultLayout::at(&self.mount);
        if layout.dir.exists() {
            if !overwrite {
                return Err(Error::AlreadyInitialized);
            }
            fs::remove_dir_all(&layout.dir).map_err(Error::medium)?;
        }
        fs::create_dir_all(&layout.dir).map_err(Error::medium)?;

        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let mut host_secret = Zeroizing::new([0u8; HOST_SECRET_SIZE]);
        OsRng.fill_bytes(host_secret.as_mut_slice());
        let fingerprint = self.probe.host_fingerprint();

        let shares = shamir::split(host_secret.as_slice(), TOTAL_SHARES, REQUIRED_SHARES)?;
        let (host_shares, usb_shares) = shares.split_at(REQUIRED_SHARES);
        self.store.save(host_shares)?;

        let metadata = Metadata {
            salt_hex: hex::encode(salt),
            usb_chunks_hex: usb_shares.iter().map(hex::encode).collect(),
            system_fingerprint_hex: hex::encode(fingerprint),
            usb_signature: Some(self.probe.volume_signature(&self.mount)),
            extra: Default::default(),
        };
        metadata.store(&layout.meta_file)?;

        let key = derive_vault_key(pin, &salt, host_secret.as_slice(), &fingerprint)?;
        let plaintext = serde_json::to_vec(&Entries::new())
            .map_err(|e| Error::InvalidParameters(e.to_string()))?;
        container::write_container(&layout.vault_file, &key, &plaintext)?;
        logchain::append_entry(&self.mount, "vault initialized", None)?;
        info!(mount = %self.mount.display(), "vault initialized");
        self.state = State::Closed;
        Ok(())
    }

    /// Unlock the vault and return the decrypted entries.
    ///
    /// A fingerprint mismatch is raised before any share is read or any
    /// decryption is attempted, so a non-bound host learns nothing about
    /// the PIN.
    pub fn unlock(&mut self, pin: &str) -> Result<Entries> {
        let layout = VaultLayout::at(&self.mount);
        let report = self.verify();
        if !report.valid {
            return Err(match report.reason {
                VerifyReason::MountMissing => Error::MissingArtifacts("mount path"),
                VerifyReason::VaultDirMissing => Error::MissingArtifacts(URSAFE_DIR),
                VerifyReason::ArtifactMissing(name) => Error::MissingArtifacts(name),
                VerifyReason::MetadataCorrupt(msg) => Error::MetadataCorrupt(msg),
                VerifyReason::CloneSuspected => Error::CloneSuspected,
                VerifyReason::Valid => unreachable!("invalid report with valid reason"),
            });
        }
        if report.system_match != Some(true) {
            return Err(Error::HardwareMismatch);
        }
        let metadata = report
            .metadata
            .ok_or_else(|| Error::MetadataCorrupt("metadata unavailable".into()))?;

        let salt = metadata.salt()?;
        let usb_shares = metadata.usb_chunks()?;
        let host_shares = self.store.load(REQUIRED_SHARES)?;
        if host_shares.len() < REQUIRED_SHARES {
            return Err(Error::MissingHostShares {
                found: host_shares.len(),
                required: REQUIRED_SHARES,
            });
        }

        // Deterministic selection: host shares first, then the medium's.
        let selected: Vec<Vec<u8>> = host_shares
            .iter()
            .chain(usb_shares.iter())
            .take(REQUIRED_SHARES)
            .cloned()
            .collect();
        let host_secret = Zeroizing::new(
            shamir::combine(&selected).map_err(|_| Error::WrongPinOrCorruptVault)?,
        );

        let fingerprint = self.probe.host_fingerprint();
        let key = derive_vault_key(pin, &salt, &host_secret, &fingerprint)?;
        let plaintext = container::read_container(&layout.vault_file, &key)?;
        let entries: Entries =
            serde_json::from_slice(&plaintext).map_err(|_| Error::WrongPinOrCorruptVault)?;

        logchain::append_entry(&self.mount, "vault unlocked", None)?;
        info!(mount = %self.mount.display(), entries = entries.len(), "vault unlocked");
        self.state = State::Unlocked { key };
        Ok(entries)
    }

    /// Re-encrypt `entries` under the session key with a fresh nonce and
    /// atomically replace the container. The session closes and the key
    /// is discarded whether or not the write succeeds.
    pub fn save(&mut self, entries: &Entries) -> Result<()> {
        let State::Unlocked { key } = &self.state else {
            return Err(Error::SessionClosed);
        };
        for (label, entry) in entries {
            if label.is_empty() || entry.label.is_empty() {
                return Err(Error::InvalidParameters(
                    "entry labels must not be empty".into(),
                ));
            }
        }
        let layout = VaultLayout::at(&self.mount);
        if !layout.dir.is_dir() {
            self.state = State::Closed;
            return Err(Error::MediumGone);
        }
        let plaintext = Zeroizing::new(
            serde_json::to_vec(entries).map_err(|e| Error::InvalidParameters(e.to_string()))?,
        );
        let written = container::write_container(&layout.vault_file, key, &plaintext)
            .and_then(|_| logchain::append_entry(&self.mount, "vault saved", None));
        self.state = State::Closed;
        written?;
        info!(mount = %self.mount.display(), entries = entries.len(), "vault saved");
        Ok(())
    }

    /// Discard the key without writing.
    pub fn lock(&mut self) -> Result<()> {
        if !self.is_unlocked() {
            return Err(Error::SessionClosed);
        }
        self.state = State::Closed;
        Ok(())
    }

    /// Remove the vault from the medium and the host shares. Requires a
    /// successful unlock first, which proves PIN knowledge.
    /// Non-recoverable.
    pub fn delete_all(&mut self, pin: &str) -> Result<()> {
        self.unlock(pin)?;
        self.state = State::Closed;
        let layout = VaultLayout::at(&self.mount);
        fs::remove_dir_all(&layout.dir).map_err(Error::medium)?;
        self.store.purge()?;
        info!(mount = %self.mount.display(), "vault deleted");
        Ok(())
    }
}

/// Vault key derivation. The KDF input is the ordered concatenation
/// `pin || salt || host_secret || fingerprint`, and the same salt is
/// passed as the Argon2 salt parameter; both sides of the format depend
/// on this exact assembly.
fn derive_vault_key(
    pin: &str,
    salt: &[u8],
    host_secret: &[u8],
    fingerprint: &[u8; 32],
) -> Result<VaultKey> {
    let mut material = Zeroizing::new(Vec::with_capacity(
        pin.len() + salt.len() + host_secret.len() + fingerprint.len(),
    ));
    material.extend_from_slice(pin.as_bytes());
    material.extend_from_slice(salt);
    material.extend_from_slice(host_secret);
    material.extend_from_slice(fingerprint);
    let derived = crypto::derive_key_argon2id(&material, salt)?;
    Ok(VaultKey::new(*derived))
}

/// Verify a mount without holding a session.
pub fn verify_mount<P: IdentityProbe>(mount: &Path, probe: &P) -> VerifyReport {
    verify::verify(mount, probe)
}

/// One-shot initialize against the system host share store.
pub fn initialize<P: IdentityProbe>(mount: &Path, pin: &str, probe: &P) -> Result<()> {
    VaultSession::new(mount, probe).initialize(pin)
}

/// One-shot unlock against the system host share store.
pub fn unlock<P: IdentityProbe>(mount: &Path, pin: &str, probe: &P) -> Result<Entries> {
    VaultSession::new(mount, probe).unlock(pin)
}

/// One-shot save: rederives the key from the PIN, then writes.
pub fn save<P: IdentityProbe>(
    mount: &Path,
    pin: &str,
    entries: &Entries,
    probe: &P,
) -> Result<()> {
    let mut session = VaultSession::new(mount, probe);
    session.unlock(pin)?;
    session.save(entries)
}

/// One-shot removal of the vault and its host shares.
pub fn delete_all<P: IdentityProbe>(mount: &Path, pin: &str, probe: &P) -> Result<()> {
    VaultSession::new(mount, probe).delete_all(pin)
}
