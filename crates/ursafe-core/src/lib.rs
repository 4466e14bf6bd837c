//! Core engine of the UR Safe removable vault.
//!
//! A vault opens only when four factors are presented together: the
//! removable medium, the user's PIN, the bound host's fingerprint and
//! the share files persisted on that host. This crate implements the
//! key-derivation pipeline, the Shamir-split host binding, the
//! authenticated container format, the hash-chained audit log and the
//! verification protocol gating access. The graphical shell and the
//! platform probes live outside; the engine consumes their results
//! through [`IdentityProbe`] and stays synchronous throughout.

pub mod container;
pub mod crypto;
pub mod error;
pub mod hostshare;
pub mod logchain;
pub mod metadata;
pub mod security;
pub mod session;
pub mod shamir;
pub mod verify;

use std::path::Path;

pub use container::{VaultLayout, LOG_FILE, META_FILE, URSAFE_DIR, VAULT_FILE};
pub use crypto::{SigningKey, VaultKey, VerifyingKey};
pub use error::{Error, Result};
pub use hostshare::{host_share_dir, HostShareStore};
pub use logchain::LogRecord;
pub use metadata::{Entries, Entry, Metadata};
pub use session::{delete_all, initialize, save, unlock, verify_mount, VaultSession};
pub use verify::{VerifyReason, VerifyReport};

/// Identity supplied by the embedding platform: a stable 32-byte host
/// fingerprint and a stable identifier string for a mounted volume. The
/// engine treats both as opaque.
pub trait IdentityProbe {
    fn host_fingerprint(&self) -> [u8; 32];
    fn volume_signature(&self, mount: &Path) -> String;
}

impl<T: IdentityProbe + ?Sized> IdentityProbe for &T {
    fn host_fingerprint(&self) -> [u8; 32] {
        (**self).host_fingerprint()
    }

    fn volume_signature(&self, mount: &Path) -> String {
        (**self).volume_signature(mount)
    }
}

/// Append an audit record to the chain on `mount`.
pub fn log_append(mount: &Path, action: &str, signing_key: Option<&SigningKey>) -> Result<()> {
    logchain::append_entry(mount, action, signing_key)
}

/// Whether the audit chain on `mount` verifies end to end.
pub fn log_verify(mount: &Path) -> bool {
    logchain::verify_chain(mount, None).is_ok()
}
