//! Mount verification: decide whether a path holds a valid vault bound
//! to this host, without touching key material.

use std::fmt;
use std::path::Path;

use crate::container::{VaultLayout, META_FILE, VAULT_FILE};
use crate::metadata::Metadata;
use crate::security::constant_time_eq;
use crate::IdentityProbe;

/// Why a mount failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyReason {
    Valid,
    MountMissing,
    VaultDirMissing,
    ArtifactMissing(&'static str),
    MetadataCorrupt(String),
    CloneSuspected,
}

impl fmt::Display for VerifyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyReason::Valid => write!(f, "valid vault"),
            VerifyReason::MountMissing => write!(f, "mount path is not a directory"),
            VerifyReason::VaultDirMissing => write!(f, "no vault directory on this medium"),
            VerifyReason::ArtifactMissing(name) => write!(f, "missing required file: {name}"),
            VerifyReason::MetadataCorrupt(msg) => write!(f, "invalid metadata: {msg}"),
            VerifyReason::CloneSuspected => {
                write!(f, "volume signature mismatch, possible clone")
            }
        }
    }
}

/// Structured verification outcome.
///
/// A fingerprint mismatch is reported through `system_match`, not as a
/// failure; the session turns it into a hard block at unlock time.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub valid: bool,
    pub reason: VerifyReason,
    pub system_match: Option<bool>,
    pub usb_signature: Option<String>,
    pub metadata: Option<Metadata>,
}

impl VerifyReport {
    fn invalid(reason: VerifyReason) -> Self {
        VerifyReport {
            valid: false,
            reason,
            system_match: None,
            usb_signature: None,
            metadata: None,
        }
    }
}

/// Check a mount for a valid vault, short-circuiting on the first
/// failed step.
pub fn verify<P: IdentityProbe + ?Sized>(mount: &Path, probe: &P) -> VerifyReport {
    if !mount.is_dir() {
        return VerifyReport::invalid(VerifyReason::MountMissing);
    }
    let layout = VaultLayout::at(mount);
    if !layout.dir.is_dir() {
        return VerifyReport::invalid(VerifyReason::VaultDirMissing);
    }
    if !layout.vault_file.is_file() {
        return VerifyReport::invalid(VerifyReason::ArtifactMissing(VAULT_FILE));
    }
    if !layout.meta_file.is_file() {
        return VerifyReport::invalid(VerifyReason::ArtifactMissing(META_FILE));
    }
    let metadata = match Metadata::load(&layout.meta_file) {
        Ok(metadata) => metadata,
        Err(e) => return VerifyReport::invalid(VerifyReason::MetadataCorrupt(e.to_string())),
    };
    let stored_fingerprint = match metadata.fingerprint() {
        Ok(fingerprint) => fingerprint,
        Err(e) => return VerifyReport::invalid(VerifyReason::MetadataCorrupt(e.to_string())),
    };

    let usb_signature = probe.volume_signature(mount);
    if let Some(stored) = &metadata.usb_signature {
        if *stored != usb_signature {
            return VerifyReport {
                valid: false,
                reason: VerifyReason::CloneSuspected,
                system_match: None,
                usb_signature: Some(usb_signature),
                metadata: Some(metadata),
            };
        }
    }

    let system_match = constant_time_eq(&stored_fingerprint, &probe.host_fingerprint());
    VerifyReport {
        valid: true,
        reason: VerifyReason::Valid,
        system_match: Some(system_match),
        usb_signature: Some(usb_signature),
        metadata: Some(metadata),
    }
}
