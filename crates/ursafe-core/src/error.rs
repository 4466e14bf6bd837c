use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the vault engine.
///
/// Wrong-PIN and tampered-ciphertext conditions are folded into a single
/// kind; callers must not be able to tell them apart.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid key size: expected {expected} bytes, got {got}")]
    InvalidKeySize { expected: usize, got: usize },

    #[error("invalid nonce size: expected {expected} bytes, got {got}")]
    InvalidNonceSize { expected: usize, got: usize },

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("host share store I/O failed: {0}")]
    HostIo(#[source] io::Error),

    #[error("removable medium I/O failed: {0}")]
    MediumIo(#[source] io::Error),

    #[error("missing vault artifact: {0}")]
    MissingArtifacts(&'static str),

    #[error("vault metadata corrupt: {0}")]
    MetadataCorrupt(String),

    #[error("hardware changed: this vault is bound to a different computer")]
    HardwareMismatch,

    #[error("volume signature mismatch, possible clone")]
    CloneSuspected,

    #[error("only {found} of {required} host shares could be loaded")]
    MissingHostShares { found: usize, required: usize },

    #[error("wrong PIN or corrupt vault")]
    WrongPinOrCorruptVault,

    #[error("log chain broken at entry {index}: prev_hash mismatch")]
    ChainBroken { index: usize },

    #[error("log entry {index} is corrupt")]
    EntryCorrupt { index: usize },

    #[error("log entry {index} carries an invalid signature")]
    SignatureInvalid { index: usize },

    #[error("removable medium disappeared mid-operation")]
    MediumGone,

    #[error("a vault already exists on this medium")]
    AlreadyInitialized,

    #[error("session is not unlocked")]
    SessionClosed,
}

impl Error {
    /// Wrap a medium-side I/O failure. A path that vanished after the
    /// vault was seen present means the medium itself went away.
    pub(crate) fn medium(e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::NotFound {
            Error::MediumGone
        } else {
            Error::MediumIo(e)
        }
    }
}
