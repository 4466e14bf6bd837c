//! Tamper-evident audit log: one JSON record per line, hash-chained.
//!
//! `prev_hash` commits to the previous line exactly as written, its own
//! `current_hash` and `signature` included; append and verify must use
//! the same textual convention or chains never round-trip.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::container::{VaultLayout, URSAFE_DIR};
use crate::crypto::{self, SigningKey, VerifyingKey};
use crate::error::{Error, Result};

pub const GENESIS: &str = "genesis";
pub const UNSIGNED: &str = "unsigned";

/// One audit record, serialized as a single LF-terminated line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub action: String,
    pub prev_hash: String,
    pub signature: String,
    pub current_hash: String,
}

impl LogRecord {
    /// Canonical serialization for hashing and signing: the record minus
    /// `signature` and `current_hash`, sorted keys, compact separators.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut fields = BTreeMap::new();
        fields.insert("action", self.action.as_str());
        fields.insert("prev_hash", self.prev_hash.as_str());
        fields.insert("timestamp", self.timestamp.as_str());
        serde_json::to_vec(&fields).expect("string map serializes")
    }
}

/// Hex SHA-256 of the last non-empty line, or `"genesis"`.
fn previous_hash(log_file: &Path) -> Result<String> {
    let raw = match fs::read_to_string(log_file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(GENESIS.to_owned()),
        Err(e) => return Err(Error::medium(e)),
    };
    Ok(raw
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| hex::encode(crypto::sha256(line.as_bytes())))
        .unwrap_or_else(|| GENESIS.to_owned()))
}

/// Append an audit record for `action`, chaining it to the last line.
pub fn append_entry(mount: &Path, action: &str, signing_key: Option<&SigningKey>) -> Result<()> {
    let layout = VaultLayout::at(mount);
    if !layout.dir.is_dir() {
        return Err(Error::MissingArtifacts(URSAFE_DIR));
    }
    let mut record = LogRecord {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        action: action.to_owned(),
        prev_hash: previous_hash(&layout.log_file)?,
        signature: UNSIGNED.to_owned(),
        current_hash: String::new(),
    };
    let canonical = record.canonical_bytes();
    record.current_hash = hex::encode(crypto::sha256(&canonical));
    if let Some(key) = signing_key {
        record.signature = hex::encode(crypto::sign(key, &canonical));
    }
    let line =
        serde_json::to_string(&record).map_err(|e| Error::InvalidParameters(e.to_string()))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&layout.log_file)
        .map_err(Error::medium)?;
    file.write_all(line.as_bytes()).map_err(Error::medium)?;
    file.write_all(b"\n").map_err(Error::medium)?;
    Ok(())
}

/// Walk the chain and return the number of verified records.
///
/// An absent or empty log is a valid chain of length zero. With a
/// verifying key, signed records are checked; unsigned records pass.
pub fn verify_chain(mount: &Path, verifying_key: Option<&VerifyingKey>) -> Result<usize> {
    let layout = VaultLayout::at(mount);
    let raw = match fs::read_to_string(&layout.log_file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::medium(e)),
    };
    let mut expected_prev = GENESIS.to_owned();
    let mut verified = 0usize;
    for (index, line) in raw.lines().filter(|l| !l.trim().is_empty()).enumerate() {
        let record: LogRecord =
            serde_json::from_str(line).map_err(|_| Error::EntryCorrupt { index })?;
        if record.prev_hash != expected_prev {
            return Err(Error::ChainBroken { index });
        }
        let canonical = record.canonical_bytes();
        if record.current_hash != hex::encode(crypto::sha256(&canonical)) {
            return Err(Error::EntryCorrupt { index });
        }
        if record.signature != UNSIGNED {
            if let Some(key) = verifying_key {
                let signature = hex::decode(&record.signature)
                    .map_err(|_| Error::SignatureInvalid { index })?;
                if !crypto::verify(key, &signature, &canonical) {
                    return Err(Error::SignatureInvalid { index });
                }
            }
        }
        expected_prev = hex::encode(crypto::sha256(line.as_bytes()));
        verified += 1;
    }
    Ok(verified)
}

/// Parse every record in the chain without verifying it.
pub fn read_entries(mount: &Path) -> Result<Vec<LogRecord>> {
    let layout = VaultLayout::at(mount);
    let raw = match fs::read_to_string(&layout.log_file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::medium(e)),
    };
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|_| Error::EntryCorrupt { index })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mount_with_vault_dir() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(URSAFE_DIR)).unwrap();
        dir
    }

    #[test]
    fn chain_builds_and_verifies() {
        let mount = mount_with_vault_dir();
        append_entry(mount.path(), "vault initialized", None).unwrap();
        append_entry(mount.path(), "vault unlocked", None).unwrap();
        append_entry(mount.path(), "entry added", None).unwrap();

        assert_eq!(verify_chain(mount.path(), None).unwrap(), 3);

        let entries = read_entries(mount.path()).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].action, "vault initialized");
        assert_eq!(entries[0].prev_hash, GENESIS);
        assert_eq!(entries[0].signature, UNSIGNED);
        assert_ne!(entries[1].prev_hash, GENESIS);
    }

    #[test]
    fn prev_hash_commits_to_the_whole_line() {
        let mount = mount_with_vault_dir();
        append_entry(mount.path(), "first", None).unwrap();
        append_entry(mount.path(), "second", None).unwrap();

        let layout = VaultLayout::at(mount.path());
        let raw = fs::read_to_string(&layout.log_file).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        let entries = read_entries(mount.path()).unwrap();
        assert_eq!(
            entries[1].prev_hash,
            hex::encode(crypto::sha256(lines[0].as_bytes()))
        );
        // The line hash covers current_hash too, so it differs from the
        // record's own canonical hash.
        assert_ne!(entries[1].prev_hash, entries[0].current_hash);
    }

    #[test]
    fn tampered_action_is_reported_at_its_index() {
        let mount = mount_with_vault_dir();
        append_entry(mount.path(), "first", None).unwrap();
        append_entry(mount.path(), "second", None).unwrap();
        append_entry(mount.path(), "third", None).unwrap();

        let layout = VaultLayout::at(mount.path());
        let raw = fs::read_to_string(&layout.log_file).unwrap();
        let tampered = raw.replacen("second", "seconD", 1);
        assert_ne!(raw, tampered);
        fs::write(&layout.log_file, tampered).unwrap();

        assert!(matches!(
            verify_chain(mount.path(), None),
            Err(Error::EntryCorrupt { index: 1 })
        ));
    }

    #[test]
    fn removed_line_breaks_the_chain() {
        let mount = mount_with_vault_dir();
        append_entry(mount.path(), "first", None).unwrap();
        append_entry(mount.path(), "second", None).unwrap();
        append_entry(mount.path(), "third", None).unwrap();

        let layout = VaultLayout::at(mount.path());
        let raw = fs::read_to_string(&layout.log_file).unwrap();
        let without_middle: String = raw
            .lines()
            .enumerate()
            .filter(|(i, _)| *i != 1)
            .map(|(_, l)| format!("{l}\n"))
            .collect();
        fs::write(&layout.log_file, without_middle).unwrap();

        assert!(matches!(
            verify_chain(mount.path(), None),
            Err(Error::ChainBroken { index: 1 })
        ));
    }

    #[test]
    fn signed_records_verify_and_reject_the_wrong_key() {
        let mount = mount_with_vault_dir();
        let (signing, verifying) = crypto::generate_keypair();
        append_entry(mount.path(), "signed action", Some(&signing)).unwrap();

        assert_eq!(verify_chain(mount.path(), Some(&verifying)).unwrap(), 1);
        // Without a key, signed records still chain-verify.
        assert_eq!(verify_chain(mount.path(), None).unwrap(), 1);

        let (_, other) = crypto::generate_keypair();
        assert!(matches!(
            verify_chain(mount.path(), Some(&other)),
            Err(Error::SignatureInvalid { index: 0 })
        ));
    }

    #[test]
    fn empty_log_is_valid() {
        let mount = mount_with_vault_dir();
        assert_eq!(verify_chain(mount.path(), None).unwrap(), 0);
        assert!(read_entries(mount.path()).unwrap().is_empty());
    }
}
