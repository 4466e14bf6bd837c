//! The on-medium metadata descriptor and the plaintext entry model.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Descriptor stored as `.ursafe/meta.json` on the removable medium.
///
/// Unknown fields are preserved across load/store so newer writers can
/// extend the format without this reader destroying their data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// 16-byte random salt, hex.
    pub salt_hex: String,
    /// The medium-resident half of the split host secret, hex per share.
    pub usb_chunks_hex: Vec<String>,
    /// 32-byte host fingerprint captured at init, hex.
    pub system_fingerprint_hex: String,
    /// Stable volume identifier captured at init, if the probe had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usb_signature: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(Error::medium)?;
        serde_json::from_str(&raw).map_err(|e| Error::MetadataCorrupt(e.to_string()))
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        let raw =
            serde_json::to_string(self).map_err(|e| Error::MetadataCorrupt(e.to_string()))?;
        fs::write(path, raw).map_err(Error::medium)
    }

    pub fn salt(&self) -> Result<Vec<u8>> {
        decode_hex("salt_hex", &self.salt_hex)
    }

    pub fn usb_chunks(&self) -> Result<Vec<Vec<u8>>> {
        self.usb_chunks_hex
            .iter()
            .map(|chunk| decode_hex("usb_chunks_hex", chunk))
            .collect()
    }

    pub fn fingerprint(&self) -> Result<[u8; 32]> {
        let bytes = decode_hex("system_fingerprint_hex", &self.system_fingerprint_hex)?;
        bytes.try_into().map_err(|_| {
            Error::MetadataCorrupt("system_fingerprint_hex must decode to 32 bytes".into())
        })
    }
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| Error::MetadataCorrupt(format!("{field}: {e}")))
}

/// One labeled credential entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub label: String,
    pub username: String,
    pub password: String,
}

/// The decrypted vault payload: entries keyed by label.
pub type Entries = BTreeMap<String, Entry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata {
            salt_hex: hex::encode([1u8; 16]),
            usb_chunks_hex: vec![hex::encode([2u8; 33]); 10],
            system_fingerprint_hex: hex::encode([3u8; 32]),
            usb_signature: Some("LINUX-1234".into()),
            extra: Map::new(),
        }
    }

    #[test]
    fn typed_accessors_decode() {
        let meta = sample();
        assert_eq!(meta.salt().unwrap(), vec![1u8; 16]);
        assert_eq!(meta.usb_chunks().unwrap().len(), 10);
        assert_eq!(meta.fingerprint().unwrap(), [3u8; 32]);
    }

    #[test]
    fn bad_hex_is_metadata_corrupt() {
        let mut meta = sample();
        meta.salt_hex = "not-hex".into();
        assert!(matches!(meta.salt(), Err(Error::MetadataCorrupt(_))));

        let mut meta = sample();
        meta.system_fingerprint_hex = hex::encode([3u8; 16]);
        assert!(matches!(meta.fingerprint(), Err(Error::MetadataCorrupt(_))));
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = r#"{
            "salt_hex": "00112233445566778899aabbccddeeff",
            "usb_chunks_hex": ["0102"],
            "system_fingerprint_hex": "0000000000000000000000000000000000000000000000000000000000000000",
            "format_hint": "v3",
            "nested": {"keep": true}
        }"#;
        let meta: Metadata = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.extra.get("format_hint").unwrap(), "v3");

        let rewritten = serde_json::to_string(&meta).unwrap();
        let reparsed: Metadata = serde_json::from_str(&rewritten).unwrap();
        assert_eq!(reparsed.extra.get("format_hint").unwrap(), "v3");
        assert!(reparsed.extra.contains_key("nested"));
    }

    #[test]
    fn missing_required_field_fails_parse() {
        let raw = r#"{"salt_hex": "00", "usb_chunks_hex": []}"#;
        assert!(serde_json::from_str::<Metadata>(raw).is_err());
    }
}
