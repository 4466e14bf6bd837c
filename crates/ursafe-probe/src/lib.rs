//! Platform identity probes for the UR Safe engine.
//!
//! Produces the two opaque inputs the engine binds a vault to: a stable
//! 32-byte host fingerprint and a stable identifier string for a mounted
//! volume. Sources degrade gracefully (machine-id, then DMI product
//! UUID, then hostname-level fallbacks), so a vault created on a
//! fallback identifier stays openable as long as that identifier holds.
//! Hardware changes can lock a vault out by design.

use std::path::Path;

use sha2::{Digest, Sha256};
use ursafe_core::IdentityProbe;

/// Probe backed by the running system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl IdentityProbe for SystemProbe {
    fn host_fingerprint(&self) -> [u8; 32] {
        host_fingerprint()
    }

    fn volume_signature(&self, mount: &Path) -> String {
        volume_signature(mount)
    }
}

/// Stable fingerprint of this host: SHA-256 over `|`-joined platform
/// identifiers.
pub fn host_fingerprint() -> [u8; 32] {
    let mut parts: Vec<Vec<u8>> = vec![
        std::env::consts::OS.as_bytes().to_vec(),
        std::env::consts::ARCH.as_bytes().to_vec(),
    ];
    parts.extend(machine_identifiers());
    let joined = parts.join(&b"|"[..]);
    let mut fingerprint = [0u8; 32];
    fingerprint.copy_from_slice(&Sha256::digest(&joined));
    fingerprint
}

/// Stable identifier for the volume mounted at `mount`. Falls back to a
/// digest of the path itself when no platform lookup succeeds.
pub fn volume_signature(mount: &Path) -> String {
    platform_volume_id(mount).unwrap_or_else(|| {
        let digest = Sha256::digest(mount.to_string_lossy().as_bytes());
        format!("FALLBACK-{}", &hex::encode(digest)[..16])
    })
}

#[cfg(target_os = "linux")]
fn machine_identifiers() -> Vec<Vec<u8>> {
    for path in ["/etc/machine-id", "/sys/class/dmi/id/product_uuid"] {
        if let Ok(raw) = std::fs::read_to_string(path) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return vec![trimmed.as_bytes().to_vec()];
            }
        }
    }
    vec![hostname_fallback()]
}

#[cfg(target_os = "windows")]
fn machine_identifiers() -> Vec<Vec<u8>> {
    let mut parts = Vec::new();
    if let Some(id) = wmic_value("cpu", "ProcessorId") {
        parts.push(id.into_bytes());
    }
    if let Some(serial) = wmic_value("baseboard", "SerialNumber") {
        parts.push(serial.into_bytes());
    }
    if parts.is_empty() {
        parts.push(
            std::env::var("USERNAME")
                .unwrap_or_else(|_| "unknown".into())
                .into_bytes(),
        );
    }
    parts
}

#[cfg(target_os = "macos")]
fn machine_identifiers() -> Vec<Vec<u8>> {
    if let Some(uuid) = hardware_uuid() {
        return vec![uuid.into_bytes()];
    }
    vec![hostname_fallback()]
}

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
fn machine_identifiers() -> Vec<Vec<u8>> {
    vec![hostname_fallback()]
}

#[allow(dead_code)]
fn hostname_fallback() -> Vec<u8> {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "unknown-host".into())
        .into_bytes()
}

#[cfg(target_os = "windows")]
fn wmic_value(component: &str, field: &str) -> Option<String> {
    let output = std::process::Command::new("wmic")
        .args([component, "get", field, "/value"])
        .output()
        .ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines().find_map(|line| {
        let (key, value) = line.trim().split_once('=')?;
        if key.eq_ignore_ascii_case(field) {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

#[cfg(target_os = "macos")]
fn hardware_uuid() -> Option<String> {
    let output = std::process::Command::new("system_profiler")
        .arg("SPHardwareDataType")
        .output()
        .ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() == "Hardware UUID" {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

#[cfg(target_os = "linux")]
fn platform_volume_id(mount: &Path) -> Option<String> {
    let output = std::process::Command::new("blkid")
        .args(["-s", "UUID", "-o", "value"])
        .arg(mount)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let uuid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!uuid.is_empty()).then(|| format!("LINUX-{uuid}"))
}

#[cfg(target_os = "macos")]
fn platform_volume_id(mount: &Path) -> Option<String> {
    let output = std::process::Command::new("diskutil")
        .arg("info")
        .arg(mount)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() == "Volume UUID" {
            let value = value.trim();
            (!value.is_empty()).then(|| format!("MAC-{value}"))
        } else {
            None
        }
    })
}

#[cfg(target_os = "windows")]
fn platform_volume_id(mount: &Path) -> Option<String> {
    let drive: String = mount.to_string_lossy().chars().take(2).collect();
    if !drive.ends_with(':') {
        return None;
    }
    let output = std::process::Command::new("cmd")
        .args(["/C", "vol", &drive])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .find(|line| line.contains("Serial Number"))
        .and_then(|line| line.rsplit(' ').next())
        .map(|serial| format!("WIN-{}", serial.trim()))
}

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
fn platform_volume_id(_mount: &Path) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        let first = host_fingerprint();
        let second = host_fingerprint();
        assert_eq!(first, second);
    }

    #[test]
    fn volume_signature_is_stable_and_nonempty() {
        let mount = Path::new("/tmp/does-not-need-to-exist");
        let first = volume_signature(mount);
        let second = volume_signature(mount);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn different_paths_fall_back_to_different_signatures() {
        let a = volume_signature(Path::new("/mnt/one"));
        let b = volume_signature(Path::new("/mnt/two"));
        assert_ne!(a, b);
    }
}
