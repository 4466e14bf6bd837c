//! Crypto primitives: AES-256-GCM, Argon2id, Ed25519 and SHA-256.
//!
//! Pure functions over byte slices with no hidden state. Sizes are
//! checked at the boundary; callers never reach the cipher with a bad
//! key or nonce.

use aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use ed25519_dalek::{Signature, Signer, Verifier};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

pub use ed25519_dalek::{SigningKey, VerifyingKey};

use crate::error::{Error, Result};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;

const ARGON2_M_COST_KIB: u32 = 65536;
const ARGON2_T_COST: u32 = 2;
const ARGON2_LANES: u32 = 2;

/// Symmetric vault key material. Exists only in process memory, is wiped
/// on drop and is never serialized.
pub struct VaultKey(Secret<[u8; KEY_SIZE]>);

impl VaultKey {
    pub(crate) fn new(bytes: [u8; KEY_SIZE]) -> Self {
        VaultKey(Secret::new(bytes))
    }

    /// Borrow the raw key bytes for an AEAD call.
    pub fn expose(&self) -> &[u8; KEY_SIZE] {
        self.0.expose_secret()
    }
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|_| Error::InvalidKeySize {
        expected: KEY_SIZE,
        got: key.len(),
    })
}

/// Encrypt under AES-256-GCM with a freshly random 12-byte nonce and no
/// associated data. Returns `(nonce, ciphertext_with_tag)`.
pub fn aead_encrypt(key: &[u8], plaintext: &[u8]) -> Result<([u8; NONCE_SIZE], Vec<u8>)> {
    let cipher = cipher_for(key)?;
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::InvalidParameters("AEAD encryption failed".into()))?;
    Ok((nonce, ciphertext))
}

/// Decrypt AES-256-GCM. Fails with [`Error::DecryptionFailed`] on tag
/// mismatch, key mismatch or truncation.
pub fn aead_decrypt(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = cipher_for(key)?;
    if nonce.len() != NONCE_SIZE {
        return Err(Error::InvalidNonceSize {
            expected: NONCE_SIZE,
            got: nonce.len(),
        });
    }
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::DecryptionFailed)?;
    Ok(Zeroizing::new(plaintext))
}

/// Argon2id with the engine's fixed cost parameters (t=2, m=64 MiB,
/// p=2), 32-byte output. The salt is used as supplied.
pub fn derive_key_argon2id(material: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let params = Params::new(ARGON2_M_COST_KIB, ARGON2_T_COST, ARGON2_LANES, Some(KEY_SIZE))
        .map_err(|e| Error::InvalidParameters(format!("argon2 params: {e}")))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    argon
        .hash_password_into(material, salt, out.as_mut_slice())
        .map_err(|e| Error::InvalidParameters(format!("argon2 derive: {e}")))?;
    Ok(out)
}

/// Generate a fresh Ed25519 keypair.
pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let signing = SigningKey::generate(&mut OsRng);
    let verifying = signing.verifying_key();
    (signing, verifying)
}

/// Detached Ed25519 signature over `data`.
pub fn sign(key: &SigningKey, data: &[u8]) -> [u8; 64] {
    key.sign(data).to_bytes()
}

/// Boolean signature check; malformed signatures are simply invalid.
pub fn verify(key: &VerifyingKey, signature: &[u8], data: &[u8]) -> bool {
    match Signature::from_slice(signature) {
        Ok(sig) => key.verify(data, &sig).is_ok(),
        Err(_) => false,
    }
}

/// SHA-256 digest as raw bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::digest(data));
    digest
}
