//! Authenticated encryption of node payloads.
//!
//! Payloads are sealed with AES-256-GCM under a caller-supplied [`Key`].
//! A [`SealedPayload`] is self-contained: it is the lowercase hex encoding of
//! `nonce ‖ ciphertext ‖ tag`, so nothing besides the key is needed to open it.
//!
//! There is no process-wide cipher state; every call takes the key
//! explicitly.
//!
//! # Example
//!
//! ```
//! use sealdb_core::cipher::{open, seal, Key};
//!
//! let key = Key::generate();
//! let sealed = seal(b"coordinates", &key).unwrap();
//! assert_eq!(open(&sealed, &key).unwrap(), b"coordinates");
//! ```

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Length of the symmetric key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the GCM nonce prepended to every sealed payload.
pub const NONCE_LEN: usize = 12;

/// Length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// A 256-bit symmetric key.
///
/// The key bytes never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Wraps raw key bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Derives a key from externally provisioned root material by truncating
    /// it to [`KEY_LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if fewer than [`KEY_LEN`] bytes are supplied.
    pub fn from_material(material: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = material
            .get(..KEY_LEN)
            .and_then(|head| head.try_into().ok())
            .ok_or_else(|| {
                Error::Crypto(format!(
                    "key material too short: need {} bytes, got {}",
                    KEY_LEN,
                    material.len()
                ))
            })?;
        Ok(Self(bytes))
    }

    /// Generates a fresh random key from the operating system's CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(<redacted>)")
    }
}

/// An encrypted, authenticated payload encoded as hex text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedPayload(String);

impl SealedPayload {
    /// Wraps hex text previously produced by [`seal`].
    ///
    /// The text is not validated here; [`open`] rejects malformed input.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the hex text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the hex text in characters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the payload text is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the payload and returns the hex text.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SealedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encrypts `plaintext` under `key` with a fresh random nonce.
///
/// Sealing the same plaintext twice yields different payloads.
pub fn seal(plaintext: &[u8], key: &Key) -> Result<SealedPayload> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| Error::Crypto(format!("nonce generation failed: {}", e)))?;

    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::Crypto("encryption failed".into()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(SealedPayload(hex::encode(blob)))
}

/// Decrypts and authenticates a payload produced by [`seal`].
///
/// # Errors
///
/// Returns [`Error::Crypto`] if the text is not valid hex, if the decoded
/// blob is shorter than the nonce, or if authentication fails because the
/// payload was tampered with or the key is wrong. No plaintext is returned
/// on failure.
pub fn open(sealed: &SealedPayload, key: &Key) -> Result<Vec<u8>> {
    let blob = hex::decode(&sealed.0)
        .map_err(|e| Error::Crypto(format!("malformed payload: {}", e)))?;

    if blob.len() < NONCE_LEN {
        return Err(Error::Crypto(format!(
            "payload too short: {} bytes, nonce alone is {}",
            blob.len(),
            NONCE_LEN
        )));
    }

    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Crypto("authentication failed".into()))
}

/// Seals a coordinate list as consecutive little-endian `f32` values.
pub fn seal_coordinates(coords: &[f32], key: &Key) -> Result<SealedPayload> {
    let plaintext: Vec<u8> = coords.iter().flat_map(|c| c.to_le_bytes()).collect();
    seal(&plaintext, key)
}

/// Opens a payload produced by [`seal_coordinates`].
pub fn open_coordinates(sealed: &SealedPayload, key: &Key) -> Result<Vec<f32>> {
    let plaintext = open(sealed, key)?;
    if plaintext.len() % 4 != 0 {
        return Err(Error::Crypto(format!(
            "coordinate payload length {} is not a multiple of 4",
            plaintext.len()
        )));
    }
    Ok(plaintext
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
