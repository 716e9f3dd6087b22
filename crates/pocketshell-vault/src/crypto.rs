//! AES-256-GCM primitives and key types, built on the `ring` crate.
//!
//! This module provides the building blocks that [`wrap`](crate::wrap) and
//! [`entry`](crate::entry) compose:
//!
//! - **Sealing/opening**: AES-256-GCM authenticated encryption with a freshly
//!   generated 96-bit nonce per call.
//! - **Key types**: [`Dek`] (the data encryption key) and [`Kek`] (a key
//!   encryption key). Both hold their bytes in zeroize-on-drop buffers and
//!   never print them.
//! - **Random generation**: cryptographically secure random bytes via `ring`.
//!
//! # Security Notes
//!
//! - Nonces are random per encryption. With a 96-bit nonce the probability of
//!   a collision is negligible for up to ~2^32 encryptions under one key.
//! - Every open failure is reported as [`VaultError::AuthFailure`] with no
//!   further detail, whether the key was wrong or the data was modified.

use std::fmt;

use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

/// Length of an AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// AES-256-GCM algorithm from `ring`.
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Key types
// ---------------------------------------------------------------------------

/// The data encryption key: a random 256-bit key that encrypts every vault
/// entry.
///
/// A `Dek` is never serialized. The only durable copies are
/// [`WrappedKey`](crate::wrap::WrappedKey)s.
#[derive(Clone)]
pub struct Dek(Zeroizing<[u8; KEY_LEN]>);

impl Dek {
    /// Generate a fresh random key.
    pub fn generate() -> Result<Self> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        fill_random(&mut key[..])?;
        Ok(Self(key))
    }

    /// Import raw key bytes (e.g. a legacy key or an unwrapped key).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Corrupt`] if `bytes` is not exactly
    /// [`KEY_LEN`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(VaultError::Corrupt {
                reason: format!("key must be {KEY_LEN} bytes, got {}", bytes.len()),
            });
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for Dek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dek(<redacted>)")
    }
}

/// A key encryption key, used only to wrap and unwrap a [`Dek`].
pub struct Kek(Zeroizing<[u8; KEY_LEN]>);

impl Kek {
    pub(crate) fn from_array(key: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for Kek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Kek(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A single-use nonce sequence that yields exactly one nonce and then errors.
///
/// `ring` requires a [`NonceSequence`] for sealing and opening keys. Each
/// bound key here is used for exactly one operation.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` with AES-256-GCM under the 256-bit `key`.
///
/// Returns `(nonce, ciphertext)` where `nonce` is a freshly generated 96-bit
/// value and `ciphertext` has the 128-bit tag appended.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if nonce generation or sealing fails.
pub fn encrypt(plaintext: &[u8], key: &[u8; KEY_LEN]) -> Result<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    fill_random(&mut nonce_bytes)?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::Crypto {
        reason: "failed to create AES-256-GCM key".into(),
    })?;

    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::Crypto {
            reason: "seal_in_place failed".into(),
        })?;

    tracing::trace!(
        plaintext_len = plaintext.len(),
        ciphertext_len = in_out.len(),
        "encrypted data"
    );

    Ok((nonce_bytes, in_out))
}

/// Decrypt `ciphertext` (tag included) with the given `nonce` and `key`.
///
/// The plaintext is returned in a zeroize-on-drop buffer.
///
/// # Errors
///
/// Returns [`VaultError::AuthFailure`] for every failure: wrong nonce length,
/// wrong key, modified ciphertext or nonce.
pub fn decrypt(nonce: &[u8], ciphertext: &[u8], key: &[u8; KEY_LEN]) -> Result<Zeroizing<Vec<u8>>> {
    let nonce: [u8; NONCE_LEN_BYTES] = nonce.try_into().map_err(|_| VaultError::AuthFailure)?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::AuthFailure)?;
    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce));

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = opening_key
        .open_in_place(Aad::empty(), &mut in_out[..])
        .map_err(|_| VaultError::AuthFailure)?
        .len();
    in_out.truncate(plaintext_len);

    tracing::trace!(
        ciphertext_len = ciphertext.len(),
        plaintext_len,
        "decrypted data"
    );

    Ok(in_out)
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Fill `buf` with cryptographically secure random bytes.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if the system CSPRNG fails.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| VaultError::Crypto {
            reason: "failed to generate random bytes".into(),
        })
}

/// Generate `len` cryptographically secure random bytes.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    fill_random(&mut buf)?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = Dek::generate().unwrap();
        let plaintext = b"ssh-ed25519 AAAA...";

        let (nonce, ciphertext) = encrypt(plaintext, key.as_bytes()).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_LEN);

        let decrypted = decrypt(&nonce, &ciphertext, key.as_bytes()).unwrap();
        assert_eq!(decrypted.as_slice(), plaintext);
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let key = Dek::generate().unwrap();
        let (n1, c1) = encrypt(b"same", key.as_bytes()).unwrap();
        let (n2, c2) = encrypt(b"same", key.as_bytes()).unwrap();
        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let key1 = Dek::generate().unwrap();
        let key2 = Dek::generate().unwrap();

        let (nonce, ciphertext) = encrypt(b"secret data", key1.as_bytes()).unwrap();
        let result = decrypt(&nonce, &ciphertext, key2.as_bytes());

        assert!(matches!(result, Err(VaultError::AuthFailure)));
    }

    #[test]
    fn decrypt_with_tampered_ciphertext_fails() {
        let key = Dek::generate().unwrap();

        let (nonce, mut ciphertext) = encrypt(b"secret data", key.as_bytes()).unwrap();
        if let Some(byte) = ciphertext.first_mut() {
            *byte ^= 0x01;
        }

        let result = decrypt(&nonce, &ciphertext, key.as_bytes());
        assert!(matches!(result, Err(VaultError::AuthFailure)));
    }

    #[test]
    fn decrypt_with_tampered_nonce_fails() {
        let key = Dek::generate().unwrap();

        let (mut nonce, ciphertext) = encrypt(b"secret data", key.as_bytes()).unwrap();
        nonce[0] ^= 0x80;

        let result = decrypt(&nonce, &ciphertext, key.as_bytes());
        assert!(matches!(result, Err(VaultError::AuthFailure)));
    }

    #[test]
    fn short_nonce_is_auth_failure() {
        let key = Dek::generate().unwrap();
        let (_, ciphertext) = encrypt(b"x", key.as_bytes()).unwrap();

        let result = decrypt(&[0u8; 8], &ciphertext, key.as_bytes());
        assert!(matches!(result, Err(VaultError::AuthFailure)));
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = Dek::generate().unwrap();

        let (nonce, ciphertext) = encrypt(b"", key.as_bytes()).unwrap();
        let decrypted = decrypt(&nonce, &ciphertext, key.as_bytes()).unwrap();

        assert!(decrypted.is_empty());
    }

    #[test]
    fn dek_from_slice_checks_length() {
        assert!(Dek::from_slice(&[7u8; KEY_LEN]).is_ok());
        assert!(matches!(
            Dek::from_slice(&[7u8; 16]),
            Err(VaultError::Corrupt { .. })
        ));
    }

    #[test]
    fn key_debug_is_redacted() {
        let dek = Dek::from_slice(&[0x41; KEY_LEN]).unwrap();
        let printed = format!("{dek:?}");
        assert_eq!(printed, "Dek(<redacted>)");
    }

    #[test]
    fn random_bytes_length() {
        assert_eq!(random_bytes(32).unwrap().len(), 32);
        assert_ne!(random_bytes(32).unwrap(), random_bytes(32).unwrap());
    }
}
