//! Access to the DEK of a pre-password (legacy) vault.
//!
//! Legacy installs kept the DEK itself, unwrapped, in a platform credential
//! store and opened the vault without asking for a password. Migration reads
//! that key once, wraps it under a new password KEK, and discards the legacy
//! copy. Entry ciphertext is untouched because the DEK bytes do not change.
//!
//! [`LegacyKeySource`] abstracts over where the legacy key lives.
//! [`FileLegacyKeySource`] reads the file-based fallback store: the key
//! encrypted with a device-derived key.
//!
//! # Security Notes
//!
//! - The device-derived key can be reconstructed by anyone with access to
//!   the same machine and account. That weakness is the reason legacy vaults
//!   are migrated.
//! - The key file is restricted to the current user (mode 0600 on Unix).

use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::crypto;
use crate::error::{Result, VaultError};
use crate::kdf::{self, DEFAULT_PBKDF2_ITERATIONS, SALT_LEN};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A place where a legacy install may have left its raw DEK.
///
/// Implementations must be `Send + Sync` so the vault can be used across
/// async tasks.
pub trait LegacyKeySource: Send + Sync {
    /// Check whether a legacy key is present.
    fn has_legacy_key(&self) -> Result<bool>;

    /// Read the raw legacy key, or `None` if there is none.
    fn load_legacy_key(&self) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Delete the legacy key. Deleting an absent key is not an error.
    fn discard_legacy_key(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// File-based store
// ---------------------------------------------------------------------------

/// Application salt mixed into the device-derived key. Changing this makes
/// every existing legacy key file unreadable.
const APP_SALT: &[u8; SALT_LEN] = b"pocketshell-legacy-keystore-v1\x00\x00";

/// Legacy key file encrypted with a device-derived key.
///
/// The key file layout (binary):
/// ```text
/// [32 bytes: PBKDF2 salt]
/// [12 bytes: AES-256-GCM nonce]
/// [remaining: AES-256-GCM ciphertext + 16-byte tag]
/// ```
pub struct FileLegacyKeySource {
    key_file: PathBuf,
    iterations: u32,
}

impl FileLegacyKeySource {
    /// Read the legacy key from `key_file`.
    pub fn new(key_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }

    /// Override the PBKDF2 cost of the device-derived key.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Default key file location: `<data_dir>/master.key`.
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("master.key")
    }

    /// Write `key` in the legacy format.
    ///
    /// New installs never call this; it exists to provision legacy fixtures
    /// and to round-trip the file format.
    pub fn store_legacy_key(&self, key: &[u8]) -> Result<()> {
        let device_key = self.device_derived_key()?;
        let (nonce, ciphertext) = crypto::encrypt(key, device_key.as_bytes())?;

        let mut data = Vec::with_capacity(SALT_LEN + crypto::NONCE_LEN_BYTES + ciphertext.len());
        data.extend_from_slice(APP_SALT);
        data.extend_from_slice(&nonce);
        data.extend_from_slice(&ciphertext);

        if let Some(parent) = self.key_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&self.key_file, &data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.key_file, perms)?;
        }

        tracing::info!(path = %self.key_file.display(), "wrote legacy key file");
        Ok(())
    }

    /// Derive the file encryption key from hostname, username and
    /// [`APP_SALT`].
    fn device_derived_key(&self) -> Result<crypto::Kek> {
        let hostname = Self::get_hostname();
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown-user".into());

        let mut material =
            Zeroizing::new(Vec::with_capacity(hostname.len() + username.len() + SALT_LEN));
        material.extend_from_slice(hostname.as_bytes());
        material.extend_from_slice(username.as_bytes());
        material.extend_from_slice(APP_SALT);

        kdf::derive_kek_from_password(&material, APP_SALT, self.iterations)
    }

    /// Hostname from `/etc/hostname` or the environment; "unknown-host" if
    /// neither is available.
    fn get_hostname() -> String {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/etc/hostname")
                .map(|s| s.trim().to_string())
                .or_else(|_| std::env::var("HOSTNAME"))
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown-host".into())
        }

        #[cfg(not(unix))]
        {
            std::env::var("COMPUTERNAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or_else(|_| "unknown-host".into())
        }
    }
}

impl LegacyKeySource for FileLegacyKeySource {
    fn has_legacy_key(&self) -> Result<bool> {
        Ok(self.key_file.exists())
    }

    fn load_legacy_key(&self) -> Result<Option<Zeroizing<Vec<u8>>>> {
        if !self.key_file.exists() {
            return Ok(None);
        }

        let data = std::fs::read(&self.key_file)?;

        // Minimum size: salt (32) + nonce (12) + tag (16) = 60 bytes.
        if data.len() < SALT_LEN + crypto::NONCE_LEN_BYTES + crypto::TAG_LEN {
            return Err(VaultError::Corrupt {
                reason: "legacy key file is too small".into(),
            });
        }

        let device_key = self.device_derived_key()?;

        let (_salt, rest) = data.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(crypto::NONCE_LEN_BYTES);

        let key = crypto::decrypt(nonce, ciphertext, device_key.as_bytes()).map_err(|_| {
            VaultError::Corrupt {
                reason: "legacy key file cannot be decrypted on this device".into(),
            }
        })?;

        tracing::debug!(path = %self.key_file.display(), "read legacy key file");
        Ok(Some(key))
    }

    fn discard_legacy_key(&self) -> Result<()> {
        if self.key_file.exists() {
            std::fs::remove_file(&self.key_file)?;
            tracing::info!(path = %self.key_file.display(), "deleted legacy key file");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn source(dir: &tempfile::TempDir) -> FileLegacyKeySource {
        FileLegacyKeySource::new(FileLegacyKeySource::default_path(dir.path()))
            .with_iterations(1_000)
    }

    #[test]
    fn roundtrip_legacy_key() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(&dir);

        assert!(!source.has_legacy_key().unwrap());
        assert!(source.load_legacy_key().unwrap().is_none());

        let key = crypto::random_bytes(crypto::KEY_LEN).unwrap();
        source.store_legacy_key(&key).unwrap();
        assert!(source.has_legacy_key().unwrap());

        let loaded = source.load_legacy_key().unwrap().unwrap();
        assert_eq!(loaded.as_slice(), key.as_slice());

        source.discard_legacy_key().unwrap();
        assert!(!source.has_legacy_key().unwrap());
        // Discarding again is a no-op.
        source.discard_legacy_key().unwrap();
    }

    #[test]
    fn key_file_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(&dir);

        let key = vec![0x5a; crypto::KEY_LEN];
        source.store_legacy_key(&key).unwrap();

        let raw = std::fs::read(FileLegacyKeySource::default_path(dir.path())).unwrap();
        assert!(!raw.windows(key.len()).any(|w| w == key.as_slice()));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(&dir);
        std::fs::write(FileLegacyKeySource::default_path(dir.path()), [0u8; 20]).unwrap();

        assert!(matches!(
            source.load_legacy_key(),
            Err(VaultError::Corrupt { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let source = source(&dir);
        source.store_legacy_key(&[1u8; crypto::KEY_LEN]).unwrap();

        let mode = std::fs::metadata(FileLegacyKeySource::default_path(dir.path()))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
