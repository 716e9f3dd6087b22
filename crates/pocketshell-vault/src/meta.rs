//! Durable vault metadata.
//!
//! [`VaultMeta`] is the only durable record about the DEK: the PBKDF2 salt
//! and cost, and one [`WrappedKey`] per enrolled unlock path. It lives in the
//! [`Namespace::Meta`](crate::storage::Namespace::Meta) namespace under
//! [`META_KEY`], serialized as JSON with base64 byte fields:
//!
//! ```json
//! {
//!   "version": 1,
//!   "salt": "<base64, 32 bytes>",
//!   "iterations": 600000,
//!   "dekPw": { "iv": "<base64>", "ciphertext": "<base64>" },
//!   "dekBio": { "iv": "<base64>", "ciphertext": "<base64>" }
//! }
//! ```
//!
//! `version` and `iterations` were not part of the first record layout; when
//! absent they read as version 1 and 600 000 iterations.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{Result, VaultError};
use crate::kdf::DEFAULT_PBKDF2_ITERATIONS;
use crate::wrap::WrappedKey;

/// Current metadata format version.
pub const FORMAT_VERSION: u32 = 1;

/// Storage key of the [`VaultMeta`] record.
pub const META_KEY: &str = "vault";

/// Storage key of the [`BiometricRegistration`](crate::biometric::BiometricRegistration)
/// record.
pub const BIOMETRIC_KEY: &str = "biometric";

/// The set of unlock paths a vault offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockMethod {
    /// Only the master password unwraps the DEK.
    PasswordOnly,
    /// Both the master password and the biometric KEK unwrap the DEK.
    PasswordPlusBiometric,
}

impl UnlockMethod {
    pub fn has_biometric(&self) -> bool {
        matches!(self, Self::PasswordPlusBiometric)
    }
}

impl std::fmt::Display for UnlockMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PasswordOnly => write!(f, "password"),
            Self::PasswordPlusBiometric => write!(f, "password+biometric"),
        }
    }
}

/// Salt, cost and wrapped copies of the DEK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultMeta {
    #[serde(default = "default_version")]
    pub version: u32,

    /// PBKDF2 salt for the password KEK.
    #[serde(with = "codec::b64")]
    pub salt: Vec<u8>,

    /// PBKDF2 iteration count the password KEK was derived with.
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// The DEK wrapped under the password KEK.
    pub dek_pw: WrappedKey,

    /// The DEK wrapped under the biometric KEK, when enrolled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dek_bio: Option<WrappedKey>,
}

fn default_version() -> u32 {
    1
}

fn default_iterations() -> u32 {
    DEFAULT_PBKDF2_ITERATIONS
}

impl VaultMeta {
    /// Build a password-only metadata record at the current format version.
    pub fn new(salt: Vec<u8>, iterations: u32, dek_pw: WrappedKey) -> Self {
        Self {
            version: FORMAT_VERSION,
            salt,
            iterations,
            dek_pw,
            dek_bio: None,
        }
    }

    /// The unlock paths this record enables.
    pub fn unlock_method(&self) -> UnlockMethod {
        match self.dek_bio {
            Some(_) => UnlockMethod::PasswordPlusBiometric,
            None => UnlockMethod::PasswordOnly,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Corrupt`] if the bytes are not a valid record or
    /// the version is newer than [`FORMAT_VERSION`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let meta: Self = decode_record(bytes, "vault metadata")?;
        if meta.version == 0 || meta.version > FORMAT_VERSION {
            return Err(VaultError::Corrupt {
                reason: format!("unsupported vault metadata version {}", meta.version),
            });
        }
        if meta.iterations == 0 {
            return Err(VaultError::Corrupt {
                reason: "vault metadata has zero PBKDF2 iterations".into(),
            });
        }
        Ok(meta)
    }
}

/// Deserialize a JSON record, mapping parse failures to [`VaultError::Corrupt`].
pub(crate) fn decode_record<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| VaultError::Corrupt {
        reason: format!("{what}: {e}"),
    })
}
