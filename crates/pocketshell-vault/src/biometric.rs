//! The biometric bridge capability.
//!
//! The vault never talks to a platform authenticator directly. It consumes a
//! [`BiometricBridge`]: an oracle that can register a credential and later,
//! after the user passes a biometric check, produce a stable secret bound to
//! that credential (e.g. a WebAuthn PRF output, a Secure Enclave key, a TPM
//! sealed value).
//!
//! [`UnavailableBridge`] is the stub for headless builds and platforms
//! without an authenticator; every call reports
//! [`BiometricError::Unavailable`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::VaultError;

/// How an assertion may interact with the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    /// Succeed only if no prompt is needed (e.g. on app resume).
    Silent,
    /// Show the platform prompt and wait for the user.
    Interactive,
}

/// Material returned by a successful registration.
///
/// Persisted next to the vault metadata so later assertions can address the
/// same credential. Neither field is secret on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricRegistration {
    /// Platform identifier of the registered credential.
    #[serde(with = "codec::b64")]
    pub credential_handle: Vec<u8>,
    /// Salt the bridge feeds to its PRF to produce the secret.
    #[serde(with = "codec::b64")]
    pub domain_salt: Vec<u8>,
}

/// Failure reported by a [`BiometricBridge`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BiometricError {
    /// The user declined, cancelled or failed the check.
    #[error("biometric check denied")]
    Denied,

    /// No usable authenticator, or the platform refused the request.
    #[error("biometric capability unavailable: {0}")]
    Unavailable(String),
}

impl From<BiometricError> for VaultError {
    fn from(e: BiometricError) -> Self {
        match e {
            BiometricError::Denied => VaultError::AuthFailure,
            BiometricError::Unavailable(reason) => VaultError::Unavailable { reason },
        }
    }
}

/// A secret-producing platform authenticator.
///
/// Implementations must be `Send + Sync` so a vault can be shared across
/// tasks. An assertion may wait on the user indefinitely; callers bound it
/// with `tokio::time::timeout` or by dropping the future.
#[async_trait]
pub trait BiometricBridge: Send + Sync {
    /// Register a new credential.
    async fn register(&self) -> Result<BiometricRegistration, BiometricError>;

    /// Authenticate against `credential_handle` and return the secret bound
    /// to `(credential_handle, domain_salt)`.
    async fn assert_and_derive(
        &self,
        credential_handle: &[u8],
        domain_salt: &[u8],
        mode: InteractionMode,
    ) -> Result<Vec<u8>, BiometricError>;
}

/// Bridge for environments without a platform authenticator.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBridge;

#[async_trait]
impl BiometricBridge for UnavailableBridge {
    async fn register(&self) -> Result<BiometricRegistration, BiometricError> {
        Err(BiometricError::Unavailable(
            "no platform authenticator".into(),
        ))
    }

    async fn assert_and_derive(
        &self,
        _credential_handle: &[u8],
        _domain_salt: &[u8],
        _mode: InteractionMode,
    ) -> Result<Vec<u8>, BiometricError> {
        Err(BiometricError::Unavailable(
            "no platform authenticator".into(),
        ))
    }
}
