//! Vault configuration.
//!
//! [`VaultConfig`] holds the tunable cost and timing parameters of a
//! [`Vault`](crate::Vault). Defaults are provided via the [`Default`]
//! implementation, and a builder-style API lets callers customise individual
//! fields fluently.

use std::time::Duration;

use crate::kdf::{BIOMETRIC_KEK_INFO, DEFAULT_PBKDF2_ITERATIONS};

/// Tunable parameters of the credential vault.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// PBKDF2 iteration count for newly derived password KEKs.
    ///
    /// Applied on create, change-password and migration. Existing vaults
    /// keep the count recorded in their metadata until the password is
    /// changed, so raising this never breaks old vaults.
    ///
    /// Default: **600 000**.
    pub pbkdf2_iterations: u32,

    /// Inactivity period after which an unlocked vault locks itself.
    ///
    /// `None` disables auto-lock.
    ///
    /// Default: **5 minutes**.
    pub idle_timeout: Option<Duration>,

    /// HKDF info string used when deriving the biometric KEK.
    ///
    /// Default: [`BIOMETRIC_KEK_INFO`].
    pub biometric_info: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            idle_timeout: Some(Duration::from_secs(5 * 60)),
            biometric_info: BIOMETRIC_KEK_INFO.to_string(),
        }
    }
}

impl VaultConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the PBKDF2 iteration count for new password KEKs.
    pub fn with_pbkdf2_iterations(mut self, iterations: u32) -> Self {
        self.pbkdf2_iterations = iterations;
        self
    }

    /// Set the idle auto-lock timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Disable idle auto-lock.
    pub fn without_idle_timeout(mut self) -> Self {
        self.idle_timeout = None;
        self
    }

    /// Set the HKDF info string for the biometric KEK.
    pub fn with_biometric_info(mut self, info: impl Into<String>) -> Self {
        self.biometric_info = info.into();
        self
    }
}
