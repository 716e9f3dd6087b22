//! Vault error types.
//!
//! All vault subsystems surface errors through [`VaultError`], which is the
//! single error type returned by every public API in this crate.
//!
//! Lifecycle and entry operations on [`Vault`](crate::Vault) convert the
//! *expected* failures ([`AuthFailure`](VaultError::AuthFailure),
//! [`Unavailable`](VaultError::Unavailable), locked vault, missing entry)
//! into `false` / `None` results. Whatever still reaches the caller as an
//! `Err` is fatal: storage I/O, a violated precondition, or a broken
//! primitive.

/// Unified error type for the pocketshell credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Expected failures --------------------------------------------------
    /// Authentication failed.
    ///
    /// Covers a wrong password, stale or denied biometric material and
    /// tampered ciphertext alike. The variant carries no detail on purpose.
    #[error("authentication failed")]
    AuthFailure,

    /// The requested object does not exist (no vault, no legacy key).
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The biometric capability is missing or was refused by the platform.
    #[error("biometric unlock unavailable: {reason}")]
    Unavailable { reason: String },

    /// A durable record could not be parsed or has an unsupported version.
    #[error("corrupt vault record: {reason}")]
    Corrupt { reason: String },

    // -- Caller errors ------------------------------------------------------
    /// A lifecycle operation was called in a state that does not allow it.
    #[error("invalid vault state: {reason}")]
    InvalidState { reason: String },

    // -- Fatal errors -------------------------------------------------------
    /// A cryptographic primitive failed (RNG failure, invalid parameters).
    #[error("crypto failure: {reason}")]
    Crypto { reason: String },

    /// A storage backend reported a failure.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// SQLite error from `rusqlite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem (legacy key file operations, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or a mutex was poisoned.
    #[error("task join error: {0}")]
    TaskJoin(String),
}

impl VaultError {
    /// Whether this error is one of the expected failure modes that the
    /// lifecycle reports as `false` / `None` instead of an error.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::AuthFailure | Self::Unavailable { .. } | Self::NotFound { .. }
        )
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::TaskJoin(e.to_string())
    }
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_message_has_no_detail() {
        assert_eq!(VaultError::AuthFailure.to_string(), "authentication failed");
    }

    #[test]
    fn expected_failures_classified() {
        assert!(VaultError::AuthFailure.is_expected());
        assert!(
            VaultError::Unavailable {
                reason: "no authenticator".into()
            }
            .is_expected()
        );
        assert!(
            !VaultError::Storage {
                reason: "disk full".into()
            }
            .is_expected()
        );
        assert!(
            !VaultError::Corrupt {
                reason: "bad json".into()
            }
            .is_expected()
        );
    }
}
