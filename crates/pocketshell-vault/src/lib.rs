//! Credential vault for the PocketShell SSH client.
//!
//! Saved SSH passwords and private keys are encrypted at rest with a random
//! 256-bit data-encryption key (DEK). The DEK itself is only ever stored
//! wrapped: once under a key derived from the master password (PBKDF2) and,
//! optionally, once under a key derived from a biometric authenticator
//! secret (HKDF). Unlocking unwraps the DEK into memory; locking, an idle
//! timeout or dropping the vault discards it.
//!
//! # Modules
//!
//! - [`vault`]: lifecycle state machine and entry operations.
//! - [`crypto`], [`kdf`], [`wrap`]: AES-256-GCM, key derivation, key wrapping.
//! - [`meta`]: the persisted metadata record.
//! - [`entry`]: per-credential encryption.
//! - [`session`]: in-memory unlock state and the idle auto-lock timer.
//! - [`storage`], [`sqlite`]: durable key-value storage.
//! - [`biometric`]: the platform authenticator seam.
//! - [`legacy`]: access to keys left by pre-password installs.
//! - [`config`], [`error`], [`codec`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pocketshell_vault::{SqliteStorage, SshSecret, Vault, VaultConfig, VaultStatus};
//!
//! # async fn example() -> pocketshell_vault::Result<()> {
//! let storage = Arc::new(SqliteStorage::open("data/vault.db")?);
//! let vault = Vault::new(storage, VaultConfig::default());
//!
//! match vault.status().await? {
//!     VaultStatus::NoVault => {
//!         vault.create("correct horse battery staple", false).await?;
//!     }
//!     VaultStatus::Locked => {
//!         if !vault.unlock_with_password("correct horse battery staple").await? {
//!             return Ok(());
//!         }
//!     }
//!     _ => {}
//! }
//!
//! vault
//!     .store_entry("prod-bastion", &SshSecret::with_password("hunter2"))
//!     .await?;
//! let secret: Option<SshSecret> = vault.load_entry("prod-bastion").await?;
//! assert!(secret.is_some());
//!
//! vault.lock();
//! # Ok(())
//! # }
//! ```

pub mod biometric;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod kdf;
pub mod legacy;
pub mod meta;
pub mod session;
pub mod sqlite;
pub mod storage;
pub mod vault;
pub mod wrap;

// Re-export the most commonly used types at the crate root for convenience.
pub use biometric::{
    BiometricBridge, BiometricError, BiometricRegistration, InteractionMode, UnavailableBridge,
};
pub use config::VaultConfig;
pub use entry::SshSecret;
pub use error::{Result, VaultError};
pub use legacy::{FileLegacyKeySource, LegacyKeySource};
pub use meta::UnlockMethod;
pub use sqlite::SqliteStorage;
pub use storage::{MemoryStorage, Namespace, VaultStorage};
pub use vault::{Vault, VaultStatus};
