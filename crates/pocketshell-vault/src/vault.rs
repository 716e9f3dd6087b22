//! The vault lifecycle state machine.
//!
//! ```text
//!                create / migrate
//!   NoVault ─────────────────────────► Unlocked ◄──┐
//!      ▲                                 │  ▲      │ unlock (password
//!      │ reset                     lock  │  │      │  or biometric)
//!      │                    idle timeout ▼  │      │
//!      └──────────────────────────────── Locked ───┘
//! ```
//!
//! `LegacyPending` sits beside `NoVault`: no metadata yet, but a
//! [`LegacyKeySource`] holds a raw DEK that must be migrated before anything
//! else happens.
//!
//! Every operation reports the expected failures (wrong password, denied
//! biometric, locked vault, missing entry) as `false` / `None`. An `Err` is
//! always fatal: storage failure, a corrupt metadata record, or a call made
//! in a state that forbids it.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use crate::biometric::{BiometricBridge, BiometricRegistration, InteractionMode, UnavailableBridge};
use crate::config::VaultConfig;
use crate::crypto::{Dek, Kek};
use crate::entry;
use crate::error::{Result, VaultError};
use crate::kdf;
use crate::legacy::LegacyKeySource;
use crate::meta::{self, BIOMETRIC_KEY, FORMAT_VERSION, META_KEY, UnlockMethod, VaultMeta};
use crate::session::VaultSession;
use crate::storage::{Namespace, VaultStorage};
use crate::wrap;

/// Where a vault currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultStatus {
    /// No metadata and no legacy key: call [`Vault::create`].
    NoVault,
    /// No metadata, but a legacy key exists: call
    /// [`Vault::migrate_from_legacy_source`].
    LegacyPending,
    /// Metadata exists and the DEK is not in memory.
    Locked,
    /// The DEK is in memory.
    Unlocked,
}

/// A credential vault: durable storage plus one in-memory session.
pub struct Vault {
    storage: Arc<dyn VaultStorage>,
    bridge: Arc<dyn BiometricBridge>,
    legacy: Option<Arc<dyn LegacyKeySource>>,
    config: VaultConfig,
    session: VaultSession,
    /// Serializes state transitions so only one is in flight.
    transition: tokio::sync::Mutex<()>,
}

impl Vault {
    /// Create a vault handle over `storage`.
    ///
    /// The handle starts locked. Biometric unlock is unavailable until a
    /// bridge is supplied with [`with_biometric_bridge`](Self::with_biometric_bridge).
    pub fn new(storage: Arc<dyn VaultStorage>, config: VaultConfig) -> Self {
        let session = VaultSession::new(config.idle_timeout);
        Self {
            storage,
            bridge: Arc::new(UnavailableBridge),
            legacy: None,
            config,
            session,
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_biometric_bridge(mut self, bridge: Arc<dyn BiometricBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn with_legacy_source(mut self, source: Arc<dyn LegacyKeySource>) -> Self {
        self.legacy = Some(source);
        self
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // -- State queries ------------------------------------------------------

    /// Whether vault metadata exists.
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.storage.get(Namespace::Meta, META_KEY).await?.is_some())
    }

    /// Determine the lifecycle state. Call this before any other operation
    /// so a legacy vault is detected and migrated first.
    pub async fn status(&self) -> Result<VaultStatus> {
        if self.exists().await? {
            return Ok(if self.session.is_unlocked() {
                VaultStatus::Unlocked
            } else {
                VaultStatus::Locked
            });
        }

        if let Some(legacy) = &self.legacy {
            if legacy.has_legacy_key()? {
                return Ok(VaultStatus::LegacyPending);
            }
        }

        Ok(VaultStatus::NoVault)
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.is_unlocked()
    }

    /// The unlock paths of the current session, or `None` while locked.
    pub fn unlock_method(&self) -> Option<UnlockMethod> {
        self.session.unlock_method()
    }

    /// The unlock paths the stored metadata offers, or `None` without a vault.
    pub async fn available_unlock_method(&self) -> Result<Option<UnlockMethod>> {
        Ok(self.load_meta().await?.map(|m| m.unlock_method()))
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Create a new vault protected by `password` and leave it unlocked.
    ///
    /// With `enroll_biometric`, biometric enrollment is attempted afterwards;
    /// if it fails the vault is simply password-only.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidState`] if a vault or a legacy key
    /// already exists.
    pub async fn create(&self, password: &str, enroll_biometric: bool) -> Result<UnlockMethod> {
        {
            let _transition = self.transition.lock().await;

            match self.status().await? {
                VaultStatus::NoVault => {}
                VaultStatus::LegacyPending => {
                    return Err(VaultError::InvalidState {
                        reason: "a legacy vault must be migrated instead of created".into(),
                    });
                }
                VaultStatus::Locked | VaultStatus::Unlocked => {
                    return Err(VaultError::InvalidState {
                        reason: "vault already exists".into(),
                    });
                }
            }

            let dek = Dek::generate()?;
            let meta = self.password_meta(&dek, password).await?;
            self.save_meta(&meta).await?;
            self.session.open(dek, UnlockMethod::PasswordOnly);

            tracing::info!(iterations = meta.iterations, "created vault");
        }

        if enroll_biometric && self.enroll_biometric().await? {
            return Ok(UnlockMethod::PasswordPlusBiometric);
        }
        Ok(UnlockMethod::PasswordOnly)
    }

    /// Unlock with the master password.
    ///
    /// Returns `false` if the password is wrong, the stored wrapped key is
    /// damaged, or there is no vault. The two cases are indistinguishable.
    pub async fn unlock_with_password(&self, password: &str) -> Result<bool> {
        let _transition = self.transition.lock().await;

        let Some(meta) = self.load_meta().await? else {
            tracing::debug!("password unlock requested without a vault");
            return Ok(false);
        };

        let kek = self
            .derive_password_kek(password, meta.salt.clone(), meta.iterations)
            .await?;

        match wrap::unwrap(&kek, &meta.dek_pw) {
            Ok(dek) => {
                self.session.open(dek, meta.unlock_method());
                Ok(true)
            }
            Err(_) => {
                tracing::warn!("password unlock rejected");
                Ok(false)
            }
        }
    }

    /// Unlock with the enrolled biometric credential.
    ///
    /// Returns `false` if biometric unlock is not enrolled, the bridge is
    /// unavailable or denies the check, or the derived key does not unwrap
    /// the DEK. Dropping the returned future while the prompt is open leaves
    /// the vault locked.
    pub async fn try_unlock_biometric(&self, mode: InteractionMode) -> Result<bool> {
        let Some(registration) = self.load_registration().await? else {
            tracing::debug!("biometric unlock requested without enrollment");
            return Ok(false);
        };
        if !self.available_unlock_method().await?.is_some_and(|m| m.has_biometric()) {
            return Ok(false);
        }

        // The prompt can take arbitrarily long; no transition lock is held
        // while it is open.
        let derived = self.biometric_kek(&registration, mode).await;
        let Some(kek) = Self::expected_or(derived)? else {
            return Ok(false);
        };

        let _transition = self.transition.lock().await;

        let Some(meta) = self.load_meta().await? else {
            return Ok(false);
        };
        let Some(wrapped) = meta.dek_bio.as_ref() else {
            return Ok(false);
        };

        match wrap::unwrap(&kek, wrapped) {
            Ok(dek) => {
                self.session.open(dek, meta.unlock_method());
                Ok(true)
            }
            Err(_) => {
                tracing::warn!("biometric unlock rejected");
                Ok(false)
            }
        }
    }

    /// Drop the DEK from memory and cancel the idle timer.
    pub fn lock(&self) {
        self.session.lock();
    }

    /// Replace the master password.
    ///
    /// `old` is verified by unwrapping the stored password copy. The same DEK
    /// is then wrapped under a KEK derived from `new` with a fresh salt and
    /// the configured iteration count. The biometric copy and all entries are
    /// left as they are.
    ///
    /// Returns `false`, with nothing changed, if the vault is locked or `old`
    /// is wrong.
    pub async fn change_password(&self, old: &str, new: &str) -> Result<bool> {
        let _transition = self.transition.lock().await;

        if !self.session.is_unlocked() {
            return Ok(false);
        }
        let Some(mut meta) = self.load_meta().await? else {
            return Ok(false);
        };

        let old_kek = self
            .derive_password_kek(old, meta.salt.clone(), meta.iterations)
            .await?;
        let Ok(dek) = wrap::unwrap(&old_kek, &meta.dek_pw) else {
            tracing::warn!("password change rejected");
            return Ok(false);
        };

        let salt = kdf::generate_salt()?;
        let iterations = self.config.pbkdf2_iterations;
        let new_kek = self
            .derive_password_kek(new, salt.to_vec(), iterations)
            .await?;

        meta.version = FORMAT_VERSION;
        meta.salt = salt.to_vec();
        meta.iterations = iterations;
        meta.dek_pw = wrap::wrap(&new_kek, &dek)?;
        self.save_meta(&meta).await?;

        tracing::info!(iterations, "changed vault password");
        Ok(true)
    }

    /// Enroll biometric unlock for the unlocked vault.
    ///
    /// Registers a credential with the bridge, asserts it once to obtain the
    /// secret, and stores a biometric-wrapped copy of the DEK. Returns
    /// `false`, with nothing changed, if the vault is locked or the bridge
    /// fails.
    pub async fn enroll_biometric(&self) -> Result<bool> {
        if !self.session.is_unlocked() {
            return Ok(false);
        }

        let registered = self
            .bridge
            .register()
            .await
            .map_err(VaultError::from)
            .inspect_err(|e| tracing::warn!(error = %e, "biometric registration failed"));
        let Some(registration) = Self::expected_or(registered)? else {
            return Ok(false);
        };
        let derived = self
            .biometric_kek(&registration, InteractionMode::Interactive)
            .await;
        let Some(kek) = Self::expected_or(derived)? else {
            return Ok(false);
        };

        let _transition = self.transition.lock().await;

        let Some(dek) = self.session.dek() else {
            return Ok(false);
        };
        let Some(mut meta) = self.load_meta().await? else {
            return Ok(false);
        };

        meta.dek_bio = Some(wrap::wrap(&kek, &dek)?);
        let previous = self.storage.get(Namespace::Meta, BIOMETRIC_KEY).await?;
        self.storage
            .set(
                Namespace::Meta,
                BIOMETRIC_KEY,
                serde_json::to_vec(&registration)?,
            )
            .await?;

        // The registration must keep matching the stored `dek_bio`.
        if let Err(e) = self.save_meta(&meta).await {
            let restored = match previous {
                Some(bytes) => self.storage.set(Namespace::Meta, BIOMETRIC_KEY, bytes).await,
                None => self.storage.delete(Namespace::Meta, BIOMETRIC_KEY).await,
            };
            if let Err(restore) = restored {
                tracing::error!(error = %restore, "failed to restore biometric registration");
            }
            return Err(e);
        }
        self.session.set_unlock_method(meta.unlock_method());

        tracing::info!("enrolled biometric unlock");
        Ok(true)
    }

    /// Remove the biometric-wrapped DEK and the registration record.
    pub async fn disable_biometric(&self) -> Result<()> {
        let _transition = self.transition.lock().await;

        if let Some(mut meta) = self.load_meta().await? {
            if meta.dek_bio.take().is_some() {
                self.save_meta(&meta).await?;
            }
        }
        self.storage.delete(Namespace::Meta, BIOMETRIC_KEY).await?;
        self.session.set_unlock_method(UnlockMethod::PasswordOnly);

        tracing::info!("disabled biometric unlock");
        Ok(())
    }

    /// Lock and delete everything: metadata, biometric registration, all
    /// entries and any legacy key.
    pub async fn reset(&self) -> Result<()> {
        let _transition = self.transition.lock().await;

        self.session.lock();
        self.storage.delete(Namespace::Meta, META_KEY).await?;
        self.storage.delete(Namespace::Meta, BIOMETRIC_KEY).await?;
        self.storage.clear(Namespace::Entries).await?;
        if let Some(legacy) = &self.legacy {
            legacy.discard_legacy_key()?;
        }

        tracing::info!("vault reset");
        Ok(())
    }

    // -- Migration ----------------------------------------------------------

    /// Adopt a legacy raw DEK and protect it with `new_password`.
    ///
    /// The DEK bytes are unchanged, so entries written by the legacy vault
    /// stay readable. The vault is left unlocked.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidState`] if vault metadata already exists
    /// and [`VaultError::Corrupt`] if `old_raw_dek` is not a 256-bit key.
    pub async fn migrate_legacy(&self, old_raw_dek: &[u8], new_password: &str) -> Result<()> {
        let _transition = self.transition.lock().await;

        if self.exists().await? {
            return Err(VaultError::InvalidState {
                reason: "vault metadata already exists".into(),
            });
        }

        let dek = Dek::from_slice(old_raw_dek)?;
        let meta = self.password_meta(&dek, new_password).await?;
        self.save_meta(&meta).await?;
        self.session.open(dek, UnlockMethod::PasswordOnly);

        tracing::info!("migrated legacy vault to password protection");
        Ok(())
    }

    /// Migrate the key held by the configured [`LegacyKeySource`], then
    /// discard the legacy copy.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if there is no legacy key.
    pub async fn migrate_from_legacy_source(&self, new_password: &str) -> Result<()> {
        let Some(source) = self.legacy.clone() else {
            return Err(VaultError::NotFound {
                what: "legacy key source".into(),
            });
        };
        // Opening a legacy key can run a full-cost PBKDF2.
        let loader = Arc::clone(&source);
        let raw = tokio::task::spawn_blocking(move || loader.load_legacy_key()).await??;
        let Some(raw) = raw else {
            return Err(VaultError::NotFound {
                what: "legacy key".into(),
            });
        };

        self.migrate_legacy(&raw, new_password).await?;
        tokio::task::spawn_blocking(move || source.discard_legacy_key()).await??;
        Ok(())
    }

    // -- Entries ------------------------------------------------------------

    /// Encrypt and save `record` under `id`, replacing any previous record.
    ///
    /// Returns `false` without writing if the vault is locked. Holds the
    /// transition lock so a concurrent `lock` or `reset` cannot interleave
    /// with the write.
    pub async fn store_entry<T: Serialize + ?Sized>(&self, id: &str, record: &T) -> Result<bool> {
        let _transition = self.transition.lock().await;

        let Some(dek) = self.session.dek() else {
            tracing::debug!(id, "store refused: vault locked");
            return Ok(false);
        };

        let bytes = entry::seal(&dek, record)?;
        self.storage.set(Namespace::Entries, id, bytes).await?;
        self.session.touch();

        tracing::debug!(id, "stored entry");
        Ok(true)
    }

    /// Load and decrypt the record under `id`.
    ///
    /// Returns `None` if the vault is locked, the entry is absent, or the
    /// stored bytes fail to decrypt or parse.
    pub async fn load_entry<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        let Some(dek) = self.session.dek() else {
            return Ok(None);
        };
        let Some(bytes) = self.storage.get(Namespace::Entries, id).await? else {
            return Ok(None);
        };

        let record = entry::open(&dek, &bytes);
        if record.is_some() {
            self.session.touch();
        } else {
            tracing::warn!(id, "entry could not be opened");
        }
        Ok(record)
    }

    /// Delete the record under `id`. Works while locked.
    pub async fn delete_entry(&self, id: &str) -> Result<()> {
        self.storage.delete(Namespace::Entries, id).await?;
        tracing::debug!(id, "deleted entry");
        Ok(())
    }

    /// Ids of all stored entries, sorted. Works while locked.
    pub async fn entry_ids(&self) -> Result<Vec<String>> {
        self.storage.keys(Namespace::Entries).await
    }

    // -- Internal helpers ---------------------------------------------------

    async fn load_meta(&self) -> Result<Option<VaultMeta>> {
        match self.storage.get(Namespace::Meta, META_KEY).await? {
            Some(bytes) => VaultMeta::from_bytes(&bytes).map(Some).inspect_err(|e| {
                tracing::warn!(error = %e, "vault metadata unreadable");
            }),
            None => Ok(None),
        }
    }

    async fn save_meta(&self, meta: &VaultMeta) -> Result<()> {
        self.storage
            .set(Namespace::Meta, META_KEY, meta.to_bytes()?)
            .await
    }

    async fn load_registration(&self) -> Result<Option<BiometricRegistration>> {
        match self.storage.get(Namespace::Meta, BIOMETRIC_KEY).await? {
            Some(bytes) => meta::decode_record(&bytes, "biometric registration").map(Some),
            None => Ok(None),
        }
    }

    /// Wrap `dek` under a fresh password KEK and build a new metadata record.
    async fn password_meta(&self, dek: &Dek, password: &str) -> Result<VaultMeta> {
        let salt = kdf::generate_salt()?;
        let iterations = self.config.pbkdf2_iterations;
        let kek = self
            .derive_password_kek(password, salt.to_vec(), iterations)
            .await?;
        let dek_pw = wrap::wrap(&kek, dek)?;
        Ok(VaultMeta::new(salt.to_vec(), iterations, dek_pw))
    }

    /// PBKDF2 on the blocking pool.
    async fn derive_password_kek(
        &self,
        password: &str,
        salt: Vec<u8>,
        iterations: u32,
    ) -> Result<Kek> {
        let password = Zeroizing::new(password.as_bytes().to_vec());
        tokio::task::spawn_blocking(move || {
            kdf::derive_kek_from_password(&password, &salt, iterations)
        })
        .await?
    }

    /// Ask the bridge for the biometric secret and derive the KEK from it.
    ///
    /// A denied or unavailable bridge surfaces as an expected error
    /// ([`VaultError::is_expected`]); callers report it as `false`.
    async fn biometric_kek(
        &self,
        registration: &BiometricRegistration,
        mode: InteractionMode,
    ) -> Result<Kek> {
        let secret = self
            .bridge
            .assert_and_derive(
                &registration.credential_handle,
                &registration.domain_salt,
                mode,
            )
            .await
            .map(Zeroizing::new)
            .map_err(VaultError::from)
            .inspect_err(|e| {
                tracing::debug!(error = %e, ?mode, "biometric assertion not completed");
            })?;

        kdf::derive_kek_from_biometric(&secret, self.config.biometric_info.as_bytes())
    }

    /// Turn expected failures into `None`, keep fatal ones as errors.
    fn expected_or<T>(result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_expected() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
