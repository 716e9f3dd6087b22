//! Runtime unlock state and the idle auto-lock timer.
//!
//! A [`VaultSession`] is the single slot that holds the live DEK. It is owned
//! by one [`Vault`](crate::Vault); nothing about it is global, so several
//! vaults can be unlocked side by side.
//!
//! # Idle timer
//!
//! Every [`touch`](VaultSession::touch) aborts the previous timer task,
//! bumps a generation counter and spawns a new task, all under the slot
//! mutex. A timer task that wakes up locks the session only if its
//! generation is still current. A touch that races an expiring timer
//! therefore wins, and an old timer can never lock a freshly unlocked
//! session.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::crypto::Dek;
use crate::meta::UnlockMethod;

#[derive(Default)]
struct SessionState {
    dek: Option<Dek>,
    unlock_method: Option<UnlockMethod>,
    generation: u64,
    idle_timer: Option<JoinHandle<()>>,
}

impl SessionState {
    fn clear(&mut self) {
        self.dek = None;
        self.unlock_method = None;
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }
}

/// In-memory unlock state of one vault.
pub struct VaultSession {
    state: Arc<Mutex<SessionState>>,
    idle_timeout: Option<Duration>,
}

impl VaultSession {
    /// Create a locked session. `idle_timeout = None` disables auto-lock.
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            idle_timeout,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.lock_state().dek.is_some()
    }

    /// A copy of the live DEK, or `None` while locked.
    pub fn dek(&self) -> Option<Dek> {
        self.lock_state().dek.clone()
    }

    /// The unlock method the session was opened with.
    pub fn unlock_method(&self) -> Option<UnlockMethod> {
        self.lock_state().unlock_method
    }

    /// Install `dek` and start the idle timer.
    ///
    /// Must be called from within a tokio runtime when an idle timeout is
    /// configured.
    pub(crate) fn open(&self, dek: Dek, method: UnlockMethod) {
        let mut state = self.lock_state();
        state.dek = Some(dek);
        state.unlock_method = Some(method);
        self.restart_timer(&mut state);
        tracing::info!(method = %method, "vault unlocked");
    }

    /// Record `method` without touching the DEK or the timer.
    pub(crate) fn set_unlock_method(&self, method: UnlockMethod) {
        let mut state = self.lock_state();
        if state.dek.is_some() {
            state.unlock_method = Some(method);
        }
    }

    /// Restart the idle timer if the session is unlocked.
    pub fn touch(&self) {
        let mut state = self.lock_state();
        if state.dek.is_some() {
            self.restart_timer(&mut state);
        }
    }

    /// Drop the DEK and cancel the idle timer.
    pub fn lock(&self) {
        let mut state = self.lock_state();
        let was_unlocked = state.dek.is_some();
        state.clear();
        if was_unlocked {
            tracing::info!("vault locked");
        }
    }

    fn restart_timer(&self, state: &mut SessionState) {
        if let Some(timer) = state.idle_timer.take() {
            timer.abort();
        }
        state.generation = state.generation.wrapping_add(1);

        let Some(timeout) = self.idle_timeout else {
            return;
        };

        let generation = state.generation;
        let slot = Arc::downgrade(&self.state);
        state.idle_timer = Some(tokio::spawn(expire_after(slot, generation, timeout)));
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for VaultSession {
    fn drop(&mut self) {
        self.lock_state().clear();
    }
}

async fn expire_after(slot: Weak<Mutex<SessionState>>, generation: u64, timeout: Duration) {
    tokio::time::sleep(timeout).await;

    let Some(slot) = slot.upgrade() else {
        return;
    };
    let mut state = slot.lock().unwrap_or_else(|e| e.into_inner());
    if state.generation == generation && state.dek.is_some() {
        // Our own JoinHandle is in `idle_timer`; detach it rather than abort.
        state.idle_timer = None;
        state.clear();
        tracing::info!(timeout_secs = timeout.as_secs(), "vault locked after inactivity");
    }
}
