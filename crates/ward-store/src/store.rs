//! Scoped access to the policy state
//!
//! [`PolicyStore::write`] and [`PolicyStore::read`] are the only way to reach
//! the [`PolicyState`]. Both hand the state to a synchronous callback while
//! holding the lock, so a reader can never see half of an update and the
//! state reference cannot outlive the lock.
//!
//! Callbacks must not call back into the same store; the lock is not
//! reentrant and doing so deadlocks.

use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::ipset::{DefaultIpSetFactory, IpSetFactory};
use crate::state::PolicyState;

/// Whether evaluators may read before the initial replay has completed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadGate {
    /// Reads are always allowed and may observe a partially replayed state
    #[default]
    Open,
    /// Reads fail with [`StoreError::NotInSync`] until the in-sync marker
    AwaitInSync,
}

/// Shared handle to the policy state
///
/// Created once by the process and shared via `Arc` between the sync client
/// (the only writer) and any number of evaluators.
pub struct PolicyStore {
    state: RwLock<PolicyState>,
    gate: ReadGate,
    in_sync_tx: watch::Sender<bool>,
}

impl PolicyStore {
    /// Create an empty store using the default IP set representation
    pub fn new(gate: ReadGate) -> Self {
        Self::with_ip_set_factory(gate, Arc::new(DefaultIpSetFactory))
    }

    /// Create an empty store whose IP sets come from `factory`
    pub fn with_ip_set_factory(gate: ReadGate, factory: Arc<dyn IpSetFactory>) -> Self {
        let (in_sync_tx, _) = watch::channel(false);
        Self {
            state: RwLock::new(PolicyState::new(factory)),
            gate,
            in_sync_tx,
        }
    }

    /// The read gate this store was created with
    pub fn gate(&self) -> ReadGate {
        self.gate
    }

    /// Mutate the state under exclusive access.
    ///
    /// Waits for in-flight reads and writes to finish, then runs `mutate`.
    /// The lock is released when `mutate` returns or unwinds.
    pub async fn write<F, R>(&self, mutate: F) -> R
    where
        F: FnOnce(&mut PolicyState) -> R,
    {
        let mut state = self.state.write().await;
        let was_in_sync = state.in_sync();
        let result = mutate(&mut state);

        if !was_in_sync && state.in_sync() {
            info!(summary = ?state.summary(), "Policy store in sync");
            self.in_sync_tx.send_replace(true);
        }

        result
    }

    /// Inspect the state under shared access.
    ///
    /// Any number of reads run concurrently; none overlaps a write. With
    /// [`ReadGate::AwaitInSync`], returns [`StoreError::NotInSync`] until the
    /// server has finished its initial replay.
    pub async fn read<F, R>(&self, inspect: F) -> Result<R, StoreError>
    where
        F: FnOnce(&PolicyState) -> R,
    {
        let state = self.state.read().await;
        if self.gate == ReadGate::AwaitInSync && !state.in_sync() {
            debug!("Rejecting read before initial sync");
            return Err(StoreError::NotInSync);
        }
        Ok(inspect(&state))
    }

    /// Whether the in-sync marker has been applied
    pub fn is_in_sync(&self) -> bool {
        *self.in_sync_tx.borrow()
    }

    /// Wait until the in-sync marker has been applied.
    ///
    /// Returns immediately if it already has.
    pub async fn wait_for_sync(&self) {
        let mut rx = self.in_sync_tx.subscribe();
        // The sender lives as long as `self`, so this can't observe a closed channel
        let _ = rx.wait_for(|in_sync| *in_sync).await;
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(ReadGate::default())
    }
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore")
            .field("gate", &self.gate)
            .field("in_sync", &self.is_in_sync())
            .finish_non_exhaustive()
    }
}
