//! Sync client for the policy sync server
//!
//! Opens the `Sync` stream and applies every update to the [`PolicyStore`]
//! in the order the server sent them, one `write` per update.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──► Connecting ──► Streaming ──► Terminated
//!               │                           ▲
//!               └───────── dial error ──────┘
//! ```
//!
//! The client never reconnects. A broken stream or an update that can't be
//! applied ends the sync with a [`SyncError`]; the caller decides whether to
//! start over or exit.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use ward_proto::{PolicySyncClient, SyncRequest, ToDataplane};
use ward_store::PolicyStore;

use crate::dispatch::apply_update;
use crate::error::SyncError;
use crate::target::DialTarget;

/// Default socket the node agent serves the sync API on
pub const DEFAULT_DIAL_TARGET: &str = "unix:///var/run/nodeagent/socket";

/// Configuration for the sync client
#[derive(Clone, Debug)]
pub struct SyncClientConfig {
    /// Where to dial (`unix:///path` or `http://host:port`)
    pub target: String,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_DIAL_TARGET.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Sync client state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Not started
    Idle,
    /// Dialing and opening the stream
    Connecting,
    /// Applying updates
    Streaming,
    /// Stopped; see the result of [`SyncClient::sync`] for why
    Terminated,
}

/// How a sync ended without an error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncExit {
    /// The cancellation token fired
    Cancelled,
    /// The server closed the stream
    StreamEnded,
}

/// Policy sync client
pub struct SyncClient {
    config: SyncClientConfig,
    state: Arc<RwLock<SyncState>>,
}

impl SyncClient {
    /// Create a new sync client with the given configuration
    pub fn new(config: SyncClientConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(SyncState::Idle)),
        }
    }

    /// Get current client state
    pub async fn state(&self) -> SyncState {
        *self.state.read().await
    }

    async fn set_state(&self, state: SyncState) {
        *self.state.write().await = state;
    }

    /// Connect and apply updates to `store` until cancelled or the stream ends.
    pub async fn sync(
        &self,
        store: &PolicyStore,
        cancel: CancellationToken,
    ) -> Result<SyncExit, SyncError> {
        self.set_state(SyncState::Connecting).await;

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Sync cancelled while connecting");
                self.set_state(SyncState::Terminated).await;
                return Ok(SyncExit::Cancelled);
            }
            opened = self.open_stream() => opened,
        };

        let result = match opened {
            Ok(stream) => {
                self.set_state(SyncState::Streaming).await;
                info!(dial_target = %self.config.target, "Connected to policy sync server");
                run_stream(stream, store, &cancel).await
            }
            Err(e) => {
                error!(error = %e, "Failed to open sync stream");
                Err(e)
            }
        };

        self.set_state(SyncState::Terminated).await;
        result
    }

    async fn open_stream(&self) -> Result<tonic::Streaming<ToDataplane>, SyncError> {
        let target = DialTarget::parse(&self.config.target)?;
        let channel = target.connect(self.config.connect_timeout).await?;

        let response = PolicySyncClient::new(channel)
            .sync(SyncRequest {})
            .await
            .map_err(SyncError::OpenStream)?;
        Ok(response.into_inner())
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Apply every update from `updates` to `store`, in order.
///
/// Each update is applied inside its own [`PolicyStore::write`], so readers
/// see either all of an update or none of it. Returns when `cancel` fires,
/// the stream ends, the stream yields an error, or an update is rejected.
/// Updates applied before a rejected one stay applied.
pub async fn run_stream<S>(
    updates: S,
    store: &PolicyStore,
    cancel: &CancellationToken,
) -> Result<SyncExit, SyncError>
where
    S: Stream<Item = Result<ToDataplane, tonic::Status>>,
{
    tokio::pin!(updates);
    let mut applied: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(applied, "Sync cancelled");
                return Ok(SyncExit::Cancelled);
            }
            next = updates.next() => next,
        };

        match next {
            Some(Ok(update)) => {
                let sequence = update.sequence_number;
                if let Err(e) = store.write(|state| apply_update(state, update)).await {
                    error!(sequence, error = %e, "Rejected update from policy sync server");
                    return Err(e.into());
                }
                applied += 1;
                debug!(sequence, applied, "Applied update");
            }
            Some(Err(status)) => {
                error!(applied, error = %status, "Connection to policy sync server broken");
                return Err(SyncError::Stream(status));
            }
            None => {
                info!(applied, "Policy sync server closed the stream");
                return Ok(SyncExit::StreamEnded);
            }
        }
    }
}
