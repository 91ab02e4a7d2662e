//! Ward sync client
//!
//! Keeps a [`ward_store::PolicyStore`] up to date with the policy sync server:
//!
//! - **[`SyncClient`]**: dials the server, opens the `Sync` stream and runs it
//! - **[`run_stream`]**: applies an update stream to a store, one write per update
//! - **[`apply_update`]**: maps each update variant to its state mutation
//!
//! # Ordering
//!
//! Updates are applied strictly in the order the server sent them. Delta
//! updates assume the full update that created their IP set was applied
//! first, so nothing here reorders or batches.

#![warn(missing_docs)]

pub mod client;
pub mod dispatch;
pub mod error;
pub mod target;

#[cfg(test)]
mod test_server;

pub use client::{
    run_stream, SyncClient, SyncClientConfig, SyncExit, SyncState, DEFAULT_DIAL_TARGET,
};
pub use dispatch::apply_update;
pub use error::{ProtocolError, SyncError, UpdateKind};
pub use target::DialTarget;
