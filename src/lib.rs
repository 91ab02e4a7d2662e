//! Ward - local policy cache for a network policy sidecar
//!
//! Ward keeps an in-memory copy of the policies, profiles, IP sets and local
//! workload endpoint that apply to one workload, fed by the node agent's
//! policy sync stream. Request evaluators read the copy through a shared
//! lock while a single sync task writes to it.
//!
//! # Crates
//!
//! - [`proto`] - wire messages and the `PolicySync` client
//! - [`store`] - the policy state container and its read/write façade
//! - [`sync`] - the sync loop and update dispatch
//! - [`telemetry`] - logging setup for the binary

#![deny(missing_docs)]

pub mod telemetry;

pub use ward_proto as proto;
pub use ward_store as store;
pub use ward_sync as sync;
