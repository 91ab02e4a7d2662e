//! Policy state container for the Ward sidecar
//!
//! Holds the policies, profiles, IP sets and local endpoint received from the
//! policy sync server:
//!
//! - **[`PolicyStore`]**: the shared handle, with scoped `write`/`read` access
//! - **[`PolicyState`]**: the materialized state handed to those callbacks
//! - **[`IpSet`] / [`IpSetFactory`]**: the membership-set interface the state uses
//!
//! # Locking
//!
//! A single reader-writer lock covers the whole state. The sync client is the
//! only writer and applies exactly one update per `write` call, so readers
//! always see the state between two complete updates.

#![warn(missing_docs)]

pub mod error;
pub mod ipset;
pub mod state;
pub mod store;

pub use error::StoreError;
pub use ipset::{DefaultIpSetFactory, IpSet, IpSetFactory, MemberSet};
pub use state::{LocalEndpoint, PolicyState, StateSummary};
pub use store::{PolicyStore, ReadGate};
