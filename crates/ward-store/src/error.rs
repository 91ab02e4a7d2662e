//! Error types for store access

use thiserror::Error;

/// Errors returned by [`crate::PolicyStore::read`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store gates reads on the initial sync and the server hasn't
    /// sent its in-sync marker yet
    #[error("policy store has not completed its initial sync")]
    NotInSync,
}
