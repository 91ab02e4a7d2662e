//! Error types for the sync client
//!
//! Transport failures and protocol violations are kept apart so the caller can
//! tell a broken connection from a server that sent something this client
//! can't apply. Both end the sync; neither is retried here.

use std::fmt;

use thiserror::Error;

/// The kind of update a message carried, for logs and errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// End of the initial replay
    InSync,
    /// Full IP set membership
    IpSetUpdate,
    /// IP set additions and removals
    IpSetDeltaUpdate,
    /// IP set deletion
    IpSetRemove,
    /// Profile replacement
    ActiveProfileUpdate,
    /// Profile deletion
    ActiveProfileRemove,
    /// Policy replacement
    ActivePolicyUpdate,
    /// Policy deletion
    ActivePolicyRemove,
    /// Local endpoint replacement
    WorkloadEndpointUpdate,
    /// Local endpoint removal
    WorkloadEndpointRemove,
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateKind::InSync => "InSync",
            UpdateKind::IpSetUpdate => "IPSetUpdate",
            UpdateKind::IpSetDeltaUpdate => "IPSetDeltaUpdate",
            UpdateKind::IpSetRemove => "IPSetRemove",
            UpdateKind::ActiveProfileUpdate => "ActiveProfileUpdate",
            UpdateKind::ActiveProfileRemove => "ActiveProfileRemove",
            UpdateKind::ActivePolicyUpdate => "ActivePolicyUpdate",
            UpdateKind::ActivePolicyRemove => "ActivePolicyRemove",
            UpdateKind::WorkloadEndpointUpdate => "WorkloadEndpointUpdate",
            UpdateKind::WorkloadEndpointRemove => "WorkloadEndpointRemove",
        };
        f.write_str(name)
    }
}

/// An update that can't be applied to the current state
///
/// Indicates the server and this client disagree about what state exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Policy update or remove without a policy id
    #[error("got {kind} with nil PolicyID")]
    MissingPolicyId {
        /// Which update carried the nil id
        kind: UpdateKind,
    },

    /// Profile update or remove without a profile id
    #[error("got {kind} with nil ProfileID")]
    MissingProfileId {
        /// Which update carried the nil id
        kind: UpdateKind,
    },

    /// Delta update for an IP set that was never created
    #[error("unknown IPSet id: {id}")]
    UnknownIpSet {
        /// The IP set id from the delta update
        id: String,
    },
}

/// Why a sync ended with an error
#[derive(Debug, Error)]
pub enum SyncError {
    /// The configured target is not something we can dial
    #[error("invalid dial target {target}: {message}")]
    InvalidTarget {
        /// The target as configured
        target: String,
        /// What is wrong with it
        message: String,
    },

    /// Dialing the policy sync server failed
    #[error("failed to dial {target}: {source}")]
    Connect {
        /// The target that was dialed
        target: String,
        /// The underlying transport error
        #[source]
        source: tonic::transport::Error,
    },

    /// The server rejected or failed the `Sync` call
    #[error("failed to sync with server: {0}")]
    OpenStream(tonic::Status),

    /// The stream broke after it was established
    #[error("connection to policy sync server broken: {0}")]
    Stream(tonic::Status),

    /// The server sent an update that can't be applied
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SyncError {
    /// Create an invalid target error
    pub fn invalid_target(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Whether the sync ended because of the transport rather than the content
    pub fn is_transport(&self) -> bool {
        !self.is_protocol()
    }

    /// Whether the sync ended because the server sent an inapplicable update
    pub fn is_protocol(&self) -> bool {
        matches!(self, SyncError::Protocol(_))
    }
}
