//! Protocol buffer definitions for the policy sync API.
//!
//! This crate provides the message types and gRPC client used by the sidecar
//! to receive policy state from the per-node policy sync server.
//!
//! # Communication Flow
//!
//! ```text
//! ┌─────────────────────────┐
//! │   Policy Sync Server    │
//! │      (node agent)       │
//! └───────────┬─────────────┘
//!             │ Server stream
//!             │ (SyncRequest → ToDataplane*)
//!             ▼
//! ┌─────────────────────────┐
//! │     Ward sidecar        │
//! │  ┌──────────────────┐   │
//! │  │   PolicyStore    │◄──┼──── evaluators read
//! │  └──────────────────┘   │
//! └─────────────────────────┘
//! ```
//!
//! The sidecar opens one `Sync` call with an empty [`SyncRequest`]. The server
//! first replays the full state for the workload, sends [`InSync`], and then
//! keeps streaming incremental updates for as long as the connection lives.
//!
//! # Key Message Types
//!
//! - [`IpSetUpdate`]: Full membership of an IP set (additive)
//! - [`IpSetDeltaUpdate`]: Members added to and removed from an existing IP set
//! - [`ActivePolicyUpdate`] / [`ActiveProfileUpdate`]: Rule payloads keyed by id
//! - [`WorkloadEndpointUpdate`]: The local workload endpoint
//! - [`InSync`]: End of the initial state replay
//!
//! The message structs are written with `prost` derives rather than generated
//! by a build script, so building the workspace does not require `protoc`.

mod client;

pub use client::PolicySyncClient;

/// Fully qualified gRPC service name
pub const SERVICE_NAME: &str = "felix.PolicySync";

/// HTTP/2 path of the `Sync` method
pub const SYNC_PATH: &str = "/felix.PolicySync/Sync";

/// Request that opens the sync stream. The server identifies the workload
/// from the connection, so the request carries no fields.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncRequest {}

/// One update pushed from the policy sync server
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ToDataplane {
    /// Monotonic sequence number assigned by the server
    #[prost(uint64, tag = "1")]
    pub sequence_number: u64,
    #[prost(oneof = "to_dataplane::Payload", tags = "2, 3, 4, 5, 6, 7, 8, 9, 10, 11")]
    pub payload: Option<to_dataplane::Payload>,
}

/// Nested types for [`ToDataplane`]
pub mod to_dataplane {
    /// The update carried by a [`super::ToDataplane`]. Payloads added by newer
    /// servers decode as `None` on the parent message.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "2")]
        InSync(super::InSync),
        #[prost(message, tag = "3")]
        IpsetUpdate(super::IpSetUpdate),
        #[prost(message, tag = "4")]
        IpsetDeltaUpdate(super::IpSetDeltaUpdate),
        #[prost(message, tag = "5")]
        IpsetRemove(super::IpSetRemove),
        #[prost(message, tag = "6")]
        ActiveProfileUpdate(super::ActiveProfileUpdate),
        #[prost(message, tag = "7")]
        ActiveProfileRemove(super::ActiveProfileRemove),
        #[prost(message, tag = "8")]
        ActivePolicyUpdate(super::ActivePolicyUpdate),
        #[prost(message, tag = "9")]
        ActivePolicyRemove(super::ActivePolicyRemove),
        #[prost(message, tag = "10")]
        WorkloadEndpointUpdate(super::WorkloadEndpointUpdate),
        #[prost(message, tag = "11")]
        WorkloadEndpointRemove(super::WorkloadEndpointRemove),
    }
}

/// Marks the end of the initial state replay
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InSync {}

/// How the members of an IP set are interpreted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum IpSetType {
    /// Single addresses, e.g. `10.0.0.1`
    Ip = 0,
    /// Address, protocol and port, e.g. `10.0.0.1,tcp:8080`
    IpAndPort = 1,
    /// CIDRs, e.g. `10.0.0.0/8`
    Net = 2,
}

impl IpSetType {
    /// Name as it appears in the protobuf definition
    pub fn as_str_name(&self) -> &'static str {
        match self {
            IpSetType::Ip => "IP",
            IpSetType::IpAndPort => "IP_AND_PORT",
            IpSetType::Net => "NET",
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpSetUpdate {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, repeated, tag = "2")]
    pub members: Vec<String>,
    #[prost(enumeration = "IpSetType", tag = "3")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpSetDeltaUpdate {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, repeated, tag = "2")]
    pub added_members: Vec<String>,
    #[prost(string, repeated, tag = "3")]
    pub removed_members: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpSetRemove {
    #[prost(string, tag = "1")]
    pub id: String,
}

/// Identifies a policy within a tier
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Message)]
pub struct PolicyId {
    #[prost(string, tag = "1")]
    pub tier: String,
    #[prost(string, tag = "2")]
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Message)]
pub struct ProfileId {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActivePolicyUpdate {
    #[prost(message, optional, tag = "1")]
    pub id: Option<PolicyId>,
    #[prost(message, optional, tag = "2")]
    pub policy: Option<Policy>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActivePolicyRemove {
    #[prost(message, optional, tag = "1")]
    pub id: Option<PolicyId>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActiveProfileUpdate {
    #[prost(message, optional, tag = "1")]
    pub id: Option<ProfileId>,
    #[prost(message, optional, tag = "2")]
    pub profile: Option<Profile>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActiveProfileRemove {
    #[prost(message, optional, tag = "1")]
    pub id: Option<ProfileId>,
}

/// Ordered rule lists for a policy. The sidecar stores these verbatim; rule
/// evaluation happens elsewhere.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Policy {
    #[prost(message, repeated, tag = "1")]
    pub inbound_rules: Vec<Rule>,
    #[prost(message, repeated, tag = "2")]
    pub outbound_rules: Vec<Rule>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Profile {
    #[prost(message, repeated, tag = "1")]
    pub inbound_rules: Vec<Rule>,
    #[prost(message, repeated, tag = "2")]
    pub outbound_rules: Vec<Rule>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Rule {
    #[prost(string, tag = "1")]
    pub action: String,
    #[prost(string, tag = "2")]
    pub protocol: String,
    #[prost(string, repeated, tag = "3")]
    pub src_net: Vec<String>,
    #[prost(string, repeated, tag = "4")]
    pub dst_net: Vec<String>,
    #[prost(message, repeated, tag = "5")]
    pub dst_ports: Vec<PortRange>,
    #[prost(string, repeated, tag = "6")]
    pub src_ip_set_ids: Vec<String>,
    #[prost(string, repeated, tag = "7")]
    pub dst_ip_set_ids: Vec<String>,
    #[prost(string, tag = "8")]
    pub rule_id: String,
}

#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct PortRange {
    #[prost(int32, tag = "1")]
    pub first: i32,
    #[prost(int32, tag = "2")]
    pub last: i32,
}

/// Identity of the workload endpoint the sidecar is attached to
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct WorkloadEndpointId {
    #[prost(string, tag = "1")]
    pub orchestrator_id: String,
    #[prost(string, tag = "2")]
    pub workload_id: String,
    #[prost(string, tag = "3")]
    pub endpoint_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkloadEndpoint {
    #[prost(string, tag = "1")]
    pub state: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub mac: String,
    #[prost(string, repeated, tag = "4")]
    pub profile_ids: Vec<String>,
    #[prost(string, repeated, tag = "5")]
    pub ipv4_nets: Vec<String>,
    #[prost(string, repeated, tag = "6")]
    pub ipv6_nets: Vec<String>,
    #[prost(message, repeated, tag = "7")]
    pub tiers: Vec<TierInfo>,
}

/// Policies that apply to the endpoint, grouped by tier in evaluation order
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TierInfo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, repeated, tag = "2")]
    pub ingress_policies: Vec<String>,
    #[prost(string, repeated, tag = "3")]
    pub egress_policies: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkloadEndpointUpdate {
    #[prost(message, optional, tag = "1")]
    pub id: Option<WorkloadEndpointId>,
    #[prost(message, optional, tag = "2")]
    pub endpoint: Option<WorkloadEndpoint>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkloadEndpointRemove {
    #[prost(message, optional, tag = "1")]
    pub id: Option<WorkloadEndpointId>,
}
