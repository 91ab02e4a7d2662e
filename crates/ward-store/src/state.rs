//! Materialized policy state
//!
//! [`PolicyState`] is only reachable through [`crate::PolicyStore::write`] and
//! [`crate::PolicyStore::read`], so every field here is guarded by the store's
//! lock even though the fields themselves are plain collections.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ward_proto::{
    IpSetType, Policy, PolicyId, Profile, ProfileId, WorkloadEndpoint, WorkloadEndpointId,
};

use crate::ipset::{IpSet, IpSetFactory};

/// The workload endpoint this sidecar is attached to
#[derive(Clone, Debug, PartialEq)]
pub struct LocalEndpoint {
    /// Orchestrator, workload and endpoint identifiers
    pub id: WorkloadEndpointId,
    /// Network identity and tier membership
    pub endpoint: WorkloadEndpoint,
}

/// Everything the sidecar knows about policy for its workload
pub struct PolicyState {
    /// Active policies keyed by tier and name
    pub policy_by_id: HashMap<PolicyId, Policy>,
    /// Active profiles keyed by name
    pub profile_by_id: HashMap<ProfileId, Profile>,
    /// IP sets referenced by rules, keyed by set id
    pub ip_set_by_id: HashMap<String, Box<dyn IpSet>>,
    /// The local endpoint, if the server has sent one
    pub endpoint: Option<LocalEndpoint>,
    in_sync: bool,
    ip_set_factory: Arc<dyn IpSetFactory>,
}

impl PolicyState {
    pub(crate) fn new(ip_set_factory: Arc<dyn IpSetFactory>) -> Self {
        Self {
            policy_by_id: HashMap::new(),
            profile_by_id: HashMap::new(),
            ip_set_by_id: HashMap::new(),
            endpoint: None,
            in_sync: false,
            ip_set_factory,
        }
    }

    /// Create an empty IP set using the store's factory. The set is not
    /// inserted into [`Self::ip_set_by_id`].
    pub fn new_ip_set(&self, set_type: IpSetType) -> Box<dyn IpSet> {
        self.ip_set_factory.create(set_type)
    }

    /// Whether the server has finished its initial state replay
    pub fn in_sync(&self) -> bool {
        self.in_sync
    }

    /// Record that the initial state replay is complete
    pub fn mark_in_sync(&mut self) {
        self.in_sync = true;
    }

    /// Look up an IP set by id
    pub fn ip_set(&self, id: &str) -> Option<&dyn IpSet> {
        self.ip_set_by_id.get(id).map(|s| s.as_ref())
    }

    /// Entry counts, for logging
    pub fn summary(&self) -> StateSummary {
        StateSummary {
            policies: self.policy_by_id.len(),
            profiles: self.profile_by_id.len(),
            ip_sets: self.ip_set_by_id.len(),
            has_endpoint: self.endpoint.is_some(),
            in_sync: self.in_sync,
        }
    }
}

impl fmt::Debug for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyState")
            .field("policy_by_id", &self.policy_by_id)
            .field("profile_by_id", &self.profile_by_id)
            .field("ip_set_by_id", &self.ip_set_by_id)
            .field("endpoint", &self.endpoint)
            .field("in_sync", &self.in_sync)
            .finish_non_exhaustive()
    }
}

/// Entry counts of a [`PolicyState`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateSummary {
    /// Number of active policies
    pub policies: usize,
    /// Number of active profiles
    pub profiles: usize,
    /// Number of IP sets
    pub ip_sets: usize,
    /// Whether a local endpoint is known
    pub has_endpoint: bool,
    /// Whether the initial replay has completed
    pub in_sync: bool,
}
