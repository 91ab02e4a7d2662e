//! Applying sync updates to the policy state
//!
//! [`apply_update`] is the single place that maps an update variant to its
//! handler. Every handler checks its precondition before touching the state,
//! so a rejected update leaves the state exactly as it found it.

use tracing::{debug, info, trace, warn};

use ward_proto::to_dataplane::Payload;
use ward_proto::{
    ActivePolicyRemove, ActivePolicyUpdate, ActiveProfileRemove, ActiveProfileUpdate,
    IpSetDeltaUpdate, IpSetRemove, IpSetType, IpSetUpdate, ToDataplane, WorkloadEndpointRemove,
    WorkloadEndpointUpdate,
};
use ward_store::{LocalEndpoint, PolicyState};

use crate::error::{ProtocolError, UpdateKind};

/// Classify a payload (pure function)
pub fn update_kind(payload: &Payload) -> UpdateKind {
    match payload {
        Payload::InSync(_) => UpdateKind::InSync,
        Payload::IpsetUpdate(_) => UpdateKind::IpSetUpdate,
        Payload::IpsetDeltaUpdate(_) => UpdateKind::IpSetDeltaUpdate,
        Payload::IpsetRemove(_) => UpdateKind::IpSetRemove,
        Payload::ActiveProfileUpdate(_) => UpdateKind::ActiveProfileUpdate,
        Payload::ActiveProfileRemove(_) => UpdateKind::ActiveProfileRemove,
        Payload::ActivePolicyUpdate(_) => UpdateKind::ActivePolicyUpdate,
        Payload::ActivePolicyRemove(_) => UpdateKind::ActivePolicyRemove,
        Payload::WorkloadEndpointUpdate(_) => UpdateKind::WorkloadEndpointUpdate,
        Payload::WorkloadEndpointRemove(_) => UpdateKind::WorkloadEndpointRemove,
    }
}

/// Apply one update to the state.
///
/// Updates without a payload (including payload types this client doesn't
/// know) are ignored.
pub fn apply_update(state: &mut PolicyState, update: ToDataplane) -> Result<(), ProtocolError> {
    let Some(payload) = update.payload else {
        debug!(
            sequence = update.sequence_number,
            "Ignoring update with no recognized payload"
        );
        return Ok(());
    };

    trace!(
        sequence = update.sequence_number,
        kind = %update_kind(&payload),
        "Applying update"
    );

    match payload {
        Payload::InSync(_) => apply_in_sync(state),
        Payload::IpsetUpdate(u) => apply_ip_set_update(state, u),
        Payload::IpsetDeltaUpdate(u) => apply_ip_set_delta_update(state, u),
        Payload::IpsetRemove(u) => apply_ip_set_remove(state, u),
        Payload::ActiveProfileUpdate(u) => apply_profile_update(state, u),
        Payload::ActiveProfileRemove(u) => apply_profile_remove(state, u),
        Payload::ActivePolicyUpdate(u) => apply_policy_update(state, u),
        Payload::ActivePolicyRemove(u) => apply_policy_remove(state, u),
        Payload::WorkloadEndpointUpdate(u) => apply_endpoint_update(state, u),
        Payload::WorkloadEndpointRemove(u) => apply_endpoint_remove(state, u),
    }
}

fn apply_in_sync(state: &mut PolicyState) -> Result<(), ProtocolError> {
    state.mark_in_sync();
    Ok(())
}

/// Full update: members are added to whatever the set already holds
fn apply_ip_set_update(state: &mut PolicyState, update: IpSetUpdate) -> Result<(), ProtocolError> {
    let set_type = IpSetType::try_from(update.r#type).unwrap_or_else(|_| {
        warn!(id = %update.id, set_type = update.r#type, "Unknown IPSet type, treating as IP");
        IpSetType::Ip
    });

    if !state.ip_set_by_id.contains_key(&update.id) {
        let set = state.new_ip_set(set_type);
        state.ip_set_by_id.insert(update.id.clone(), set);
    }
    if let Some(set) = state.ip_set_by_id.get_mut(&update.id) {
        for member in &update.members {
            set.add_member(member);
        }
    }
    Ok(())
}

/// Additions first, then removals
fn apply_ip_set_delta_update(
    state: &mut PolicyState,
    update: IpSetDeltaUpdate,
) -> Result<(), ProtocolError> {
    let set = state
        .ip_set_by_id
        .get_mut(&update.id)
        .ok_or(ProtocolError::UnknownIpSet { id: update.id })?;

    for member in &update.added_members {
        set.add_member(member);
    }
    for member in &update.removed_members {
        set.remove_member(member);
    }
    Ok(())
}

fn apply_ip_set_remove(state: &mut PolicyState, update: IpSetRemove) -> Result<(), ProtocolError> {
    state.ip_set_by_id.remove(&update.id);
    Ok(())
}

fn apply_profile_update(
    state: &mut PolicyState,
    update: ActiveProfileUpdate,
) -> Result<(), ProtocolError> {
    let id = update.id.ok_or(ProtocolError::MissingProfileId {
        kind: UpdateKind::ActiveProfileUpdate,
    })?;
    state
        .profile_by_id
        .insert(id, update.profile.unwrap_or_default());
    Ok(())
}

fn apply_profile_remove(
    state: &mut PolicyState,
    update: ActiveProfileRemove,
) -> Result<(), ProtocolError> {
    let id = update.id.ok_or(ProtocolError::MissingProfileId {
        kind: UpdateKind::ActiveProfileRemove,
    })?;
    state.profile_by_id.remove(&id);
    Ok(())
}

fn apply_policy_update(
    state: &mut PolicyState,
    update: ActivePolicyUpdate,
) -> Result<(), ProtocolError> {
    let id = update.id.ok_or(ProtocolError::MissingPolicyId {
        kind: UpdateKind::ActivePolicyUpdate,
    })?;
    state.policy_by_id.insert(id, update.policy.unwrap_or_default());
    Ok(())
}

fn apply_policy_remove(
    state: &mut PolicyState,
    update: ActivePolicyRemove,
) -> Result<(), ProtocolError> {
    let id = update.id.ok_or(ProtocolError::MissingPolicyId {
        kind: UpdateKind::ActivePolicyRemove,
    })?;
    state.policy_by_id.remove(&id);
    Ok(())
}

fn apply_endpoint_update(
    state: &mut PolicyState,
    update: WorkloadEndpointUpdate,
) -> Result<(), ProtocolError> {
    let id = update.id.unwrap_or_default();
    info!(
        orchestrator_id = %id.orchestrator_id,
        workload_id = %id.workload_id,
        endpoint_id = %id.endpoint_id,
        "Got WorkloadEndpointUpdate"
    );
    state.endpoint = Some(LocalEndpoint {
        id,
        endpoint: update.endpoint.unwrap_or_default(),
    });
    Ok(())
}

fn apply_endpoint_remove(
    state: &mut PolicyState,
    update: WorkloadEndpointRemove,
) -> Result<(), ProtocolError> {
    let id = update.id.unwrap_or_default();
    warn!(
        orchestrator_id = %id.orchestrator_id,
        workload_id = %id.workload_id,
        endpoint_id = %id.endpoint_id,
        "Got WorkloadEndpointRemove"
    );
    state.endpoint = None;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use ward_proto::{
        InSync, Policy, PolicyId, Profile, ProfileId, Rule, WorkloadEndpoint, WorkloadEndpointId,
    };
    use ward_store::{PolicyStore, StateSummary};

    fn msg(payload: Payload) -> ToDataplane {
        ToDataplane {
            sequence_number: 0,
            payload: Some(payload),
        }
    }

    fn ip_set_update(id: &str, members: &[&str]) -> ToDataplane {
        msg(Payload::IpsetUpdate(IpSetUpdate {
            id: id.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            r#type: IpSetType::Ip as i32,
        }))
    }

    fn ip_set_delta(id: &str, added: &[&str], removed: &[&str]) -> ToDataplane {
        msg(Payload::IpsetDeltaUpdate(IpSetDeltaUpdate {
            id: id.to_string(),
            added_members: added.iter().map(|m| m.to_string()).collect(),
            removed_members: removed.iter().map(|m| m.to_string()).collect(),
        }))
    }

    fn policy_id(name: &str) -> PolicyId {
        PolicyId {
            tier: "default".to_string(),
            name: name.to_string(),
        }
    }

    fn policy_with_action(action: &str) -> Policy {
        Policy {
            inbound_rules: vec![Rule {
                action: action.to_string(),
                ..Default::default()
            }],
            outbound_rules: vec![],
        }
    }

    fn endpoint_id(workload: &str) -> WorkloadEndpointId {
        WorkloadEndpointId {
            orchestrator_id: "k8s".to_string(),
            workload_id: workload.to_string(),
            endpoint_id: "eth0".to_string(),
        }
    }

    fn members(state: &PolicyState, id: &str, candidates: &[&str]) -> BTreeSet<String> {
        let set = state.ip_set(id).expect("set exists");
        candidates
            .iter()
            .filter(|m| set.contains_member(m))
            .map(|m| m.to_string())
            .collect()
    }

    async fn apply(store: &PolicyStore, update: ToDataplane) -> Result<(), ProtocolError> {
        store.write(|state| apply_update(state, update)).await
    }

    async fn summary(store: &PolicyStore) -> StateSummary {
        store.read(|s| s.summary()).await.expect("open gate")
    }

    #[test]
    fn test_update_kind_classifies_payloads() {
        assert_eq!(update_kind(&Payload::InSync(InSync {})), UpdateKind::InSync);
        assert_eq!(
            update_kind(&Payload::IpsetRemove(IpSetRemove::default())),
            UpdateKind::IpSetRemove
        );
        assert_eq!(
            update_kind(&Payload::WorkloadEndpointRemove(Default::default())),
            UpdateKind::WorkloadEndpointRemove
        );
    }

    #[tokio::test]
    async fn test_update_without_payload_is_ignored() {
        let store = PolicyStore::default();
        let update = ToDataplane {
            sequence_number: 9,
            payload: None,
        };

        assert_eq!(apply(&store, update).await, Ok(()));
        assert_eq!(summary(&store).await, StateSummary::default());
    }

    #[tokio::test]
    async fn test_in_sync_marks_state() {
        let store = PolicyStore::default();
        apply(&store, msg(Payload::InSync(InSync {}))).await.unwrap();

        assert!(summary(&store).await.in_sync);
        assert!(store.is_in_sync());
    }

    #[tokio::test]
    async fn test_ip_set_update_creates_set_with_type() {
        let store = PolicyStore::default();
        let update = msg(Payload::IpsetUpdate(IpSetUpdate {
            id: "s:net".to_string(),
            members: vec!["10.0.0.0/8".to_string()],
            r#type: IpSetType::Net as i32,
        }));
        apply(&store, update).await.unwrap();

        let (set_type, len) = store
            .read(|s| {
                let set = s.ip_set("s:net").expect("created");
                (set.set_type(), set.len())
            })
            .await
            .unwrap();
        assert_eq!(set_type, IpSetType::Net);
        assert_eq!(len, 1);
    }

    #[tokio::test]
    async fn test_ip_set_full_update_is_additive_union() {
        let store = PolicyStore::default();
        apply(&store, ip_set_update("s1", &["10.0.0.1", "10.0.0.2"]))
            .await
            .unwrap();
        apply(&store, ip_set_update("s1", &["10.0.0.2", "10.0.0.3"]))
            .await
            .unwrap();

        let found = store
            .read(|s| members(s, "s1", &["10.0.0.1", "10.0.0.2", "10.0.0.3"]))
            .await
            .unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(store.read(|s| s.ip_set("s1").map(|s| s.len())).await, Ok(Some(3)));
    }

    #[tokio::test]
    async fn test_ip_set_unknown_type_falls_back_to_ip() {
        let store = PolicyStore::default();
        let update = msg(Payload::IpsetUpdate(IpSetUpdate {
            id: "s1".to_string(),
            members: vec![],
            r#type: 17,
        }));
        apply(&store, update).await.unwrap();

        let set_type = store.read(|s| s.ip_set("s1").map(|s| s.set_type())).await;
        assert_eq!(set_type, Ok(Some(IpSetType::Ip)));
    }

    #[tokio::test]
    async fn test_ip_set_delta_on_unknown_set_is_protocol_error() {
        let store = PolicyStore::default();

        let result = apply(&store, ip_set_delta("missing", &["10.0.0.1"], &[])).await;

        assert_eq!(
            result,
            Err(ProtocolError::UnknownIpSet {
                id: "missing".to_string()
            })
        );
        assert_eq!(summary(&store).await.ip_sets, 0);
    }

    #[tokio::test]
    async fn test_ip_set_delta_adds_then_removes() {
        let store = PolicyStore::default();
        apply(&store, ip_set_update("s1", &["10.0.0.1", "10.0.0.2"]))
            .await
            .unwrap();
        apply(
            &store,
            ip_set_delta("s1", &["10.0.0.3", "10.0.0.9"], &["10.0.0.1", "10.0.0.9"]),
        )
        .await
        .unwrap();

        let found = store
            .read(|s| members(s, "s1", &["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.9"]))
            .await
            .unwrap();
        let expected: BTreeSet<String> = ["10.0.0.2", "10.0.0.3"]
            .iter()
            .map(|m| m.to_string())
            .collect();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn test_ip_set_delta_member_in_both_lists_ends_absent() {
        let store = PolicyStore::default();
        apply(&store, ip_set_update("s1", &[])).await.unwrap();
        apply(&store, ip_set_delta("s1", &["X"], &["X"])).await.unwrap();

        let contains = store
            .read(|s| s.ip_set("s1").map(|set| set.contains_member("X")))
            .await;
        assert_eq!(contains, Ok(Some(false)));
    }

    #[tokio::test]
    async fn test_ip_set_remove() {
        let store = PolicyStore::default();
        apply(&store, ip_set_update("s1", &["10.0.0.1"])).await.unwrap();
        apply(
            &store,
            msg(Payload::IpsetRemove(IpSetRemove {
                id: "s1".to_string(),
            })),
        )
        .await
        .unwrap();

        assert_eq!(summary(&store).await.ip_sets, 0);
    }

    #[tokio::test]
    async fn test_removing_nonexistent_entries_is_noop() {
        let store = PolicyStore::default();
        apply(&store, ip_set_update("keep", &["10.0.0.1"])).await.unwrap();
        let before = summary(&store).await;

        for update in [
            msg(Payload::IpsetRemove(IpSetRemove {
                id: "nope".to_string(),
            })),
            msg(Payload::ActivePolicyRemove(ActivePolicyRemove {
                id: Some(policy_id("nope")),
            })),
            msg(Payload::ActiveProfileRemove(ActiveProfileRemove {
                id: Some(ProfileId {
                    name: "nope".to_string(),
                }),
            })),
        ] {
            assert_eq!(apply(&store, update).await, Ok(()));
        }

        assert_eq!(summary(&store).await, before);
    }

    #[tokio::test]
    async fn test_policy_update_replaces_wholesale() {
        let store = PolicyStore::default();
        for action in ["allow", "deny"] {
            apply(
                &store,
                msg(Payload::ActivePolicyUpdate(ActivePolicyUpdate {
                    id: Some(policy_id("p1")),
                    policy: Some(policy_with_action(action)),
                })),
            )
            .await
            .unwrap();
        }

        let policy = store
            .read(|s| s.policy_by_id.get(&policy_id("p1")).cloned())
            .await
            .unwrap();
        assert_eq!(policy, Some(policy_with_action("deny")));
    }

    #[tokio::test]
    async fn test_policy_remove() {
        let store = PolicyStore::default();
        apply(
            &store,
            msg(Payload::ActivePolicyUpdate(ActivePolicyUpdate {
                id: Some(policy_id("p1")),
                policy: Some(Policy::default()),
            })),
        )
        .await
        .unwrap();
        apply(
            &store,
            msg(Payload::ActivePolicyRemove(ActivePolicyRemove {
                id: Some(policy_id("p1")),
            })),
        )
        .await
        .unwrap();

        assert_eq!(summary(&store).await.policies, 0);
    }

    #[tokio::test]
    async fn test_policies_in_different_tiers_are_distinct() {
        let store = PolicyStore::default();
        for tier in ["default", "security"] {
            apply(
                &store,
                msg(Payload::ActivePolicyUpdate(ActivePolicyUpdate {
                    id: Some(PolicyId {
                        tier: tier.to_string(),
                        name: "p1".to_string(),
                    }),
                    policy: Some(Policy::default()),
                })),
            )
            .await
            .unwrap();
        }

        assert_eq!(summary(&store).await.policies, 2);
    }

    #[tokio::test]
    async fn test_nil_ids_are_protocol_errors() {
        let store = PolicyStore::default();
        apply(
            &store,
            msg(Payload::ActiveProfileUpdate(ActiveProfileUpdate {
                id: Some(ProfileId {
                    name: "existing".to_string(),
                }),
                profile: Some(Profile::default()),
            })),
        )
        .await
        .unwrap();
        let before = summary(&store).await;

        let cases = [
            (
                msg(Payload::ActivePolicyUpdate(ActivePolicyUpdate {
                    id: None,
                    policy: Some(Policy::default()),
                })),
                ProtocolError::MissingPolicyId {
                    kind: UpdateKind::ActivePolicyUpdate,
                },
            ),
            (
                msg(Payload::ActivePolicyRemove(ActivePolicyRemove { id: None })),
                ProtocolError::MissingPolicyId {
                    kind: UpdateKind::ActivePolicyRemove,
                },
            ),
            (
                msg(Payload::ActiveProfileUpdate(ActiveProfileUpdate {
                    id: None,
                    profile: Some(Profile::default()),
                })),
                ProtocolError::MissingProfileId {
                    kind: UpdateKind::ActiveProfileUpdate,
                },
            ),
            (
                msg(Payload::ActiveProfileRemove(ActiveProfileRemove { id: None })),
                ProtocolError::MissingProfileId {
                    kind: UpdateKind::ActiveProfileRemove,
                },
            ),
        ];

        for (update, expected) in cases {
            assert_eq!(apply(&store, update).await, Err(expected));
        }
        assert_eq!(summary(&store).await, before);
    }

    #[tokio::test]
    async fn test_endpoint_lifecycle() {
        let store = PolicyStore::default();
        let endpoint = WorkloadEndpoint {
            name: "eth0".to_string(),
            ipv4_nets: vec!["10.65.0.2/32".to_string()],
            profile_ids: vec!["kns.default".to_string()],
            ..Default::default()
        };

        apply(
            &store,
            msg(Payload::WorkloadEndpointUpdate(WorkloadEndpointUpdate {
                id: Some(endpoint_id("default/frontend")),
                endpoint: Some(endpoint.clone()),
            })),
        )
        .await
        .unwrap();

        let local = store.read(|s| s.endpoint.clone()).await.unwrap();
        assert_eq!(
            local,
            Some(LocalEndpoint {
                id: endpoint_id("default/frontend"),
                endpoint,
            })
        );

        apply(
            &store,
            msg(Payload::WorkloadEndpointRemove(WorkloadEndpointRemove {
                id: Some(endpoint_id("default/frontend")),
            })),
        )
        .await
        .unwrap();

        assert_eq!(store.read(|s| s.endpoint.clone()).await, Ok(None));
    }

    #[tokio::test]
    async fn test_endpoint_update_replaces_previous() {
        let store = PolicyStore::default();
        for workload in ["default/a", "default/b"] {
            apply(
                &store,
                msg(Payload::WorkloadEndpointUpdate(WorkloadEndpointUpdate {
                    id: Some(endpoint_id(workload)),
                    endpoint: Some(WorkloadEndpoint::default()),
                })),
            )
            .await
            .unwrap();
        }

        let workload = store
            .read(|s| s.endpoint.as_ref().map(|e| e.id.workload_id.clone()))
            .await;
        assert_eq!(workload, Ok(Some("default/b".to_string())));
    }

    /// Story: the final state is the ordered fold of every update
    ///
    /// Applying the same sequence to two fresh stores yields the same state,
    /// and the result reflects the order the updates arrived in.
    #[tokio::test]
    async fn story_replay_is_deterministic() {
        let updates = vec![
            ip_set_update("s1", &["10.0.0.1"]),
            msg(Payload::ActivePolicyUpdate(ActivePolicyUpdate {
                id: Some(policy_id("p1")),
                policy: Some(policy_with_action("allow")),
            })),
            ip_set_delta("s1", &["10.0.0.2"], &["10.0.0.1"]),
            msg(Payload::ActivePolicyUpdate(ActivePolicyUpdate {
                id: Some(policy_id("p1")),
                policy: Some(policy_with_action("deny")),
            })),
            msg(Payload::InSync(InSync {})),
        ];

        let mut snapshots = Vec::new();
        for _ in 0..2 {
            let store = PolicyStore::default();
            for update in updates.clone() {
                apply(&store, update).await.unwrap();
            }
            snapshots.push(
                store
                    .read(|s| {
                        (
                            s.summary(),
                            s.policy_by_id.get(&policy_id("p1")).cloned(),
                            members(s, "s1", &["10.0.0.1", "10.0.0.2"]),
                        )
                    })
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(snapshots[0], snapshots[1]);
        let (summary, policy, set) = &snapshots[0];
        assert!(summary.in_sync);
        assert_eq!(policy, &Some(policy_with_action("deny")));
        assert_eq!(set, &BTreeSet::from(["10.0.0.2".to_string()]));
    }
}
