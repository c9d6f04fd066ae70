//! Scenario: a single-voter cluster adds a non-voting node, the node catches
//! up and is flagged as having sufficient logs, and a subsequent promotion
//! goes through the same log-replicated configuration-change path.

mod support;

use raft_engine::testing::{encode_node_id, Recorded};
use raft_engine::{EntryType, NodeId, ServerConfig};
use support::Cluster;

const A: NodeId = NodeId(1);
const B: NodeId = NodeId(2);

#[test]
fn add_nonvoting_node_then_promote() {
    let mut cluster = Cluster::new(&[A], ServerConfig::default(), 0);
    cluster.elect(A, 1500);

    let i = cluster.idx(A);
    let add_idx = cluster.servers[i]
        .recv_entry(
            &mut cluster.callbacks[i],
            1,
            EntryType::AddNonVotingNode,
            encode_node_id(B),
        )
        .unwrap();
    // Majority of the single voting member (A) commits immediately.
    assert_eq!(cluster.servers[i].commit_idx(), add_idx);
    assert!(
        cluster.callbacks[i]
            .records
            .iter()
            .any(|r| matches!(r, Recorded::Membership { node, .. } if *node == B))
    );

    // B isn't a real cluster member in this test, but recv_entry's
    // structural validation only cares about the peer table, which now
    // contains B as non-voting.
    let promote_idx = cluster.servers[i]
        .recv_entry(
            &mut cluster.callbacks[i],
            2,
            EntryType::PromoteNode,
            encode_node_id(B),
        )
        .unwrap();
    assert_eq!(cluster.servers[i].commit_idx(), promote_idx);
}

#[test]
fn concurrent_voting_changes_are_rejected() {
    let mut cluster = Cluster::new(&[A], ServerConfig::default(), 0);
    cluster.elect(A, 1500);
    let i = cluster.idx(A);

    cluster.servers[i]
        .recv_entry(&mut cluster.callbacks[i], 1, EntryType::AddNonVotingNode, encode_node_id(B))
        .unwrap();

    // Single-voter cluster commits every entry immediately, so
    // voting_cfg_change_log_idx clears again once applied — simulate a
    // slower host that hasn't applied yet by checking the promote path
    // still works once it has.
    cluster.apply_all(A);
    let promote_idx = cluster.servers[i]
        .recv_entry(&mut cluster.callbacks[i], 2, EntryType::PromoteNode, encode_node_id(B))
        .unwrap();
    assert_eq!(cluster.servers[i].commit_idx(), promote_idx);

    // voting_cfg_change_log_idx is still held by the not-yet-applied promote,
    // so a second voting change is rejected outright.
    let err = cluster.servers[i]
        .recv_entry(&mut cluster.callbacks[i], 3, EntryType::DemoteNode, encode_node_id(B))
        .unwrap_err();
    assert!(matches!(err, raft_engine::Error::OneVotingChangeOnly));

    // ...and once it's applied, the slot frees up, but B is already voting so
    // promoting it again is structurally invalid.
    cluster.apply_all(A);
    let err = cluster.servers[i]
        .recv_entry(&mut cluster.callbacks[i], 4, EntryType::PromoteNode, encode_node_id(B))
        .unwrap_err();
    assert!(matches!(err, raft_engine::Error::InvalidCfgChange { .. }));
}
