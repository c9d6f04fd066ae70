//! Scenario: a leader that has compacted its log past a follower's
//! `next_idx` sends an InstallSnapshot instead of AppendEntries; once the
//! follower's transfer completes, loading the snapshot catches it up to the
//! leader's compacted boundary in one step.

mod support;

use raft_engine::testing::TestCallbacks;
use raft_engine::{EntryType, NodeId, Server, ServerConfig};
use support::Cluster;

const A: NodeId = NodeId(1);
const B: NodeId = NodeId(2);

#[test]
fn follower_catches_up_via_snapshot_load() {
    let mut cluster = Cluster::new(&[A], ServerConfig::default(), 0);
    cluster.elect(A, 1500);

    for i in 0..100u64 {
        let idx0 = cluster.idx(A);
        cluster.servers[idx0]
            .recv_entry(&mut cluster.callbacks[idx0], i, EntryType::Normal, vec![])
            .unwrap();
    }
    let i = cluster.idx(A);
    assert_eq!(cluster.servers[i].commit_idx(), 100);
    cluster.apply_all(A);

    cluster.servers[i]
        .begin_snapshot(&mut cluster.callbacks[i], 100)
        .unwrap();
    cluster.servers[i].end_snapshot(&mut cluster.callbacks[i]).unwrap();
    assert_eq!(cluster.servers[i].log().base(), 100);
    let snapshot_term = cluster.servers[i].log().base_term();

    // A fresh follower, far behind, receives the snapshot directly (as it
    // would via InstallSnapshot once the leader notices next_idx <= base).
    let mut b = Server::new(B, ServerConfig::default(), 0).unwrap();
    let mut cb_b = TestCallbacks::new(99);
    b.add_peer(A, true);
    b.add_peer(B, true);

    let is_msg = raft_engine::InstallSnapshot {
        term: 1,
        last_idx: 100,
        last_term: snapshot_term,
        data: vec![],
        done: true,
    };
    let resp = b.recv_installsnapshot(&mut cb_b, A, &is_msg, 500).unwrap();
    assert!(resp.complete);

    b.begin_load_snapshot(snapshot_term, 100).unwrap();
    b.end_load_snapshot();

    assert_eq!(b.log().current_idx(), 100);
    assert_eq!(b.commit_idx(), 100);
    assert_eq!(b.last_applied_idx(), 100);
}

#[test]
fn begin_load_snapshot_rejects_stale_metadata() {
    let mut b = Server::new(B, ServerConfig::default(), 0).unwrap();
    b.add_peer(A, true);
    b.add_peer(B, true);
    b.begin_load_snapshot(5, 50).unwrap();
    let err = b.begin_load_snapshot(5, 50).unwrap_err();
    assert!(matches!(err, raft_engine::Error::SnapshotAlreadyLoaded));
}
