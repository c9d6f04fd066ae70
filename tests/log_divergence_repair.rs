//! Scenario: a follower's log has diverged from a newly elected leader's at
//! the tail. The leader's AppendEntries carries the correct prefix plus the
//! conflicting suffix; the follower truncates and re-appends rather than
//! rejecting forever.

use raft_engine::testing::TestCallbacks;
use raft_engine::{AppendEntries, Entry, EntryType, NodeId, Server, ServerConfig};

const A: NodeId = NodeId(1);
const B: NodeId = NodeId(2);

fn entry_at(idx: u64, term: u64, id: u64) -> Entry {
    let mut e = Entry::new(term, id, EntryType::Normal, vec![]);
    e.index = idx;
    e
}

#[test]
fn follower_truncates_and_repairs_conflicting_suffix() {
    let config = ServerConfig::default();
    let mut b = Server::new(B, config, 0).unwrap();
    let mut cb_b = TestCallbacks::new(1);
    b.add_peer(A, true);
    b.add_peer(B, true);

    // Build B's initial (soon-to-diverge) log: (1,1),(2,1),(3,2) under the
    // original term-1 leader.
    let ae1 = AppendEntries {
        term: 1,
        leader_id: A,
        prev_log_idx: 0,
        prev_log_term: 0,
        leader_commit: 0,
        entries: vec![entry_at(1, 1, 10), entry_at(2, 1, 11)],
    };
    let r1 = b.recv_appendentries(&mut cb_b, &ae1, 100).unwrap();
    assert!(r1.success);
    assert_eq!(r1.current_idx, 2);

    let ae2 = AppendEntries {
        term: 2,
        leader_id: A,
        prev_log_idx: 2,
        prev_log_term: 1,
        leader_commit: 0,
        entries: vec![entry_at(3, 2, 12)],
    };
    let r2 = b.recv_appendentries(&mut cb_b, &ae2, 150).unwrap();
    assert!(r2.success);
    assert_eq!(r2.current_idx, 3);
    assert_eq!(b.log().term_at(3), Some(2));

    // New leader at term 3 has (3, t3) instead of (3, t2).
    let ae3 = AppendEntries {
        term: 3,
        leader_id: A,
        prev_log_idx: 2,
        prev_log_term: 1,
        leader_commit: 0,
        entries: vec![entry_at(3, 3, 99)],
    };
    let r3 = b.recv_appendentries(&mut cb_b, &ae3, 200).unwrap();
    assert!(r3.success);
    assert_eq!(r3.current_idx, 3);
    assert_eq!(b.log().term_at(3), Some(3));
    assert_eq!(b.log().get_at(3).unwrap().id, 99);
    assert_eq!(b.current_term(), 3);
}

#[test]
fn committed_entry_mismatch_is_a_safety_violation() {
    let config = ServerConfig::default();
    let mut b = Server::new(B, config, 0).unwrap();
    let mut cb_b = TestCallbacks::new(1);
    b.add_peer(A, true);
    b.add_peer(B, true);

    let ae1 = AppendEntries {
        term: 1,
        leader_id: A,
        prev_log_idx: 0,
        prev_log_term: 0,
        leader_commit: 1,
        entries: vec![entry_at(1, 1, 10)],
    };
    let r1 = b.recv_appendentries(&mut cb_b, &ae1, 100).unwrap();
    assert!(r1.success);
    assert_eq!(b.commit_idx(), 1);

    // A "leader" now claims a different term at the already-committed index.
    let ae2 = AppendEntries {
        term: 2,
        leader_id: A,
        prev_log_idx: 1,
        prev_log_term: 99,
        leader_commit: 1,
        entries: vec![],
    };
    let err = b.recv_appendentries(&mut cb_b, &ae2, 200).unwrap_err();
    assert!(matches!(err, raft_engine::Error::Shutdown { .. }));
}
