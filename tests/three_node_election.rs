//! Scenario: three voting nodes, all followers. A's election timer fires
//! first; it should win pre-vote, graduate to a real election, win that too,
//! and become leader, sending heartbeats to B and C.

use raft_engine::message::VoteGranted;
use raft_engine::testing::TestCallbacks;
use raft_engine::{NodeId, Role, Server, ServerConfig};

const A: NodeId = NodeId(1);
const B: NodeId = NodeId(2);
const C: NodeId = NodeId(3);

fn three_node_cluster() -> (Server, Server, Server) {
    let config = ServerConfig::default();
    let mut a = Server::new(A, config.clone(), 0).unwrap();
    let mut b = Server::new(B, config.clone(), 0).unwrap();
    let mut c = Server::new(C, config, 0).unwrap();
    for s in [&mut a, &mut b, &mut c] {
        s.add_peer(A, true);
        s.add_peer(B, true);
        s.add_peer(C, true);
    }
    (a, b, c)
}

#[test]
fn a_wins_prevote_then_real_election_then_becomes_leader() {
    let (mut a, mut b, mut c) = three_node_cluster();
    let mut cb_a = TestCallbacks::new(1);
    let mut cb_b = TestCallbacks::new(2);
    let mut cb_c = TestCallbacks::new(3);

    a.periodic(&mut cb_a, 1500).unwrap();
    assert_eq!(a.role(), Role::Candidate);

    let prevotes = cb_a.sent_requestvotes();
    assert_eq!(prevotes.len(), 2);
    assert!(prevotes.iter().all(|(_, m)| m.prevote));
    cb_a.clear_records();

    for (to, msg) in &prevotes {
        let (callee, cb) = if *to == B { (&mut b, &mut cb_b) } else { (&mut c, &mut cb_c) };
        let resp = callee.recv_requestvote(cb, A, msg, 1500).unwrap();
        assert_eq!(resp.vote_granted, VoteGranted::Granted);
        a.recv_requestvote_response(&mut cb_a, callee.self_id(), &resp, 1500)
            .unwrap();
    }

    // Pre-vote majority reached: A graduated to a real election (term bump,
    // vote for self) and sent real RequestVote to both peers.
    assert_eq!(a.current_term(), 1);
    let real_votes = cb_a.sent_requestvotes();
    assert_eq!(real_votes.len(), 2);
    assert!(real_votes.iter().all(|(_, m)| !m.prevote));
    cb_a.clear_records();

    for (to, msg) in &real_votes {
        let (callee, cb) = if *to == B { (&mut b, &mut cb_b) } else { (&mut c, &mut cb_c) };
        let resp = callee.recv_requestvote(cb, A, msg, 1500).unwrap();
        assert_eq!(resp.vote_granted, VoteGranted::Granted);
        a.recv_requestvote_response(&mut cb_a, callee.self_id(), &resp, 1500)
            .unwrap();
    }

    assert_eq!(a.role(), Role::Leader);
    assert_eq!(a.leader_id(), Some(A));
    let heartbeats = cb_a.sent_appendentries();
    assert_eq!(heartbeats.len(), 2);
    assert!(heartbeats.iter().all(|(_, ae)| ae.entries.is_empty()));
}

#[test]
fn candidate_refuses_to_start_while_leader_lease_is_live() {
    let (mut a, mut b, _c) = three_node_cluster();
    let mut cb_a = TestCallbacks::new(1);
    let mut cb_b = TestCallbacks::new(2);

    // A becomes leader uncontested by skipping straight to the role (what
    // matters here is B's view: a live lease on leader A).
    a.periodic(&mut cb_a, 2000).unwrap();
    for (to, msg) in cb_a.sent_requestvotes() {
        if to == B {
            let resp = b.recv_requestvote(&mut cb_b, A, &msg, 2000).unwrap();
            a.recv_requestvote_response(&mut cb_a, B, &resp, 2000).unwrap();
        }
    }

    let ae = raft_engine::AppendEntries {
        term: a.current_term().max(1),
        leader_id: A,
        prev_log_idx: 0,
        prev_log_term: 0,
        leader_commit: 0,
        entries: vec![],
    };
    b.recv_appendentries(&mut cb_b, &ae, 2000).unwrap();
    assert_eq!(b.leader_id(), Some(A));

    // B's election timer fires shortly after, well within the lease window.
    let err = b.become_candidate(&mut cb_b, 2300).unwrap_err();
    assert!(matches!(err, raft_engine::Error::MightViolateLease));
    assert_eq!(b.role(), Role::Follower);
}
