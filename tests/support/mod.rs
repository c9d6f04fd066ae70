//! Shared multi-node simulation harness for the scenario-level integration
//! tests in this directory. Each test owns one [`Cluster`]; messages are
//! routed by draining each node's [`TestCallbacks`] record log and feeding
//! the payload into the destination node's matching `recv_*` handler, the
//! way an in-memory transport would.

#![allow(dead_code)]

use raft_engine::testing::{Recorded, TestCallbacks};
use raft_engine::{AppendEntries, AppendEntriesResponse, InstallSnapshot};
use raft_engine::{NodeId, RequestVote, RequestVoteResponse, Server, ServerConfig, Time};

enum Envelope {
    RequestVote(NodeId, NodeId, RequestVote),
    RequestVoteResponse(NodeId, NodeId, RequestVoteResponse),
    AppendEntries(NodeId, NodeId, AppendEntries),
    AppendEntriesResponse(NodeId, NodeId, AppendEntriesResponse),
    InstallSnapshot(NodeId, NodeId, InstallSnapshot),
}

pub struct Cluster {
    pub ids: Vec<NodeId>,
    pub servers: Vec<Server>,
    pub callbacks: Vec<TestCallbacks>,
}

impl Cluster {
    pub fn new(ids: &[NodeId], config: ServerConfig, now: Time) -> Self {
        let servers: Vec<Server> = ids
            .iter()
            .map(|id| Server::new(*id, config.clone(), now).unwrap())
            .collect();
        let callbacks: Vec<TestCallbacks> = ids
            .iter()
            .enumerate()
            .map(|(i, _)| TestCallbacks::new(i as u64 + 1))
            .collect();
        let mut cluster = Cluster {
            ids: ids.to_vec(),
            servers,
            callbacks,
        };
        for s in cluster.servers.iter_mut() {
            for id in ids {
                s.add_peer(*id, true);
            }
        }
        cluster
    }

    pub fn idx(&self, id: NodeId) -> usize {
        self.ids.iter().position(|i| *i == id).unwrap()
    }

    pub fn tick(&mut self, id: NodeId, now: Time) {
        let i = self.idx(id);
        self.servers[i].periodic(&mut self.callbacks[i], now).unwrap();
    }

    pub fn tick_all(&mut self, now: Time) {
        for i in 0..self.ids.len() {
            self.servers[i].periodic(&mut self.callbacks[i], now).unwrap();
        }
    }

    fn drain_envelopes(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        for (i, cb) in self.callbacks.iter_mut().enumerate() {
            let from = self.ids[i];
            for rec in cb.records.drain(..) {
                match rec {
                    Recorded::RequestVote { to, msg } => out.push(Envelope::RequestVote(from, to, msg)),
                    Recorded::AppendEntries { to, msg } => out.push(Envelope::AppendEntries(from, to, msg)),
                    Recorded::InstallSnapshot { to, msg } => {
                        out.push(Envelope::InstallSnapshot(from, to, msg))
                    }
                    _ => {}
                }
            }
        }
        out
    }

    /// Run the network until no node has anything left to send. Caps at a
    /// generous iteration bound so a protocol bug manifests as a test
    /// assertion failure rather than an infinite loop.
    pub fn pump(&mut self, now: Time) {
        let mut queue = self.drain_envelopes();
        for _ in 0..10_000 {
            let Some(envelope) = queue.pop() else {
                queue = self.drain_envelopes();
                if queue.is_empty() {
                    return;
                }
                continue;
            };
            match envelope {
                Envelope::RequestVote(from, to, msg) => {
                    let j = self.idx(to);
                    let resp = self.servers[j]
                        .recv_requestvote(&mut self.callbacks[j], from, &msg, now)
                        .unwrap();
                    queue.push(Envelope::RequestVoteResponse(to, from, resp));
                }
                Envelope::RequestVoteResponse(from, to, resp) => {
                    let j = self.idx(to);
                    self.servers[j]
                        .recv_requestvote_response(&mut self.callbacks[j], from, &resp, now)
                        .unwrap();
                }
                Envelope::AppendEntries(from, to, msg) => {
                    let j = self.idx(to);
                    let resp = self.servers[j]
                        .recv_appendentries(&mut self.callbacks[j], &msg, now)
                        .unwrap();
                    queue.push(Envelope::AppendEntriesResponse(to, from, resp));
                }
                Envelope::AppendEntriesResponse(from, to, resp) => {
                    let j = self.idx(to);
                    self.servers[j]
                        .recv_appendentries_response(&mut self.callbacks[j], from, &resp, now)
                        .unwrap();
                }
                Envelope::InstallSnapshot(from, to, msg) => {
                    let j = self.idx(to);
                    let _resp = self.servers[j]
                        .recv_installsnapshot(&mut self.callbacks[j], from, &msg, now)
                        .unwrap();
                }
            }
            queue.extend(self.drain_envelopes());
        }
        panic!("cluster simulation did not quiesce within the iteration bound");
    }

    /// Drives node `leader` through an uncontested election and pumps the
    /// resulting traffic to completion.
    pub fn elect(&mut self, leader: NodeId, now: Time) {
        self.tick(leader, now);
        self.pump(now);
        assert_eq!(
            self.servers[self.idx(leader)].role(),
            raft_engine::Role::Leader,
            "expected {leader:?} to become leader"
        );
    }

    pub fn apply_all(&mut self, id: NodeId) {
        let i = self.idx(id);
        self.servers[i].apply_committed(&mut self.callbacks[i]).unwrap();
    }
}
