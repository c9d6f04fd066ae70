//! In-memory [`Callbacks`] harness for this crate's own test suite.
//!
//! Exported unconditionally (no feature gate) so downstream hosts can reuse
//! it for their own simulation tests.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::callbacks::Callbacks;
use crate::entry::{Entry, LogIndex, Term};
use crate::error::CallbackError;
use crate::message::{
    AppendEntries, InstallSnapshot, LogLevel, MembershipEvent, RequestVote, SnapshotChunkResult,
};
use crate::peer::NodeId;
use crate::Time;

/// One observed side effect, recorded in send order so tests can assert on
/// both occurrence and ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    RequestVote { to: NodeId, msg: RequestVote },
    AppendEntries { to: NodeId, msg: AppendEntries },
    InstallSnapshot { to: NodeId, msg: InstallSnapshot },
    Applied { idx: LogIndex, entry: Entry },
    PersistedTerm { term: Term, vote: Option<NodeId> },
    PersistedVote { vote: Option<NodeId> },
    Membership { node: NodeId, event: MembershipEvent },
}

/// Per-node id, for hosts that encode a cfg-change entry's target node as a
/// little-endian `u64` in the entry payload, the convention this harness's
/// own integration tests use.
pub fn encode_node_id(id: NodeId) -> Vec<u8> {
    id.0.to_le_bytes().to_vec()
}

fn decode_node_id(data: &[u8]) -> NodeId {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[0..8]);
    NodeId(u64::from_le_bytes(buf))
}

/// Scriptable, in-memory [`Callbacks`] implementation. Time and randomness
/// are both under test control; nothing in it blocks or touches real I/O.
pub struct TestCallbacks {
    pub time: Time,
    rand: StdRng,
    pub records: Vec<Recorded>,
    pub snapshot_chunks_remaining: HashMap<NodeId, u32>,
    /// When set, the next `apply_log` call for this index returns this error
    /// instead of succeeding, used to exercise the `Shutdown` path.
    pub fail_apply_at: Option<LogIndex>,
}

impl TestCallbacks {
    /// A seeded `StdRng` makes election-timeout jitter reproducible across
    /// test runs instead of pulling from `rand::thread_rng`'s process-global
    /// state.
    pub fn new(seed: u64) -> Self {
        TestCallbacks {
            time: 0,
            rand: StdRng::seed_from_u64(seed),
            records: Vec::new(),
            snapshot_chunks_remaining: HashMap::new(),
            fail_apply_at: None,
        }
    }

    pub fn advance(&mut self, by: Time) {
        self.time += by;
    }

    pub fn applied(&self) -> Vec<(LogIndex, Entry)> {
        self.records
            .iter()
            .filter_map(|r| match r {
                Recorded::Applied { idx, entry } => Some((*idx, entry.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn sent_requestvotes(&self) -> Vec<(NodeId, RequestVote)> {
        self.records
            .iter()
            .filter_map(|r| match r {
                Recorded::RequestVote { to, msg } => Some((*to, msg.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn sent_appendentries(&self) -> Vec<(NodeId, AppendEntries)> {
        self.records
            .iter()
            .filter_map(|r| match r {
                Recorded::AppendEntries { to, msg } => Some((*to, msg.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear_records(&mut self) {
        self.records.clear();
    }
}

impl Callbacks for TestCallbacks {
    fn send_requestvote(&mut self, peer: NodeId, msg: &RequestVote) {
        self.records.push(Recorded::RequestVote {
            to: peer,
            msg: msg.clone(),
        });
    }

    fn send_appendentries(&mut self, peer: NodeId, msg: &AppendEntries) {
        self.records.push(Recorded::AppendEntries {
            to: peer,
            msg: msg.clone(),
        });
    }

    fn send_installsnapshot(&mut self, peer: NodeId, msg: &InstallSnapshot) {
        self.records.push(Recorded::InstallSnapshot {
            to: peer,
            msg: msg.clone(),
        });
    }

    fn apply_log(&mut self, entry: &Entry, idx: LogIndex) -> Result<(), CallbackError> {
        if self.fail_apply_at == Some(idx) {
            return Err(CallbackError::msg(format!("forced apply failure at {idx}")));
        }
        self.records.push(Recorded::Applied {
            idx,
            entry: entry.clone(),
        });
        Ok(())
    }

    fn persist_vote(&mut self, node: Option<NodeId>) -> Result<(), CallbackError> {
        self.records.push(Recorded::PersistedVote { vote: node });
        Ok(())
    }

    fn persist_term(&mut self, term: Term, vote: Option<NodeId>) -> Result<(), CallbackError> {
        self.records.push(Recorded::PersistedTerm { term, vote });
        Ok(())
    }

    fn log_offer(&mut self, _entries: &[Entry], _start_idx: LogIndex) -> Result<usize, CallbackError> {
        Ok(_entries.len())
    }

    fn log_pop(&mut self, _entry: &Entry, _idx: LogIndex) -> Result<(), CallbackError> {
        Ok(())
    }

    fn log_poll(&mut self, _entries: &[Entry], _start_idx: LogIndex) -> Result<(), CallbackError> {
        Ok(())
    }

    fn log_get_node_id(&self, entry: &Entry, _idx: LogIndex) -> NodeId {
        decode_node_id(&entry.data)
    }

    fn recv_installsnapshot_chunk(
        &mut self,
        from: NodeId,
        _msg: &InstallSnapshot,
    ) -> Result<SnapshotChunkResult, CallbackError> {
        let remaining = self.snapshot_chunks_remaining.entry(from).or_insert(0);
        if *remaining == 0 {
            Ok(SnapshotChunkResult::Complete)
        } else {
            *remaining -= 1;
            Ok(SnapshotChunkResult::Continue)
        }
    }

    fn node_has_sufficient_logs(&mut self, _node: NodeId) {}

    fn notify_membership_event(&mut self, node: NodeId, _entry: &Entry, event: MembershipEvent) {
        self.records.push(Recorded::Membership { node, event });
    }

    fn get_time(&self) -> Time {
        self.time
    }

    fn get_rand(&mut self) -> f64 {
        self.rand.random::<f64>()
    }

    fn log(&mut self, _node: Option<NodeId>, _level: LogLevel, _text: &str) {}
}
