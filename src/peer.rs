//! Peer bookkeeping the leader and follower roles both need.

use crate::entry::LogIndex;
use crate::Time;

/// Stable identity of a cluster member. Opaque to the engine beyond equality
/// and ordering; hosts typically derive it from a network address or UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-peer state the leader tracks for replication and lease reasoning, and
/// which every node (leader or not) keeps a slot for so peer lists survive
/// role changes.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: NodeId,
    pub voting: bool,
    pub is_self: bool,
    /// Set once a non-voting node has caught up enough to be promoted.
    pub has_sufficient_logs: bool,
    /// Leader's guess of the next log index to send this peer.
    pub next_idx: LogIndex,
    /// Highest index known durably replicated on this peer.
    pub match_idx: LogIndex,
    /// When the leader started counting this peer towards lease majorities.
    /// Per the reference implementation this is only initialized in
    /// `become_leader` or when a leader adds a node; a peer added while we
    /// are not yet leader never gets this set until we next become leader.
    pub effective_time: Option<Time>,
    /// Absolute time through which this peer has promised to recognize us
    /// as leader, as last reported in an AppendEntries response.
    pub lease: Time,
    /// Per-election tally flag, reset at the start of each election.
    pub vote_for_me: bool,
}

impl Peer {
    pub fn new(id: NodeId, voting: bool, is_self: bool) -> Self {
        Peer {
            id,
            voting,
            is_self,
            has_sufficient_logs: is_self,
            next_idx: 1,
            match_idx: 0,
            effective_time: None,
            lease: 0,
            vote_for_me: false,
        }
    }
}
