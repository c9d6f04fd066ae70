//! Wire message shapes. The engine never serializes these itself — hosts
//! pick their own encoding (`serde` derives are available behind the
//! `serde` feature purely for convenience).

use crate::entry::{Entry, LogIndex, Term};
use crate::peer::NodeId;
use crate::Time;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestVote {
    pub term: Term,
    pub candidate_id: NodeId,
    pub last_log_idx: LogIndex,
    pub last_log_term: Term,
    /// A prevote never bumps the voter's term; it is only a straw poll of
    /// whether the candidate could win a real election.
    pub prevote: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VoteGranted {
    Granted,
    NotGranted,
    /// The candidate is not in our peer set; lets a removed node discover
    /// its own removal.
    UnknownNode,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: VoteGranted,
    pub prevote: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppendEntries {
    pub term: Term,
    pub leader_id: NodeId,
    pub prev_log_idx: LogIndex,
    pub prev_log_term: Term,
    pub leader_commit: LogIndex,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
    /// On success, the index of the last entry matched or appended. On
    /// failure, our current index, used by the leader to back off `next_idx`.
    pub current_idx: LogIndex,
    /// Echoes `prev_log_idx + 1` from the request so the leader can match
    /// responses to requests even if they arrive out of order.
    pub first_idx: LogIndex,
    /// Absolute time through which the follower promises to recognize the
    /// sender as leader.
    pub lease: Time,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstallSnapshot {
    pub term: Term,
    pub last_idx: LogIndex,
    pub last_term: Term,
    /// Host-defined chunk payload; the engine does not interpret it.
    pub data: Vec<u8>,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstallSnapshotResponse {
    pub term: Term,
    pub last_idx: LogIndex,
    pub complete: bool,
    pub lease: Time,
}

/// Outcome the host reports after handing a chunk of snapshot bytes to its
/// own transfer machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotChunkResult {
    Continue,
    Complete,
}

/// Membership-side-effect notifications raised from `offer_log`/`pop_log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEvent {
    NodeAdded,
    NodeRemoved,
    NodePromoted,
    NodeDemoted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
