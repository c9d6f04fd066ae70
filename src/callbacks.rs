//! The boundary the engine calls out through. Every side effect the engine
//! cannot perform itself — sending a message, persisting state, applying a
//! committed entry, reading the clock — is a method on this trait.
//!
//! The reference implementation this crate is modeled on passes an opaque
//! `void* udata` through a C function-pointer table; here that collapses
//! into ordinary trait dispatch, so hosts implement `Callbacks` on whatever
//! type holds their transport and storage handles.

use crate::entry::{Entry, LogIndex, Term};
use crate::error::CallbackError;
use crate::message::{
    AppendEntries, InstallSnapshot, LogLevel, MembershipEvent, RequestVote, SnapshotChunkResult,
};
use crate::peer::NodeId;
use crate::Time;

pub trait Callbacks {
    fn send_requestvote(&mut self, peer: NodeId, msg: &RequestVote);
    fn send_appendentries(&mut self, peer: NodeId, msg: &AppendEntries);
    fn send_installsnapshot(&mut self, peer: NodeId, msg: &InstallSnapshot);

    /// Apply a committed entry to the host's state machine. A returned error
    /// is treated as fatal and surfaces to the caller as `Error::Shutdown`.
    fn apply_log(&mut self, entry: &Entry, idx: LogIndex) -> Result<(), CallbackError>;

    fn persist_vote(&mut self, node: Option<NodeId>) -> Result<(), CallbackError>;
    fn persist_term(&mut self, term: Term, vote: Option<NodeId>) -> Result<(), CallbackError>;

    /// Durability hook for an append run; may accept fewer entries than
    /// offered by returning a smaller count, in which case the log commits
    /// only that many.
    fn log_offer(&mut self, entries: &[Entry], start_idx: LogIndex) -> Result<usize, CallbackError>;
    /// Durability hook for a suffix truncation, walked from the tail inward.
    fn log_pop(&mut self, entry: &Entry, idx: LogIndex) -> Result<(), CallbackError>;
    /// Durability hook for a prefix compaction (snapshot `poll_to`).
    fn log_poll(&mut self, entries: &[Entry], start_idx: LogIndex) -> Result<(), CallbackError>;

    /// Node id encoded in a configuration-change entry's payload.
    fn log_get_node_id(&self, entry: &Entry, idx: LogIndex) -> NodeId;

    fn recv_installsnapshot_chunk(
        &mut self,
        from: NodeId,
        msg: &InstallSnapshot,
    ) -> Result<SnapshotChunkResult, CallbackError>;

    /// One-shot notification that a non-voting node has caught up enough to
    /// be considered for promotion.
    fn node_has_sufficient_logs(&mut self, node: NodeId);

    fn notify_membership_event(&mut self, node: NodeId, entry: &Entry, event: MembershipEvent);

    /// Monotonic clock, in milliseconds. Must never go backwards.
    fn get_time(&self) -> Time;

    /// Uniform random value in `[0, 1)`, used to jitter election timeouts.
    fn get_rand(&mut self) -> f64;

    fn log(&mut self, node: Option<NodeId>, level: LogLevel, text: &str);
}
