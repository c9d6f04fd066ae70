//! Embeddable Raft consensus engine with pre-vote, leader leases, and log
//! compaction via snapshots.
//!
//! This crate owns protocol state and the replicated log; it performs no
//! I/O, timing, persistence, or state-machine application of its own. A host
//! program drives a [`Server`](server::Server) by delivering messages,
//! ticking a clock ([`Server::periodic`](server::Server::periodic)), and
//! implementing the [`Callbacks`] trait.

pub mod callbacks;
pub mod config;
pub mod entry;
pub mod error;
pub mod log;
pub mod message;
pub mod peer;
pub mod server;
pub mod testing;

pub use callbacks::Callbacks;
pub use config::ServerConfig;
pub use entry::{Entry, EntryType, LogIndex, Term};
pub use error::{CallbackError, Error, Result};
pub use log::Log;
pub use message::{
    AppendEntries, AppendEntriesResponse, InstallSnapshot, InstallSnapshotResponse, LogLevel,
    MembershipEvent, RequestVote, RequestVoteResponse, SnapshotChunkResult, VoteGranted,
};
pub use peer::{NodeId, Peer};
pub use server::{Role, Server};

/// Absolute monotonic time in milliseconds, as supplied by the host's
/// `get_time` callback. The engine never reads a wall clock itself.
pub type Time = u64;
