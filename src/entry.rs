//! Log entry types shared by [`crate::log::Log`] and the server.

pub type LogIndex = u64;
pub type Term = u64;

/// Discriminates ordinary client entries from configuration-change and
/// snapshot-boundary entries. The four `*_NODE`/`*_NONVOTING_NODE` variants
/// that touch voting membership are "voting cfg changes"; at most one may sit
/// uncommitted in the log at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntryType {
    Normal,
    AddNonVotingNode,
    AddNode,
    PromoteNode,
    DemoteNode,
    RemoveNonVotingNode,
    RemoveNode,
    /// Sentinel entry created at `base + 1` by [`crate::log::Log::load_from_snapshot`].
    Snapshot,
}

impl EntryType {
    pub fn is_voting_cfg_change(self) -> bool {
        matches!(
            self,
            EntryType::AddNode
                | EntryType::PromoteNode
                | EntryType::DemoteNode
                | EntryType::RemoveNode
        )
    }

    pub fn is_cfg_change(self) -> bool {
        self.is_voting_cfg_change()
            || matches!(
                self,
                EntryType::AddNonVotingNode | EntryType::RemoveNonVotingNode
            )
    }
}

/// A single log entry. `index` is assigned by the log on append, never by
/// the caller.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entry {
    pub index: LogIndex,
    pub term: Term,
    /// Host-chosen identifier, opaque to the engine, used for client-side
    /// deduplication of resubmitted entries.
    pub id: u64,
    pub entry_type: EntryType,
    pub data: Vec<u8>,
}

impl Entry {
    pub fn new(term: Term, id: u64, entry_type: EntryType, data: Vec<u8>) -> Self {
        Entry {
            index: 0,
            term,
            id,
            entry_type,
            data,
        }
    }
}
