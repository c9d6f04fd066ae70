//! Configuration changes are ordinary log entries with side effects applied
//! the moment they are appended (not when committed), and unwound the moment
//! they are popped off the log during a suffix truncation. Keeping forward
//! and inverse application as a single reversibility table is what makes log
//! divergence repair safe for membership entries.

use crate::entry::{EntryType, LogIndex};
use crate::error::{Error, Result};
use crate::message::MembershipEvent;
use crate::peer::{NodeId, Peer};

fn find_mut<'a>(peers: &'a mut [Peer], id: NodeId) -> Option<&'a mut Peer> {
    peers.iter_mut().find(|p| p.id == id)
}

/// Which membership notification, if any, a forward cfg-change application
/// corresponds to. `Normal`/`Snapshot` entries never raise one.
pub(crate) fn membership_event_for(entry_type: EntryType) -> Option<MembershipEvent> {
    use EntryType::*;
    match entry_type {
        AddNonVotingNode | AddNode => Some(MembershipEvent::NodeAdded),
        PromoteNode => Some(MembershipEvent::NodePromoted),
        DemoteNode => Some(MembershipEvent::NodeDemoted),
        RemoveNonVotingNode | RemoveNode => Some(MembershipEvent::NodeRemoved),
        Normal | Snapshot => None,
    }
}

/// Structural validity check run before a configuration-change entry is
/// accepted from a client, independent of whether it will ultimately commit.
pub(crate) fn validate_cfg_change(
    peers: &[Peer],
    self_id: NodeId,
    entry_type: EntryType,
    node_id: NodeId,
) -> Result<()> {
    if node_id == self_id {
        return Err(Error::InvalidCfgChange {
            reason: "a node cannot change its own membership".into(),
        });
    }
    let existing = peers.iter().find(|p| p.id == node_id);
    use EntryType::*;
    let ok = match entry_type {
        AddNonVotingNode | AddNode => existing.is_none(),
        PromoteNode => matches!(existing, Some(p) if !p.voting),
        DemoteNode | RemoveNode => matches!(existing, Some(p) if p.voting),
        RemoveNonVotingNode => matches!(existing, Some(p) if !p.voting),
        Normal | Snapshot => true,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidCfgChange {
            reason: format!("{entry_type:?} is not valid for node {node_id} in its current state"),
        })
    }
}

/// Forward application, invoked from `Log::append`'s `offer` callback the
/// moment a cfg-change entry is accepted.
pub(crate) fn apply_cfg_change(
    peers: &mut Vec<Peer>,
    voting_cfg_change_log_idx: &mut Option<LogIndex>,
    self_id: NodeId,
    node_id: NodeId,
    entry_type: EntryType,
    idx: LogIndex,
) {
    use EntryType::*;
    match entry_type {
        AddNonVotingNode => {
            if find_mut(peers, node_id).is_none() {
                peers.push(Peer::new(node_id, false, node_id == self_id));
            }
        }
        AddNode => {
            if let Some(p) = find_mut(peers, node_id) {
                p.voting = true;
            } else {
                peers.push(Peer::new(node_id, true, node_id == self_id));
            }
        }
        PromoteNode => {
            if let Some(p) = find_mut(peers, node_id) {
                p.voting = true;
            }
        }
        DemoteNode => {
            if let Some(p) = find_mut(peers, node_id) {
                p.voting = false;
            }
        }
        RemoveNonVotingNode | RemoveNode => {
            peers.retain(|p| p.id != node_id);
        }
        Normal | Snapshot => {}
    }
    if entry_type.is_voting_cfg_change() {
        *voting_cfg_change_log_idx = Some(idx);
    }
}

/// Inverse of [`apply_cfg_change`], invoked from `Log::delete_from`'s `pop`
/// callback when a cfg-change entry is truncated off the log before commit.
pub(crate) fn revert_cfg_change(
    peers: &mut Vec<Peer>,
    voting_cfg_change_log_idx: &mut Option<LogIndex>,
    self_id: NodeId,
    node_id: NodeId,
    entry_type: EntryType,
    idx: LogIndex,
) {
    use EntryType::*;
    match entry_type {
        AddNonVotingNode | AddNode => {
            peers.retain(|p| p.id != node_id);
        }
        PromoteNode => {
            if let Some(p) = find_mut(peers, node_id) {
                p.voting = false;
            }
        }
        DemoteNode => {
            if let Some(p) = find_mut(peers, node_id) {
                p.voting = true;
            }
        }
        RemoveNonVotingNode => {
            if find_mut(peers, node_id).is_none() {
                peers.push(Peer::new(node_id, false, node_id == self_id));
            }
        }
        RemoveNode => {
            if find_mut(peers, node_id).is_none() {
                peers.push(Peer::new(node_id, true, node_id == self_id));
            }
        }
        Normal | Snapshot => {}
    }
    if let Some(pending) = *voting_cfg_change_log_idx {
        if idx <= pending {
            *voting_cfg_change_log_idx = None;
        }
    }
}
