//! Client entry submission and the AppendEntries protocol: construction,
//! follower-side consistency checking, and leader-side response handling
//! including commit-index advancement.

use tracing::{debug, info, instrument};

use super::{Role, Server};
use crate::callbacks::Callbacks;
use crate::entry::{Entry, EntryType, LogIndex};
use crate::error::{Error, Result};
use crate::message::AppendEntries;
use crate::message::AppendEntriesResponse;
use crate::peer::NodeId;
use crate::Time;

impl Server {
    /// Submit a client entry. Only the leader accepts; cfg-change entries
    /// get extra validation (at most one outstanding voting change, no
    /// snapshot in progress, structurally sound membership transition).
    #[instrument(level = "debug", skip(self, cb, data), fields(self_id = ?self.self_id))]
    pub fn recv_entry(
        &mut self,
        cb: &mut impl Callbacks,
        id: u64,
        entry_type: EntryType,
        data: Vec<u8>,
    ) -> Result<LogIndex> {
        if self.role != Role::Leader {
            return Err(Error::NotLeader {
                leader_hint: self.leader_id,
            });
        }
        let mut entry = Entry::new(self.current_term, id, entry_type, data);
        entry.index = self.log.current_idx() + 1;

        if entry_type.is_cfg_change() {
            if self.snapshot_in_progress {
                return Err(Error::SnapshotInProgress);
            }
            if entry_type.is_voting_cfg_change() && self.voting_cfg_change_log_idx.is_some() {
                return Err(Error::OneVotingChangeOnly);
            }
            let node_id = cb.log_get_node_id(&entry, entry.index);
            super::membership::validate_cfg_change(&self.peers, self.self_id, entry_type, node_id)?;
        }

        let idx = self.append_local(cb, &entry)?;

        if self.voting_peer_count() == 1 {
            self.advance_commit_to(idx);
        } else {
            for peer_id in self.caught_up_voting_peers(idx) {
                self.send_appendentries_to(cb, peer_id);
            }
        }
        Ok(idx)
    }

    fn caught_up_voting_peers(&self, current_idx: LogIndex) -> Vec<NodeId> {
        self.peers
            .iter()
            .filter(|p| !p.is_self && p.voting && p.next_idx == current_idx)
            .map(|p| p.id)
            .collect()
    }

    /// Append one entry into our own log, running it through the same
    /// `offer_log`/membership side-effect path a replicated append would.
    pub(crate) fn append_local(&mut self, cb: &mut impl Callbacks, entry: &Entry) -> Result<LogIndex> {
        let entries = [entry.clone()];
        let accepted = self.append_with_side_effects(cb, &entries)?;
        if accepted == 0 {
            return Err(Error::NoMem);
        }
        Ok(self.log.current_idx())
    }

    /// Truncate the suffix from `idx`, unwinding any cfg-change side effects
    /// in reverse-append order via the membership reversibility table.
    pub(crate) fn delete_from_with_side_effects(
        &mut self,
        cb: &mut impl Callbacks,
        idx: LogIndex,
    ) -> Result<()> {
        let self_id = self.self_id;
        let voting_cfg_change_log_idx = &mut self.voting_cfg_change_log_idx;
        let peers = &mut self.peers;
        self.log.delete_from(idx, |entry, popped_idx| {
            cb.log_pop(entry, popped_idx)?;
            if entry.entry_type.is_cfg_change() {
                let node_id = cb.log_get_node_id(entry, popped_idx);
                super::membership::revert_cfg_change(
                    peers,
                    voting_cfg_change_log_idx,
                    self_id,
                    node_id,
                    entry.entry_type,
                    popped_idx,
                );
            }
            Ok(())
        })
    }

    pub(crate) fn append_with_side_effects(
        &mut self,
        cb: &mut impl Callbacks,
        entries: &[Entry],
    ) -> Result<usize> {
        let self_id = self.self_id;
        let voting_cfg_change_log_idx = &mut self.voting_cfg_change_log_idx;
        let peers = &mut self.peers;
        let n = self.log.append(entries, |run, start_idx| {
            for (offset, e) in run.iter().enumerate() {
                let idx = start_idx + offset as LogIndex;
                if e.entry_type.is_cfg_change() {
                    let node_id = cb.log_get_node_id(e, idx);
                    super::membership::apply_cfg_change(
                        peers,
                        voting_cfg_change_log_idx,
                        self_id,
                        node_id,
                        e.entry_type,
                        idx,
                    );
                    if let Some(event) = super::membership::membership_event_for(e.entry_type) {
                        cb.notify_membership_event(node_id, e, event);
                    }
                }
            }
            cb.log_offer(run, start_idx).map(|accepted| accepted.min(run.len()))
        })?;
        Ok(n)
    }

    /// Build and send an AppendEntries (or, if the peer has fallen behind
    /// the compacted prefix, delegate to InstallSnapshot) to one peer.
    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id, peer = ?peer_id))]
    pub(crate) fn send_appendentries_to(&mut self, cb: &mut impl Callbacks, peer_id: NodeId) {
        let next_idx = match self.peer(peer_id) {
            Some(p) => p.next_idx,
            None => return,
        };

        if next_idx <= self.log.base() && self.log.base() > 0 {
            self.send_installsnapshot_to(cb, peer_id);
            return;
        }

        let prev_log_idx = next_idx.saturating_sub(1);
        let prev_log_term = self.log.term_at(prev_log_idx).unwrap_or(0);
        let entries = self.log.slice_from(next_idx, self.config.max_entries_per_append);

        let msg = AppendEntries {
            term: self.current_term,
            leader_id: self.self_id,
            prev_log_idx,
            prev_log_term,
            leader_commit: self.commit_idx,
            entries,
        };
        cb.send_appendentries(peer_id, &msg);
    }

    pub(crate) fn send_appendentries_to_all(&mut self, cb: &mut impl Callbacks) {
        let targets: Vec<NodeId> = self.peers.iter().filter(|p| !p.is_self).map(|p| p.id).collect();
        for peer_id in targets {
            self.send_appendentries_to(cb, peer_id);
        }
    }

    /// Follower-side AppendEntries handling: term/role bookkeeping, the
    /// previous-entry consistency check, conflict truncation, and
    /// commit-index catch-up.
    #[instrument(level = "debug", skip(self, cb, ae), fields(self_id = ?self.self_id))]
    pub fn recv_appendentries(
        &mut self,
        cb: &mut impl Callbacks,
        ae: &AppendEntries,
        now: Time,
    ) -> Result<AppendEntriesResponse> {
        let first_idx = ae.prev_log_idx + 1;

        if self.role == Role::Candidate && ae.term == self.current_term {
            self.become_follower(cb, now);
        }
        if ae.term > self.current_term {
            self.update_term(cb, ae.term)?;
            self.become_follower(cb, now);
        }
        if ae.term < self.current_term {
            return Ok(self.reject_appendentries(first_idx, now));
        }

        self.leader_id = Some(ae.leader_id);
        self.first_start = false;
        self.election_timer = now;
        let lease = now + self.config.election_timeout;

        if ae.prev_log_idx > 0 {
            match self.log.term_at(ae.prev_log_idx) {
                None => {
                    if ae.prev_log_idx > self.log.current_idx() {
                        debug!(prev_log_idx = ae.prev_log_idx, "missing entries, rejecting");
                        return Ok(self.reject_appendentries(first_idx, now));
                    }
                }
                Some(term) if term != ae.prev_log_term => {
                    if ae.prev_log_idx <= self.commit_idx {
                        return Err(Error::Shutdown {
                            reason: format!(
                                "committed entry at {} has term {} but leader expects {}",
                                ae.prev_log_idx, term, ae.prev_log_term
                            ),
                        });
                    }
                    self.delete_from_with_side_effects(cb, ae.prev_log_idx)?;
                    return Ok(self.reject_appendentries(first_idx, now));
                }
                _ => {}
            }
        }

        let mut last_matched = ae.prev_log_idx;
        let mut to_append: Vec<Entry> = Vec::new();
        for e in &ae.entries {
            match self.log.term_at(e.index) {
                Some(term) if term == e.term => {
                    last_matched = e.index;
                }
                Some(_) => {
                    if e.index <= self.commit_idx {
                        return Err(Error::Shutdown {
                            reason: format!("attempted to overwrite committed entry {}", e.index),
                        });
                    }
                    self.delete_from_with_side_effects(cb, e.index)?;
                    to_append.push(e.clone());
                }
                None => to_append.push(e.clone()),
            }
        }

        if !to_append.is_empty() {
            let accepted = self.append_with_side_effects(cb, &to_append)?;
            last_matched = to_append[..accepted]
                .last()
                .map(|e| e.index)
                .unwrap_or(last_matched);
        }

        if ae.leader_commit > self.commit_idx {
            self.commit_idx = ae.leader_commit.min(last_matched);
        }

        Ok(AppendEntriesResponse {
            term: self.current_term,
            success: true,
            current_idx: last_matched,
            first_idx,
            lease,
        })
    }

    fn reject_appendentries(&self, first_idx: LogIndex, now: Time) -> AppendEntriesResponse {
        AppendEntriesResponse {
            term: self.current_term,
            success: false,
            current_idx: self.log.current_idx(),
            first_idx,
            lease: now + self.config.election_timeout,
        }
    }

    /// Leader-side AppendEntries response handling: term bookkeeping,
    /// match/next index advancement, commit-index advancement, and
    /// node-has-sufficient-logs notification for catching-up non-voters.
    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id, peer = ?from))]
    pub fn recv_appendentries_response(
        &mut self,
        cb: &mut impl Callbacks,
        from: NodeId,
        r: &AppendEntriesResponse,
        now: Time,
    ) -> Result<()> {
        if r.term > self.current_term {
            self.update_term(cb, r.term)?;
            self.become_follower(cb, now);
            return Ok(());
        }
        if r.term < self.current_term || self.role != Role::Leader {
            return Ok(());
        }

        let Some(peer) = self.peer_mut(from) else {
            return Ok(());
        };
        peer.lease = r.lease;

        if !r.success {
            let match_idx = peer.match_idx;
            let current_idx = self.log.current_idx();
            peer.next_idx = peer
                .next_idx
                .saturating_sub(1)
                .max(match_idx + 1)
                .min((r.current_idx + 1).min(current_idx + 1));
            self.send_appendentries_to(cb, from);
            return Ok(());
        }

        let mut sufficient_logs_target = None;
        {
            let peer = self.peer_mut(from).expect("checked above");
            if r.current_idx > peer.match_idx {
                peer.next_idx = r.current_idx + 1;
                peer.match_idx = r.current_idx;
            }
            if !peer.is_self
                && !peer.voting
                && !peer.has_sufficient_logs
                && self.voting_cfg_change_log_idx.is_none()
                && self.log.current_idx() <= r.current_idx + 1
            {
                peer.has_sufficient_logs = true;
                sufficient_logs_target = Some(peer.id);
            }
        }
        if let Some(node) = sufficient_logs_target {
            cb.node_has_sufficient_logs(node);
        }

        self.advance_commit_index();
        Ok(())
    }

    /// Raft §5.4.2: a leader can only advance `commit_idx` to an index whose
    /// term equals its own current term, even once a majority replicates it.
    fn advance_commit_index(&mut self) {
        if self.role != Role::Leader {
            return;
        }
        let current_idx = self.log.current_idx();
        let mut candidate = current_idx;
        while candidate > self.commit_idx {
            let term_at_candidate = self.log.term_at(candidate);
            if term_at_candidate == Some(self.current_term) {
                let count = self
                    .voting_peers()
                    .filter(|p| p.is_self || p.match_idx >= candidate)
                    .count();
                if count >= self.majority() {
                    self.advance_commit_to(candidate);
                    return;
                }
            }
            candidate -= 1;
        }
    }

    fn advance_commit_to(&mut self, idx: LogIndex) {
        if idx > self.commit_idx {
            info!(idx, "advancing commit index");
            self.commit_idx = idx;
        }
    }

    fn send_installsnapshot_to(&mut self, cb: &mut impl Callbacks, peer_id: NodeId) {
        super::snapshot::send_installsnapshot(self, cb, peer_id);
    }
}
