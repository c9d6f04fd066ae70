//! Snapshot lifecycle: compacting the log prefix on the leader side, and
//! receiving/loading a snapshot stream on the follower side.

use tracing::{info, instrument};

use super::{Role, Server};
use crate::callbacks::Callbacks;
use crate::entry::LogIndex;
use crate::error::{Error, Result};
use crate::message::{InstallSnapshot, InstallSnapshotResponse, SnapshotChunkResult};
use crate::peer::NodeId;
use crate::Time;

impl Server {
    /// Begin compacting the log up to `idx`. Requires `idx` to be committed
    /// and present in the log; applies every entry through `idx` so the
    /// state machine is caught up before the snapshot is considered to cover
    /// it.
    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id))]
    pub fn begin_snapshot(&mut self, cb: &mut impl Callbacks, idx: LogIndex) -> Result<()> {
        if idx > self.commit_idx {
            return Err(Error::InvalidCfgChange {
                reason: format!("cannot snapshot past commit index ({idx} > {})", self.commit_idx),
            });
        }
        let term = self.log.term_at(idx).ok_or_else(|| Error::InvalidCfgChange {
            reason: format!("no entry at index {idx} to snapshot"),
        })?;
        while self.last_applied_idx < idx {
            let apply_idx = self.last_applied_idx + 1;
            let entry = self
                .log
                .get_at(apply_idx)
                .cloned()
                .expect("entries through commit_idx remain in the log until polled");
            cb.apply_log(&entry, apply_idx)
                .map_err(|e| Error::Shutdown { reason: e.to_string() })?;
            self.last_applied_idx = apply_idx;
            if self.voting_cfg_change_log_idx == Some(apply_idx) {
                self.voting_cfg_change_log_idx = None;
            }
        }
        self.snapshot_last_idx = idx;
        self.snapshot_last_term = term;
        self.snapshot_in_progress = true;
        info!(idx, term, "beginning snapshot");
        Ok(())
    }

    /// Finish a snapshot begun with [`Server::begin_snapshot`], discarding
    /// the now-redundant log prefix.
    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id))]
    pub fn end_snapshot(&mut self, cb: &mut impl Callbacks) -> Result<()> {
        let target = self.snapshot_last_idx;
        let self_id = self.self_id;
        let voting_cfg_change_log_idx = &mut self.voting_cfg_change_log_idx;
        let peers = &mut self.peers;
        self.log.poll_to(target, |run, start_idx| {
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
                }
            }
            cb.log_poll(run, start_idx)
        })?;
        self.snapshot_in_progress = false;
        info!(idx = target, "ended snapshot");
        Ok(())
    }

    /// Follower-side receipt of an InstallSnapshot chunk. Term/role/lease
    /// bookkeeping mirrors AppendEntries; the byte-stream itself is opaque
    /// to the engine and handled by `recv_installsnapshot_chunk`.
    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id))]
    pub fn recv_installsnapshot(
        &mut self,
        cb: &mut impl Callbacks,
        from: NodeId,
        is: &InstallSnapshot,
        now: Time,
    ) -> Result<InstallSnapshotResponse> {
        if is.term < self.current_term {
            return Ok(InstallSnapshotResponse {
                term: self.current_term,
                last_idx: is.last_idx,
                complete: false,
                lease: 0,
            });
        }
        if is.term > self.current_term {
            self.update_term(cb, is.term)?;
        }
        self.become_follower(cb, now);
        self.leader_id = Some(from);
        self.first_start = false;
        self.election_timer = now;
        let lease = now + self.config.election_timeout;

        if is.last_idx <= self.commit_idx {
            return Ok(InstallSnapshotResponse {
                term: self.current_term,
                last_idx: is.last_idx,
                complete: true,
                lease,
            });
        }
        if self.log.term_at(is.last_idx) == Some(is.last_term) {
            self.commit_idx = is.last_idx;
            return Ok(InstallSnapshotResponse {
                term: self.current_term,
                last_idx: is.last_idx,
                complete: true,
                lease,
            });
        }

        let outcome = cb
            .recv_installsnapshot_chunk(from, is)
            .map_err(Error::Callback)?;
        Ok(InstallSnapshotResponse {
            term: self.current_term,
            last_idx: is.last_idx,
            complete: outcome == SnapshotChunkResult::Complete,
            lease,
        })
    }

    /// Rebuild the log around a freshly received snapshot. The host calls
    /// this once `recv_installsnapshot` has reported the transfer complete.
    #[instrument(level = "debug", skip(self), fields(self_id = ?self.self_id))]
    pub fn begin_load_snapshot(&mut self, term: crate::entry::Term, idx: LogIndex) -> Result<()> {
        if idx == self.snapshot_last_idx && term == self.snapshot_last_term {
            return Err(Error::SnapshotAlreadyLoaded);
        }
        if idx <= self.commit_idx {
            return Err(Error::InvalidCfgChange {
                reason: format!("snapshot at {idx} is behind commit index {}", self.commit_idx),
            });
        }
        self.log.load_from_snapshot(idx, term)?;
        self.snapshot_last_idx = idx;
        self.snapshot_last_term = term;
        self.commit_idx = idx;
        self.last_applied_idx = idx;
        self.peers.clear();
        Ok(())
    }

    /// Finish loading a snapshot begun with [`Server::begin_load_snapshot`].
    /// Membership is rebuilt by the host re-adding peers from the snapshot's
    /// own configuration data; this only marks everyone as caught up.
    pub fn end_load_snapshot(&mut self) {
        for peer in self.peers.iter_mut() {
            if peer.voting {
                peer.has_sufficient_logs = true;
            }
        }
    }
}

pub(crate) fn send_installsnapshot(server: &mut Server, cb: &mut impl Callbacks, peer_id: NodeId) {
    if server.role != Role::Leader {
        return;
    }
    let msg = InstallSnapshot {
        term: server.current_term,
        last_idx: server.snapshot_last_idx,
        last_term: server.snapshot_last_term,
        data: Vec::new(),
        done: true,
    };
    cb.send_installsnapshot(peer_id, &msg);
}
