//! Candidacy: pre-vote, real election, and vote granting/counting.

use tracing::{debug, info, instrument, warn};

use super::{Role, Server};
use crate::callbacks::Callbacks;
use crate::error::{Error, Result};
use crate::message::{RequestVote, RequestVoteResponse, VoteGranted};
use crate::peer::NodeId;
use crate::Time;

impl Server {
    /// Enter candidacy. Starts in pre-vote: a straw poll that does not bump
    /// `current_term`, so a partitioned node retrying this in a loop never
    /// inflates the term the rest of the cluster has to catch up to.
    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id))]
    pub fn become_candidate(&mut self, cb: &mut impl Callbacks, now: Time) -> Result<()> {
        if self.lease_granted(self.self_id, now) {
            return Err(Error::MightViolateLease);
        }
        self.first_start = false;
        info!(term = self.current_term, "starting pre-vote candidacy");
        self.role = Role::Candidate;
        self.prevote = true;
        self.leader_id = None;
        for peer in self.peers.iter_mut() {
            peer.vote_for_me = peer.is_self;
        }
        let rand = cb.get_rand();
        self.reset_election_timeout(now, rand);

        let msg = RequestVote {
            term: self.current_term,
            candidate_id: self.self_id,
            last_log_idx: self.last_log_idx(),
            last_log_term: self.last_log_term(),
            prevote: true,
        };
        self.broadcast_requestvote(cb, &msg);
        self.maybe_advance_candidacy(cb, now)
    }

    fn broadcast_requestvote(&self, cb: &mut impl Callbacks, msg: &RequestVote) {
        for peer in &self.peers {
            if !peer.is_self && peer.voting {
                cb.send_requestvote(peer.id, msg);
            }
        }
    }

    fn votes_for_me(&self) -> usize {
        self.voting_peers().filter(|p| p.vote_for_me).count()
    }

    /// After tallying votes, either graduate from pre-vote to a real
    /// election, or become leader, if a majority has been reached.
    fn maybe_advance_candidacy(&mut self, cb: &mut impl Callbacks, now: Time) -> Result<()> {
        if self.role != Role::Candidate || self.votes_for_me() < self.majority() {
            return Ok(());
        }
        if self.prevote {
            self.graduate_to_real_election(cb, now)
        } else {
            self.become_leader(cb, now);
            Ok(())
        }
    }

    /// Pre-vote won: bump the term for real, vote for ourselves, and send
    /// real RequestVote messages.
    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id))]
    fn graduate_to_real_election(&mut self, cb: &mut impl Callbacks, now: Time) -> Result<()> {
        let new_term = self.current_term + 1;
        cb.persist_term(new_term, Some(self.self_id))?;
        self.current_term = new_term;
        cb.persist_vote(Some(self.self_id))?;
        self.voted_for = Some(self.self_id);
        self.prevote = false;
        for peer in self.peers.iter_mut() {
            peer.vote_for_me = peer.is_self;
        }
        info!(term = self.current_term, "pre-vote won, starting real election");

        let msg = RequestVote {
            term: self.current_term,
            candidate_id: self.self_id,
            last_log_idx: self.last_log_idx(),
            last_log_term: self.last_log_term(),
            prevote: false,
        };
        self.broadcast_requestvote(cb, &msg);
        self.maybe_advance_candidacy(cb, now)
    }

    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id))]
    pub(crate) fn become_leader(&mut self, cb: &mut impl Callbacks, now: Time) {
        info!(term = self.current_term, "becoming leader");
        self.role = Role::Leader;
        self.leader_id = Some(self.self_id);
        self.election_timer = now;
        let current_idx = self.last_log_idx();
        for peer in self.peers.iter_mut() {
            if !peer.is_self {
                peer.next_idx = current_idx + 1;
                peer.match_idx = 0;
                peer.effective_time = Some(now);
            }
        }
        self.send_appendentries_to_all(cb);
    }

    /// Vote-granting logic for both pre-vote and real RequestVote messages.
    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id))]
    pub fn recv_requestvote(
        &mut self,
        cb: &mut impl Callbacks,
        candidate: NodeId,
        vr: &RequestVote,
        now: Time,
    ) -> Result<RequestVoteResponse> {
        if self.peer(candidate).is_none() {
            return Ok(RequestVoteResponse {
                term: self.current_term,
                vote_granted: VoteGranted::UnknownNode,
                prevote: vr.prevote,
            });
        }

        if self.role == Role::Leader || self.lease_granted(candidate, now) {
            return Ok(RequestVoteResponse {
                term: self.current_term,
                vote_granted: VoteGranted::NotGranted,
                prevote: vr.prevote,
            });
        }

        // Deliberately un-gated on `vr.prevote`: the reference implementation's
        // `raft_recv_requestvote` runs this same `current_term < vr.term` check for
        // both prevote and real votes, so a prevote alone can bump a voter's term.
        // See the spec's "prevote term check" open question.
        if vr.term > self.current_term {
            self.update_term(cb, vr.term)?;
            self.become_follower(cb, now);
            self.leader_id = None;
        }

        let log_ok = (vr.last_log_term, vr.last_log_idx) >= (self.last_log_term(), self.last_log_idx());
        let term_ok = vr.term >= self.current_term;
        let grantable =
            vr.prevote || self.voted_for.is_none() || self.voted_for == Some(candidate);

        let granted = term_ok && log_ok && grantable;
        if granted && !vr.prevote {
            cb.persist_vote(Some(candidate))?;
            self.voted_for = Some(candidate);
            self.leader_id = None;
            self.election_timer = now;
        }

        debug!(candidate = ?candidate, prevote = vr.prevote, granted, "vote request");
        Ok(RequestVoteResponse {
            term: self.current_term,
            vote_granted: if granted {
                VoteGranted::Granted
            } else {
                VoteGranted::NotGranted
            },
            prevote: vr.prevote,
        })
    }

    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id))]
    pub fn recv_requestvote_response(
        &mut self,
        cb: &mut impl Callbacks,
        from: NodeId,
        r: &RequestVoteResponse,
        now: Time,
    ) -> Result<()> {
        if self.role != Role::Candidate || r.prevote != self.prevote {
            return Ok(());
        }
        if r.term > self.current_term {
            self.update_term(cb, r.term)?;
            self.become_follower(cb, now);
            return Ok(());
        }
        if r.term < self.current_term {
            return Ok(());
        }

        match r.vote_granted {
            VoteGranted::Granted => {
                if let Some(peer) = self.peer_mut(from) {
                    peer.vote_for_me = true;
                }
            }
            VoteGranted::UnknownNode => {
                warn!(from = ?from, "peer does not recognize us, we may have been removed");
            }
            VoteGranted::NotGranted => {}
        }
        self.maybe_advance_candidacy(cb, now)
    }
}
