//! Lease reasoning: the timing rules that let a leader serve linearizable
//! reads without a round trip, and that stop a partitioned node from
//! stepping up while a lease it would violate is still live.

use super::{Role, Server};
use crate::peer::NodeId;
use crate::Time;

impl Server {
    /// Whether `peer` has, as of `now`, a live promise to recognize the
    /// current leader — optionally with `lease_maintenance_grace` slack.
    /// Mirrors the reference implementation's two-path definition: the
    /// peer's own reported lease hasn't expired, or — only when grace is in
    /// play — not enough time has passed since we started counting
    /// `effective_time` for the election timeout to have plausibly elapsed
    /// without a renewal. The no-grace path (used by the linearizable-read
    /// check) never falls back to `effective_time`, since that would count a
    /// peer as leased before it has ever actually acknowledged us.
    pub(crate) fn has_lease(&self, peer_id: NodeId, now: Time, with_grace: bool) -> bool {
        if peer_id == self.self_id {
            return true;
        }
        let grace = if with_grace {
            self.config.lease_maintenance_grace
        } else {
            0
        };
        let Some(peer) = self.peer(peer_id) else {
            return false;
        };
        if now < peer.lease + grace {
            return true;
        }
        if !with_grace {
            return false;
        }
        match peer.effective_time {
            Some(effective_time) => {
                now.saturating_sub(effective_time) < self.config.election_timeout + grace
            }
            None => false,
        }
    }

    /// True if a majority of voting peers (self included) currently hold a
    /// lease on us, counting grace. Used by the leader's periodic check for
    /// whether it must step down.
    pub(crate) fn has_majority_leases_with_grace(&self, now: Time) -> bool {
        self.has_majority_leases_inner(now, true)
    }

    /// Ungraced variant used for the linearizable-read check: only true
    /// while we are leader and strictly within every peer's promised lease.
    pub fn has_majority_leases(&self, now: Time) -> bool {
        self.role == Role::Leader && self.has_majority_leases_inner(now, false)
    }

    fn has_majority_leases_inner(&self, now: Time, with_grace: bool) -> bool {
        let held = self
            .voting_peers()
            .filter(|p| self.has_lease(p.id, now, with_grace))
            .count();
        held >= self.majority()
    }

    /// True if recognizing `candidate` as leader (or starting our own
    /// candidacy, when `candidate == self_id`) could violate a lease we
    /// already granted someone else.
    pub(crate) fn lease_granted(&self, except: NodeId, now: Time) -> bool {
        if self.first_start {
            // A freshly started node has no outstanding promises to anyone.
        } else if now.saturating_sub(self.start_time) < self.config.election_timeout {
            return true;
        }
        if let Some(leader) = self.leader_id {
            if leader != except && now.saturating_sub(self.election_timer) < self.config.election_timeout {
                return true;
            }
        }
        false
    }
}
