//! The Raft server: persistent/volatile state and the message handlers that
//! mutate it. Submodules group handlers by concern; all of them are `impl
//! Server` blocks operating on the fields declared here.

mod election;
mod lease;
mod membership;
mod replication;
mod snapshot;

use tracing::{debug, instrument};

use crate::config::ServerConfig;
use crate::entry::{LogIndex, Term};
use crate::error::{Error, Result};
use crate::log::Log;
use crate::peer::{NodeId, Peer};
use crate::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// The consensus state machine. Owns the log and peer table; every externally
/// visible effect (sending a message, persisting state, applying an entry)
/// goes through the `Callbacks` implementation passed into each handler.
pub struct Server {
    pub(crate) config: ServerConfig,
    pub(crate) self_id: NodeId,

    // Persistent state (must be durable before acknowledging; the `Callbacks`
    // persist_term/persist_vote hooks are the durability boundary).
    pub(crate) current_term: Term,
    pub(crate) voted_for: Option<NodeId>,
    pub(crate) log: Log,
    pub(crate) snapshot_last_idx: LogIndex,
    pub(crate) snapshot_last_term: Term,

    // Volatile state.
    pub(crate) role: Role,
    pub(crate) commit_idx: LogIndex,
    pub(crate) last_applied_idx: LogIndex,
    pub(crate) leader_id: Option<NodeId>,
    pub(crate) peers: Vec<Peer>,

    pub(crate) election_timer: Time,
    pub(crate) election_timeout_rand: u64,
    pub(crate) prevote: bool,
    pub(crate) voting_cfg_change_log_idx: Option<LogIndex>,
    pub(crate) snapshot_in_progress: bool,
    pub(crate) start_time: Time,
    pub(crate) first_start: bool,
}

impl Server {
    pub fn new(self_id: NodeId, config: ServerConfig, now: Time) -> Result<Self> {
        config.validate()?;
        let initial_timeout = config.election_timeout;
        let mut server = Server {
            config,
            self_id,
            current_term: 0,
            voted_for: None,
            log: Log::new(),
            snapshot_last_idx: 0,
            snapshot_last_term: 0,
            role: Role::Follower,
            commit_idx: 0,
            last_applied_idx: 0,
            leader_id: None,
            peers: Vec::new(),
            election_timer: now,
            election_timeout_rand: initial_timeout,
            prevote: false,
            voting_cfg_change_log_idx: None,
            snapshot_in_progress: false,
            start_time: now,
            first_start: true,
        };
        server.peers.push(Peer::new(self_id, true, true));
        Ok(server)
    }

    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn commit_idx(&self) -> LogIndex {
        self.commit_idx
    }

    pub fn last_applied_idx(&self) -> LogIndex {
        self.last_applied_idx
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.leader_id
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn voting_peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| p.voting)
    }

    pub fn voting_peer_count(&self) -> usize {
        self.voting_peers().count()
    }

    pub fn majority(&self) -> usize {
        self.voting_peer_count() / 2 + 1
    }

    /// Add a peer outside of the log-replicated configuration-change path —
    /// used to seed a server's initial membership before any entries exist
    /// (the reference implementation's `raft_add_peer`). Once a cluster is
    /// running, membership changes should go through `recv_entry` instead so
    /// they are replicated and can be repaired on divergence.
    pub fn add_peer(&mut self, id: NodeId, voting: bool) {
        if self.peer(id).is_none() {
            self.peers.push(Peer::new(id, voting, id == self.self_id));
        }
    }

    pub(crate) fn peer(&self, id: NodeId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == id)
    }

    pub(crate) fn peer_mut(&mut self, id: NodeId) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|p| p.id == id)
    }

    pub(crate) fn self_peer(&self) -> &Peer {
        self.peer(self.self_id).expect("self is always a peer")
    }

    fn last_log_idx(&self) -> LogIndex {
        self.log.current_idx()
    }

    fn last_log_term(&self) -> Term {
        self.log
            .term_at(self.last_log_idx())
            .unwrap_or(self.log.base_term())
    }

    /// Randomize the next election timeout into
    /// `[election_timeout, election_timeout + jitter)`.
    pub(crate) fn reset_election_timeout(&mut self, now: Time, rand: f64) {
        self.election_timer = now;
        let jitter = (rand * self.config.election_timeout_jitter as f64) as u64;
        self.election_timeout_rand = self.config.election_timeout + jitter;
    }

    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id))]
    pub(crate) fn become_follower(&mut self, cb: &mut impl crate::Callbacks, now: Time) {
        debug!(term = self.current_term, "stepping down to follower");
        cb.log(
            Some(self.self_id),
            crate::message::LogLevel::Info,
            "becoming follower",
        );
        self.role = Role::Follower;
        self.prevote = false;
        self.election_timer = now;
    }

    /// Update `current_term` and persist it, clearing `voted_for` as Raft
    /// requires whenever we observe a strictly higher term.
    pub(crate) fn update_term(
        &mut self,
        cb: &mut impl crate::Callbacks,
        term: Term,
    ) -> Result<()> {
        if term <= self.current_term {
            return Ok(());
        }
        cb.persist_term(term, None)?;
        self.current_term = term;
        self.voted_for = None;
        Ok(())
    }

    /// Periodic heartbeat/timeout re-evaluation; the host is expected to
    /// call this on a steady cadence (e.g. every few tens of milliseconds).
    #[instrument(level = "debug", skip(self, cb), fields(self_id = ?self.self_id))]
    pub fn periodic(&mut self, cb: &mut impl crate::Callbacks, now: Time) -> Result<()> {
        if self.snapshot_in_progress {
            return Ok(());
        }
        match self.role {
            Role::Follower | Role::Candidate => {
                if self.self_peer().voting
                    && now.saturating_sub(self.election_timer) >= self.election_timeout_rand
                {
                    match self.become_candidate(cb, now) {
                        Ok(()) | Err(Error::MightViolateLease) => {}
                        Err(e) => return Err(e),
                    }
                }
            }
            Role::Leader => {
                if !self.has_majority_leases_with_grace(now) {
                    debug!("lost majority of leases, stepping down");
                    self.become_follower(cb, now);
                    return Ok(());
                }
                if now.saturating_sub(self.election_timer) >= self.config.request_timeout {
                    self.election_timer = now;
                    self.send_appendentries_to_all(cb);
                }
            }
        }
        Ok(())
    }

    /// Apply every committed-but-unapplied entry in index order.
    pub fn apply_committed(&mut self, cb: &mut impl crate::Callbacks) -> Result<()> {
        while self.last_applied_idx < self.commit_idx {
            let idx = self.last_applied_idx + 1;
            let entry = self
                .log
                .get_at(idx)
                .cloned()
                .expect("committed entries below current_idx stay in the log until polled");
            cb.apply_log(&entry, idx)
                .map_err(|e| Error::Shutdown { reason: e.to_string() })?;
            self.last_applied_idx = idx;
            if self.voting_cfg_change_log_idx == Some(idx) {
                self.voting_cfg_change_log_idx = None;
            }
        }
        Ok(())
    }
}
