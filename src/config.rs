//! Tunables collected into one struct, constructed programmatically by the
//! host rather than loaded from a config file.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Base election timeout in milliseconds; a follower that hears nothing
    /// from a leader for this long (plus jitter) starts an election.
    pub election_timeout: u64,
    /// Election timeouts are randomized into
    /// `[election_timeout, election_timeout + election_timeout_jitter)` to
    /// reduce split votes.
    pub election_timeout_jitter: u64,
    /// Heartbeat interval; the leader resends AppendEntries to idle peers
    /// at least this often.
    pub request_timeout: u64,
    /// Extra slack added on top of a lease's nominal expiry before a
    /// follower will grant a vote to someone else, and before a leader
    /// considers a peer's lease lost.
    pub lease_maintenance_grace: u64,
    /// Upper bound on entries batched into one AppendEntries message.
    pub max_entries_per_append: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            election_timeout: 1000,
            election_timeout_jitter: 1000,
            request_timeout: 200,
            lease_maintenance_grace: 500,
            max_entries_per_append: 256,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout == 0 || self.request_timeout >= self.election_timeout {
            return Err(Error::InvalidConfig {
                reason: "request_timeout must be positive and less than election_timeout".into(),
            });
        }
        if self.max_entries_per_append == 0 {
            return Err(Error::InvalidConfig {
                reason: "max_entries_per_append must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
