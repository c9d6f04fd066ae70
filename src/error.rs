use std::fmt;

use crate::peer::NodeId;

/// Error returned by a host-supplied callback, boxed so the engine never
/// depends on the host's concrete error type.
pub struct CallbackError(pub Box<dyn std::error::Error + Send + Sync>);

impl CallbackError {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        CallbackError(Box::new(err))
    }

    pub fn msg(text: impl Into<String>) -> Self {
        #[derive(Debug)]
        struct Msg(String);
        impl fmt::Display for Msg {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
        impl std::error::Error for Msg {}
        CallbackError(Box::new(Msg(text.into())))
    }
}

impl fmt::Debug for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for CallbackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("allocation failed while growing the log")]
    NoMem,

    #[error("operation requires leader role (leader hint: {leader_hint:?})")]
    NotLeader { leader_hint: Option<NodeId> },

    #[error("starting candidacy might violate an outstanding lease, retry after election timeout")]
    MightViolateLease,

    #[error("a voting configuration change is already in flight")]
    OneVotingChangeOnly,

    #[error("configuration change rejected while a snapshot is in progress")]
    SnapshotInProgress,

    #[error("invalid configuration change: {reason}")]
    InvalidCfgChange { reason: String },

    #[error("snapshot already matches currently loaded metadata")]
    SnapshotAlreadyLoaded,

    #[error("invalid server configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("server must shut down: {reason}")]
    Shutdown { reason: String },

    #[error("host callback failed: {0}")]
    Callback(#[from] CallbackError),
}

pub type Result<T> = std::result::Result<T, Error>;
