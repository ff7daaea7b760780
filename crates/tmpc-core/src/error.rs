//! Error types for protocol execution

use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller-side misuse
    InvalidArgument,
    /// A peer misbehaved or sent something malformed
    Protocol,
    /// Send/receive failure or abort
    Transport,
    /// Cryptographic check failed locally
    Crypto,
    /// Local invariant violated; the share must be discarded
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Transport => "transport",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Fatal => "fatal",
        }
    }
}

/// Errors that can occur during protocol execution
///
/// Messages never carry secret material.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid input supplied by the caller
    #[error("{component}: invalid argument: {reason}")]
    InvalidArgument {
        component: &'static str,
        reason: String,
    },

    /// A peer sent a malformed or inconsistent message
    #[error("{component}: protocol violation (peer {peer:?}): {reason}")]
    Protocol {
        component: &'static str,
        peer: Option<usize>,
        reason: String,
    },

    /// Transport failure or abort
    #[error("{component}: transport failure (peer {peer:?}, round {round:?}): {reason}")]
    Transport {
        component: &'static str,
        peer: Option<usize>,
        round: Option<u32>,
        reason: String,
    },

    /// Cryptographic operation failed
    #[error("{component}: cryptographic failure: {reason}")]
    Crypto {
        component: &'static str,
        reason: String,
    },

    /// Local invariant violation
    #[error("{component}: fatal: {reason}")]
    Fatal {
        component: &'static str,
        reason: String,
    },
}

impl Error {
    pub fn invalid_argument(component: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            component,
            reason: reason.into(),
        }
    }

    pub fn protocol(component: &'static str, reason: impl Into<String>) -> Self {
        Error::Protocol {
            component,
            peer: None,
            reason: reason.into(),
        }
    }

    /// Protocol error blamed on a specific peer
    pub fn peer(component: &'static str, peer: usize, reason: impl Into<String>) -> Self {
        Error::Protocol {
            component,
            peer: Some(peer),
            reason: reason.into(),
        }
    }

    pub fn transport(
        component: &'static str,
        peer: Option<usize>,
        round: Option<u32>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Transport {
            component,
            peer,
            round,
            reason: reason.into(),
        }
    }

    pub fn crypto(component: &'static str, reason: impl Into<String>) -> Self {
        Error::Crypto {
            component,
            reason: reason.into(),
        }
    }

    pub fn fatal(component: &'static str, reason: impl Into<String>) -> Self {
        Error::Fatal {
            component,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Error::Protocol { .. } => ErrorKind::Protocol,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Crypto { .. } => ErrorKind::Crypto,
            Error::Fatal { .. } => ErrorKind::Fatal,
        }
    }

    /// Component that raised the error
    pub fn component(&self) -> &'static str {
        match self {
            Error::InvalidArgument { component, .. }
            | Error::Protocol { component, .. }
            | Error::Transport { component, .. }
            | Error::Crypto { component, .. }
            | Error::Fatal { component, .. } => component,
        }
    }

    /// Index of the peer involved, if known
    pub fn peer_index(&self) -> Option<usize> {
        match self {
            Error::Protocol { peer, .. } | Error::Transport { peer, .. } => *peer,
            _ => None,
        }
    }

    /// Attach a peer index to protocol and transport errors that lack one
    pub fn blame(self, index: usize) -> Self {
        match self {
            Error::Protocol {
                component,
                peer: None,
                reason,
            } => Error::Protocol {
                component,
                peer: Some(index),
                reason,
            },
            Error::Transport {
                component,
                peer: None,
                round,
                reason,
            } => Error::Transport {
                component,
                peer: Some(index),
                round,
                reason,
            },
            other => other,
        }
    }

    /// Reclassify a failure on data received from `peer` as that peer's
    /// protocol violation
    pub fn caused_by(self, peer: usize) -> Self {
        match self {
            Error::InvalidArgument { component, reason } | Error::Crypto { component, reason } => {
                Error::Protocol {
                    component,
                    peer: Some(peer),
                    reason,
                }
            }
            other => other.blame(peer),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::protocol("wire", format!("malformed message: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blame_sets_missing_peer_only() {
        let e = Error::protocol("zk", "bad proof").blame(2);
        assert_eq!(e.peer_index(), Some(2));
        assert_eq!(e.kind(), ErrorKind::Protocol);

        let e = Error::peer("zk", 1, "bad proof").blame(2);
        assert_eq!(e.peer_index(), Some(1));

        let e = Error::crypto("paillier", "decrypt").blame(3);
        assert_eq!(e.peer_index(), None);
        assert_eq!(e.component(), "paillier");
    }

    #[test]
    fn test_caused_by_reclassifies_peer_data_failures() {
        let e = Error::crypto("zk-dl", "invalid proof").caused_by(1);
        assert_eq!(e.kind(), ErrorKind::Protocol);
        assert_eq!(e.peer_index(), Some(1));
        assert_eq!(e.component(), "zk-dl");

        let e = Error::fatal("share", "corrupt").caused_by(1);
        assert_eq!(e.kind(), ErrorKind::Fatal);
    }
}
