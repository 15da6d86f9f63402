//! Crate-wide error type.
//!
//! Every fallible operation in the library returns [`ConnError`].  Retryable
//! conditions (a single failure status) never surface here: they are resolved
//! inside [`crate::retry`] and only the terminal outcomes escape.

use thiserror::Error;

use crate::state::Phase;

/// Errors that terminate a connection (or, for `InvalidConfig`, prevent one).
#[derive(Debug, Error)]
pub enum ConnError {
    /// Underlying transport I/O error from the OS.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream while a slot or status was expected.
    #[error("peer closed the connection during {phase}")]
    PeerClosed { phase: Phase },

    /// The stream ended part-way through a fixed-size slot.
    #[error("truncated {phase} slot: got {got} of {expected} bytes")]
    TruncatedSlot {
        phase: Phase,
        got: usize,
        expected: usize,
    },

    /// The peer kept reporting failure after every allowed retransmission.
    #[error("{phase} still unconfirmed after {retransmissions} retransmissions")]
    MaxRetriesExceeded { phase: Phase, retransmissions: u32 },

    /// No slot arrived within the configured read timeout.
    #[error("timed out waiting for {phase}")]
    Timeout { phase: Phase },

    /// Application messages must carry at least one byte.
    #[error("refusing to send an empty message")]
    EmptyMessage,

    /// A configuration the protocol cannot run with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ConnError {
    /// `true` for errors raised because the peer went away rather than
    /// because of a local failure or a protocol violation.
    pub fn is_peer_closed(&self) -> bool {
        match self {
            Self::PeerClosed { .. } | Self::TruncatedSlot { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_phase() {
        let err = ConnError::MaxRetriesExceeded {
            phase: Phase::Integrity,
            retransmissions: 3,
        };
        assert_eq!(
            err.to_string(),
            "integrity confirmation still unconfirmed after 3 retransmissions"
        );
    }

    #[test]
    fn reset_counts_as_peer_closed() {
        let err = ConnError::from(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(err.is_peer_closed());
        assert!(ConnError::PeerClosed { phase: Phase::Syn }.is_peer_closed());
        assert!(!ConnError::EmptyMessage.is_peer_closed());
    }
}
