//! Handshake finite-state machine types and protocol phase tags.
//!
//! State transitions are driven by [`crate::handshake::Handshake`]; this
//! module only names the states and the phases/rounds that make up one
//! connection's life.

use std::fmt;

/// All possible states of the handshake FSM.
///
/// ```text
///  INIT ──SYN ok──▶ SYN_EXCHANGED ──SYN-ACK ok──▶ SYN_ACK_EXCHANGED ──ACK ok──▶ ESTABLISHED
///    │                    │                              │
///    └────────────────────┴───── retries exhausted ──────┴──────────────────▶ FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// Nothing exchanged yet.
    #[default]
    Init,
    /// SYN confirmed by the responder.
    SynExchanged,
    /// SYN-ACK confirmed by the initiator.
    SynAckExchanged,
    /// ACK confirmed; data may flow.
    Established,
    /// A phase ran out of retries or the peer went away. Terminal.
    Failed,
}

impl HandshakeState {
    /// `true` once no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Established | Self::Failed)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::SynExchanged => "SYN_EXCHANGED",
            Self::SynAckExchanged => "SYN_ACK_EXCHANGED",
            Self::Established => "ESTABLISHED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One confirm-with-retry exchange: a handshake phase, a delivery round, or
/// the client's request frame (which is not confirmed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Syn,
    SynAck,
    Ack,
    Receipt,
    Integrity,
    Request,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Syn => "SYN",
            Self::SynAck => "SYN-ACK",
            Self::Ack => "ACK",
            Self::Receipt => "receipt confirmation",
            Self::Integrity => "integrity confirmation",
            Self::Request => "request",
        };
        f.write_str(name)
    }
}
