//! Three-phase connection establishment.
//!
//! The client (initiator) and server (responder) each own one [`Handshake`]
//! per connection.  Every phase is one confirm-with-retry exchange from
//! [`crate::retry`], originated by whichever side sends that phase's frame:
//!
//! | phase   | originator | frame                                   | responder accepts when |
//! |---------|------------|-----------------------------------------|------------------------|
//! | SYN     | client     | `ack=0, syn=1, seq=CLIENT_ISN, bufsize` | `syn == 1`             |
//! | SYN-ACK | server     | `ack=client_isn+1, syn=1, seq=SERVER_ISN` | `ack == CLIENT_ISN+1 && syn == 1` |
//! | ACK     | client     | `ack=server_isn+1, syn=0, seq=CLIENT_ISN+1` | `ack == SERVER_ISN+1` |
//!
//! The server adopts the `bufsize` proposed in the SYN.  A SYN whose
//! `bufsize` cannot carry a header plus one payload byte fails validation.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{CLIENT_ISN, SERVER_ISN};
use crate::error::ConnError;
use crate::link::Link;
use crate::packet::{Header, HANDSHAKE_SLOT, MIN_BUFSIZE};
use crate::retry::{self, RetryPolicy};
use crate::state::{HandshakeState, Phase};

/// Per-connection handshake state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Current FSM state.
    pub state: HandshakeState,
    /// Our Initial Sequence Number.
    pub local_isn: u16,
    /// The peer's ISN, known once its SYN or SYN-ACK validated.
    pub peer_isn: Option<u16>,
    /// Negotiated data slot size.  Zero on the responder until the SYN arrives.
    pub bufsize: u16,
}

impl Handshake {
    /// Client side, proposing `bufsize`.
    pub fn initiator(bufsize: u16) -> Self {
        Self {
            state: HandshakeState::Init,
            local_isn: CLIENT_ISN,
            peer_isn: None,
            bufsize,
        }
    }

    /// Server side.
    pub fn responder() -> Self {
        Self {
            state: HandshakeState::Init,
            local_isn: SERVER_ISN,
            peer_isn: None,
            bufsize: 0,
        }
    }

    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::Established
    }

    /// Run the client side of the handshake to `Established` or `Failed`.
    pub async fn connect<S>(&mut self, link: &mut Link<S>, policy: &RetryPolicy) -> Result<(), ConnError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug_assert_eq!(self.state, HandshakeState::Init);
        let result = self.run_initiator(link, policy).await;
        self.settle(result)
    }

    /// Run the server side of the handshake to `Established` or `Failed`.
    pub async fn accept<S>(&mut self, link: &mut Link<S>, policy: &RetryPolicy) -> Result<(), ConnError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug_assert_eq!(self.state, HandshakeState::Init);
        let result = self.run_responder(link, policy).await;
        self.settle(result)
    }

    async fn run_initiator<S>(&mut self, link: &mut Link<S>, policy: &RetryPolicy) -> Result<(), ConnError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // SYN
        let syn = Header::handshake(0, true, self.local_isn, self.bufsize);
        log::debug!("[handshake] → SYN {syn}");
        retry::send_confirmed(link, Phase::Syn, &syn.encode(), HANDSHAKE_SLOT, policy).await?;
        log::info!("[handshake] 1) SYN sent");
        self.advance(HandshakeState::SynExchanged);

        // SYN-ACK
        let expected_ack = self.local_isn.wrapping_add(1);
        let (_, syn_ack) = retry::respond(link, Phase::SynAck, HANDSHAKE_SLOT, None, |slot| {
            let h = Header::from_slot(slot).ok()?;
            log::debug!("[handshake] ← SYN-ACK {h}");
            (h.ack == expected_ack && h.syn == 1).then_some(h)
        })
        .await?;
        self.peer_isn = Some(syn_ack.seq);
        log::info!("[handshake] 2) SYN-ACK received");
        self.advance(HandshakeState::SynAckExchanged);

        // ACK
        let ack = Header::handshake(syn_ack.seq.wrapping_add(1), false, syn_ack.ack, self.bufsize);
        log::debug!("[handshake] → ACK {ack}");
        retry::send_confirmed(link, Phase::Ack, &ack.encode(), HANDSHAKE_SLOT, policy).await?;
        log::info!("[handshake] 3) ACK sent");
        self.advance(HandshakeState::Established);
        Ok(())
    }

    async fn run_responder<S>(&mut self, link: &mut Link<S>, policy: &RetryPolicy) -> Result<(), ConnError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // SYN
        let (_, syn) = retry::respond(link, Phase::Syn, HANDSHAKE_SLOT, None, |slot| {
            let h = Header::from_slot(slot).ok()?;
            log::debug!("[handshake] ← SYN {h}");
            (h.syn == 1 && h.bufsize >= MIN_BUFSIZE).then_some(h)
        })
        .await?;
        self.peer_isn = Some(syn.seq);
        self.bufsize = syn.bufsize;
        log::info!("[handshake] 1) SYN received");
        self.advance(HandshakeState::SynExchanged);

        // SYN-ACK
        let syn_ack = Header::handshake(syn.seq.wrapping_add(1), true, self.local_isn, self.bufsize);
        log::debug!("[handshake] → SYN-ACK {syn_ack}");
        retry::send_confirmed(link, Phase::SynAck, &syn_ack.encode(), HANDSHAKE_SLOT, policy).await?;
        log::info!("[handshake] 2) SYN-ACK sent");
        self.advance(HandshakeState::SynAckExchanged);

        // ACK
        let expected_ack = self.local_isn.wrapping_add(1);
        retry::respond(link, Phase::Ack, HANDSHAKE_SLOT, None, |slot| {
            let h = Header::from_slot(slot).ok()?;
            log::debug!("[handshake] ← ACK {h}");
            (h.ack == expected_ack).then_some(())
        })
        .await?;
        log::info!("[handshake] 3) ACK received");
        self.advance(HandshakeState::Established);
        Ok(())
    }

    fn advance(&mut self, next: HandshakeState) {
        log::debug!("[handshake] {} → {}", self.state, next);
        self.state = next;
    }

    fn settle(&mut self, result: Result<(), ConnError>) -> Result<(), ConnError> {
        if let Err(e) = &result {
            log::warn!("[handshake] failed in {}: {e}", self.state);
            self.state = HandshakeState::Failed;
        }
        debug_assert!(self.state.is_terminal());
        result
    }
}
