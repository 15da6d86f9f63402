//! The confirm-with-retry exchange shared by every handshake phase and
//! delivery round.
//!
//! Two roles take part in each exchange:
//!
//! - The **originator** transmits a frame and waits for a Status Signal.  On
//!   failure it waits [`RetryPolicy::delay`] and retransmits the *identical*
//!   frame, at most [`RetryPolicy::max_retransmissions`] times.  Running out
//!   closes the stream from the originator's side.
//! - The **responder** reads frames, validates each one, and answers every
//!   frame with a status until a frame validates.  It never gives up on its
//!   own: the originator's retry bound (and the resulting close) ends a
//!   hopeless exchange.
//!
//! ```text
//!  originator                        responder
//!      │ ── frame ──────────────────▶ │ validate
//!      │ ◀──────────────── status 0 ─ │
//!      │   sleep(delay)               │
//!      │ ── frame (same bytes) ─────▶ │ validate
//!      │ ◀──────────────── status 1 ─ │
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ConnError;
use crate::link::Link;
use crate::state::Phase;
use crate::status::Status;

/// Retransmissions allowed per phase or round.
pub const MAX_RETRANSMISSIONS: u32 = 3;

/// Pause before each retransmission.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bounded-retransmission parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retransmissions after the initial transmission before giving up.
    pub max_retransmissions: u32,
    /// Fixed delay before each retransmission.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retransmissions: MAX_RETRANSMISSIONS,
            delay: RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Default bound with a custom delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

/// Outcome of a confirmed exchange on the originating side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmed {
    /// How many times the frame was re-sent before the peer confirmed it.
    pub retransmissions: u32,
}

/// Transmit `frame` in a `slot_len` slot and wait until the peer confirms it.
pub async fn send_confirmed<S>(
    link: &mut Link<S>,
    phase: Phase,
    frame: &[u8],
    slot_len: usize,
    policy: &RetryPolicy,
) -> Result<Confirmed, ConnError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    link.send_slot(frame, slot_len).await?;
    confirm_sent(link, phase, frame, slot_len, policy).await
}

/// Wait for a status on a frame that is already on the wire, retransmitting
/// it on failure.
///
/// Used directly by rounds that reuse the frame of a previous round.
pub async fn confirm_sent<S>(
    link: &mut Link<S>,
    phase: Phase,
    frame: &[u8],
    slot_len: usize,
    policy: &RetryPolicy,
) -> Result<Confirmed, ConnError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut retransmissions = 0u32;

    loop {
        if link.recv_status(phase).await?.is_success() {
            log::debug!("[retry] {phase} confirmed after {retransmissions} retransmission(s)");
            return Ok(Confirmed { retransmissions });
        }

        if retransmissions >= policy.max_retransmissions {
            log::warn!("[retry] {phase} failed {} times; closing connection", retransmissions + 1);
            // Best effort: the stream is being abandoned either way.
            let _ = link.shutdown().await;
            return Err(ConnError::MaxRetriesExceeded {
                phase,
                retransmissions,
            });
        }

        retransmissions += 1;
        log::warn!(
            "[retry] {phase} reported failure; retransmitting in {:?} ({retransmissions}/{})",
            policy.delay,
            policy.max_retransmissions
        );
        tokio::time::sleep(policy.delay).await;
        link.send_slot(frame, slot_len).await?;
    }
}

/// Answer incoming `slot_len` frames until one passes `validate`.
///
/// `first` is a frame already read by the caller (e.g. the frame confirmed
/// by a previous round); it is validated before anything new is read.
/// Returns the accepted frame together with the validator's output.
pub async fn respond<S, T, F>(
    link: &mut Link<S>,
    phase: Phase,
    slot_len: usize,
    first: Option<Vec<u8>>,
    mut validate: F,
) -> Result<(Vec<u8>, T), ConnError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(&[u8]) -> Option<T>,
{
    let mut pending = first;
    let mut rejected = 0u32;

    loop {
        let slot = match pending.take() {
            Some(slot) => slot,
            None => link.expect_slot(slot_len, phase).await?,
        };

        if let Some(accepted) = validate(&slot) {
            link.send_status(Status::Success).await?;
            return Ok((slot, accepted));
        }

        rejected += 1;
        log::warn!("[retry] rejected {phase} frame #{rejected}; requesting retransmission");
        link.send_status(Status::Failure).await?;
    }
}
