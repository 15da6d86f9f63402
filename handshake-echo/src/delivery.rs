//! Confirmed delivery of one data frame.
//!
//! The sending side (the server, echoing) obtains two confirmations for the
//! same frame, strictly in order:
//!
//! 1. **Receipt**: the receiver got a decodable frame with a non-empty
//!    payload.
//! 2. **Integrity**: the receiver's checksum over exactly `len` payload
//!    bytes equals the header's `checksum`.
//!
//! Round 2 starts on the frame already confirmed by round 1; no new
//! transmission happens unless the receiver reports an integrity failure.
//! Each round retransmits independently under the same [`RetryPolicy`].

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ConnError;
use crate::link::Link;
use crate::packet::Packet;
use crate::retry::{self, RetryPolicy};
use crate::state::Phase;

/// Retransmissions each round needed before it was confirmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub receipt_retransmissions: u32,
    pub integrity_retransmissions: u32,
}

/// Send `packet` in a `bufsize` slot and run both confirmation rounds.
///
/// On [`ConnError::MaxRetriesExceeded`] the stream has already been shut
/// down and the caller should drop the connection.
pub async fn deliver<S>(
    link: &mut Link<S>,
    packet: &Packet,
    policy: &RetryPolicy,
) -> Result<DeliveryReport, ConnError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let slot_len = usize::from(packet.header.bufsize);
    let frame = packet.encode();
    log::debug!("[delivery] → DATA {}", packet.header);

    let receipt = retry::send_confirmed(link, Phase::Receipt, &frame, slot_len, policy).await?;
    log::debug!("[delivery] receipt confirmed");

    let integrity = retry::confirm_sent(link, Phase::Integrity, &frame, slot_len, policy).await?;
    log::debug!("[delivery] integrity confirmed");

    Ok(DeliveryReport {
        receipt_retransmissions: receipt.retransmissions,
        integrity_retransmissions: integrity.retransmissions,
    })
}

/// Receive one data frame in a `bufsize` slot, answering both rounds.
///
/// Returns the packet whose integrity was confirmed.
pub async fn receive<S>(link: &mut Link<S>, bufsize: u16) -> Result<Packet, ConnError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let slot_len = usize::from(bufsize);

    let (slot, _) = retry::respond(link, Phase::Receipt, slot_len, None, |slot| {
        let packet = Packet::decode(slot).ok()?;
        log::debug!("[delivery] ← DATA {}", packet.header);
        (!packet.payload.is_empty()).then_some(())
    })
    .await?;
    log::info!("[delivery] 1) received payload");

    let (_, packet) = retry::respond(link, Phase::Integrity, slot_len, Some(slot), |slot| {
        Packet::decode(slot).ok().filter(Packet::is_intact)
    })
    .await?;
    log::info!("[delivery] 2) received integral payload");

    Ok(packet)
}
