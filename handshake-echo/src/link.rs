//! Slot-oriented I/O over an ordered byte stream.
//!
//! [`Link`] is a thin wrapper around any `AsyncRead + AsyncWrite` stream
//! (a `tokio::net::TcpStream` in production, a `tokio::io::DuplexStream` in
//! tests) that speaks fixed-size slots instead of raw bytes.  All protocol
//! logic lives elsewhere; this module owns only byte I/O.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ConnError;
use crate::state::Phase;
use crate::status::{Status, STATUS_SLOT};

/// A slot-framed connection to one peer.
#[derive(Debug)]
pub struct Link<S> {
    stream: S,
    /// Upper bound on every slot read; `None` blocks indefinitely.
    read_timeout: Option<Duration>,
}

impl<S> Link<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_timeout: None,
        }
    }

    /// Bound every subsequent slot read by `timeout`.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Write `bytes` zero-padded to exactly `slot_len` bytes.
    ///
    /// Bytes beyond `slot_len` are dropped; callers size frames to fit.
    pub async fn send_slot(&mut self, bytes: &[u8], slot_len: usize) -> Result<(), ConnError> {
        let mut slot = vec![0u8; slot_len];
        let n = bytes.len().min(slot_len);
        slot[..n].copy_from_slice(&bytes[..n]);
        self.stream.write_all(&slot).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read exactly one `slot_len`-byte slot.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly at a slot
    /// boundary.
    pub async fn recv_slot(
        &mut self,
        slot_len: usize,
        phase: Phase,
    ) -> Result<Option<Vec<u8>>, ConnError> {
        let limit = self.read_timeout;
        match limit {
            Some(limit) => tokio::time::timeout(limit, self.fill_slot(slot_len, phase))
                .await
                .map_err(|_elapsed| ConnError::Timeout { phase })?,
            None => self.fill_slot(slot_len, phase).await,
        }
    }

    /// Like [`recv_slot`](Self::recv_slot) but a closed stream is an error.
    pub async fn expect_slot(&mut self, slot_len: usize, phase: Phase) -> Result<Vec<u8>, ConnError> {
        self.recv_slot(slot_len, phase)
            .await?
            .ok_or(ConnError::PeerClosed { phase })
    }

    pub async fn send_status(&mut self, status: Status) -> Result<(), ConnError> {
        self.send_slot(status.encode(), STATUS_SLOT).await
    }

    pub async fn recv_status(&mut self, phase: Phase) -> Result<Status, ConnError> {
        let slot = self.expect_slot(STATUS_SLOT, phase).await?;
        Ok(Status::parse(&slot))
    }

    /// Close the write half; the peer observes end-of-stream.
    pub async fn shutdown(&mut self) -> Result<(), ConnError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn fill_slot(
        &mut self,
        slot_len: usize,
        phase: Phase,
    ) -> Result<Option<Vec<u8>>, ConnError> {
        let mut buf = vec![0u8; slot_len];
        let mut filled = 0;
        while filled < slot_len {
            let n = self.stream.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(ConnError::TruncatedSlot {
                    phase,
                    got: filled,
                    expected: slot_len,
                });
            }
            filled += n;
        }
        Ok(Some(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn slots_are_padded_to_size() {
        let (a, b) = duplex(1024);
        let (mut tx, mut rx) = (Link::new(a), Link::new(b));

        tx.send_slot(b"abc", 16).await.unwrap();
        let slot = rx.expect_slot(16, Phase::Syn).await.unwrap();
        assert_eq!(slot.len(), 16);
        assert_eq!(&slot[..3], b"abc");
        assert!(slot[3..].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn oversized_input_is_cut_to_slot() {
        let (a, b) = duplex(1024);
        let (mut tx, mut rx) = (Link::new(a), Link::new(b));

        tx.send_slot(&[7u8; 32], 8).await.unwrap();
        tx.send_slot(b"next", 8).await.unwrap();
        assert_eq!(rx.expect_slot(8, Phase::Syn).await.unwrap(), vec![7u8; 8]);
        assert_eq!(&rx.expect_slot(8, Phase::Syn).await.unwrap()[..4], b"next");
    }

    #[tokio::test]
    async fn clean_close_at_boundary_is_none() {
        let (a, b) = duplex(1024);
        drop(a);
        let mut rx = Link::new(b);
        assert!(rx.recv_slot(16, Phase::Request).await.unwrap().is_none());
        assert!(matches!(
            rx.expect_slot(16, Phase::Ack).await,
            Err(ConnError::PeerClosed { phase: Phase::Ack })
        ));
    }

    #[tokio::test]
    async fn close_mid_slot_is_truncation() {
        let (a, b) = duplex(1024);
        let mut tx = Link::new(a);
        tx.send_slot(b"half", 4).await.unwrap();
        drop(tx);

        let mut rx = Link::new(b);
        assert!(matches!(
            rx.recv_slot(8, Phase::Receipt).await,
            Err(ConnError::TruncatedSlot {
                got: 4,
                expected: 8,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn status_roundtrip() {
        let (a, b) = duplex(1024);
        let (mut tx, mut rx) = (Link::new(a), Link::new(b));

        tx.send_status(Status::Failure).await.unwrap();
        tx.send_status(Status::Success).await.unwrap();
        assert_eq!(rx.recv_status(Phase::Syn).await.unwrap(), Status::Failure);
        assert_eq!(rx.recv_status(Phase::Syn).await.unwrap(), Status::Success);
    }

    #[tokio::test]
    async fn read_timeout_fires_when_configured() {
        let (_a, b) = duplex(1024);
        let mut rx = Link::new(b).with_read_timeout(Some(Duration::from_millis(20)));
        assert!(matches!(
            rx.recv_status(Phase::Integrity).await,
            Err(ConnError::Timeout {
                phase: Phase::Integrity
            })
        ));
    }

    #[tokio::test]
    async fn shutdown_signals_end_of_stream() {
        let (a, b) = duplex(1024);
        let (mut tx, mut rx) = (Link::new(a), Link::new(b));
        tx.shutdown().await.unwrap();
        assert!(rx.recv_slot(4, Phase::Request).await.unwrap().is_none());
    }
}
