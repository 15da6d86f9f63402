//! Connection multiplexer.
//!
//! # Architecture
//!
//! ```text
//!   TcpListener ──accept──▶ accept loop ──spawn──▶ connection task (one per peer)
//!                               ▲   owns              handshake, then
//!                               │   ConnectionTable   request → deliver, repeat
//!                               │                            │
//!                               └──────── ConnEvent ◀────────┘
//!                                      (mpsc channel)
//! ```
//!
//! The accept loop is the only owner of the [`ConnectionTable`]; connection
//! tasks report `Established` and `Closed` over a channel.  A slot is reserved
//! at accept time, so connections still handshaking count against
//! `max_clients`.  Each task runs its handshake and delivery cycles strictly
//! one after another, so frames and statuses of two cycles never interleave on
//! one connection, while different connections progress independently.
//!
//! When every slot is taken the new connection is rejected: it receives one
//! failure Status Signal and is closed without being read.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::delivery;
use crate::error::ConnError;
use crate::handshake::Handshake;
use crate::link::Link;
use crate::packet::Packet;
use crate::state::Phase;
use crate::status::Status;

/// Stable identifier of one accepted connection.  Never reused.
pub type ConnectionId = u64;

// ---------------------------------------------------------------------------
// Connection table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Handshaking,
    Established { bufsize: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub addr: SocketAddr,
    pub state: PeerState,
}

/// Bounded set of live connections keyed by [`ConnectionId`].
#[derive(Debug)]
pub struct ConnectionTable {
    capacity: usize,
    next_id: ConnectionId,
    entries: HashMap<ConnectionId, PeerEntry>,
}

impl ConnectionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_id: 0,
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Claim a slot for a freshly accepted peer, or `None` when full.
    pub fn reserve(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.is_full() {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            PeerEntry {
                addr,
                state: PeerState::Handshaking,
            },
        );
        Some(id)
    }

    /// Record a completed handshake.  Returns `false` for unknown ids.
    pub fn mark_established(&mut self, id: ConnectionId, bufsize: u16) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.state = PeerState::Established { bufsize };
                true
            }
            None => false,
        }
    }

    /// Free the slot held by `id`.
    pub fn release(&mut self, id: ConnectionId) -> Option<PeerEntry> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Lifecycle notifications from connection tasks to the accept loop.
#[derive(Debug)]
enum ConnEvent {
    Established {
        id: ConnectionId,
        bufsize: u16,
    },
    Closed {
        id: ConnectionId,
        result: Result<(), ConnError>,
    },
}

/// A bound, listening server.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Bind and listen on `config.bind` with `config.backlog`.
    pub async fn bind(config: ServerConfig) -> Result<Self, ConnError> {
        config.validate()?;
        let socket = if config.bind.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(config.bind)?;
        let listener = socket.listen(config.backlog)?;
        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ConnError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` completes; live connections are then aborted.
    ///
    /// Only a failing `accept` ends the loop with an error.  Per-connection
    /// failures are logged and free their slot.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ConnError>
    where
        F: Future<Output = ()>,
    {
        let (events_tx, mut events_rx) = mpsc::channel::<ConnEvent>(64);
        let mut table = ConnectionTable::new(self.config.max_clients);
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("[server] shutting down with {} connection(s) open", table.len());
                    break;
                }

                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted?;
                    match table.reserve(addr) {
                        Some(id) => {
                            log::debug!("[server] accepted {addr} as #{id}");
                            tasks.spawn(serve_connection(
                                id,
                                stream,
                                addr,
                                Arc::clone(&self.config),
                                events_tx.clone(),
                            ));
                        }
                        None => {
                            log::warn!(
                                "[server] all {} slots in use; rejecting {addr}",
                                table.capacity()
                            );
                            tasks.spawn(reject(stream));
                        }
                    }
                }

                Some(event) = events_rx.recv() => match event {
                    ConnEvent::Established { id, bufsize } => {
                        table.mark_established(id, bufsize);
                    }
                    ConnEvent::Closed { id, result } => {
                        let who = match table.release(id) {
                            Some(PeerEntry { addr, state: PeerState::Established { bufsize } }) => {
                                format!("{addr} (bufsize {bufsize})")
                            }
                            Some(PeerEntry { addr, state: PeerState::Handshaking }) => {
                                format!("{addr} (mid-handshake)")
                            }
                            None => format!("#{id}"),
                        };
                        match result {
                            Ok(()) => log::info!("[server] client {who} disconnected"),
                            Err(e) if e.is_peer_closed() => {
                                log::info!("[server] client {who} went away: {e}")
                            }
                            Err(e) => log::warn!("[server] closed connection with {who}: {e}"),
                        }
                    }
                },

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            log::error!("[server] connection task panicked: {e}");
                        }
                    }
                }
            }
        }

        tasks.shutdown().await;
        Ok(())
    }
}

/// Per-connection task body: always reports `Closed` exactly once.
async fn serve_connection(
    id: ConnectionId,
    stream: TcpStream,
    addr: SocketAddr,
    config: Arc<ServerConfig>,
    events: mpsc::Sender<ConnEvent>,
) {
    let mut link = Link::new(stream).with_read_timeout(config.read_timeout);
    let result = async {
        let bufsize = establish(&mut link, addr, &config).await?;
        // The accept loop only stops draining events when shutting down.
        let _ = events.send(ConnEvent::Established { id, bufsize }).await;
        echo_requests(&mut link, addr, bufsize, &config).await
    }
    .await;
    let _ = events.send(ConnEvent::Closed { id, result }).await;
}

/// Run the responder handshake; returns the negotiated `bufsize`.
async fn establish<S>(
    link: &mut Link<S>,
    addr: SocketAddr,
    config: &ServerConfig,
) -> Result<u16, ConnError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = Handshake::responder();
    handshake.accept(link, &config.retry).await?;
    log::info!("[server] client on port {} (IP {}) connected", addr.port(), addr.ip());
    Ok(handshake.bufsize)
}

/// Echo each request through confirmed delivery until the peer disconnects
/// or a round exhausts its retries.
async fn echo_requests<S>(
    link: &mut Link<S>,
    addr: SocketAddr,
    bufsize: u16,
    config: &ServerConfig,
) -> Result<(), ConnError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let Some(slot) = link.recv_slot(usize::from(bufsize), Phase::Request).await? else {
            return Ok(());
        };

        let payload = match Packet::decode(&slot) {
            Ok(request) => request.payload,
            Err(e) => {
                log::warn!("[server] malformed request from {addr}: {e}");
                Vec::new()
            }
        };

        let echo = Packet::echo(&payload, bufsize, config.data_cap);
        let report = delivery::deliver(link, &echo, &config.retry).await?;
        log::info!(
            "[server] client on port {} received integral payload ({} + {} retransmissions)",
            addr.port(),
            report.receipt_retransmissions,
            report.integrity_retransmissions
        );
    }
}

/// Refuse a connection that found no free slot.
async fn reject(stream: TcpStream) {
    let mut link = Link::new(stream);
    if let Err(e) = link.send_status(Status::Failure).await {
        log::debug!("[server] rejection not delivered: {e}");
    }
    let _ = link.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn reserve_until_full() {
        let mut table = ConnectionTable::new(2);
        assert!(table.reserve(addr(1)).is_some());
        assert!(table.reserve(addr(2)).is_some());
        assert!(table.is_full());
        assert_eq!(table.reserve(addr(3)), None);
    }

    #[test]
    fn release_frees_a_slot_without_reusing_ids() {
        let mut table = ConnectionTable::new(1);
        let first = table.reserve(addr(1)).unwrap();
        assert_eq!(table.release(first).unwrap().addr, addr(1));
        assert!(table.is_empty());

        let second = table.reserve(addr(2)).unwrap();
        assert_ne!(first, second);
        assert_eq!(table.release(first), None);
    }

    #[test]
    fn mark_established_records_bufsize() {
        let mut table = ConnectionTable::new(4);
        let id = table.reserve(addr(1)).unwrap();
        let other = table.reserve(addr(2)).unwrap();

        assert!(table.mark_established(id, 4096));
        assert!(!table.mark_established(other + 1, 4096));
        assert_eq!(
            table.release(id).unwrap().state,
            PeerState::Established { bufsize: 4096 }
        );
        assert_eq!(table.release(other).unwrap().state, PeerState::Handshaking);
    }

    #[tokio::test]
    async fn serves_requests_until_peer_disconnects() {
        use std::time::Duration;

        use crate::client::Session;
        use crate::config::ClientConfig;
        use crate::retry::RetryPolicy;

        let (a, b) = tokio::io::duplex(1 << 16);
        let config = ServerConfig {
            data_cap: 4,
            retry: RetryPolicy::with_delay(Duration::from_millis(1)),
            ..ServerConfig::default()
        };

        let server = async {
            let mut link = Link::new(b);
            let bufsize = establish(&mut link, addr(9), &config).await?;
            assert_eq!(bufsize, 256);
            echo_requests(&mut link, addr(9), bufsize, &config).await
        };

        let client = async {
            let client_config = ClientConfig {
                bufsize: 256,
                retry: config.retry,
                ..ClientConfig::default()
            };
            let mut session = Session::establish(a, &client_config).await.unwrap();
            assert_eq!(session.exchange(b"ping").await.unwrap(), b"ping");
            // Longer than the server's data cap.
            assert_eq!(session.exchange(b"pong pong").await.unwrap(), b"pong");
            session.close().await.unwrap();
        };

        let (served, ()) = tokio::join!(server, client);
        served.unwrap();
    }
}
