//! `handshake-echo`: a three-way handshake and confirmed echo delivery over
//! an ordered, reliable byte stream.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  request frame   ┌──────────────────────────┐
//!  │   Session    │─────────────────▶│  Server (accept loop)    │
//!  │  (client)    │                  │   └─ one task per peer   │
//!  └──────┬───────┘◀─────────────────└────────────┬─────────────┘
//!         │      echo + 2 confirmation rounds     │
//!  ┌──────▼───────────────────────────────────────▼─────────────┐
//!  │  Handshake (SYN / SYN-ACK / ACK)   delivery (receipt,      │
//!  │                                    integrity)              │
//!  │        └──────── retry: confirm-with-retry ───────┘        │
//!  └──────────────────────────┬─────────────────────────────────┘
//!                             │ fixed-size slots
//!  ┌──────────────────────────▼─────────────────────────────────┐
//!  │  Link  (slot I/O over TcpStream / any AsyncRead+AsyncWrite) │
//!  └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: 13-byte header codec and data frames
//! - [`checksum`]: one's-complement payload checksum
//! - [`status`]: Status Signal encoding and parsing
//! - [`link`]: slot-oriented async stream I/O
//! - [`retry`]: the confirm-with-retry exchange and its policy
//! - [`state`]: handshake states and phase tags
//! - [`handshake`]: three-phase connection establishment
//! - [`delivery`]: two-round confirmed delivery of one frame
//! - [`server`]: connection multiplexer
//! - [`client`]: client session driver
//! - [`config`]: protocol constants and endpoint configuration
//! - [`error`]: crate error type

pub mod checksum;
pub mod client;
pub mod config;
pub mod delivery;
pub mod error;
pub mod handshake;
pub mod link;
pub mod packet;
pub mod retry;
pub mod server;
pub mod state;
pub mod status;

pub use client::Session;
pub use config::{ClientConfig, ServerConfig};
pub use error::ConnError;
pub use retry::RetryPolicy;
pub use server::Server;
