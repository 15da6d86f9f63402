//! Wire-format definitions.
//!
//! Every frame exchanged between peers starts with a fixed 13-byte
//! [`Header`].  Handshake frames carry only the header inside a
//! [`HANDSHAKE_SLOT`]-byte slot; data frames ([`Packet`]) carry the header
//! followed by `len` payload bytes inside a `bufsize`-byte slot.  Slot padding
//! is added by [`crate::link::Link`], not here.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **little-endian**.
//!
//! ```text
//!  offset  0         1    3    5    7         9          11    13
//!         +---------+----+----+----+---------+----------+-----+---------...
//!         | version | ack| syn| seq| bufsize | checksum | len | payload
//!         +---------+----+----+----+---------+----------+-----+---------...
//! ```

use std::fmt;

use thiserror::Error;

use crate::checksum::checksum;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 13;

/// Protocol version carried in every header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of a handshake frame slot (header plus zero padding).
pub const HANDSHAKE_SLOT: usize = 256;

/// Smallest `bufsize` that can carry a header and one payload byte.
pub const MIN_BUFSIZE: u16 = HEADER_LEN as u16 + 1;

// Byte offsets of each field within the serialised header.
const OFF_VERSION: usize = 0;
const OFF_ACK: usize = 1;
const OFF_SYN: usize = 3;
const OFF_SEQ: usize = 5;
const OFF_BUFSIZE: usize = 7;
const OFF_CHECKSUM: usize = 9;
const OFF_LEN: usize = 11;

/// Fixed-size protocol header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    /// Protocol version, currently [`PROTOCOL_VERSION`].
    pub version: u8,
    /// Acknowledgement number (peer ISN + 1 during the handshake).
    pub ack: u16,
    /// Synchronisation flag, `0` or `1`.
    pub syn: u16,
    /// Sender's sequence number (its ISN during the handshake).
    pub seq: u16,
    /// Negotiated data slot size, header included.
    pub bufsize: u16,
    /// Checksum of the `len` payload bytes that follow.
    pub checksum: u16,
    /// Payload length in bytes.
    pub len: u16,
}

impl Header {
    /// Serialise the header into its 13-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[OFF_VERSION] = self.version;
        put_u16(&mut buf, OFF_ACK, self.ack);
        put_u16(&mut buf, OFF_SYN, self.syn);
        put_u16(&mut buf, OFF_SEQ, self.seq);
        put_u16(&mut buf, OFF_BUFSIZE, self.bufsize);
        put_u16(&mut buf, OFF_CHECKSUM, self.checksum);
        put_u16(&mut buf, OFF_LEN, self.len);
        buf
    }

    /// Parse a header from its 13-byte wire form.  Never fails.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            version: buf[OFF_VERSION],
            ack: get_u16(buf, OFF_ACK),
            syn: get_u16(buf, OFF_SYN),
            seq: get_u16(buf, OFF_SEQ),
            bufsize: get_u16(buf, OFF_BUFSIZE),
            checksum: get_u16(buf, OFF_CHECKSUM),
            len: get_u16(buf, OFF_LEN),
        }
    }

    /// Parse the header at the front of a received slot.
    pub fn from_slot(slot: &[u8]) -> Result<Self, FrameError> {
        let bytes: &[u8; HEADER_LEN] = slot
            .get(..HEADER_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(FrameError::SlotTooShort(slot.len()))?;
        Ok(Self::decode(bytes))
    }

    /// Header for a handshake frame: no payload, no checksum.
    pub fn handshake(ack: u16, syn: bool, seq: u16, bufsize: u16) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            ack,
            syn: u16::from(syn),
            seq,
            bufsize,
            checksum: 0,
            len: 0,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VER: {} ACK: {} SYN: {} SEQ: {} BUFSIZE: {} CS: {} LEN: {}",
            self.version, self.ack, self.syn, self.seq, self.bufsize, self.checksum, self.len
        )
    }
}

fn put_u16(buf: &mut [u8; HEADER_LEN], off: usize, value: u16) {
    buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(buf: &[u8; HEADER_LEN], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

/// A data frame: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a data frame for a `bufsize`-byte slot.
    ///
    /// The payload is cut to what fits after the header; `len` and
    /// `checksum` are computed over the bytes actually carried.
    pub fn data(payload: &[u8], bufsize: u16) -> Self {
        let room = usize::from(bufsize).saturating_sub(HEADER_LEN);
        let payload = &payload[..payload.len().min(room)];
        Self {
            header: Header {
                version: PROTOCOL_VERSION,
                ack: 0,
                syn: 0,
                seq: 0,
                bufsize,
                checksum: checksum(payload),
                len: payload.len() as u16,
            },
            payload: payload.to_vec(),
        }
    }

    /// Build the server's echo of `payload`, capped at `data_cap` bytes.
    pub fn echo(payload: &[u8], bufsize: u16, data_cap: usize) -> Self {
        Self::data(&payload[..payload.len().min(data_cap)], bufsize)
    }

    /// Serialise header and payload back to back (unpadded).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a data frame from a received slot.
    ///
    /// Exactly `len` bytes after the header form the payload; anything past
    /// them is padding and ignored.
    pub fn decode(slot: &[u8]) -> Result<Self, FrameError> {
        let header = Header::from_slot(slot)?;
        let len = usize::from(header.len);
        let available = slot.len() - HEADER_LEN;
        if len > available {
            return Err(FrameError::LengthOverflow { len, available });
        }
        Ok(Self {
            header,
            payload: slot[HEADER_LEN..HEADER_LEN + len].to_vec(),
        })
    }

    /// `true` when the carried checksum matches the payload.
    pub fn is_intact(&self) -> bool {
        checksum(&self.payload) == self.header.checksum
    }
}

/// Errors that can arise when parsing a received slot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Slot shorter than the fixed header size.
    #[error("slot of {0} bytes cannot hold a header")]
    SlotTooShort(usize),
    /// `len` field claims more bytes than the slot carries.
    #[error("len field {len} exceeds the {available} bytes after the header")]
    LengthOverflow { len: usize, available: usize },
}
