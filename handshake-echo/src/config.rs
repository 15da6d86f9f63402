//! Protocol constants and endpoint configuration.
//!
//! Nothing here is read from files or the environment; the binary builds
//! these structs from its command line and everything else uses `Default`.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::ConnError;
use crate::packet::MIN_BUFSIZE;
use crate::retry::RetryPolicy;

/// Client's fixed Initial Sequence Number.
pub const CLIENT_ISN: u16 = 1001;
/// Server's fixed Initial Sequence Number.
pub const SERVER_ISN: u16 = 2001;

pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_BACKLOG: u32 = 100;
pub const DEFAULT_MAX_CLIENTS: usize = 30;
/// Data slot size a client proposes unless told otherwise.
pub const DEFAULT_BUFSIZE: u16 = 4096;
/// Most payload bytes the server will echo back in one frame.
pub const DATA_CAP: usize = 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listening address.
    pub bind: SocketAddr,
    /// Pending-connection queue length passed to `listen`.
    pub backlog: u32,
    /// Connection slots; connections beyond this are rejected.
    pub max_clients: usize,
    /// Cap on echoed payload bytes.
    pub data_cap: usize,
    pub retry: RetryPolicy,
    /// `None` waits forever for the next frame or status.
    pub read_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            backlog: DEFAULT_BACKLOG,
            max_clients: DEFAULT_MAX_CLIENTS,
            data_cap: DATA_CAP,
            retry: RetryPolicy::default(),
            read_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConnError> {
        if self.max_clients == 0 {
            return Err(ConnError::InvalidConfig("max_clients must be at least 1".into()));
        }
        if self.data_cap == 0 {
            return Err(ConnError::InvalidConfig("data_cap must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server to connect to.
    pub server: SocketAddr,
    /// Data slot size proposed in the SYN.
    pub bufsize: u16,
    pub retry: RetryPolicy,
    /// `None` waits forever for the next frame or status.
    pub read_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            bufsize: DEFAULT_BUFSIZE,
            retry: RetryPolicy::default(),
            read_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConnError> {
        if self.bufsize < MIN_BUFSIZE {
            return Err(ConnError::InvalidConfig(format!(
                "bufsize {} cannot carry a header and payload (minimum {MIN_BUFSIZE})",
                self.bufsize
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let c = ServerConfig::default();
        assert_eq!(c.bind.port(), 8888);
        assert_eq!(c.backlog, 100);
        assert_eq!(c.max_clients, 30);
        assert_eq!(c.data_cap, 1024);
        assert_eq!(c.read_timeout, None);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn client_defaults() {
        let c = ClientConfig::default();
        assert_eq!(c.server, "127.0.0.1:8888".parse::<SocketAddr>().unwrap());
        assert_eq!(c.bufsize, 4096);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn tiny_bufsize_is_rejected() {
        let c = ClientConfig {
            bufsize: 13,
            ..ClientConfig::default()
        };
        assert!(matches!(c.validate(), Err(ConnError::InvalidConfig(_))));
    }

    #[test]
    fn zero_slots_is_rejected() {
        let c = ServerConfig {
            max_clients: 0,
            ..ServerConfig::default()
        };
        assert!(c.validate().is_err());
    }
}
