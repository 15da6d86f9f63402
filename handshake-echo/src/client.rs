//! Client session driver.
//!
//! A [`Session`] performs the handshake once, then sends user messages one
//! at a time: each message goes out as a request frame, and the server's echo
//! comes back through both confirmation rounds before the next message is
//! taken.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ClientConfig;
use crate::delivery;
use crate::error::ConnError;
use crate::handshake::Handshake;
use crate::link::Link;
use crate::packet::Packet;

/// An established client connection.
#[derive(Debug)]
pub struct Session<S> {
    link: Link<S>,
    handshake: Handshake,
}

impl Session<TcpStream> {
    /// Connect to `config.server` and complete the handshake.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ConnError> {
        config.validate()?;
        let stream = TcpStream::connect(config.server).await?;
        log::info!("[client] connected to {}", config.server);
        Self::establish(stream, config).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the handshake over an already-open stream.
    pub async fn establish(stream: S, config: &ClientConfig) -> Result<Self, ConnError> {
        config.validate()?;
        let mut link = Link::new(stream).with_read_timeout(config.read_timeout);
        let mut handshake = Handshake::initiator(config.bufsize);
        handshake.connect(&mut link, &config.retry).await?;
        Ok(Self { link, handshake })
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Negotiated data slot size.
    pub fn bufsize(&self) -> u16 {
        self.handshake.bufsize
    }

    /// Send one message and return the confirmed echo.
    ///
    /// Messages longer than the slot allows are truncated; the server may
    /// truncate further to its data cap.
    pub async fn exchange(&mut self, message: &[u8]) -> Result<Vec<u8>, ConnError> {
        if message.is_empty() {
            return Err(ConnError::EmptyMessage);
        }
        let bufsize = self.bufsize();
        let request = Packet::data(message, bufsize);
        log::debug!("[client] → REQUEST {}", request.header);
        self.link.send_slot(&request.encode(), usize::from(bufsize)).await?;

        let echo = delivery::receive(&mut self.link, bufsize).await?;
        Ok(echo.payload)
    }

    /// Feed every non-blank line of `input` through [`exchange`](Self::exchange),
    /// writing `Received: <payload>` to `output` for each.
    ///
    /// Lines are raw bytes; nothing is decoded before sending.  Returns when
    /// `input` is exhausted or the connection fails.
    pub async fn run<R, W>(&mut self, input: R, output: &mut W) -> Result<(), ConnError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.split(b'\n');
        while let Some(line) = lines.next_segment().await? {
            let message = line.trim_ascii();
            if message.is_empty() {
                continue;
            }
            let payload = self.exchange(message).await?;
            let text = format!("Received: {}\n", String::from_utf8_lossy(&payload));
            output.write_all(text.as_bytes()).await?;
            output.flush().await?;
        }
        Ok(())
    }

    /// Close the connection; the server sees a clean disconnect.
    pub async fn close(mut self) -> Result<(), ConnError> {
        self.link.shutdown().await
    }
}
