//! Outbound secured connections to the control server.
//!
//! Every logical channel is its own TCP connection. The handshake selects
//! the channel with a one-byte selector, authenticates with the server key,
//! and waits for a single acknowledgement byte. Framing beyond that is each
//! channel's own business.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ConnectError;

/// Channel selector sent as the first handshake byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Primary,
    ConsoleReceive,
    ConsoleSend,
    Status,
    FileTransfer,
}

impl ChannelKind {
    pub fn selector(self) -> u8 {
        match self {
            ChannelKind::Primary => 0,
            ChannelKind::ConsoleReceive => 1,
            ChannelKind::ConsoleSend => 2,
            ChannelKind::Status => 3,
            ChannelKind::FileTransfer => 4,
        }
    }
}

const ACK_OK: u8 = 1;

/// Factory for authenticated channel connections. Rebuilt from the current
/// config for every session so key or address edits apply on reconnect.
#[derive(Debug, Clone)]
pub struct SecuredConnector {
    address: String,
    key: String,
}

impl SecuredConnector {
    pub fn new(address: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            key: key.into(),
        }
    }

    /// Open one authenticated connection for the given channel.
    pub async fn connect(&self, kind: ChannelKind) -> Result<TcpStream, ConnectError> {
        let mut stream = TcpStream::connect(&self.address).await?;
        stream.write_u8(kind.selector()).await?;
        let key = self.key.as_bytes();
        stream.write_u16(key.len() as u16).await?;
        stream.write_all(key).await?;
        stream.flush().await?;

        match stream.read_u8().await? {
            ACK_OK => Ok(stream),
            _ => Err(ConnectError::AuthenticationFailed),
        }
    }
}
