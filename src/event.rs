//! Notifications emitted by the transport and the rcon session.

use crate::config::ConnectionInfo;
use crate::error::RconError;
use crate::packet::{Opcode, Packet};
use crate::response::{ChatMessage, Player};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Details attached to every connection lifecycle event.
#[derive(Debug)]
pub struct ConnectionEvent {
    pub status: ConnectionStatus,
    pub message: String,
    /// Cause of a failure or drop.
    pub error: Option<RconError>,
    /// Filled in by [crate::rcon::Rcon]; the transport doesn't know it.
    pub info: Option<ConnectionInfo>,
}

impl ConnectionEvent {
    pub fn new(status: ConnectionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error: None,
            info: None,
        }
    }

    pub fn with_error(mut self, error: RconError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Emitted by [crate::client::Client].
#[derive(Debug)]
pub enum ClientEvent {
    ConnectionStarting(ConnectionEvent),
    ConnectionSucceeded(ConnectionEvent),
    ConnectionFailed(ConnectionEvent),
    ConnectionDropped(ConnectionEvent),
    Disconnected(ConnectionEvent),
    PacketReceived(Packet),
}

/// Emitted by [crate::rcon::Rcon] to its subscriber.
#[derive(Debug)]
pub enum RconEvent {
    ConnectionStarting(ConnectionEvent),
    ConnectionSucceeded(ConnectionEvent),
    ConnectionFailed(ConnectionEvent),
    ConnectionDropped(ConnectionEvent),
    Disconnected(ConnectionEvent),
    PacketReceived(Packet),
    AuthSucceeded(String),
    /// Followed by [RconEvent::Disconnected].
    AuthFailed(RconError),
    ConsoleLog(String),
    ChatReceived(ChatMessage),
    /// The server echoed a message this session sent with `say`.
    MessageSent(ChatMessage),
    /// Always sent right before [RconEvent::Players].
    PlayerCount(usize),
    Players(Vec<Player>),
    HostnameChanged(String),
    /// A response body could not be parsed. The connection stays up.
    MalformedResponse { opcode: Opcode, error: RconError },
}
