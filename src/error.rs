use thiserror::Error;

/// Possible errors for the package.
#[derive(Error, Debug)]
pub enum RconError {
    /// Returned if the host is down, refuses the connection or is behind a
    /// firewall.
    #[error("host cannot be reached")]
    UnreachableHost(#[source] std::io::Error),
    /// The stream was established, but there was a problem writing to the
    /// socket.
    #[error("cannot send packet to host")]
    SendError(#[source] std::io::Error),
    /// The stream was established, but there was a problem reading from the
    /// socket.
    #[error("cannot receive packet from host")]
    ReceiveError(#[source] std::io::Error),
    /// The peer closed the stream, possibly in the middle of a packet.
    #[error("connection to the server has been lost")]
    ConnectionLost,
    /// The size header can't describe a valid packet, so the stream can't be
    /// re-synchronised.
    #[error("packet header malformed (size {size})")]
    MalformedPacket { size: i32 },
    /// Outgoing data too large to fit in one frame. Nothing was written.
    #[error("packet too large to send ({len} bytes of data)")]
    PacketTooLarge { len: usize },
    /// Returned if you can't remember the password.
    #[error("server authentication failed, check that the rcon password is correct")]
    AuthenticationError,
    /// A response body could not be parsed (player list, chat line).
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("not connected")]
    NotConnected,
}

impl RconError {
    /// Whether this error means the connection can no longer be used.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            RconError::SendError(_)
                | RconError::ReceiveError(_)
                | RconError::ConnectionLost
                | RconError::MalformedPacket { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_loss_classification() {
        let io = || std::io::Error::from(std::io::ErrorKind::BrokenPipe);

        assert!(RconError::SendError(io()).is_connection_loss());
        assert!(RconError::ReceiveError(io()).is_connection_loss());
        assert!(RconError::ConnectionLost.is_connection_loss());
        assert!(RconError::MalformedPacket { size: 3 }.is_connection_loss());

        assert!(!RconError::UnreachableHost(io()).is_connection_loss());
        assert!(!RconError::AuthenticationError.is_connection_loss());
        assert!(!RconError::PacketTooLarge { len: 1 << 31 }.is_connection_loss());
        assert!(!RconError::MalformedResponse("x".into()).is_connection_loss());
    }
}
