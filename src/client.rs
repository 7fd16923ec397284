use crate::{
    config::RconConfig,
    error::RconError,
    event::{ClientEvent, ConnectionEvent, ConnectionStatus},
    keepalive::Keepalive,
    packet::Packet,
};
use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::future::poll_fn;
use std::task::Poll;
use tokio::io::ReadBuf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

/// Transport half of an rcon session: owns the socket and a queue of
/// outgoing [Packet]s, and turns socket activity into [ClientEvent]s.
///
/// Nothing is written until [Client::update] runs. Each call drains whatever
/// the server has already sent, then writes at most one queued packet. A
/// packet may only be written once the send cooldown has passed or the
/// server has replied since the previous write, so a server that handles
/// commands one at a time isn't flooded.
///
/// ## Example
/// ```no_run
/// use atlas_rcon::{client::Client, config::RconConfig, packet::{Opcode, Packet, PacketType}};
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = mpsc::unbounded_channel();
///     let mut client = Client::new(RconConfig::default(), tx);
///
///     if client.connect("127.0.0.1", 27020).await {
///         client.send_packet(Packet::text(Opcode::Auth, PacketType::Auth, "<password>"));
///         loop {
///             client.update().await;
///             while let Ok(event) = rx.try_recv() {
///                 println!("{:?}", event);
///             }
///             tokio::time::sleep(std::time::Duration::from_millis(10)).await;
///         }
///     }
/// }
/// ```
pub struct Client {
    config: RconConfig,
    status: ConnectionStatus,
    stream: Option<TcpStream>,
    outgoing: VecDeque<Packet>,
    keepalive: Keepalive,
    last_send: Instant,
    incoming_since_send: bool,
    events: UnboundedSender<ClientEvent>,
}

impl Client {
    pub fn new(config: RconConfig, events: UnboundedSender<ClientEvent>) -> Self {
        Client {
            keepalive: Keepalive::new(config.keepalive_interval),
            config,
            status: ConnectionStatus::Disconnected,
            stream: None,
            outgoing: VecDeque::new(),
            last_send: Instant::now(),
            // the first packet never waits
            incoming_since_send: true,
            events,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected && self.stream.is_some()
    }

    /// Number of packets waiting to be written.
    pub fn queued(&self) -> usize {
        self.outgoing.len()
    }

    /// Queues a packet for a later [Client::update]. Never writes.
    pub fn send_packet(&mut self, packet: Packet) {
        self.outgoing.push_back(packet);
    }

    /// Opens the TCP stream. Emits `ConnectionStarting` followed by either
    /// `ConnectionSucceeded` or `ConnectionFailed`.
    pub async fn connect(&mut self, hostname: &str, port: u16) -> bool {
        self.close();
        self.status = ConnectionStatus::Connecting;
        self.emit(ClientEvent::ConnectionStarting(ConnectionEvent::new(
            ConnectionStatus::Connecting,
            format!("Connecting to {}:{}...", hostname, port),
        )));

        let stream = match TcpStream::connect((hostname, port)).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("could not connect to {}:{}: {}", hostname, port, e);
                self.status = ConnectionStatus::Disconnected;
                self.emit(ClientEvent::ConnectionFailed(
                    ConnectionEvent::new(
                        ConnectionStatus::Disconnected,
                        "Failed to connect! Make sure the server is running and that your hostname and port are correct.",
                    )
                    .with_error(RconError::UnreachableHost(e)),
                ));
                return false;
            }
        };

        if self.config.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                debug!("could not set TCP_NODELAY: {}", e);
            }
        }
        trace!("opened tcp stream to {}:{}", hostname, port);

        self.stream = Some(stream);
        self.status = ConnectionStatus::Connected;
        self.last_send = Instant::now();
        self.incoming_since_send = true;
        self.emit(ClientEvent::ConnectionSucceeded(ConnectionEvent::new(
            ConnectionStatus::Connected,
            "Successfully connected.",
        )));
        self.keepalive.reset();
        true
    }

    /// Announces a disconnect. The socket stays open until [Client::close];
    /// the owner decides when to tear it down.
    pub fn disconnect(&mut self) {
        debug!("disconnect requested");
        self.emit(ClientEvent::Disconnected(ConnectionEvent::new(
            ConnectionStatus::Disconnected,
            "Disconnected from server.",
        )));
    }

    /// One pump step. I/O failures end the connection and are reported as
    /// `ConnectionDropped`; nothing is returned to the caller.
    pub async fn update(&mut self) {
        if !self.is_connected() {
            return;
        }

        if let Err(e) = self.process_packet_stream().await {
            debug!("connection lost: {}", e);
            self.close();
            self.emit(ClientEvent::ConnectionDropped(
                ConnectionEvent::new(
                    ConnectionStatus::Disconnected,
                    "Connection to the server has been lost.",
                )
                .with_error(e),
            ));
            return;
        }

        if self.keepalive.update() {
            trace!("connection idle, queueing keepalive");
            self.send_packet(Packet::keepalive());
        }
    }

    /// Releases the stream and socket and discards anything still queued.
    pub fn close(&mut self) {
        // TcpStream owns the socket, dropping it releases both
        if self.stream.take().is_some() {
            trace!("closed tcp stream");
        }
        if !self.outgoing.is_empty() {
            trace!("discarding {} unsent packets", self.outgoing.len());
            self.outgoing.clear();
        }
        self.status = ConnectionStatus::Disconnected;
    }

    fn can_send(&self) -> bool {
        self.incoming_since_send || self.last_send.elapsed() >= self.config.send_cooldown
    }

    async fn process_packet_stream(&mut self) -> Result<(), RconError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let result = self.pump(&mut stream).await;
        self.stream = Some(stream);
        result
    }

    async fn pump(&mut self, stream: &mut TcpStream) -> Result<(), RconError> {
        while Self::has_incoming(stream).await? {
            let packet = Packet::read_from(stream).await?;
            trace!(
                "received packet type {} opcode {}",
                packet.raw_packet_type(),
                packet.raw_opcode()
            );
            self.incoming_since_send = true;
            self.keepalive.reset();
            self.emit(ClientEvent::PacketReceived(packet));
        }

        if self.outgoing.is_empty() || !self.can_send() {
            return Ok(());
        }

        if let Some(packet) = self.outgoing.pop_front() {
            let bytes = match packet.pack() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("dropping outgoing packet opcode {}: {}", packet.raw_opcode(), e);
                    return Ok(());
                }
            };
            Self::write_to_stream(&bytes, stream).await?;
            trace!(
                "sent packet type {} opcode {}",
                packet.raw_packet_type(),
                packet.raw_opcode()
            );
            self.last_send = Instant::now();
            self.incoming_since_send = false;
            self.keepalive.reset();
        }
        Ok(())
    }

    /// Checks for buffered bytes without waiting for any. A peer that has
    /// closed its end reads as zero bytes available.
    async fn has_incoming(stream: &TcpStream) -> Result<bool, RconError> {
        let mut probe = [0u8; 1];
        poll_fn(|cx| {
            let mut buf = ReadBuf::new(&mut probe);
            match stream.poll_peek(cx, &mut buf) {
                Poll::Ready(Ok(0)) => Poll::Ready(Err(RconError::ConnectionLost)),
                Poll::Ready(Ok(_)) => Poll::Ready(Ok(true)),
                Poll::Ready(Err(e)) => Poll::Ready(Err(RconError::ReceiveError(e))),
                Poll::Pending => Poll::Ready(Ok(false)),
            }
        })
        .await
    }

    async fn write_to_stream(bytes: &[u8], stream: &TcpStream) -> Result<(), RconError> {
        let mut written = 0;

        while written < bytes.len() {
            stream.writable().await.map_err(RconError::SendError)?;

            match stream.try_write(&bytes[written..]) {
                Ok(0) => return Err(RconError::ConnectionLost),
                Ok(n) => written += n,
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(RconError::SendError(e)),
            }
        }
        Ok(())
    }

    fn emit(&self, event: ClientEvent) {
        // the owner may have stopped listening; that is not our problem
        let _ = self.events.send(event);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Opcode, PacketType};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tokio::time::{sleep, timeout};

    async fn connected(config: RconConfig) -> (Client, UnboundedReceiver<ClientEvent>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut client = Client::new(config, tx);

        let (ok, accepted) = tokio::join!(client.connect("127.0.0.1", port), listener.accept());
        assert!(ok);
        let (server, _) = accepted.unwrap();
        (client, rx, server)
    }

    fn drain(rx: &mut UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn command(text: &str) -> Packet {
        Packet::text(Opcode::Generic, PacketType::ExecCommand, text)
    }

    async fn read(server: &mut TcpStream) -> Packet {
        timeout(Duration::from_secs(2), Packet::read_from(server))
            .await
            .expect("server timed out waiting for a packet")
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_events() {
        let (client, mut rx, _server) = connected(RconConfig::default()).await;

        assert!(client.is_connected());
        assert_eq!(client.status(), ConnectionStatus::Connected);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ClientEvent::ConnectionStarting(e) if e.status == ConnectionStatus::Connecting));
        assert!(matches!(&events[1], ClientEvent::ConnectionSucceeded(e) if e.status == ConnectionStatus::Connected));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client = Client::new(RconConfig::default(), tx);
        assert!(!client.connect("127.0.0.1", port).await);
        assert_eq!(client.status(), ConnectionStatus::Disconnected);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ClientEvent::ConnectionStarting(_)));
        match &events[1] {
            ClientEvent::ConnectionFailed(e) => {
                assert!(matches!(e.error, Some(RconError::UnreachableHost(_))));
            }
            other => panic!("expected ConnectionFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_packet_only_queues() {
        let (mut client, _rx, _server) = connected(RconConfig::default()).await;

        client.send_packet(command("echo a"));
        client.send_packet(command("echo b"));
        assert_eq!(client.queued(), 2);
    }

    #[tokio::test]
    async fn test_pacing_without_replies() {
        let (mut client, _rx, mut server) = connected(RconConfig::default()).await;

        client.send_packet(command("echo a"));
        client.send_packet(command("echo b"));

        client.update().await;
        client.update().await;
        assert_eq!(client.queued(), 1, "second packet must wait for the cooldown");
        assert_eq!(read(&mut server).await.body(), "echo a");

        sleep(Duration::from_millis(850)).await;
        client.update().await;
        assert_eq!(client.queued(), 0);
        assert_eq!(read(&mut server).await.body(), "echo b");
    }

    #[tokio::test]
    async fn test_reply_reopens_gate() {
        let (mut client, mut rx, mut server) = connected(RconConfig::default()).await;
        drain(&mut rx);

        client.send_packet(command("echo a"));
        client.send_packet(command("echo b"));
        client.update().await;
        assert_eq!(read(&mut server).await.body(), "echo a");

        let reply = Packet::text(Opcode::Generic, PacketType::ResponseValue, "a");
        server.write_all(&reply.pack().unwrap()).await.unwrap();

        // well inside the 800ms cooldown
        for _ in 0..30 {
            client.update().await;
            if client.queued() == 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(client.queued(), 0);
        assert_eq!(read(&mut server).await.body(), "echo b");

        let events = drain(&mut rx);
        assert!(matches!(&events[..], [ClientEvent::PacketReceived(p)] if *p == reply));
    }

    #[tokio::test]
    async fn test_oversized_packet_is_dropped_not_fatal() {
        let (mut client, mut rx, mut server) = connected(RconConfig::default()).await;
        drain(&mut rx);

        let limit = (Packet::MAX_PACKET_SIZE - Packet::BASE_PACKET_SIZE) as usize;
        client.send_packet(Packet::new(
            Opcode::Generic,
            PacketType::ExecCommand,
            vec![b'x'; limit + 1],
        ));
        client.send_packet(command("echo a"));

        client.update().await;
        assert!(client.is_connected());
        assert_eq!(client.queued(), 1);

        // nothing went out, so the gate is still open
        client.update().await;
        assert_eq!(client.queued(), 0);
        assert_eq!(read(&mut server).await.body(), "echo a");
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_keepalive_queued_when_idle() {
        let config = RconConfig::default().with_keepalive_interval(Duration::from_millis(50));
        let (mut client, _rx, mut server) = connected(config).await;

        sleep(Duration::from_millis(70)).await;
        client.update().await;
        assert_eq!(client.queued(), 1);

        client.update().await;
        assert_eq!(client.queued(), 0);
        assert_eq!(read(&mut server).await, Packet::keepalive());
    }

    #[tokio::test]
    async fn test_traffic_postpones_keepalive() {
        let config = RconConfig::default().with_keepalive_interval(Duration::from_millis(150));
        let (mut client, _rx, mut server) = connected(config).await;

        sleep(Duration::from_millis(100)).await;
        client.send_packet(command("echo a"));
        client.update().await;
        assert_eq!(read(&mut server).await.body(), "echo a");

        sleep(Duration::from_millis(100)).await;
        client.update().await;
        assert_eq!(client.queued(), 0, "send should have restarted the keepalive clock");
    }

    #[tokio::test]
    async fn test_peer_close_drops_connection() {
        let (mut client, mut rx, server) = connected(RconConfig::default()).await;
        drain(&mut rx);

        client.send_packet(command("echo a"));
        client.send_packet(command("echo b"));
        client.update().await;
        drop(server);

        for _ in 0..100 {
            client.update().await;
            if !client.is_connected() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        assert!(!client.is_connected());
        assert_eq!(client.queued(), 0, "unsent packets are discarded");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ClientEvent::ConnectionDropped(e) => {
                assert_eq!(e.status, ConnectionStatus::Disconnected);
                assert!(e.error.as_ref().is_some_and(RconError::is_connection_loss));
            }
            other => panic!("expected ConnectionDropped, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_size_drops_connection() {
        let (mut client, mut rx, mut server) = connected(RconConfig::default()).await;
        drain(&mut rx);

        server.write_all(&3i32.to_le_bytes()).await.unwrap();
        for _ in 0..100 {
            client.update().await;
            if !client.is_connected() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        let events = drain(&mut rx);
        assert!(matches!(
            &events[..],
            [ClientEvent::ConnectionDropped(ConnectionEvent {
                error: Some(RconError::MalformedPacket { size: 3 }),
                ..
            })]
        ));
    }

    #[tokio::test]
    async fn test_disconnect_notifies_then_close_releases() {
        let (mut client, mut rx, _server) = connected(RconConfig::default()).await;
        drain(&mut rx);

        client.send_packet(command("echo a"));
        client.disconnect();
        let events = drain(&mut rx);
        assert!(matches!(&events[..], [ClientEvent::Disconnected(_)]));
        assert!(client.is_connected());

        client.close();
        assert!(!client.is_connected());
        assert_eq!(client.queued(), 0);

        // pumping a closed client is a no-op
        client.update().await;
        assert!(drain(&mut rx).is_empty());
    }
}
