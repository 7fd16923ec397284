//! Session layer: authentication, commands and response handling on top of
//! [Client].

use crate::{
    client::Client,
    config::{ConnectionInfo, RconConfig},
    error::RconError,
    event::{ClientEvent, ConnectionEvent, RconEvent},
    packet::{Opcode, Packet, PacketType},
    response::{self, ChatLine},
};
use log::{debug, trace, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// State that lives for one connection attempt.
#[derive(Debug, Default)]
struct Session {
    info: Option<ConnectionInfo>,
    last_sent_admin_message: Option<String>,
    got_chat_response: bool,
}

/// An rcon session with one server at a time.
///
/// Drive it by calling [Rcon::update] every [RconConfig::tick_interval];
/// everything it learns is delivered as [RconEvent]s on the receiver
/// returned by [Rcon::new], in the order it happened.
///
/// ## Example
/// ```no_run
/// use atlas_rcon::{config::{ConnectionInfo, RconConfig}, event::RconEvent, rcon::Rcon};
///
/// #[tokio::main]
/// async fn main() {
///     let (mut rcon, mut events) = Rcon::new(RconConfig::default());
///     rcon.connect(ConnectionInfo::new("127.0.0.1", 27020, "<password>")).await;
///
///     loop {
///         rcon.update().await;
///         while let Ok(event) = events.try_recv() {
///             if let RconEvent::Players(players) = event {
///                 println!("{} players online", players.len());
///             }
///         }
///         tokio::time::sleep(rcon.config().tick_interval).await;
///     }
/// }
/// ```
pub struct Rcon {
    config: RconConfig,
    client: Option<Client>,
    client_events_tx: UnboundedSender<ClientEvent>,
    client_events: UnboundedReceiver<ClientEvent>,
    events: UnboundedSender<RconEvent>,
    session: Session,
}

impl Rcon {
    pub fn new(config: RconConfig) -> (Self, UnboundedReceiver<RconEvent>) {
        let (client_events_tx, client_events) = mpsc::unbounded_channel();
        let (events, receiver) = mpsc::unbounded_channel();
        let rcon = Rcon {
            config,
            client: None,
            client_events_tx,
            client_events,
            events,
            session: Session::default(),
        };
        (rcon, receiver)
    }

    pub fn config(&self) -> &RconConfig {
        &self.config
    }

    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.session.info.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(Client::is_connected)
    }

    /// Whether a chat response arrived since the last [Rcon::get_chat].
    pub fn got_chat_response(&self) -> bool {
        self.session.got_chat_response
    }

    /// Connects and, once the stream is up, queues the auth packet. Any
    /// existing session is disconnected first.
    pub async fn connect(&mut self, info: ConnectionInfo) -> bool {
        self.disconnect();

        let hostname = info.hostname.clone();
        let port = info.port;
        self.session.info = Some(info);

        let client = self.client.insert(Client::new(
            self.config.clone(),
            self.client_events_tx.clone(),
        ));
        let connected = client.connect(&hostname, port).await;
        self.dispatch_client_events();
        connected
    }

    pub fn disconnect(&mut self) {
        if let Some(client) = self.client.as_mut().filter(|c| c.is_connected()) {
            client.disconnect();
            self.dispatch_client_events();
        }
    }

    /// One tick: pumps the transport and handles whatever it produced.
    pub async fn update(&mut self) {
        if let Some(client) = self.client.as_mut() {
            client.update().await;
        }
        self.dispatch_client_events();
    }

    // Commands

    /// Queues `command` under `opcode`; the response is routed by the same
    /// opcode.
    pub fn exec_command(&mut self, opcode: Opcode, command: &str) -> Result<(), RconError> {
        let client = self
            .client
            .as_mut()
            .filter(|c| c.is_connected())
            .ok_or(RconError::NotConnected)?;
        client.send_packet(Packet::text(opcode, PacketType::ExecCommand, command));
        Ok(())
    }

    /// Generic console command, optionally echoed to the console log.
    pub fn exec(&mut self, command: &str, write_to_console: bool) -> Result<(), RconError> {
        self.exec_command(Opcode::Generic, command)?;
        if write_to_console {
            self.emit(RconEvent::ConsoleLog(format!("> {}", command)));
        }
        Ok(())
    }

    /// Sends `message` and logs it, attributed to `nickname` if given.
    pub fn console_command(&mut self, message: &str, nickname: Option<&str>) -> Result<(), RconError> {
        self.exec_command(Opcode::Generic, message)?;
        self.emit(RconEvent::ConsoleLog(attributed(message, nickname)));
        Ok(())
    }

    pub fn echo(&mut self, message: &str) -> Result<(), RconError> {
        self.exec(&format!("echo {}", message), false)
    }

    pub fn execute_scheduled_task(&mut self, name: &str, command: &str) -> Result<(), RconError> {
        self.exec_command(Opcode::ScheduledTask, command)?;
        self.emit(RconEvent::ConsoleLog(format!("EXECUTED SCHEDULED TASK: {}", name)));
        self.emit(RconEvent::ConsoleLog(format!("TASK COMMAND: {}", command)));
        Ok(())
    }

    /// Broadcasts a chat message. The server echoes it back on the next
    /// `getchat`, which is reported as [RconEvent::MessageSent].
    pub fn say(&mut self, message: &str, nickname: Option<&str>) -> Result<(), RconError> {
        let formatted = attributed(message, nickname);
        self.exec_command(Opcode::ChatMessage, &format!("serverchat {}", formatted))?;
        self.session.last_sent_admin_message = Some(formatted);
        Ok(())
    }

    pub fn send_private_message(&mut self, message: &str, steam_id: u64) -> Result<(), RconError> {
        self.exec_command(
            Opcode::ChatMessage,
            &format!("serverchatto \"{}\" PM From Admin: {}", steam_id, message),
        )
    }

    pub fn get_chat(&mut self) -> Result<(), RconError> {
        self.exec_command(Opcode::ChatMessage, "getchat")?;
        self.session.got_chat_response = false;
        Ok(())
    }

    pub fn get_players(&mut self) -> Result<(), RconError> {
        self.exec_command(Opcode::GetPlayers, "listplayers")
    }

    pub fn kick_player(&mut self, steam_id: u64) -> Result<(), RconError> {
        self.exec_command(Opcode::KickPlayer, &format!("kickplayer {}", steam_id))
    }

    pub fn ban_player(&mut self, steam_id: u64) -> Result<(), RconError> {
        self.exec_command(Opcode::BanPlayer, &format!("banplayer {}", steam_id))
    }

    pub fn whitelist_player(&mut self, steam_id: u64) -> Result<(), RconError> {
        self.exec_command(
            Opcode::Whitelist,
            &format!("AllowPlayerToJoinNoCheck {}", steam_id),
        )
    }

    pub fn unwhitelist_player(&mut self, steam_id: u64) -> Result<(), RconError> {
        self.exec_command(
            Opcode::UnWhitelist,
            &format!("DisallowPlayerToJoinNoCheck {}", steam_id),
        )
    }

    fn request_auth(&mut self) {
        let Some(password) = self.session.info.as_ref().map(|info| info.password.clone()) else {
            return;
        };
        if let Some(client) = self.client.as_mut() {
            trace!("queueing auth packet");
            client.send_packet(Packet::text(Opcode::Auth, PacketType::Auth, &password));
        }
    }

    // Transport events

    fn dispatch_client_events(&mut self) {
        while let Ok(event) = self.client_events.try_recv() {
            self.on_client_event(event);
        }
    }

    fn on_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::ConnectionStarting(e) => {
                let e = self.with_info(e);
                self.emit(RconEvent::ConnectionStarting(e));
            }
            ClientEvent::ConnectionSucceeded(e) => {
                let e = self.with_info(e);
                let hostname = e.info.as_ref().map(|info| info.hostname.clone());
                self.emit(RconEvent::ConnectionSucceeded(e));
                if let Some(hostname) = hostname {
                    self.emit(RconEvent::HostnameChanged(hostname));
                }
                self.request_auth();
            }
            ClientEvent::ConnectionFailed(e) => {
                let e = self.with_info(e);
                self.purge();
                self.emit(RconEvent::ConnectionFailed(e));
            }
            ClientEvent::ConnectionDropped(e) => {
                let e = self.with_info(e);
                self.purge();
                self.emit(RconEvent::ConnectionDropped(e));
            }
            ClientEvent::Disconnected(e) => {
                let e = self.with_info(e);
                self.purge();
                self.emit(RconEvent::Disconnected(e));
            }
            ClientEvent::PacketReceived(packet) => self.on_packet(packet),
        }
    }

    fn with_info(&self, mut event: ConnectionEvent) -> ConnectionEvent {
        event.info = self.session.info.clone();
        event
    }

    /// Forgets the session and releases the transport.
    fn purge(&mut self) {
        debug!("clearing session");
        self.session = Session::default();
        if let Some(mut client) = self.client.take() {
            client.close();
        }
        self.emit(RconEvent::HostnameChanged(String::new()));
        self.emit(RconEvent::PlayerCount(0));
    }

    // Packet handlers

    fn on_packet(&mut self, packet: Packet) {
        debug!(
            "received {:?},{:?}",
            packet.packet_type(),
            packet.opcode()
        );
        self.emit(RconEvent::PacketReceived(packet.clone()));

        let (Some(packet_type), Some(opcode)) = (packet.packet_type(), packet.opcode()) else {
            trace!(
                "ignoring packet with unknown type {} / opcode {}",
                packet.raw_packet_type(),
                packet.raw_opcode()
            );
            return;
        };

        match (packet_type, opcode) {
            (PacketType::Server, Opcode::ServerResponse)
            | (PacketType::ResponseValue, Opcode::Generic) => self.on_console_log(&packet),
            (PacketType::ResponseValue, Opcode::GetPlayers) => self.on_get_players(&packet),
            (PacketType::ResponseValue, Opcode::ChatMessage) => self.on_chat_message(&packet),
            (PacketType::ResponseValue, Opcode::KickPlayer) => {
                self.on_confirmation(&packet, "KICK PLAYER COMMAND EXECUTED", true)
            }
            (PacketType::ResponseValue, Opcode::BanPlayer) => {
                self.on_confirmation(&packet, "BAN PLAYER COMMAND EXECUTED", true)
            }
            (PacketType::ResponseValue, Opcode::Whitelist) => {
                self.on_confirmation(&packet, "PLAYER ADDED TO WHITELIST COMMAND EXECUTED", false)
            }
            (PacketType::ResponseValue, Opcode::UnWhitelist) => self.on_confirmation(
                &packet,
                "REMOVE PLAYER FROM WHITELIST COMMAND EXECUTED",
                false,
            ),
            (PacketType::ResponseValue, Opcode::ScheduledTask) => {
                self.emit(RconEvent::ConsoleLog(format!(
                    "TASK SERVER RESPONSE: {}",
                    packet.body()
                )));
            }
            (PacketType::ResponseValue, Opcode::Keepalive) => trace!("keepalive"),
            (PacketType::AuthResponse, Opcode::Auth) => self.on_auth_success(),
            (PacketType::AuthResponse, Opcode::AuthFailed) => self.on_auth_failed(),
            (packet_type, opcode) => trace!("no handler for {:?},{:?}", packet_type, opcode),
        }
    }

    fn on_auth_success(&mut self) {
        debug!("authenticated");
        self.emit(RconEvent::AuthSucceeded("Successfully authenticated.".to_string()));
        if let Err(e) = self.get_players() {
            debug!("could not request player list: {}", e);
        }
    }

    fn on_auth_failed(&mut self) {
        warn!("server rejected the rcon password");
        self.emit(RconEvent::AuthFailed(RconError::AuthenticationError));
        self.disconnect();
    }

    fn on_console_log(&mut self, packet: &Packet) {
        let body = packet.body();
        self.emit(RconEvent::ConsoleLog(format!(
            "SERVER CONSOLE: {}",
            response::console_line(&body)
        )));
    }

    fn on_chat_message(&mut self, packet: &Packet) {
        self.session.got_chat_response = true;

        let body = packet.body();
        if response::is_no_response(&body) {
            return;
        }

        let lines =
            response::parse_chat(&body, self.session.last_sent_admin_message.as_deref());
        for line in lines {
            match line {
                Ok(ChatLine::Sent(message)) => self.emit(RconEvent::MessageSent(message)),
                Ok(ChatLine::Received(message)) => self.emit(RconEvent::ChatReceived(message)),
                Err(e) => self.report_malformed(Opcode::ChatMessage, e),
            }
        }
    }

    fn on_confirmation(&mut self, packet: &Packet, label: &str, refresh_players: bool) {
        let body = packet.body();
        // the real answer follows later
        if response::is_no_response(&body) {
            return;
        }

        self.emit(RconEvent::ConsoleLog(format!("{}: {}", label, body)));
        if refresh_players {
            if let Err(e) = self.get_players() {
                debug!("could not refresh player list: {}", e);
            }
        }
    }

    fn on_get_players(&mut self, packet: &Packet) {
        let body = packet.body();
        let list = match response::parse_players(&body, self.config.player_list_policy) {
            Ok(list) => list,
            Err(e) => return self.report_malformed(Opcode::GetPlayers, e),
        };

        for e in list.skipped {
            self.report_malformed(Opcode::GetPlayers, e);
        }

        let status = if response::is_no_players(&body) {
            "Server Response: No Players Connected"
        } else {
            "Server Response: Player List Updated"
        };
        self.emit(RconEvent::PlayerCount(list.players.len()));
        self.emit(RconEvent::Players(list.players));
        self.emit(RconEvent::ConsoleLog(status.to_string()));
    }

    fn report_malformed(&mut self, opcode: Opcode, error: RconError) {
        warn!("malformed {:?} response: {}", opcode, error);
        self.emit(RconEvent::MalformedResponse { opcode, error });
    }

    fn emit(&self, event: RconEvent) {
        let _ = self.events.send(event);
    }
}

fn attributed(message: &str, nickname: Option<&str>) -> String {
    match nickname {
        Some(nickname) => format!("({}): {}", nickname, message),
        None => message.to_string(),
    }
}
