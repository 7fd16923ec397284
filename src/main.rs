use atlas_rcon::{
    config::{ConnectionInfo, RconConfig},
    event::RconEvent,
    rcon::Rcon,
};
use log::{error, info, warn, Level, Metadata, Record};
use std::error::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{} - {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn report(event: RconEvent) {
    match event {
        RconEvent::ConnectionStarting(e)
        | RconEvent::ConnectionSucceeded(e)
        | RconEvent::Disconnected(e) => info!("{}", e.message),
        RconEvent::ConnectionFailed(e) | RconEvent::ConnectionDropped(e) => match e.error {
            Some(err) => error!("{} ({})", e.message, err),
            None => error!("{}", e.message),
        },
        RconEvent::AuthSucceeded(message) => info!("{}", message),
        RconEvent::AuthFailed(err) => error!("{}", err),
        RconEvent::ConsoleLog(line) => info!("{}", line),
        RconEvent::ChatReceived(chat) => {
            info!("[chat] {}:{}", chat.sender.unwrap_or_default(), chat.message)
        }
        RconEvent::MessageSent(chat) => info!("[chat] sent: {}", chat.message),
        RconEvent::Players(players) => {
            for player in players {
                info!(
                    "  {}. {} ({})",
                    player.player_number, player.name, player.steam_id
                );
            }
        }
        RconEvent::MalformedResponse { opcode, error } => warn!("{:?}: {}", opcode, error),
        RconEvent::PlayerCount(_) | RconEvent::HostnameChanged(_) | RconEvent::PacketReceived(_) => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = log::set_logger(&SimpleLogger).map(|()| log::set_max_level(log::LevelFilter::Info));

    let mut args = std::env::args().skip(1);
    let (Some(hostname), Some(port), Some(password)) = (args.next(), args.next(), args.next())
    else {
        return Err("usage: atlas-rcon <host> <port> <password>".into());
    };
    let port: u16 = port.parse()?;

    let (mut rcon, mut events) = Rcon::new(RconConfig::default());
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            report(event);
        }
    });

    rcon.connect(ConnectionInfo::new(hostname, port, password))
        .await;

    let mut ticker = tokio::time::interval(rcon.config().tick_interval);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select!(
            _ = ticker.tick() => {
                // a stalled peer can hold update() in the middle of a frame
                tokio::select!(
                    _ = rcon.update() => {}
                    _ = signal::ctrl_c() => break,
                );
                // failed, dropped or rejected
                if rcon.connection_info().is_none() {
                    break;
                }
            }
            line = lines.next_line() => match line? {
                Some(line) if !line.trim().is_empty() => {
                    if let Err(e) = rcon.exec(line.trim(), true) {
                        error!("{}", e);
                    }
                }
                Some(_) => {}
                None => break,
            },
            _ = signal::ctrl_c() => break,
        );
    }

    rcon.disconnect();
    drop(rcon);
    let _ = printer.await;

    info!("bye");
    Ok(())
}
