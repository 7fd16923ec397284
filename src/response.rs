//! Parsers for the text bodies the server sends back.

use crate::config::PlayerListPolicy;
use crate::error::RconError;

/// Placeholder the server sends when a command produced no output.
pub const NO_RESPONSE: &str = "Server received, But no response!!";
/// What [NO_RESPONSE] is shown as on the console.
pub const COMMAND_EXECUTED: &str = "Command Executed Successfully!";
pub const NO_PLAYERS: &str = "No Players Connected";

const SERVER_PREFIX: &str = "SERVER: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub steam_id: u64,
    pub player_number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// `None` for messages sent by this session.
    pub sender: Option<String>,
    pub message: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLine {
    /// The server echoing our own last `say`.
    Sent(ChatMessage),
    Received(ChatMessage),
}

#[derive(Debug, Default)]
pub struct PlayerList {
    pub players: Vec<Player>,
    /// Lines dropped under [PlayerListPolicy::SkipInvalid].
    pub skipped: Vec<RconError>,
}

pub fn is_no_response(body: &str) -> bool {
    body.trim() == NO_RESPONSE
}

pub fn is_no_players(body: &str) -> bool {
    body.trim() == NO_PLAYERS
}

/// Console text for a generic response, with the no-output placeholder
/// rewritten.
pub fn console_line(body: &str) -> &str {
    if is_no_response(body) {
        COMMAND_EXECUTED
    } else {
        body
    }
}

/// Splits a `getchat` body into lines. Blank lines are dropped; every other
/// line yields either a chat line or the reason it couldn't be read.
pub fn parse_chat(
    body: &str,
    last_admin_message: Option<&str>,
) -> Vec<Result<ChatLine, RconError>> {
    body.split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_chat_line(line, last_admin_message))
        .collect()
}

fn parse_chat_line(line: &str, last_admin_message: Option<&str>) -> Result<ChatLine, RconError> {
    if let (Some(sent), Some(last)) = (line.strip_prefix(SERVER_PREFIX), last_admin_message) {
        if sent == last {
            return Ok(ChatLine::Sent(ChatMessage {
                sender: None,
                message: sent.to_string(),
                is_admin: true,
            }));
        }
    }

    let (sender, message) = line.split_once(':').ok_or_else(|| {
        RconError::MalformedResponse(format!("chat line has no sender: {:?}", line))
    })?;

    Ok(ChatLine::Received(ChatMessage {
        sender: Some(sender.to_string()),
        message: message.to_string(),
        is_admin: false,
    }))
}

/// Parses a `listplayers` body of `<number>. <name>, <steam id>` lines.
pub fn parse_players(body: &str, policy: PlayerListPolicy) -> Result<PlayerList, RconError> {
    let mut list = PlayerList::default();
    if is_no_players(body) {
        return Ok(list);
    }

    for line in body.split('\n').filter(|line| !line.trim().is_empty()) {
        match parse_player_line(line) {
            Ok(player) => list.players.push(player),
            Err(e) => match policy {
                PlayerListPolicy::FailFast => return Err(e),
                PlayerListPolicy::SkipInvalid => list.skipped.push(e),
            },
        }
    }

    Ok(list)
}

pub fn parse_player_line(line: &str) -> Result<Player, RconError> {
    let malformed =
        |reason: &str| RconError::MalformedResponse(format!("{} in player line {:?}", reason, line));

    let cleaned = line.replace("...", "");
    let (number, rest) = cleaned
        .split_once('.')
        .ok_or_else(|| malformed("missing '.'"))?;
    let (name, steam_id) = rest.split_once(',').ok_or_else(|| malformed("missing ','"))?;

    let player_number = number
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| malformed("bad player number"))?;
    let steam_id = steam_id
        .trim()
        .parse::<u64>()
        .map_err(|_| malformed("bad steam id"))?;

    Ok(Player {
        name: name.trim().to_string(),
        steam_id,
        player_number,
    })
}
