//! Wire format for Atlas rcon packets.
//!
//! ```text
//! +--------+--------+-------------+----------------+------+
//! | size   | opcode | packet type | data           | 0x00 |
//! | 4 bytes| 4 bytes| 4 bytes     | size - 9 bytes | 1    |
//! +--------+--------+-------------+----------------+------+
//! ```
//!
//! All integers are little-endian. `size` counts everything after itself.
//! Text data carries its own NUL terminator, so a text packet ends in two
//! zero bytes.

use crate::error::RconError;
use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Semantic kind of a command or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Opcode {
    AuthFailed = -1,
    ServerResponse = 0,
    Generic = 1,
    Auth = 2,
    Keepalive = 3,
    GetPlayers = 4,
    KickPlayer = 5,
    BanPlayer = 6,
    ScheduledTask = 7,
    ChatMessage = 8,
    Whitelist = 9,
    UnWhitelist = 10,
}

impl Opcode {
    pub fn value(self) -> i32 {
        self as i32
    }

    pub fn from_value(value: i32) -> Option<Self> {
        let opcode = match value {
            -1 => Opcode::AuthFailed,
            0 => Opcode::ServerResponse,
            1 => Opcode::Generic,
            2 => Opcode::Auth,
            3 => Opcode::Keepalive,
            4 => Opcode::GetPlayers,
            5 => Opcode::KickPlayer,
            6 => Opcode::BanPlayer,
            7 => Opcode::ScheduledTask,
            8 => Opcode::ChatMessage,
            9 => Opcode::Whitelist,
            10 => Opcode::UnWhitelist,
            _ => return None,
        };
        Some(opcode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    // SERVERDATA_RESPONSE_VALUE
    ResponseValue,
    // SERVERDATA_EXECCOMMAND
    ExecCommand,
    // SERVERDATA_AUTH_RESPONSE
    AuthResponse,
    // SERVERDATA_AUTH
    Auth,
    // unsolicited console output pushed by the server
    Server,
}

impl PacketType {
    /// ExecCommand and AuthResponse share 2 on the wire; the opcode tells
    /// them apart.
    pub fn value(self) -> i32 {
        match self {
            PacketType::ResponseValue => 0,
            PacketType::ExecCommand => 2,
            PacketType::AuthResponse => 2,
            PacketType::Auth => 3,
            PacketType::Server => 4,
        }
    }

    /// Inbound view of a wire value: a 2 from the server is an auth response.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(PacketType::ResponseValue),
            2 => Some(PacketType::AuthResponse),
            3 => Some(PacketType::Auth),
            4 => Some(PacketType::Server),
            _ => None,
        }
    }
}

/// One length-prefixed unit on the wire. The opcode and packet type are kept
/// as raw wire values so that unknown or colliding values survive a
/// round-trip; use [Packet::opcode] and [Packet::packet_type] for the typed
/// view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    opcode: i32,
    packet_type: i32,
    data: Vec<u8>,
}

impl Packet {
    /// Opcode + packet type + trailing terminator.
    pub const BASE_PACKET_SIZE: i32 = 9;
    /// Anything larger is treated as a corrupt size header.
    pub const MAX_PACKET_SIZE: i32 = 4 * 1024 * 1024;

    pub fn new(opcode: Opcode, packet_type: PacketType, data: Vec<u8>) -> Self {
        Self::from_raw(opcode.value(), packet_type.value(), data)
    }

    pub fn from_raw(opcode: i32, packet_type: i32, data: Vec<u8>) -> Self {
        Packet {
            opcode,
            packet_type,
            data,
        }
    }

    /// Text packet: one byte per character plus an embedded NUL.
    pub fn text(opcode: Opcode, packet_type: PacketType, body: &str) -> Self {
        let mut data = encode_latin1(body);
        data.push(0);
        Self::new(opcode, packet_type, data)
    }

    pub fn keepalive() -> Self {
        Self::text(Opcode::Keepalive, PacketType::ResponseValue, "")
    }

    /// Value of the size header. Saturates at `i32::MAX`; [Packet::pack]
    /// refuses anything above [Packet::MAX_PACKET_SIZE].
    pub fn size(&self) -> i32 {
        i32::try_from(self.data.len())
            .map_or(i32::MAX, |len| len.saturating_add(Self::BASE_PACKET_SIZE))
    }

    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_value(self.opcode)
    }

    pub fn raw_opcode(&self) -> i32 {
        self.opcode
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_value(self.packet_type)
    }

    pub fn raw_packet_type(&self) -> i32 {
        self.packet_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Data as text, dropping the embedded terminator (exactly one byte).
    pub fn body(&self) -> String {
        match self.data.split_last() {
            Some((_, text)) => decode_latin1(text),
            None => String::new(),
        }
    }

    pub fn pack(&self) -> Result<Vec<u8>, RconError> {
        let size = self.size();
        if size > Self::MAX_PACKET_SIZE {
            return Err(RconError::PacketTooLarge {
                len: self.data.len(),
            });
        }

        // Size, Opcode, Type, Data, Terminator
        let mut payload = Vec::<u8>::with_capacity(4 + size as usize);
        payload.extend_from_slice(&size.to_le_bytes());
        payload.extend_from_slice(&self.opcode.to_le_bytes());
        payload.extend_from_slice(&self.packet_type.to_le_bytes());
        payload.extend_from_slice(&self.data);
        payload.push(0);
        Ok(payload)
    }

    /// Decodes one complete packet held in memory. Trailing bytes after the
    /// packet are ignored.
    pub fn unpack(incoming: &[u8]) -> Result<Self, RconError> {
        let header: [u8; 4] = incoming
            .get(..4)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(RconError::ConnectionLost)?;
        let len = Self::body_len(i32::from_le_bytes(header))?;
        let body = incoming.get(4..4 + len).ok_or(RconError::ConnectionLost)?;
        Ok(Self::from_body(body))
    }

    /// Reads exactly one packet. Short reads are retried until the size
    /// header is satisfied; a read of zero bytes before that means the peer
    /// went away.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, RconError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 4];
        read_full(reader, &mut header).await?;
        let size = i32::from_le_bytes(header);
        let len = Self::body_len(size)?;

        let mut body = vec![0u8; len];
        read_full(reader, &mut body).await?;
        trace!("read packet of size {}", size);

        Ok(Self::from_body(&body))
    }

    fn body_len(size: i32) -> Result<usize, RconError> {
        if size == 0 {
            return Ok(0);
        }
        if !(Self::BASE_PACKET_SIZE..=Self::MAX_PACKET_SIZE).contains(&size) {
            return Err(RconError::MalformedPacket { size });
        }
        Ok(size as usize)
    }

    // `body` is either empty or at least BASE_PACKET_SIZE bytes long.
    fn from_body(body: &[u8]) -> Self {
        if body.is_empty() {
            return Self::from_raw(0, 0, Vec::new());
        }
        let opcode = i32::from_le_bytes([body[0], body[1], body[2], body[3]]);
        let packet_type = i32::from_le_bytes([body[4], body[5], body[6], body[7]]);
        // the last byte is the packet terminator, not data
        let data = body[8..body.len() - 1].to_vec();
        Self::from_raw(opcode, packet_type, data)
    }
}

async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), RconError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader
            .read(&mut buf[filled..])
            .await
            .map_err(RconError::ReceiveError)?;
        if read == 0 {
            return Err(RconError::ConnectionLost);
        }
        filled += read;
    }
    Ok(())
}

fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(c).unwrap_or(b'?'))
        .collect()
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
