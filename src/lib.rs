//! Async client for the Atlas flavour of the [Source RCON protocol](https://developer.valvesoftware.com/wiki/Source_RCON_Protocol).
//!
//! [client::Client] moves packets over one TCP connection, pacing writes and
//! sending keepalives. [rcon::Rcon] sits on top of it, authenticates,
//! routes responses by packet type and opcode and reports what it learns as
//! [event::RconEvent]s.
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod keepalive;
pub mod packet;
pub mod rcon;
pub mod response;
