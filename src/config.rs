//! Connection and session configuration.

use std::fmt;
use std::time::Duration;

/// Where to connect and how to authenticate.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub hostname: String,
    pub port: u16,
    pub password: String,
}

impl ConnectionInfo {
    pub fn new(hostname: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            password: password.into(),
        }
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What to do when one line of a player list can't be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlayerListPolicy {
    /// Reject the whole list and report it as malformed.
    #[default]
    FailFast,
    /// Report the bad line and keep the others.
    SkipInvalid,
}

/// Session tuning.
#[derive(Debug, Clone)]
pub struct RconConfig {
    /// Minimum gap between two sends unless a reply arrived in between.
    pub send_cooldown: Duration,
    /// Idle time after which a keepalive packet is queued.
    pub keepalive_interval: Duration,
    /// How often a driving loop should call `update`.
    pub tick_interval: Duration,
    /// Disable Nagle on the socket.
    pub nodelay: bool,
    pub player_list_policy: PlayerListPolicy,
}

impl RconConfig {
    pub const DEFAULT_SEND_COOLDOWN: Duration = Duration::from_millis(800);
    pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(2000);
    pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_send_cooldown(mut self, cooldown: Duration) -> Self {
        self.send_cooldown = cooldown;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn with_player_list_policy(mut self, policy: PlayerListPolicy) -> Self {
        self.player_list_policy = policy;
        self
    }
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            send_cooldown: Self::DEFAULT_SEND_COOLDOWN,
            keepalive_interval: Self::DEFAULT_KEEPALIVE_INTERVAL,
            tick_interval: Self::DEFAULT_TICK_INTERVAL,
            nodelay: true,
            player_list_policy: PlayerListPolicy::FailFast,
        }
    }
}
