//! Game server connection settings

use crate::error::{Result, TopicError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which payload encoding the server build expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVersion {
    /// URL query strings (`?key=..&status`)
    #[default]
    Legacy,
    /// JSON envelope (`{"auth":..,"query":..}`)
    Modern,
}

impl ProtocolVersion {
    /// The other encoding, for "toggle legacy topics" style admin commands
    pub fn toggled(self) -> Self {
        match self {
            ProtocolVersion::Legacy => ProtocolVersion::Modern,
            ProtocolVersion::Modern => ProtocolVersion::Legacy,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Legacy => f.write_str("legacy"),
            ProtocolVersion::Modern => f.write_str("modern"),
        }
    }
}

/// Where and how to reach the game server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP or DNS name of the game server
    pub host: String,
    /// World topic port
    pub port: u16,
    /// Shared secret for authenticated queries
    pub comms_key: String,
    /// Bound on connect, send and receive, in seconds
    pub timeout_secs: u64,
    /// Payload encoding the server expects
    pub protocol: ProtocolVersion,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1337,
            comms_key: String::new(),
            // BYOND is slow to answer while the world is busy
            timeout_secs: 30,
            protocol: ProtocolVersion::Legacy,
        }
    }
}

impl ServerConfig {
    /// Lowest port an admin may configure; everything below is reserved
    pub const MIN_PORT: u16 = 1024;

    /// Create config for a host and port, defaults elsewhere
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// `host:port` as passed to the resolver
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Response timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject values the admin commands would refuse
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(TopicError::InvalidConfig("host is empty".to_string()));
        }
        if self.port < Self::MIN_PORT {
            return Err(TopicError::InvalidConfig(format!(
                "{} is not a valid port (expected {}-65535)",
                self.port,
                Self::MIN_PORT
            )));
        }
        if self.timeout_secs == 0 {
            return Err(TopicError::InvalidConfig(
                "timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}
