//! Push listener settings

use crate::event::EventKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat channel identifiers each event kind is routed to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationChannels {
    pub admin: Option<String>,
    pub mentor: Option<String>,
    pub ban: Option<String>,
    pub new_round: Option<String>,
}

impl NotificationChannels {
    /// Channel configured for an event kind
    pub fn for_kind(&self, kind: EventKind) -> Option<&str> {
        let channel = match kind {
            EventKind::RoundStart => &self.new_round,
            EventKind::AdminTicket | EventKind::AdminAnnounce => &self.admin,
            EventKind::MentorAnnounce => &self.mentor,
            EventKind::BanAnnounce => &self.ban,
            EventKind::Unclassified => return None,
        };
        channel.as_deref()
    }
}

/// Where to listen and how to treat inbound pushes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind; keep it private on untrusted networks
    pub bind_host: String,
    /// Port the game server pushes to
    pub port: u16,
    /// Shared secret every push must carry as `key`. Empty rejects all pushes.
    pub comms_key: String,
    /// Cap on the single read per connection
    pub max_read_bytes: usize,
    /// How long to wait for the push after accepting
    pub read_timeout_secs: u64,
    /// Text fired for urgent announcements
    pub urgent_mention: String,
    /// Minimum gap between two urgent mentions
    pub mention_window_secs: u64,
    /// Routing per event kind
    pub channels: NotificationChannels,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".into(),
            port: 8081,
            comms_key: String::new(),
            max_read_bytes: 10_000,
            read_timeout_secs: 30,
            urgent_mention: "@here".into(),
            mention_window_secs: 300,
            channels: NotificationChannels::default(),
        }
    }
}

impl ListenerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn mention_window(&self) -> Duration {
        Duration::from_secs(self.mention_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing() {
        let channels = NotificationChannels {
            admin: Some("admin-chan".into()),
            new_round: Some("rounds".into()),
            ..Default::default()
        };

        assert_eq!(
            channels.for_kind(EventKind::AdminTicket),
            Some("admin-chan")
        );
        assert_eq!(
            channels.for_kind(EventKind::AdminAnnounce),
            Some("admin-chan")
        );
        assert_eq!(channels.for_kind(EventKind::RoundStart), Some("rounds"));
        assert_eq!(channels.for_kind(EventKind::MentorAnnounce), None);
        assert_eq!(channels.for_kind(EventKind::Unclassified), None);
    }
}
