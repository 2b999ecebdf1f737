//! Typed view over a `status` topic reply

use byond_topic_core::TopicResponse;

/// Round lifecycle as reported by the `gamestate` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Startup,
    Lobby,
    SettingUp,
    Playing,
    Finished,
}

impl GameState {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(GameState::Startup),
            1 => Some(GameState::Lobby),
            2 => Some(GameState::SettingUp),
            3 => Some(GameState::Playing),
            4 => Some(GameState::Finished),
            _ => None,
        }
    }
}

/// Server status summary.
///
/// Every field is optional: server builds differ in what they report, and a
/// field that is missing or unparsable is left empty rather than failing the
/// whole reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerStatus {
    pub version: Option<String>,
    pub mode: Option<String>,
    pub round_id: Option<String>,
    pub players: Option<u32>,
    pub admins: Option<u32>,
    pub map_name: Option<String>,
    /// Seconds since the round started
    pub round_duration: Option<u64>,
    pub game_state: Option<GameState>,
    pub security_level: Option<String>,
    pub shuttle_mode: Option<String>,
    /// Seconds until the shuttle arrives or departs
    pub shuttle_timer: Option<u64>,
    pub popcap: Option<u32>,
}

impl ServerStatus {
    /// Pick the known fields out of a reply
    pub fn from_response(response: &TopicResponse) -> Self {
        let text = |key: &str| {
            response
                .get(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            version: text("version"),
            mode: text("mode"),
            round_id: text("round_id"),
            players: response.get_parsed("players"),
            admins: response.get_parsed("admins"),
            map_name: text("map_name"),
            round_duration: response.get_parsed("round_duration"),
            game_state: response
                .get_parsed::<u8>("gamestate")
                .and_then(GameState::from_code),
            security_level: text("security_level"),
            shuttle_mode: text("shuttle_mode"),
            shuttle_timer: response.get_parsed("shuttle_timer"),
            popcap: response.get_parsed("popcap"),
        }
    }

    /// Compact one-line summary suitable for a channel topic
    pub fn topic_line(&self) -> String {
        let mut parts = Vec::new();

        if let Some(players) = self.players {
            match self.popcap.filter(|cap| *cap > 0) {
                Some(cap) => parts.push(format!("Players: {}/{}", players, cap)),
                None => parts.push(format!("Players: {}", players)),
            }
        }
        if let Some(admins) = self.admins {
            parts.push(format!("Admins: {}", admins));
        }
        if let Some(map) = &self.map_name {
            parts.push(format!("Map: {}", map));
        }
        if let Some(round) = &self.round_id {
            parts.push(format!("Round #{}", round));
        }
        if let Some(secs) = self.round_duration {
            parts.push(format!("Duration {}", format_duration(secs)));
        }

        if parts.is_empty() {
            "Server online".to_string()
        } else {
            parts.join(" | ")
        }
    }
}

/// `HH:MM` from a second count
fn format_duration(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byond_topic_core::parse_query_string;

    #[test]
    fn test_from_legacy_reply() {
        let response = parse_query_string(
            "version=/tg/+Station+13&mode=secret&round_id=1234&players=42&admins=3\
             &map_name=MetaStation&round_duration=4980&gamestate=3&popcap=80",
        );
        let status = ServerStatus::from_response(&response);

        assert_eq!(status.version.as_deref(), Some("/tg/ Station 13"));
        assert_eq!(status.players, Some(42));
        assert_eq!(status.admins, Some(3));
        assert_eq!(status.round_duration, Some(4980));
        assert_eq!(status.game_state, Some(GameState::Playing));
        assert_eq!(
            status.topic_line(),
            "Players: 42/80 | Admins: 3 | Map: MetaStation | Round #1234 | Duration 01:23"
        );
    }

    #[test]
    fn test_bad_fields_are_skipped() {
        let response = parse_query_string("players=lots&map_name=&gamestate=9");
        let status = ServerStatus::from_response(&response);

        assert_eq!(status.players, None);
        assert_eq!(status.map_name, None);
        assert_eq!(status.game_state, None);
        assert_eq!(status.topic_line(), "Server online");
    }
}
