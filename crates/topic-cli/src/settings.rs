//! Settings file for the CLI.
//! Parsed from `byond-topic.toml`; every section and key is optional.

use byond_topic_client::PollerConfig;
use byond_topic_core::ServerConfig;
use byond_topic_listener::ListenerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub listener: ListenerConfig,
    pub poller: PollerConfig,
}

impl Settings {
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }
}
