//! Query client for BYOND world-topic servers
//!
//! Talks to the game server over short-lived topic connections:
//!
//! - **Queries**: one framed request and one framed reply per connection,
//!   encoded as legacy query strings or modern JSON per the server config
//! - **Status**: typed view over the `status` reply
//! - **Polling**: periodic status updates with linear backoff

pub mod client;
pub mod poller;
pub mod status;

pub use client::{DEFAULT_SOURCE, QueryClient, query};
pub use poller::{HealthPoller, PollerConfig, PollerExit, PollerHandle, StatusSource, TopicSink};
pub use status::{GameState, ServerStatus};
