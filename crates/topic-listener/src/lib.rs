//! Push listener for BYOND world-topic notifications
//!
//! This crate provides:
//! - A TCP listener accepting one push per connection
//! - Shared-key authentication and classification into round events
//! - Rate limiting of urgent mentions
//! - The sink trait events are delivered through

pub mod config;
pub mod event;
pub mod listener;
pub mod sink;
pub mod spam;

pub use config::{ListenerConfig, NotificationChannels};
pub use event::{EventKind, RoundEvent, Ticket, classify};
pub use listener::{ConnectionOutcome, EventListener, ListenerHandle};
pub use sink::{ChannelSink, LogSink, NotificationSink};
pub use spam::SpamGuard;
