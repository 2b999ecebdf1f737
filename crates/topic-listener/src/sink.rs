//! Notification sinks
//!
//! The listener hands every classified event to a [`NotificationSink`]. How
//! the event is rendered and delivered (chat message, embed, log line) is up
//! to the implementation.

use crate::event::RoundEvent;
use async_trait::async_trait;
use byond_topic_core::{Result, TopicError};
use tokio::sync::mpsc;
use tracing::info;

/// Receiver of classified push events
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one event
    async fn dispatch(&self, event: RoundEvent) -> Result<()>;
}

/// Forwards events into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<RoundEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<RoundEvent>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RoundEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn dispatch(&self, event: RoundEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| TopicError::Sink("event receiver dropped".to_string()))
    }
}

/// Writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn dispatch(&self, event: RoundEvent) -> Result<()> {
        info!(
            kind = ?event.kind,
            channel = event.channel.as_deref().unwrap_or("-"),
            round = event.round_id.as_deref().unwrap_or("-"),
            mention = event.mention.as_deref().unwrap_or("-"),
            "{}",
            event.body
        );
        Ok(())
    }
}
