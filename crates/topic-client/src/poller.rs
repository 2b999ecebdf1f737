//! Periodic status poller
//!
//! Polls `status` on a timer and pushes a compact status line to a topic
//! sink. Failures stretch the interval linearly; after too many in a row the
//! poller reports a fatal warning and stops until restarted.

use crate::client::QueryClient;
use crate::status::ServerStatus;
use async_trait::async_trait;
use byond_topic_core::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Anything that can produce a server status
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self) -> Result<ServerStatus>;
}

#[async_trait]
impl StatusSource for QueryClient {
    async fn fetch_status(&self) -> Result<ServerStatus> {
        self.status().await
    }
}

/// Receives status lines, typically a chat channel topic
#[async_trait]
pub trait TopicSink: Send + Sync {
    /// Replace the displayed status line
    async fn update_topic(&self, line: String) -> Result<()>;

    /// The poller gave up and stopped
    async fn report_fatal(&self, message: String);
}

/// Poll timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Interval while the server answers
    pub interval_secs: u64,
    /// Added to the interval for each consecutive failure
    pub backoff_step_secs: u64,
    /// Consecutive failures before the poller disables itself
    pub max_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            backoff_step_secs: 300,
            max_failures: 10,
        }
    }
}

impl PollerConfig {
    /// Wait before the next poll after `failures` consecutive failures
    pub fn next_interval(&self, failures: u32) -> Duration {
        let step = self.backoff_step_secs.saturating_mul(u64::from(failures));
        Duration::from_secs(self.interval_secs.saturating_add(step))
    }
}

/// Why the poller stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerExit {
    /// Stopped through its handle
    Stopped,
    /// Gave up after too many consecutive failures
    Disabled { failures: u32, last_error: String },
    /// The poll task panicked or was aborted
    Crashed(String),
}

/// Status poller driving a topic sink
pub struct HealthPoller<S: StatusSource, T: TopicSink> {
    source: Arc<S>,
    sink: Arc<T>,
    config: PollerConfig,
}

impl<S: StatusSource + 'static, T: TopicSink + 'static> HealthPoller<S, T> {
    pub fn new(source: Arc<S>, sink: Arc<T>, config: PollerConfig) -> Self {
        Self {
            source,
            sink,
            config,
        }
    }

    /// Start polling in the background
    pub fn spawn(self) -> PollerHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(stop_rx));
        PollerHandle {
            stop: Some(stop_tx),
            task,
        }
    }

    async fn run(self, mut stop: oneshot::Receiver<()>) -> PollerExit {
        info!(
            "Status poller started (every {}s)",
            self.config.interval_secs
        );
        let mut failures: u32 = 0;

        loop {
            let result = tokio::select! {
                result = self.source.fetch_status() => result,
                _ = &mut stop => break,
            };

            match result {
                Ok(status) => {
                    failures = 0;
                    let line = status.topic_line();
                    debug!("Status line: {}", line);
                    if let Err(e) = self.sink.update_topic(line).await {
                        warn!("Failed to update topic: {}", e);
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "Status poll failed ({}/{}): {}",
                        failures, self.config.max_failures, e
                    );

                    if failures >= self.config.max_failures {
                        let message = format!(
                            "Status polling disabled after {} consecutive failures: {}",
                            failures, e
                        );
                        error!("{}", message);
                        self.sink.report_fatal(message).await;
                        return PollerExit::Disabled {
                            failures,
                            last_error: e.to_string(),
                        };
                    }
                }
            }

            let wait = self.config.next_interval(failures);
            tokio::select! {
                _ = sleep(wait) => {}
                _ = &mut stop => break,
            }
        }

        info!("Status poller stopped");
        PollerExit::Stopped
    }
}

/// Owned handle to a running poller.
///
/// Dropping the handle stops the poller at its next wait.
pub struct PollerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<PollerExit>,
}

impl PollerHandle {
    /// Whether the poller has exited on its own
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop polling and wait for the task to exit
    pub async fn stop(mut self) -> PollerExit {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.join().await
    }

    /// Wait for the poller to exit on its own, keeping the handle.
    ///
    /// Call at most once; use `stop` or `join` afterwards only if this was
    /// cancelled before completing.
    pub async fn wait(&mut self) -> PollerExit {
        exit_of((&mut self.task).await)
    }

    /// Wait for the poller to exit on its own
    pub async fn join(self) -> PollerExit {
        // Keep the stop sender alive so the poller is not cancelled
        let _stop = self.stop;
        exit_of(self.task.await)
    }
}

fn exit_of(result: std::result::Result<PollerExit, JoinError>) -> PollerExit {
    result.unwrap_or_else(|e| {
        error!("Status poller task failed: {}", e);
        PollerExit::Crashed(e.to_string())
    })
}
