//! Error types for the topic protocol

use std::time::Duration;
use thiserror::Error;

/// Result type for topic operations
pub type Result<T> = std::result::Result<T, TopicError>;

/// Topic error types
#[derive(Debug, Error)]
pub enum TopicError {
    /// Peer actively refused the connection
    #[error("Connection refused by {0}")]
    ConnectionRefused(String),

    /// Host name could not be resolved
    #[error("Could not resolve {host}: {reason}")]
    DnsFailure { host: String, reason: String },

    /// Peer did not answer within the configured timeout
    #[error("Timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Any other socket failure (reset, broken pipe, ...)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Reply does not match the configured protocol version
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// Truncated or garbage frame
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Payload does not fit in the 16-bit length field
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Payload cannot be framed as-is
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Inbound push carried a missing or wrong comms key
    #[error("Authentication failed")]
    AuthenticationFailure,

    /// Listener could not acquire its port
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// Rejected configuration value
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Notification sink failed to accept an event
    #[error("Sink error: {0}")]
    Sink(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TopicError {
    /// True when the server should be presumed offline.
    ///
    /// Malformed frames count as connection-level failures: the caller should
    /// treat them exactly like an unreachable server.
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            TopicError::ConnectionRefused(_)
                | TopicError::DnsFailure { .. }
                | TopicError::Timeout(_)
                | TopicError::Connection(_)
                | TopicError::MalformedFrame(_)
        )
    }

    /// True when the configured protocol version is probably wrong.
    pub fn is_protocol_mismatch(&self) -> bool {
        matches!(self, TopicError::ProtocolMismatch(_))
    }

    /// Classify an I/O error raised while talking to `addr` under `limit`.
    pub fn from_io(err: std::io::Error, addr: &str, limit: Duration) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::ConnectionRefused => TopicError::ConnectionRefused(addr.to_string()),
            ErrorKind::TimedOut | ErrorKind::WouldBlock => TopicError::Timeout(limit),
            _ => TopicError::Connection(format!("{}: {}", addr, err)),
        }
    }
}

impl From<serde_json::Error> for TopicError {
    fn from(err: serde_json::Error) -> Self {
        TopicError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_classification() {
        assert!(TopicError::ConnectionRefused("x:1".into()).is_offline());
        assert!(TopicError::Timeout(Duration::from_secs(1)).is_offline());
        assert!(TopicError::MalformedFrame("short".into()).is_offline());
        assert!(!TopicError::ProtocolMismatch("no data".into()).is_offline());
        assert!(TopicError::ProtocolMismatch("no data".into()).is_protocol_mismatch());
    }

    #[test]
    fn test_from_io_refused() {
        let err = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        match TopicError::from_io(err, "127.0.0.1:1337", Duration::from_secs(30)) {
            TopicError::ConnectionRefused(addr) => assert_eq!(addr, "127.0.0.1:1337"),
            other => panic!("Wrong error: {:?}", other),
        }
    }

    #[test]
    fn test_timeout_display() {
        let err = TopicError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Timed out after 30s");
    }
}
