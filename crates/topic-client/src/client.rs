//! World-topic query client
//!
//! Every query is one short-lived TCP connection: connect, send one frame,
//! read one frame, close. BYOND answers slowly and rarely, so there is no
//! pooling and no retry; each socket operation is bounded by the configured
//! timeout.

use crate::status::ServerStatus;
use byond_topic_core::frame;
use byond_topic_core::{Result, ServerConfig, TopicError, TopicRequest, TopicResponse, codec_for};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, lookup_host};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Client name reported in modern payloads
pub const DEFAULT_SOURCE: &str = "byond-topic";

/// Largest reply read from the server
pub const MAX_RESPONSE_LEN: usize = 4096;

/// Perform one query round-trip against `config`.
pub async fn query(
    config: &ServerConfig,
    request: &TopicRequest,
    source: &str,
) -> Result<TopicResponse> {
    let codec = codec_for(config.protocol);
    let payload = codec.encode_request(request, &config.comms_key, source);
    let packet = frame::encode(&payload)?;

    debug!(
        "Topic query {} to {} ({})",
        request.query(),
        config.address(),
        config.protocol
    );

    let raw = round_trip(config, &packet).await?;
    let text = frame::decode(&raw)?;

    debug!(
        "Topic reply: {}",
        text.chars().take(100).collect::<String>()
    );

    codec.decode_response(&text)
}

/// Connect, send `packet`, read one reply frame
async fn round_trip(config: &ServerConfig, packet: &[u8]) -> Result<Vec<u8>> {
    let addr = config.address();
    let limit = config.timeout();

    let mut stream = connect(&config.host, config.port, limit).await?;

    timeout(limit, stream.write_all(packet))
        .await
        .map_err(|_| TopicError::Timeout(limit))?
        .map_err(|e| TopicError::from_io(e, &addr, limit))?;

    let raw = timeout(limit, read_reply(&mut stream, &addr, limit))
        .await
        .map_err(|_| TopicError::Timeout(limit))??;

    // Best effort; the socket is dropped either way
    let _ = stream.shutdown().await;

    Ok(raw)
}

async fn connect(host: &str, port: u16, limit: Duration) -> Result<TcpStream> {
    let addr = format!("{}:{}", host, port);

    let resolved: Vec<SocketAddr> = timeout(limit, lookup_host(&addr))
        .await
        .map_err(|_| TopicError::Timeout(limit))?
        .map_err(|e| TopicError::DnsFailure {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .collect();

    if resolved.is_empty() {
        return Err(TopicError::DnsFailure {
            host: host.to_string(),
            reason: "no addresses found".to_string(),
        });
    }

    let stream = timeout(limit, TcpStream::connect(&resolved[..]))
        .await
        .map_err(|_| TopicError::Timeout(limit))?
        .map_err(|e| TopicError::from_io(e, &addr, limit))?;

    stream
        .set_nodelay(true)
        .map_err(|e| TopicError::from_io(e, &addr, limit))?;

    Ok(stream)
}

/// Read until the frame announced by the header is complete, the peer
/// closes, or the buffer is full.
async fn read_reply(stream: &mut TcpStream, addr: &str, limit: Duration) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; MAX_RESPONSE_LEN];
    let mut filled = 0;

    loop {
        let n = stream
            .read(&mut buf[filled..])
            .await
            .map_err(|e| TopicError::from_io(e, addr, limit))?;
        if n == 0 {
            break;
        }
        filled += n;

        let complete = frame::frame_len(&buf[..filled]).is_some_and(|total| filled >= total);
        if complete || filled == buf.len() {
            break;
        }
    }

    buf.truncate(filled);
    Ok(buf)
}

/// Query client bound to a mutable server configuration
#[derive(Debug, Clone)]
pub struct QueryClient {
    /// Read on every query; admin commands replace it
    config: Arc<RwLock<ServerConfig>>,
    /// Client name reported in modern payloads
    source: String,
}

impl QueryClient {
    /// Create a client for the given server
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            source: DEFAULT_SOURCE.to_string(),
        }
    }

    /// Report a different client name to modern servers
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Snapshot of the current configuration
    pub async fn config(&self) -> ServerConfig {
        self.config.read().await.clone()
    }

    /// Edit the configuration; the change is rejected if it fails validation
    pub async fn update_config(&self, edit: impl FnOnce(&mut ServerConfig)) -> Result<()> {
        let mut guard = self.config.write().await;
        let mut updated = guard.clone();
        edit(&mut updated);
        updated.validate()?;
        info!(
            "Topic server set to {} ({} topics)",
            updated.address(),
            updated.protocol
        );
        *guard = updated;
        Ok(())
    }

    /// Run a query against the configured server
    pub async fn query(&self, request: &TopicRequest) -> Result<TopicResponse> {
        let config = self.config().await;
        let result = query(&config, request, &self.source).await;

        if let Err(e) = &result {
            if e.is_protocol_mismatch() {
                warn!(
                    "{} topics do not match {}: {} (try toggling the protocol version)",
                    config.protocol,
                    config.address(),
                    e
                );
            } else if e.is_offline() {
                warn!("Game server {} unreachable: {}", config.address(), e);
            }
        }

        result
    }

    /// Fetch the server status
    pub async fn status(&self) -> Result<ServerStatus> {
        let response = self.query(&TopicRequest::status()).await?;
        Ok(ServerStatus::from_response(&response))
    }

    /// Fetch the connected player list
    pub async fn who_is(&self) -> Result<TopicResponse> {
        self.query(&TopicRequest::who_is()).await
    }

    /// Fetch the online admin list
    pub async fn get_admins(&self) -> Result<TopicResponse> {
        self.query(&TopicRequest::get_admins()).await
    }

    /// Resolve an in-game account identifier to its ckey.
    ///
    /// `None` means the server does not know the identifier.
    pub async fn identify_uuid(&self, uuid: &str) -> Result<Option<String>> {
        let response = self.query(&TopicRequest::identify_uuid(uuid)).await?;
        Ok(response
            .get("identified_ckey")
            .filter(|ckey| !ckey.is_empty())
            .map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byond_topic_core::ProtocolVersion;
    use byond_topic_core::frame::body_type;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn string_reply(text: &str) -> Vec<u8> {
        let mut raw = vec![0x00, 0x83];
        raw.extend_from_slice(&((text.len() + 2) as u16).to_be_bytes());
        raw.push(body_type::STRING);
        raw.extend_from_slice(text.as_bytes());
        raw.push(0);
        raw
    }

    /// Accept one connection, capture the request payload, send `reply`
    async fn fake_server(reply: Vec<u8>) -> (u16, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if n == 0 || frame::frame_len(&buf).is_some_and(|total| buf.len() >= total) {
                    break;
                }
            }
            stream.write_all(&reply).await.unwrap();
            frame::decode(&buf).unwrap()
        });

        (port, handle)
    }

    fn config_for(port: u16, protocol: ProtocolVersion) -> ServerConfig {
        ServerConfig {
            port,
            protocol,
            comms_key: "default_pwd".into(),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_legacy_status() {
        let (port, server) =
            fake_server(string_reply("players=5&admins=1&map_name=Box+Station")).await;
        let client = QueryClient::new(config_for(port, ProtocolVersion::Legacy));

        let status = client.status().await.unwrap();
        assert_eq!(status.players, Some(5));
        assert_eq!(status.admins, Some(1));
        assert_eq!(status.map_name.as_deref(), Some("Box Station"));

        assert_eq!(server.await.unwrap(), "?status");
    }

    #[tokio::test]
    async fn test_legacy_identify_uuid() {
        let (port, server) = fake_server(string_reply("identified_ckey=alice")).await;
        let client = QueryClient::new(config_for(port, ProtocolVersion::Legacy));

        let ckey = client.identify_uuid("abc123").await.unwrap();
        assert_eq!(ckey.as_deref(), Some("alice"));
        assert_eq!(
            server.await.unwrap(),
            "?key=default_pwd&identify_uuid&uuid=abc123"
        );
    }

    #[tokio::test]
    async fn test_modern_identify_uuid() {
        let (port, server) =
            fake_server(string_reply(r#"{"data":{"identified_ckey":"alice"}}"#)).await;
        let client =
            QueryClient::new(config_for(port, ProtocolVersion::Modern)).with_source("verifier");

        let ckey = client.identify_uuid("abc123").await.unwrap();
        assert_eq!(ckey.as_deref(), Some("alice"));

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["auth"], "default_pwd");
        assert_eq!(sent["uuid"], "abc123");
        assert_eq!(sent["source"], "verifier");
    }

    #[tokio::test]
    async fn test_unknown_identifier() {
        let (port, _server) = fake_server(string_reply(r#"{"data":{}}"#)).await;
        let client = QueryClient::new(config_for(port, ProtocolVersion::Modern));

        assert_eq!(client.identify_uuid("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_null_reply_is_unknown_identifier() {
        let (port, _server) = fake_server(vec![0x00, 0x83, 0x00, 0x01, 0x00]).await;
        let client = QueryClient::new(config_for(port, ProtocolVersion::Legacy));

        assert_eq!(client.identify_uuid("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_modern_missing_data_is_mismatch() {
        let (port, _server) = fake_server(string_reply(r#"{"error":"bad"}"#)).await;
        let client = QueryClient::new(config_for(port, ProtocolVersion::Modern));

        let err = client.status().await.unwrap_err();
        assert!(err.is_protocol_mismatch());
        assert!(!err.is_offline());
    }

    #[tokio::test]
    async fn test_garbage_reply_is_malformed() {
        let (port, _server) = fake_server(b"HTTP/1.0 400 Bad Request\r\n\r\n".to_vec()).await;
        let client = QueryClient::new(config_for(port, ProtocolVersion::Legacy));

        let err = client.status().await.unwrap_err();
        assert!(matches!(err, TopicError::MalformedFrame(_)));
        assert!(err.is_offline());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = query(
            &config_for(port, ProtocolVersion::Legacy),
            &TopicRequest::status(),
            DEFAULT_SOURCE,
        )
        .await;
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, TopicError::ConnectionRefused(_)));
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_offline() {
        let config = ServerConfig {
            host: "unreachable.invalid".into(),
            timeout_secs: 1,
            ..Default::default()
        };

        let err = query(&config, &TopicRequest::status(), DEFAULT_SOURCE)
            .await
            .unwrap_err();
        assert!(err.is_offline());
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accept and hold the connection without answering
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let config = ServerConfig {
            port,
            timeout_secs: 1,
            ..Default::default()
        };

        let started = std::time::Instant::now();
        let err = query(&config, &TopicRequest::status(), DEFAULT_SOURCE)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, TopicError::Timeout(d) if d == Duration::from_secs(1)));
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_update_config_validates() {
        let client = QueryClient::new(ServerConfig::default());

        let result = client.update_config(|c| c.port = 80).await;
        assert!(matches!(result, Err(TopicError::InvalidConfig(_))));
        assert_eq!(client.config().await.port, 1337);

        client
            .update_config(|c| c.protocol = c.protocol.toggled())
            .await
            .unwrap();
        assert_eq!(client.config().await.protocol, ProtocolVersion::Modern);
    }
}
