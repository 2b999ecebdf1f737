//! Payload encodings carried inside topic frames
//!
//! Server builds disagree on what goes inside a frame:
//! - **Legacy**: URL query strings, e.g. `?key=secret&identify_uuid&uuid=abc`.
//!   Replies are query strings too.
//! - **Modern**: a JSON envelope `{"auth", "query", ..., "source"}`. Replies
//!   wrap their fields in `{"data": {...}}`.
//!
//! [`codec_for`] is the only place that branches on [`ProtocolVersion`].

use crate::config::ProtocolVersion;
use crate::error::{Result, TopicError};
use crate::message::{TopicRequest, TopicResponse};
use serde_json::{Map, Value};
use url::form_urlencoded;

/// Auth value sent with queries that don't need the comms key
pub const ANONYMOUS: &str = "anonymous";

/// Encodes requests and decodes replies for one protocol version
pub trait PayloadCodec: Send + Sync {
    /// Render a request as the text placed inside the frame
    fn encode_request(&self, request: &TopicRequest, comms_key: &str, source: &str) -> String;

    /// Parse the text extracted from a reply frame
    fn decode_response(&self, text: &str) -> Result<TopicResponse>;
}

/// Pick the codec for a protocol version
pub fn codec_for(version: ProtocolVersion) -> &'static dyn PayloadCodec {
    match version {
        ProtocolVersion::Legacy => &LegacyCodec,
        ProtocolVersion::Modern => &ModernCodec,
    }
}

/// URL query string payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyCodec;

impl PayloadCodec for LegacyCodec {
    fn encode_request(&self, request: &TopicRequest, comms_key: &str, _source: &str) -> String {
        let mut parts = Vec::with_capacity(request.params().len() + 2);

        if request.is_authenticated() {
            parts.push(format!("key={}", escape(comms_key)));
        }
        parts.push(escape(request.query()));

        for (name, value) in request.params() {
            match value {
                Some(value) => parts.push(format!("{}={}", escape(name), escape(value))),
                None => parts.push(escape(name)),
            }
        }

        format!("?{}", parts.join("&"))
    }

    fn decode_response(&self, text: &str) -> Result<TopicResponse> {
        if text.trim_start().starts_with('{') {
            return Err(TopicError::ProtocolMismatch(
                "received a JSON reply while legacy topics are configured".to_string(),
            ));
        }
        Ok(parse_query_string(text))
    }
}

/// JSON envelope payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct ModernCodec;

impl PayloadCodec for ModernCodec {
    fn encode_request(&self, request: &TopicRequest, comms_key: &str, source: &str) -> String {
        let mut object = Map::new();

        for (name, value) in request.params() {
            let value = match value {
                Some(value) => Value::String(value.clone()),
                None => Value::Bool(true),
            };
            object.insert(name.clone(), value);
        }

        let auth = if request.is_authenticated() && !comms_key.is_empty() {
            comms_key
        } else {
            ANONYMOUS
        };
        object.insert("auth".into(), Value::String(auth.to_string()));
        object.insert("query".into(), Value::String(request.query().to_string()));
        object.insert("source".into(), Value::String(source.to_string()));

        Value::Object(object).to_string()
    }

    fn decode_response(&self, text: &str) -> Result<TopicResponse> {
        let envelope: Value = serde_json::from_str(text).map_err(|_| {
            TopicError::ProtocolMismatch(
                "reply is not JSON; the server may expect legacy topics".to_string(),
            )
        })?;

        let Some(data) = envelope.get("data") else {
            return Err(TopicError::ProtocolMismatch(format!(
                "reply has no data field: {}",
                preview(text)
            )));
        };

        let response: TopicResponse = match data {
            Value::Object(fields) => fields
                .iter()
                .map(|(key, value)| (key.clone(), flatten(value)))
                .collect(),
            scalar => [("data", flatten(scalar))].into_iter().collect(),
        };

        Ok(response)
    }
}

/// Parse `?a=1&b&c=2` into a field map.
///
/// The leading `?` is optional, keys without `=` map to an empty value, and a
/// repeated key keeps its first value.
pub fn parse_query_string(text: &str) -> TopicResponse {
    let text = text.trim().trim_start_matches('?');
    form_urlencoded::parse(text.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

fn escape(text: &str) -> String {
    form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

fn flatten(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
