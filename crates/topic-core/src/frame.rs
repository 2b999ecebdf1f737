//! BYOND topic frame codec
//!
//! Every topic message, in either direction, travels in the same envelope:
//!
//! ```text
//! 0x00 0x83 | u16 BE length | body
//! ```
//!
//! Requests carry 5 zero bytes, the payload and a NUL terminator, so the
//! length field is always `payload + 6`. Responses carry a single type byte
//! (`0x06` string, `0x2a` float) followed by the data and a NUL. A bare
//! `0x00` type byte with nothing after it is BYOND's null reply.
//!
//! This module only deals in bytes; payload semantics live in `payload`.

use crate::error::{Result, TopicError};

/// Frame magic prefix
pub const MAGIC: [u8; 2] = [0x00, 0x83];

/// Magic + length field
pub const HEADER_LEN: usize = 4;

/// Zero padding between the length field and a request payload
pub const RESERVED_LEN: usize = 5;

/// Bytes counted by the length field on top of the payload (padding + NUL)
pub const LENGTH_OVERHEAD: usize = RESERVED_LEN + 1;

/// Smallest frame worth decoding: header plus a type byte (the null reply)
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 1;

/// Largest payload the 16-bit length field can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - LENGTH_OVERHEAD;

/// Response body type markers
pub mod body_type {
    /// Null reply when alone, request zero padding otherwise
    pub const PADDED: u8 = 0x00;
    /// NUL-terminated text
    pub const STRING: u8 = 0x06;
    /// Little-endian f32
    pub const FLOAT: u8 = 0x2a;
}

/// Wrap a payload in a topic frame.
pub fn encode(payload: &str) -> Result<Vec<u8>> {
    let payload_bytes = payload.as_bytes();

    if payload_bytes.contains(&0) {
        return Err(TopicError::InvalidPayload(
            "payload contains an embedded NUL".to_string(),
        ));
    }

    if payload_bytes.len() > MAX_PAYLOAD_LEN {
        return Err(TopicError::PayloadTooLarge {
            size: payload_bytes.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let length = (payload_bytes.len() + LENGTH_OVERHEAD) as u16;

    let mut buf = Vec::with_capacity(HEADER_LEN + length as usize);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&length.to_be_bytes());
    buf.extend_from_slice(&[0u8; RESERVED_LEN]);
    buf.extend_from_slice(payload_bytes);
    buf.push(0);

    Ok(buf)
}

/// Total size of the frame announced by `header`, once the magic and length
/// field have arrived.
pub fn frame_len(header: &[u8]) -> Option<usize> {
    if header.len() < HEADER_LEN {
        return None;
    }
    let declared = u16::from_be_bytes([header[2], header[3]]) as usize;
    Some(HEADER_LEN + declared)
}

/// Extract the text carried by a frame.
pub fn decode(raw: &[u8]) -> Result<String> {
    if raw.len() < MIN_FRAME_LEN {
        return Err(TopicError::MalformedFrame(format!(
            "frame too short: {} bytes (need at least {})",
            raw.len(),
            MIN_FRAME_LEN
        )));
    }

    if raw[..2] != MAGIC {
        return Err(TopicError::MalformedFrame(format!(
            "bad magic: {:02x} {:02x}",
            raw[0], raw[1]
        )));
    }

    // Length check above guarantees the header is present
    let end = frame_len(raw).unwrap_or(HEADER_LEN);
    if end > raw.len() {
        return Err(TopicError::MalformedFrame(format!(
            "truncated frame: header declares {} bytes, got {}",
            end,
            raw.len()
        )));
    }

    let body = &raw[HEADER_LEN..end];
    let Some((&marker, rest)) = body.split_first() else {
        return Err(TopicError::MalformedFrame("empty frame body".to_string()));
    };

    match marker {
        body_type::STRING => Ok(text(rest)),
        body_type::FLOAT => {
            if rest.len() < 4 {
                return Err(TopicError::MalformedFrame(
                    "float body shorter than 4 bytes".to_string(),
                ));
            }
            let value = f32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
            Ok(value.to_string())
        }
        // `00 83 00 01 00`: the server returned null
        body_type::PADDED if rest.is_empty() => Ok(String::new()),
        body_type::PADDED => {
            if body.len() < LENGTH_OVERHEAD {
                return Err(TopicError::MalformedFrame(
                    "request body shorter than its padding".to_string(),
                ));
            }
            Ok(text(&body[RESERVED_LEN..]))
        }
        other => Err(TopicError::MalformedFrame(format!(
            "unknown body type 0x{:02x}",
            other
        ))),
    }
}

/// Body text up to (not including) the trailing NUL
fn text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
