//! # byond-topic-core
//!
//! Shared leaf for the BYOND world-topic protocol.
//!
//! This crate provides the pieces used by both the query client and the
//! push listener:
//! - Binary frame encode/decode
//! - Legacy (query string) and modern (JSON) payload codecs
//! - Server connection settings
//! - The error taxonomy

pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod payload;

pub use config::{ProtocolVersion, ServerConfig};
pub use error::{Result, TopicError};
pub use message::{TopicRequest, TopicResponse};
pub use payload::{LegacyCodec, ModernCodec, PayloadCodec, codec_for, parse_query_string};
