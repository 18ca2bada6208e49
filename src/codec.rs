// Copyright (c) 2025, The Durabbit Authors
// MIT License
// All rights reserved.

//! # Message Codecs
//!
//! A codec pairs a content-type string with a one-way payload encoder. The
//! client applies its configured codec to every outgoing publish and stamps
//! the resulting content-type on the message properties. Decoding is the
//! consumer handler's concern; this layer never decodes.

use crate::errors::AmqpError;
use serde_json::Value;

/// Content type for JSON messages.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type for plain-text messages.
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// A payload accepted by the publishing surface.
///
/// Callers usually rely on the `From` conversions rather than building the
/// variants directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A UTF-8 string payload.
    Text(String),
    /// A raw byte payload.
    Binary(Vec<u8>),
    /// An arbitrary JSON value.
    Json(Value),
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_owned())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Binary(value.to_vec())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Binary(value)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// A one-way message encoder tied to a content type.
///
/// Implementations are values passed into the client, not subclasses; the two
/// stock codecs cover `application/json` and `text/plain`.
pub trait Codec: Send + Sync {
    /// The content type stamped on messages encoded by this codec.
    fn content_type(&self) -> &'static str;

    /// Encodes a payload into the wire body.
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, AmqpError>;
}

/// Codec producing canonical JSON bodies.
///
/// Strings encode to JSON strings (quoted), byte payloads to JSON arrays and
/// JSON values to their canonical serialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }

    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, AmqpError> {
        let encoded = match payload {
            Payload::Text(text) => serde_json::to_vec(text),
            Payload::Binary(bytes) => serde_json::to_vec(bytes),
            Payload::Json(value) => serde_json::to_vec(value),
        };

        encoded.map_err(|_| AmqpError::EncodingError)
    }
}

/// Codec passing text and bytes through unchanged.
///
/// Any other payload kind fails with `EncodingUnsupported`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn content_type(&self) -> &'static str {
        TEXT_CONTENT_TYPE
    }

    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, AmqpError> {
        match payload {
            Payload::Text(text) => Ok(text.as_bytes().to_vec()),
            Payload::Binary(bytes) => Ok(bytes.clone()),
            Payload::Json(_) => Err(AmqpError::EncodingUnsupported(TEXT_CONTENT_TYPE)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_codec_quotes_strings() {
        let encoded = JsonCodec.encode(&Payload::from("test")).unwrap();
        assert_eq!(encoded, b"\"test\"");
    }

    #[test]
    fn json_codec_serializes_values() {
        let encoded = JsonCodec.encode(&Payload::from(json!({"a": 1}))).unwrap();
        assert_eq!(encoded, br#"{"a":1}"#);
    }

    #[test]
    fn text_codec_passes_strings_through() {
        let encoded = TextCodec.encode(&Payload::from("test")).unwrap();
        assert_eq!(encoded, b"test");
    }

    #[test]
    fn text_codec_passes_bytes_through() {
        let encoded = TextCodec.encode(&Payload::from(vec![1u8, 2, 3])).unwrap();
        assert_eq!(encoded, vec![1u8, 2, 3]);
    }

    #[test]
    fn text_codec_rejects_other_inputs() {
        let result = TextCodec.encode(&Payload::from(json!(42)));
        assert_eq!(result, Err(AmqpError::EncodingUnsupported(TEXT_CONTENT_TYPE)));
    }

    #[test]
    fn content_types() {
        assert_eq!(JsonCodec.content_type(), "application/json");
        assert_eq!(TextCodec.content_type(), "text/plain");
    }
}
