//! Normalizes queue payloads into message values.

use serde_json::Value;

use crate::errors::DecodeError;

/// A message payload as delivered by (or handed to) a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Bytes(Vec<u8>),
    Text(String),
    Value(Value),
}

impl From<Vec<u8>> for MessageBody {
    fn from(bytes: Vec<u8>) -> Self {
        MessageBody::Bytes(bytes)
    }
}

impl From<&[u8]> for MessageBody {
    fn from(bytes: &[u8]) -> Self {
        MessageBody::Bytes(bytes.to_vec())
    }
}

impl From<String> for MessageBody {
    fn from(text: String) -> Self {
        MessageBody::Text(text)
    }
}

impl From<&str> for MessageBody {
    fn from(text: &str) -> Self {
        MessageBody::Text(text.to_string())
    }
}

impl From<Value> for MessageBody {
    fn from(value: Value) -> Self {
        MessageBody::Value(value)
    }
}

/// A message received from a transport.
///
/// `receipt_handle` is the transport's deletion token. Mock messages have
/// none; they are addressed by position in the mock inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub body: MessageBody,
    pub message_id: Option<String>,
    pub receipt_handle: Option<String>,
}

impl RawMessage {
    pub fn new(body: impl Into<MessageBody>) -> Self {
        RawMessage {
            body: body.into(),
            message_id: None,
            receipt_handle: None,
        }
    }
}

/// Decodes a payload: bytes to text, text to JSON, structured values as-is.
///
/// The result is either a mapping or a sequence; `message_type` is checked
/// later by the router.
pub fn decode(body: &MessageBody) -> Result<Value, DecodeError> {
    let value = match body {
        MessageBody::Bytes(bytes) => serde_json::from_str(std::str::from_utf8(bytes)?)?,
        MessageBody::Text(text) => serde_json::from_str(text)?,
        MessageBody::Value(value) => value.clone(),
    };

    match value {
        Value::Object(_) | Value::Array(_) => Ok(value),
        Value::Null => Err(DecodeError::NotAMessage("null")),
        Value::Bool(_) => Err(DecodeError::NotAMessage("a boolean")),
        Value::Number(_) => Err(DecodeError::NotAMessage("a number")),
        Value::String(_) => Err(DecodeError::NotAMessage("a string")),
    }
}

/// Encodes a payload as text for a live transport.
///
/// Text is sent unchanged, bytes must be UTF-8 and structured values are
/// serialized as JSON.
pub fn encode(body: &MessageBody) -> Result<String, DecodeError> {
    match body {
        MessageBody::Bytes(bytes) => Ok(std::str::from_utf8(bytes)?.to_string()),
        MessageBody::Text(text) => Ok(text.clone()),
        MessageBody::Value(value) => Ok(serde_json::to_string(value)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_text_and_bytes_to_the_same_mapping() {
        let original = json!({"message_type": "sample", "test": "hi", "n": 3});
        let text = original.to_string();

        assert_eq!(decode(&MessageBody::from(text.as_str())).unwrap(), original);
        assert_eq!(
            decode(&MessageBody::from(text.into_bytes())).unwrap(),
            original
        );
    }

    #[test]
    fn structured_values_pass_through() {
        let original = json!([{"message_type": "a"}, {"message_type": "b"}]);
        assert_eq!(
            decode(&MessageBody::Value(original.clone())).unwrap(),
            original
        );
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            decode(&MessageBody::from("{not json")),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode(&MessageBody::Bytes(vec![0xff, 0xfe])),
            Err(DecodeError::Utf8(_))
        ));
        assert!(matches!(
            decode(&MessageBody::from("42")),
            Err(DecodeError::NotAMessage("a number"))
        ));
    }

    #[test]
    fn invalid_utf8_reports_where_the_text_breaks() {
        let body = MessageBody::Bytes(b"{\"a\":\xff}".to_vec());

        match decode(&body) {
            Err(DecodeError::Utf8(e)) => assert_eq!(e.valid_up_to(), 5),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(encode(&body), Err(DecodeError::Utf8(_))));
    }

    #[test]
    fn encode_keeps_text_and_serializes_values() {
        assert_eq!(encode(&MessageBody::from("plain")).unwrap(), "plain");
        assert_eq!(encode(&MessageBody::from(&b"bytes"[..])).unwrap(), "bytes");

        let encoded = encode(&MessageBody::Value(json!({"message_type": "demo"}))).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&encoded).unwrap(),
            json!({"message_type": "demo"})
        );
    }
}
