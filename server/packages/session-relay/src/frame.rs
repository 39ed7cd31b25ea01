use axum::response::sse::Event;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize outbound message: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("invalid message body: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("message body must be a JSON object")]
    InvalidEnvelope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Handshake event carrying the delivery URL for this session.
    Endpoint,
    /// One serialized JSON-RPC message pushed to the client.
    Message,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Endpoint => "endpoint",
            Self::Message => "message",
        }
    }
}

/// One event-stream record: an event-type line plus a single data line.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    pub data: String,
}

impl Frame {
    pub fn endpoint(deliver_url: &str) -> Self {
        Self {
            kind: FrameKind::Endpoint,
            data: deliver_url.to_string(),
        }
    }

    pub fn message(payload: &Value) -> Result<Self, CodecError> {
        let data = serde_json::to_string(payload).map_err(CodecError::Serialize)?;
        Ok(Self {
            kind: FrameKind::Message,
            data,
        })
    }

    /// Raw wire form, `event: <type>\ndata: <json>\n\n`.
    pub fn to_wire(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind.as_str(), self.data)
    }

    pub fn into_sse_event(self) -> Event {
        Event::default().event(self.kind.as_str()).data(self.data)
    }
}

/// Inbound decoding: delivery is a plain request body, not a stream, so this
/// is structured parsing only. One JSON-RPC message per call.
pub fn decode_message(body: &[u8]) -> Result<Value, CodecError> {
    let value: Value = serde_json::from_slice(body).map_err(CodecError::Parse)?;
    if !value.is_object() {
        return Err(CodecError::InvalidEnvelope);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_frame_wire_format() {
        let frame = Frame::endpoint("/v1/messages?sessionId=abc");
        assert_eq!(
            frame.to_wire(),
            "event: endpoint\ndata: /v1/messages?sessionId=abc\n\n"
        );
    }

    #[test]
    fn message_frame_wire_format() {
        let frame =
            Frame::message(&json!({"jsonrpc": "2.0", "id": 1, "result": {}})).expect("encode");
        assert_eq!(frame.kind, FrameKind::Message);
        assert_eq!(
            frame.to_wire(),
            "event: message\ndata: {\"id\":1,\"jsonrpc\":\"2.0\",\"result\":{}}\n\n"
        );
    }

    #[test]
    fn decode_accepts_any_jsonrpc_object() {
        let request = decode_message(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#);
        assert!(request.is_ok());
        let notification = decode_message(br#"{"jsonrpc":"2.0","method":"note"}"#);
        assert!(notification.is_ok());
        let response = decode_message(br#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
        assert!(response.is_ok());
    }

    #[test]
    fn decode_rejects_garbage_and_non_objects() {
        assert!(matches!(
            decode_message(b"not json"),
            Err(CodecError::Parse(_))
        ));
        assert!(matches!(
            decode_message(b"[1,2,3]"),
            Err(CodecError::InvalidEnvelope)
        ));
        assert!(matches!(
            decode_message(b"\"ping\""),
            Err(CodecError::InvalidEnvelope)
        ));
    }
}
