use std::sync::{Arc, Weak};

use serde_json::{json, Value};

use crate::transport::{HandlerError, ProtocolCore, SessionHandler, SseTransport};

/// Minimal protocol core for the standalone binary and the end-to-end
/// tests: answers `ping` requests over the session's own stream and rejects
/// unknown methods. Real deployments attach the studio's tool-protocol core
/// through the same `ProtocolCore` seam.
pub struct LoopbackCore;

impl ProtocolCore for LoopbackCore {
    fn attach(&self, transport: &Arc<SseTransport>) {
        transport.set_handler(Arc::new(LoopbackSession {
            transport: Arc::downgrade(transport),
        }));
    }
}

struct LoopbackSession {
    transport: Weak<SseTransport>,
}

impl SessionHandler for LoopbackSession {
    fn on_message(&self, message: Value) -> Result<(), HandlerError> {
        let Some(transport) = self.transport.upgrade() else {
            return Err("transport released before dispatch".into());
        };

        let Some(id) = message.get("id").cloned() else {
            // Notification: nothing to push back.
            tracing::debug!(session_id = %transport.session_id(), "notification received");
            return Ok(());
        };
        if message.get("method").is_none() {
            // Client response to a server-initiated request; no reply either.
            return Ok(());
        }

        let method = message.get("method").and_then(Value::as_str).unwrap_or("");
        let reply = match method {
            "ping" => json!({"jsonrpc": "2.0", "id": id, "result": {}}),
            other => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("method not found: {other}")},
            }),
        };
        // Push decoupled from the delivery acknowledgment: the POST is
        // already answered by the time this write happens.
        tokio::spawn(async move {
            if let Err(err) = transport.send(&reply) {
                tracing::warn!(
                    session_id = %transport.session_id(),
                    error = %err,
                    "failed to push reply over stream"
                );
            }
        });
        Ok(())
    }

    fn on_close(&self) {
        tracing::debug!("loopback session closed");
    }
}
