use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use agent_studio_error::{ProblemDetails, StudioError};

use crate::frame;
use crate::registry::SessionRegistry;
use crate::transport::{ProtocolCore, SseTransport, TransportError};

pub const STREAM_PATH: &str = "/v1/stream";
pub const DELIVER_PATH: &str = "/v1/messages";

/// Observed-good default; override per deployment via `ServerConfig`.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const OUTBOUND_BUFFER: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub core: Arc<dyn ProtocolCore>,
    pub grace_period: Duration,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        core: Arc<dyn ProtocolCore>,
        grace_period: Duration,
    ) -> Self {
        Self {
            registry,
            core,
            grace_period,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Studio(StudioError),
}

impl From<StudioError> for ApiError {
    fn from(value: StudioError) -> Self {
        Self::Studio(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let problem: ProblemDetails = match &self {
            ApiError::Studio(err) => err.to_problem_details(),
        };
        let status =
            StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(problem)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeliverQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(get_health))
        .route(STREAM_PATH, get(connect_stream))
        .route(DELIVER_PATH, post(deliver_message))
        .with_state(Arc::new(state))
}

async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

/// Stream endpoint: opens the long-lived outbound event stream for one
/// session and keeps it until the connection ends. The response body starts
/// with the `endpoint` handshake frame; everything the protocol core pushes
/// afterwards rides the same stream.
async fn connect_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = query
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let deliver_url = format!("{DELIVER_PATH}?sessionId={session_id}");

    let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
    let transport = SseTransport::open(
        session_id.clone(),
        &deliver_url,
        tx,
        state.registry.clone(),
    )
    .map_err(|err| StudioError::StreamError {
        message: err.to_string(),
    })?;

    // Handshake succeeded; only now does the session become routable.
    state.registry.register(&session_id, transport.clone());
    state.core.attach(&transport);
    tracing::info!(session_id = %session_id, "stream opened");

    let guard = StreamGuard {
        transport,
        registry: state.registry.clone(),
        grace_period: state.grace_period,
    };
    let stream = ReceiverStream::new(rx).map(move |frame| {
        // The guard lives inside the stream: when the client disconnects the
        // body is dropped and the guard schedules grace-period teardown.
        let _held = &guard;
        Ok::<Event, Infallible>(frame.into_sse_event())
    });

    Ok((
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)),
    ))
}

/// Message endpoint: routes one inbound JSON-RPC message to its session's
/// transport. Acknowledgment is independent of whatever the core later
/// pushes back over the stream.
async fn deliver_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeliverQuery>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let Some(session_id) = query.session_id else {
        return Err(StudioError::InvalidRequest {
            message: "sessionId query parameter is required".to_string(),
        }
        .into());
    };

    let message = frame::decode_message(&body).map_err(|err| StudioError::InvalidRequest {
        message: err.to_string(),
    })?;

    let Some(transport) = state.registry.get(&session_id) else {
        tracing::debug!(session_id = %session_id, "delivery for unknown session");
        return Err(StudioError::SessionNotFound { session_id }.into());
    };

    match transport.dispatch(message) {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        // Lost the teardown race after lookup; same recoverable class as an
        // unknown session.
        Err(TransportError::Closed) => Err(StudioError::SessionNotFound { session_id }.into()),
        Err(err) => {
            tracing::warn!(session_id = %session_id, error = %err, "dispatch failed");
            Err(StudioError::DispatchFailed {
                message: err.to_string(),
            }
            .into())
        }
    }
}

/// Dropped when the SSE body goes away, for any reason: client abort, server
/// shutdown, or the transport ending the stream itself. Teardown is deferred
/// by the grace period so a delivery already in flight when the stream
/// aborts still finds its session. Each guard drops once, so cleanup is
/// never double-scheduled.
struct StreamGuard {
    transport: Arc<SseTransport>,
    registry: Arc<SessionRegistry>,
    grace_period: Duration,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.transport.is_closed() {
            return;
        }
        let transport = self.transport.clone();
        let registry = self.registry.clone();
        let grace_period = self.grace_period;
        tracing::debug!(
            session_id = %transport.session_id(),
            grace_ms = grace_period.as_millis() as u64,
            "stream dropped, scheduling teardown"
        );
        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            match registry.get(transport.session_id()) {
                Some(current) if Arc::ptr_eq(&current, &transport) => {
                    tracing::info!(
                        session_id = %transport.session_id(),
                        "grace period elapsed, closing session"
                    );
                    transport.close();
                }
                _ => {
                    // Reconnected or already torn down in the meantime.
                    tracing::debug!(
                        session_id = %transport.session_id(),
                        "teardown superseded"
                    );
                }
            }
        });
    }
}
