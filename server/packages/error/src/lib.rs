use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    InvalidRequest,
    SessionNotFound,
    DispatchFailed,
    StreamError,
}

impl ErrorType {
    pub fn as_urn(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "urn:agent-studio:error:invalid_request",
            Self::SessionNotFound => "urn:agent-studio:error:session_not_found",
            Self::DispatchFailed => "urn:agent-studio:error:dispatch_failed",
            Self::StreamError => "urn:agent-studio:error:stream_error",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid Request",
            Self::SessionNotFound => "Session Not Found",
            Self::DispatchFailed => "Dispatch Failed",
            Self::StreamError => "Stream Error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::SessionNotFound => 404,
            Self::DispatchFailed => 500,
            Self::StreamError => 502,
        }
    }
}

/// RFC 7807 problem body returned by every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl ProblemDetails {
    pub fn new(error_type: ErrorType, detail: Option<String>) -> Self {
        Self {
            type_: error_type.as_urn().to_string(),
            title: error_type.title().to_string(),
            status: error_type.status_code(),
            detail,
            extensions: Map::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },
    #[error("dispatch failed: {message}")]
    DispatchFailed { message: String },
    #[error("stream error: {message}")]
    StreamError { message: String },
}

impl StudioError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::InvalidRequest { .. } => ErrorType::InvalidRequest,
            Self::SessionNotFound { .. } => ErrorType::SessionNotFound,
            Self::DispatchFailed { .. } => ErrorType::DispatchFailed,
            Self::StreamError { .. } => ErrorType::StreamError,
        }
    }

    pub fn to_problem_details(&self) -> ProblemDetails {
        let mut problem = ProblemDetails::new(self.error_type(), Some(self.to_string()));
        if let Self::SessionNotFound { session_id } = self {
            problem
                .extensions
                .insert("sessionId".to_string(), Value::String(session_id.clone()));
        }
        problem
    }
}

impl From<StudioError> for ProblemDetails {
    fn from(value: StudioError) -> Self {
        value.to_problem_details()
    }
}

impl From<&StudioError> for ProblemDetails {
    fn from(value: &StudioError) -> Self {
        value.to_problem_details()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(ErrorType::InvalidRequest.status_code(), 400);
        assert_eq!(ErrorType::SessionNotFound.status_code(), 404);
        assert_eq!(ErrorType::DispatchFailed.status_code(), 500);
        assert_eq!(ErrorType::StreamError.status_code(), 502);
    }

    #[test]
    fn session_not_found_carries_session_id_extension() {
        let err = StudioError::SessionNotFound {
            session_id: "abc".to_string(),
        };
        let problem = err.to_problem_details();
        assert_eq!(problem.status, 404);
        assert_eq!(problem.type_, "urn:agent-studio:error:session_not_found");
        assert_eq!(
            problem.extensions.get("sessionId"),
            Some(&Value::String("abc".to_string()))
        );
    }

    #[test]
    fn problem_serializes_extensions_flattened() {
        let err = StudioError::SessionNotFound {
            session_id: "abc".to_string(),
        };
        let json = serde_json::to_value(err.to_problem_details()).expect("serialize problem");
        assert_eq!(json["sessionId"], "abc");
        assert_eq!(json["status"], 404);
        assert!(json.get("extensions").is_none());
    }

    #[test]
    fn detail_is_the_stringified_error() {
        let err = StudioError::DispatchFailed {
            message: "handler exploded".to_string(),
        };
        let problem = err.to_problem_details();
        assert_eq!(
            problem.detail.as_deref(),
            Some("dispatch failed: handler exploded")
        );
    }
}
