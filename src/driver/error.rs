use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverErrorKind {
    InvalidRequest,
    Configuration,
    Authentication,
    /// A stage answered with its own error body.
    StageRejected,
    Upstream,
    ProtocolViolation,
    Storage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
    pub body: Option<Value>,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            body: None,
        }
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(status_code) => write!(f, "{} (status={})", self.message, status_code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DriverError {}

pub fn invalid_request(message: impl Into<String>) -> DriverError {
    DriverError::new(DriverErrorKind::InvalidRequest, message)
}

pub fn configuration_error(message: impl Into<String>) -> DriverError {
    DriverError::new(DriverErrorKind::Configuration, message)
}

pub fn protocol_violation(message: impl Into<String>) -> DriverError {
    DriverError::new(DriverErrorKind::ProtocolViolation, message)
}

pub fn upstream_failure(message: impl Into<String>) -> DriverError {
    DriverError::new(DriverErrorKind::Upstream, message)
}

/// Builds the error for a stage that answered with a non-success status. The stage's own
/// `error` field, when present, becomes the message.
pub fn stage_rejected(stage: &str, status_code: u16, body: Value) -> DriverError {
    let message = match body.get("error").and_then(Value::as_str) {
        Some(error) => format!("{stage} failed: {error}"),
        None => format!("{stage} failed"),
    };
    DriverError::new(DriverErrorKind::StageRejected, message)
        .with_status_code(status_code)
        .with_body(body)
}

/// Maps a non-success HTTP answer from a model or agent service, keeping a bounded
/// excerpt of its body.
pub fn map_http_error(service: &str, status: u16, body: &str) -> DriverError {
    let excerpt = body.chars().take(240).collect::<String>();
    let kind = match status {
        401 | 403 => DriverErrorKind::Authentication,
        400..=499 => DriverErrorKind::InvalidRequest,
        _ => DriverErrorKind::Upstream,
    };

    let mut message = format!("{service} returned status {status}");
    if !excerpt.is_empty() {
        message = format!("{message}: {excerpt}");
    }
    DriverError::new(kind, message).with_status_code(status)
}
