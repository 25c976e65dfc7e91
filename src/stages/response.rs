use serde::Serialize;
use serde_json::{Value, json};

use crate::{stages::error::StageError, storage::ports::CONTENT_TYPE_JSON};

/// Outcome of one stage invocation, carried in the gateway proxy shape when serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResponse {
    pub status_code: u16,
    pub body: Value,
}

impl StageResponse {
    pub fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self {
                status_code: 200,
                body,
            },
            Err(err) => Self::error_body(500, "Failed to encode response", &err.to_string()),
        }
    }

    pub fn from_error(err: &StageError) -> Self {
        Self::error_body(err.status_code(), &err.error, &err.details)
    }

    fn error_body(status_code: u16, error: &str, details: &str) -> Self {
        Self {
            status_code,
            body: json!({ "error": error, "details": details }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn run_id(&self) -> Option<&str> {
        self.body.get("run_id").and_then(Value::as_str)
    }

    /// `{statusCode, headers, body}` with `body` encoded as a JSON string.
    pub fn to_proxy(&self) -> Value {
        json!({
            "statusCode": self.status_code,
            "headers": { "Content-Type": CONTENT_TYPE_JSON },
            "body": self.body.to_string(),
        })
    }
}

impl<T: Serialize> From<Result<T, StageError>> for StageResponse {
    fn from(result: Result<T, StageError>) -> Self {
        match result {
            Ok(body) => Self::ok(&body),
            Err(err) => Self::from_error(&err),
        }
    }
}
