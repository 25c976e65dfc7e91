use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    InputResolution,
    Transform,
    Generation,
    OutputPersistence,
}

impl StageErrorKind {
    pub fn status_code(self) -> u16 {
        match self {
            StageErrorKind::InputResolution => 400,
            StageErrorKind::Transform
            | StageErrorKind::Generation
            | StageErrorKind::OutputPersistence => 500,
        }
    }
}

/// Terminal stage failure. `error` is the caller-facing summary, `details` the cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    pub kind: StageErrorKind,
    pub error: String,
    pub details: String,
}

impl StageError {
    pub fn new(kind: StageErrorKind, error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            details: details.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.details)
    }
}

impl std::error::Error for StageError {}

pub fn input_unreadable(uri: &str, details: impl fmt::Display) -> StageError {
    StageError::new(
        StageErrorKind::InputResolution,
        format!("Failed to read input from {uri}"),
        details.to_string(),
    )
}

pub fn invalid_run_id(details: impl fmt::Display) -> StageError {
    StageError::new(
        StageErrorKind::InputResolution,
        "Invalid run_id",
        details.to_string(),
    )
}

pub fn preprocessing_failed(details: impl fmt::Display) -> StageError {
    StageError::new(
        StageErrorKind::Transform,
        "Preprocessing failed",
        details.to_string(),
    )
}

pub fn twin_generation_failed(details: impl fmt::Display) -> StageError {
    StageError::new(
        StageErrorKind::Generation,
        "Digital twin generation failed",
        details.to_string(),
    )
}

pub fn output_not_saved(artifact: &str, details: impl fmt::Display) -> StageError {
    StageError::new(
        StageErrorKind::OutputPersistence,
        format!("Failed to save {artifact}"),
        details.to_string(),
    )
}
