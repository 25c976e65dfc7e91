use std::{fmt::Display, future::Future};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    run::SourceOrigin,
    storage::{
        BlobStore, PutOptions, StorageError, error::backend_failure, ports::CONTENT_TYPE_JSON,
    },
    transforms::TransformOptions,
};

pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Preprocess,
    Synthesis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessStatus {
    pub status: String,
    pub stage: StageName,
    pub recipe: Value,
    pub options: TransformOptions,
    pub source_key: String,
    pub source_origin: SourceOrigin,
    pub output_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_png_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_png_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_zip_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisStatus {
    pub status: String,
    pub stage: StageName,
    pub recipe: Value,
    pub input_key: Option<String>,
    /// The key the twin was actually generated from.
    pub source_key: String,
    pub source_origin: SourceOrigin,
    pub from_run_id: Option<String>,
    pub digital_twin_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_twin_zip: Option<String>,
}

pub async fn write_status<T: Serialize>(
    store: &dyn BlobStore,
    key: &str,
    record: &T,
) -> Result<(), StorageError> {
    let body = serde_json::to_vec(record)
        .map_err(|err| backend_failure(key, format!("failed to encode status: {err}")))?;
    store
        .put(key, body, PutOptions::with_content_type(CONTENT_TYPE_JSON))
        .await
}

/// Reads the status record already filed under `key`, if there is one.
pub async fn read_status(store: &dyn BlobStore, key: &str) -> Result<Option<Value>, StorageError> {
    match store.get(key).await {
        Ok(body) => serde_json::from_slice(&body)
            .map(Some)
            .map_err(|err| backend_failure(key, format!("failed to decode status: {err}"))),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Status document for a synthesis run. When the run already carries a preprocess
/// record, that record is kept and the synthesis fields go under `synthesis`; anything
/// else is replaced.
pub fn synthesis_status_document(
    prior: Option<Value>,
    status: &SynthesisStatus,
) -> Result<Value, serde_json::Error> {
    let synthesis = serde_json::to_value(status)?;
    Ok(match prior {
        Some(Value::Object(mut record))
            if record.get("stage").and_then(Value::as_str) == Some("preprocess") =>
        {
            record.insert("synthesis".to_string(), synthesis);
            Value::Object(record)
        }
        _ => synthesis,
    })
}

/// Attempts `operation` once. A failure is logged and discarded; the caller only learns
/// whether a value came back.
pub async fn best_effort<T, E, F>(operation: &'static str, run_id: &str, future: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match future.await {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                target: "stages",
                operation,
                run_id = %run_id,
                error = %err,
                "best_effort_step_failed"
            );
            None
        }
    }
}
