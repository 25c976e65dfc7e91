use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    driver::{
        client::StageClient,
        error::{DriverError, protocol_violation},
    },
    stages::{PreprocessRequest, SynthesisRequest},
};

/// Input of the two-step preprocess-then-synthesis saga.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineRequest {
    pub input_key: String,
    pub denoise: bool,
    pub normalize: bool,
    pub resample: bool,
    pub export_png: bool,
    pub export_zip: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Completed,
    /// Preprocess succeeded and its artifacts remain; synthesis failed.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub status: PipelineStatus,
    pub run_id: String,
    pub preprocess: Value,
    /// Keys preprocess reported as written. Synthesis never removes them, and it files its
    /// own status fields under `synthesis` inside the preprocess status record.
    pub persisted_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis_error: Option<DriverError>,
}

/// Runs preprocess on `input_key`, then synthesis scoped to the run preprocess returned.
/// There is no rollback: a synthesis failure yields a `Partial` report, while a
/// preprocess failure fails the whole call.
pub async fn run_pipeline(
    client: &dyn StageClient,
    request: &PipelineRequest,
) -> Result<PipelineReport, DriverError> {
    let preprocess_request = PreprocessRequest {
        source_key: Some(request.input_key.clone()),
        denoise: request.denoise,
        normalize: request.normalize,
        resample: request.resample,
        export_png: request.export_png,
        export_zip: request.export_zip,
        ..PreprocessRequest::default()
    };
    let preprocess = client.preprocess(&preprocess_request).await?;
    let run_id = preprocess
        .get("run_id")
        .and_then(Value::as_str)
        .filter(|run_id| !run_id.is_empty())
        .ok_or_else(|| protocol_violation("preprocess response has no run_id"))?
        .to_string();
    let persisted_keys = persisted_keys(&preprocess);
    tracing::info!(
        target: "driver.pipeline",
        run_id = %run_id,
        persisted = persisted_keys.len(),
        "pipeline_preprocess_done"
    );

    let synthesis_request = SynthesisRequest {
        run_id: Some(run_id.clone()),
        export_png: request.export_png,
        ..SynthesisRequest::default()
    };
    let report = match client.synthesis(&synthesis_request).await {
        Ok(synthesis) => PipelineReport {
            status: PipelineStatus::Completed,
            run_id,
            preprocess,
            persisted_keys,
            synthesis: Some(synthesis),
            synthesis_error: None,
        },
        Err(err) => {
            tracing::warn!(
                target: "driver.pipeline",
                run_id = %run_id,
                error = %err,
                "pipeline_synthesis_failed"
            );
            PipelineReport {
                status: PipelineStatus::Partial,
                run_id,
                preprocess,
                persisted_keys,
                synthesis: None,
                synthesis_error: Some(err),
            }
        }
    };
    Ok(report)
}

fn persisted_keys(preprocess: &Value) -> Vec<String> {
    ["output_key", "processed_png_prefix", "processed_zip_key", "status_key"]
        .iter()
        .filter_map(|field| preprocess.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}
