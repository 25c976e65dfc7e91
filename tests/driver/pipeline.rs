use std::{io::Cursor, sync::Arc};

use async_trait::async_trait;
use medtwin::{
    config::PipelineConfig,
    driver::{
        DriverError, DriverErrorKind, InProcessStageClient, PipelineRequest, PipelineStatus,
        StageClient, run_pipeline,
    },
    stages::{PreprocessRequest, SynthesisRequest},
    storage::{BlobStore, MemoryBlobStore, PutOptions},
};
use ndarray::{ArrayD, IxDyn};
use ndarray_npy::NpzWriter;
use serde_json::{Value, json};
use tokio::sync::Mutex;

/// Replays fixed stage answers and records what it was asked.
struct ScriptedStageClient {
    preprocess: Result<Value, DriverError>,
    synthesis: Result<Value, DriverError>,
    synthesis_calls: Mutex<Vec<SynthesisRequest>>,
}

impl ScriptedStageClient {
    fn new(preprocess: Result<Value, DriverError>, synthesis: Result<Value, DriverError>) -> Self {
        Self {
            preprocess,
            synthesis,
            synthesis_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StageClient for ScriptedStageClient {
    async fn preprocess(&self, _request: &PreprocessRequest) -> Result<Value, DriverError> {
        self.preprocess.clone()
    }

    async fn synthesis(&self, request: &SynthesisRequest) -> Result<Value, DriverError> {
        self.synthesis_calls.lock().await.push(request.clone());
        self.synthesis.clone()
    }
}

fn preprocess_body() -> Value {
    json!({
        "run_id": "run_saga",
        "message": "Run run_saga completed.",
        "output_key": "work/run_saga/processed.npy",
        "processed_zip_key": "work/run_saga/processed_preproc.zip",
        "status_key": "work/run_saga/status.json",
    })
}

fn request() -> PipelineRequest {
    PipelineRequest {
        input_key: "raw/x.npz".to_string(),
        normalize: true,
        export_zip: true,
        ..PipelineRequest::default()
    }
}

#[tokio::test]
async fn given_both_stages_succeed_when_pipeline_runs_then_completed_and_scoped_to_run() {
    let client = ScriptedStageClient::new(
        Ok(preprocess_body()),
        Ok(json!({"run_id": "run_saga", "digital_twin_key": "work/run_saga/digital_twin.npy"})),
    );

    let report = run_pipeline(&client, &request())
        .await
        .expect("pipeline should succeed");

    assert_eq!(report.status, PipelineStatus::Completed);
    assert_eq!(report.run_id, "run_saga");
    assert!(report.synthesis_error.is_none());
    let calls = client.synthesis_calls.lock().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].run_id.as_deref(), Some("run_saga"));
    assert!(calls[0].source_key.is_none());
}

#[tokio::test]
async fn given_synthesis_fails_when_pipeline_runs_then_partial_with_persisted_keys() {
    let rejection = DriverError::new(DriverErrorKind::StageRejected, "synthesis failed")
        .with_status_code(500);
    let client = ScriptedStageClient::new(Ok(preprocess_body()), Err(rejection.clone()));

    let report = run_pipeline(&client, &request())
        .await
        .expect("partial pipeline is still a report");

    assert_eq!(report.status, PipelineStatus::Partial);
    assert_eq!(report.synthesis_error, Some(rejection));
    assert!(report.synthesis.is_none());
    assert_eq!(
        report.persisted_keys,
        vec![
            "work/run_saga/processed.npy".to_string(),
            "work/run_saga/processed_preproc.zip".to_string(),
            "work/run_saga/status.json".to_string(),
        ]
    );
    let encoded = serde_json::to_value(&report).expect("report should serialize");
    assert_eq!(encoded["status"], json!("partial"));
}

#[tokio::test]
async fn given_preprocess_fails_when_pipeline_runs_then_error_and_no_synthesis() {
    let rejection = DriverError::new(DriverErrorKind::StageRejected, "preprocess failed")
        .with_status_code(400);
    let client = ScriptedStageClient::new(Err(rejection.clone()), Ok(json!({})));

    let err = run_pipeline(&client, &request())
        .await
        .expect_err("pipeline should fail");

    assert_eq!(err, rejection);
    assert!(client.synthesis_calls.lock().await.is_empty());
}

#[tokio::test]
async fn given_preprocess_body_without_run_id_when_pipeline_runs_then_protocol_violation() {
    let client = ScriptedStageClient::new(Ok(json!({"message": "ok"})), Ok(json!({})));

    let err = run_pipeline(&client, &request())
        .await
        .expect_err("pipeline should fail");

    assert_eq!(err.kind, DriverErrorKind::ProtocolViolation);
}

#[tokio::test]
async fn given_memory_store_when_pipeline_runs_in_process_then_both_artifacts_share_the_run() {
    let store = Arc::new(MemoryBlobStore::default());
    let mut bundle = NpzWriter::new_compressed(Cursor::new(Vec::new()));
    let images = ArrayD::from_shape_fn(IxDyn(&[3, 5, 5]), |index| {
        (index[0] * 25 + index[1] * 5 + index[2]) as f64
    });
    bundle
        .add_array("images", &images)
        .expect("array should be added to bundle");
    let body = bundle
        .finish()
        .expect("bundle should be finalized")
        .into_inner();
    store
        .put("raw/x.npz", body, PutOptions::with_content_type("application/octet-stream"))
        .await
        .expect("raw bundle should be stored");
    let client = InProcessStageClient::new(
        store.clone(),
        PipelineConfig {
            twin_seed: Some(11),
            ..PipelineConfig::default()
        },
    );

    let report = run_pipeline(&client, &request())
        .await
        .expect("pipeline should succeed");

    assert_eq!(report.status, PipelineStatus::Completed, "{report:?}");
    let run_id = report.run_id.clone();
    for artifact in ["processed.npy", "digital_twin.npy", "status.json", "processed_preproc.zip"] {
        let key = format!("work/{run_id}/{artifact}");
        assert!(store.object(&key).await.is_some(), "missing {key}");
    }
    let status: Value = serde_json::from_slice(
        &store
            .get(&format!("work/{run_id}/status.json"))
            .await
            .expect("status should exist"),
    )
    .expect("status should be json");
    assert_eq!(status["stage"], json!("preprocess"));
    assert_eq!(
        status["options"],
        json!({"denoise": false, "normalize": true, "resample": false})
    );
    assert_eq!(
        status["processed_zip_key"],
        json!(format!("work/{run_id}/processed_preproc.zip"))
    );
    assert_eq!(status["synthesis"]["stage"], json!("synthesis"));
    assert_eq!(
        status["synthesis"]["digital_twin_key"],
        json!(format!("work/{run_id}/digital_twin.npy"))
    );
    assert!(
        report
            .persisted_keys
            .contains(&format!("work/{run_id}/status.json"))
    );
}

#[tokio::test]
async fn given_missing_input_when_pipeline_runs_in_process_then_stage_rejected_with_body() {
    let store = Arc::new(MemoryBlobStore::default());
    let client = InProcessStageClient::new(store.clone(), PipelineConfig::default());

    let err = run_pipeline(&client, &request())
        .await
        .expect_err("pipeline should fail");

    assert_eq!(err.kind, DriverErrorKind::StageRejected);
    assert_eq!(err.status_code, Some(400));
    assert!(err.body.as_ref().is_some_and(|body| body.get("error").is_some()));
    assert!(store.keys().await.is_empty());
}
