use std::sync::Arc;

use medtwin::{
    array::load_array,
    stages::{PreprocessStage, SynthesisRequest, SynthesisStage},
    storage::{BlobStore, MemoryBlobStore},
};
use serde_json::{Value, json};

use crate::support::{
    FailingPutStore, raw_batch, seed_array, seed_raw_bundle, settings, shared,
};

async fn status_of(store: &MemoryBlobStore, run_id: &str) -> Value {
    let body = store
        .get(&format!("work/{run_id}/status.json"))
        .await
        .expect("status should exist");
    serde_json::from_slice(&body).expect("status should be json")
}

#[tokio::test]
async fn given_preprocessed_run_when_synthesized_then_twin_inherits_processed_array() {
    let (store, dyn_store) = shared(MemoryBlobStore::default());
    seed_raw_bundle(&*store).await;
    let preprocess = PreprocessStage::new(dyn_store.clone(), settings());
    let synthesis = SynthesisStage::new(dyn_store, settings());

    let first = preprocess
        .handle_body(r#"{"source_key": "raw/x.npz", "normalize": true, "run_id": "run_chain"}"#)
        .await;
    assert_eq!(first.status_code, 200, "body: {}", first.body);

    let second = synthesis.handle_body(r#"{"run_id": "run_chain"}"#).await;

    assert_eq!(second.status_code, 200, "body: {}", second.body);
    assert_eq!(second.run_id(), Some("run_chain"));
    assert_eq!(
        second.body["message"],
        json!(
            "Generated digital twin for work/run_chain/processed.npy. \
             Output at memory://memory/work/run_chain/digital_twin.npy"
        )
    );

    let processed = load_array(&*store, "work/run_chain/processed.npy")
        .await
        .expect("processed should load");
    let twin = load_array(&*store, "work/run_chain/digital_twin.npy")
        .await
        .expect("twin should load");
    assert_eq!(twin.shape(), processed.shape());
    assert_eq!(twin.element_type(), processed.element_type());
    assert_ne!(twin, processed);

    let status = status_of(&*store, "run_chain").await;
    assert_eq!(status["stage"], json!("preprocess"));
    assert_eq!(
        status["options"],
        json!({"denoise": false, "normalize": true, "resample": false})
    );
    let synthesis_status = &status["synthesis"];
    assert_eq!(synthesis_status["stage"], json!("synthesis"));
    assert_eq!(synthesis_status["source_key"], json!("work/run_chain/processed.npy"));
    assert_eq!(synthesis_status["source_origin"], json!("inherited_run"));
    assert_eq!(synthesis_status["from_run_id"], json!("run_chain"));
}

#[tokio::test]
async fn given_explicit_source_and_run_id_when_synthesized_then_explicit_key_wins() {
    let (store, dyn_store) = shared(MemoryBlobStore::default());
    seed_array(&*store, "raw/direct.npy", raw_batch()).await;
    let synthesis = SynthesisStage::new(dyn_store, settings());

    let response = synthesis
        .handle(SynthesisRequest {
            run_id: Some("run_explicit".to_string()),
            source_key: Some("raw/direct.npy".to_string()),
            input_key: Some("raw/ignored.npy".to_string()),
            recipe: json!({"note": "direct"}),
            ..SynthesisRequest::default()
        })
        .await;

    assert_eq!(response.status_code, 200, "body: {}", response.body);
    let status = status_of(&*store, "run_explicit").await;
    assert_eq!(status["source_key"], json!("raw/direct.npy"));
    assert_eq!(status["source_origin"], json!("explicit"));
    assert!(status["from_run_id"].is_null());
    assert_eq!(status["input_key"], json!("raw/ignored.npy"));
    assert_eq!(status["recipe"], json!({"note": "direct"}));
}

#[tokio::test]
async fn given_same_seed_when_synthesized_twice_then_twins_match() {
    let (store, dyn_store) = shared(MemoryBlobStore::default());
    seed_array(&*store, "raw/direct.npy", raw_batch()).await;
    let synthesis = SynthesisStage::new(dyn_store, settings());

    for run_id in ["run_seed_a", "run_seed_b"] {
        let response = synthesis
            .handle(SynthesisRequest {
                run_id: Some(run_id.to_string()),
                input_key: Some("raw/direct.npy".to_string()),
                ..SynthesisRequest::default()
            })
            .await;
        assert_eq!(response.status_code, 200, "body: {}", response.body);
    }

    let a = load_array(&*store, "work/run_seed_a/digital_twin.npy")
        .await
        .expect("first twin should load");
    let b = load_array(&*store, "work/run_seed_b/digital_twin.npy")
        .await
        .expect("second twin should load");
    assert_eq!(a, b);
}

#[tokio::test]
async fn given_unknown_run_when_synthesized_then_bad_request() {
    let (store, dyn_store) = shared(MemoryBlobStore::default());
    let synthesis = SynthesisStage::new(dyn_store, settings());

    let response = synthesis.handle_body(r#"{"run_id": "run_missing"}"#).await;

    assert_eq!(response.status_code, 400);
    assert_eq!(
        response.body["error"],
        json!("Failed to read input from memory://memory/work/run_missing/processed.npy")
    );
    assert!(store.keys_with_prefix("work/").await.is_empty());
}

#[tokio::test]
async fn given_export_png_when_synthesized_then_twin_archive_is_stored() {
    let (store, dyn_store) = shared(MemoryBlobStore::default());
    seed_array(&*store, "raw/direct.npy", raw_batch()).await;
    let synthesis = SynthesisStage::new(dyn_store, settings());

    let response = synthesis
        .handle_body(r#"{"source_key": "raw/direct.npy", "run_id": "run_zip", "export_png": 1}"#)
        .await;

    assert_eq!(response.status_code, 200, "body: {}", response.body);
    let zip_key = response.body["digital_twin_zip"]
        .as_str()
        .expect("zip key should be reported")
        .to_string();
    assert!(zip_key.starts_with("work/run_zip/"));
    let archive = store.object(&zip_key).await.expect("archive should exist");
    assert_eq!(archive.content_type, "application/zip");
    let status = status_of(&*store, "run_zip").await;
    assert_eq!(status["digital_twin_zip"], json!(zip_key));
}

#[tokio::test]
async fn given_twin_write_failure_when_synthesized_then_server_error_and_nothing_written() {
    let store = Arc::new(FailingPutStore::new("digital_twin.npy"));
    seed_array(&store.inner, "raw/direct.npy", raw_batch()).await;
    let synthesis = SynthesisStage::new(store.clone(), settings());

    let response = synthesis
        .handle_body(r#"{"source_key": "raw/direct.npy", "export_png": true}"#)
        .await;

    assert_eq!(response.status_code, 500);
    assert_eq!(response.body["error"], json!("Failed to save digital_twin.npy"));
    assert_eq!(store.inner.keys().await, vec!["raw/direct.npy".to_string()]);
}

#[tokio::test]
async fn given_rank_four_source_when_synthesized_then_generation_failed() {
    let (store, dyn_store) = shared(MemoryBlobStore::default());
    seed_array(
        &*store,
        "raw/volume.npy",
        ndarray::ArrayD::zeros(ndarray::IxDyn(&[1, 2, 3, 3])),
    )
    .await;
    let synthesis = SynthesisStage::new(dyn_store, settings());

    let response = synthesis
        .handle_body(r#"{"source_key": "raw/volume.npy"}"#)
        .await;

    assert_eq!(response.status_code, 500);
    assert_eq!(response.body["error"], json!("Digital twin generation failed"));
    assert!(store.keys_with_prefix("work/").await.is_empty());
}

#[tokio::test]
async fn given_archive_write_failure_when_synthesized_then_success_without_zip_key() {
    let store = Arc::new(FailingPutStore::new("synthetic.zip"));
    seed_array(&store.inner, "raw/direct.npy", raw_batch()).await;
    let synthesis = SynthesisStage::new(store.clone(), settings());

    let response = synthesis
        .handle_body(r#"{"source_key": "raw/direct.npy", "run_id": "run_no_zip", "export_png": true}"#)
        .await;

    assert_eq!(response.status_code, 200, "body: {}", response.body);
    assert!(response.body.get("digital_twin_zip").is_none());
    assert_eq!(response.body["status_key"], json!("work/run_no_zip/status.json"));
    let status = status_of(&store.inner, "run_no_zip").await;
    assert!(status.get("digital_twin_zip").is_none());
}

#[tokio::test]
async fn given_status_write_failure_when_synthesized_then_success_without_status_key() {
    let store = Arc::new(FailingPutStore::new("status.json"));
    seed_array(&store.inner, "raw/direct.npy", raw_batch()).await;
    let synthesis = SynthesisStage::new(store.clone(), settings());

    let response = synthesis
        .handle_body(r#"{"source_key": "raw/direct.npy", "run_id": "run_no_status"}"#)
        .await;

    assert_eq!(response.status_code, 200, "body: {}", response.body);
    assert!(response.body.get("status_key").is_none());
    assert!(
        store
            .inner
            .object("work/run_no_status/digital_twin.npy")
            .await
            .is_some()
    );
}
