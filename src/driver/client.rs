use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::Serialize;
use serde_json::Value;

use crate::{
    config::PipelineConfig,
    driver::error::{
        DriverError, map_http_error, protocol_violation, stage_rejected, upstream_failure,
    },
    stages::{PreprocessRequest, PreprocessStage, StageResponse, SynthesisRequest, SynthesisStage},
    storage::BlobStore,
};

/// Calls the two stages and returns their success bodies. A stage error body comes back
/// as a `StageRejected` error carrying that body.
#[async_trait]
pub trait StageClient: Send + Sync {
    async fn preprocess(&self, request: &PreprocessRequest) -> Result<Value, DriverError>;

    async fn synthesis(&self, request: &SynthesisRequest) -> Result<Value, DriverError>;
}

/// Runs the stages inside this process against the configured store.
pub struct InProcessStageClient {
    preprocess: PreprocessStage,
    synthesis: SynthesisStage,
}

impl InProcessStageClient {
    pub fn new(store: Arc<dyn BlobStore>, settings: PipelineConfig) -> Self {
        Self {
            preprocess: PreprocessStage::new(Arc::clone(&store), settings.clone()),
            synthesis: SynthesisStage::new(store, settings),
        }
    }
}

#[async_trait]
impl StageClient for InProcessStageClient {
    async fn preprocess(&self, request: &PreprocessRequest) -> Result<Value, DriverError> {
        into_body("preprocess", self.preprocess.handle(request.clone()).await)
    }

    async fn synthesis(&self, request: &SynthesisRequest) -> Result<Value, DriverError> {
        into_body("synthesis", self.synthesis.handle(request.clone()).await)
    }
}

fn into_body(stage: &str, response: StageResponse) -> Result<Value, DriverError> {
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(stage_rejected(stage, response.status_code, response.body))
    }
}

/// Calls deployed stages with `POST <api_base>/preprocess` and `POST <api_base>/synthesis`.
#[derive(Clone)]
pub struct HttpStageClient {
    client: Client,
    api_base: String,
    timeout: Duration,
}

impl HttpStageClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .pool_idle_timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client must build"),
            api_base: api_base.into(),
            timeout,
        }
    }

    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }

    async fn post<T: Serialize + Sync>(
        &self,
        stage: &str,
        path: &str,
        payload: &T,
    ) -> Result<Value, DriverError> {
        let url = self.endpoint_url(path);
        tracing::debug!(target: "driver.http", stage, url = %url, "stage_request_start");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|err| upstream_failure(format!("{stage} request to {url} failed: {err}")))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| upstream_failure(format!("failed to read {stage} response: {err}")))?;
        tracing::debug!(
            target: "driver.http",
            stage,
            status,
            body_bytes = text.len(),
            "stage_request_done"
        );

        let body = serde_json::from_str::<Value>(&text);
        match (status, body) {
            (200..=299, Ok(body)) => Ok(body),
            (200..=299, Err(err)) => Err(protocol_violation(format!(
                "{stage} returned a non-JSON body: {err}"
            ))),
            (_, Ok(body)) => Err(stage_rejected(stage, status, body)),
            (_, Err(_)) => Err(map_http_error(stage, status, &text)),
        }
    }
}

#[async_trait]
impl StageClient for HttpStageClient {
    async fn preprocess(&self, request: &PreprocessRequest) -> Result<Value, DriverError> {
        self.post("preprocess", "/preprocess", request).await
    }

    async fn synthesis(&self, request: &SynthesisRequest) -> Result<Value, DriverError> {
        self.post("synthesis", "/synthesis", request).await
    }
}
