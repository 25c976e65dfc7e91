use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    array::{load_array, save_array},
    config::PipelineConfig,
    preview::{build_preview_archive, store_preview_archive},
    run::{
        DIGITAL_TWIN_ARTIFACT, InputRole, RunLayout, SourceOrigin, generate_run_id,
        resolve_source_key, validate_run_id,
    },
    stages::{
        error::{
            StageError, input_unreadable, invalid_run_id, output_not_saved,
            twin_generation_failed,
        },
        request::SynthesisRequest,
        response::StageResponse,
        status::{
            STATUS_COMPLETED, StageName, SynthesisStatus, best_effort, read_status,
            synthesis_status_document, write_status,
        },
        twin::{generate_twin, twin_rng},
    },
    storage::{BlobStore, error::backend_failure},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisOutcome {
    pub run_id: String,
    pub message: String,
    pub digital_twin_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_twin_zip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_key: Option<String>,
}

pub struct SynthesisStage {
    store: Arc<dyn BlobStore>,
    settings: PipelineConfig,
}

impl SynthesisStage {
    pub fn new(store: Arc<dyn BlobStore>, settings: PipelineConfig) -> Self {
        Self { store, settings }
    }

    pub async fn handle_body(&self, body: &str) -> StageResponse {
        self.handle(SynthesisRequest::from_body(body)).await
    }

    pub async fn handle(&self, request: SynthesisRequest) -> StageResponse {
        self.run(request).await.into()
    }

    pub async fn run(&self, request: SynthesisRequest) -> Result<SynthesisOutcome, StageError> {
        let result = self.execute(request).await;
        if let Err(err) = &result {
            tracing::warn!(
                target: "stages.synthesis",
                kind = ?err.kind,
                error = %err,
                "synthesis_failed"
            );
        }
        result
    }

    async fn execute(&self, request: SynthesisRequest) -> Result<SynthesisOutcome, StageError> {
        let store = self.store.as_ref();
        if let Some(run_id) = request.run_id.as_deref() {
            validate_run_id(run_id).map_err(invalid_run_id)?;
        }

        let source = resolve_source_key(
            request.explicit_key(),
            request.run_id.as_deref(),
            InputRole::Synthesis,
            &self.settings.default_source_key,
        );
        tracing::info!(
            target: "stages.synthesis",
            key = %source.key,
            origin = ?source.origin,
            "synthesis_input_resolved"
        );
        let data = load_array(store, &source.key)
            .await
            .map_err(|err| input_unreadable(&store.object_uri(&source.key), err))?;

        let twin = generate_twin(&data, &mut twin_rng(self.settings.twin_seed))
            .map_err(twin_generation_failed)?;

        let layout = RunLayout::new(request.run_id.clone().unwrap_or_else(generate_run_id));
        let run_id = layout.run_id().to_string();
        let twin_key = layout.digital_twin_key();
        save_array(store, &twin, &twin_key)
            .await
            .map_err(|err| output_not_saved(DIGITAL_TWIN_ARTIFACT, err))?;
        tracing::info!(
            target: "stages.synthesis",
            run_id = %run_id,
            key = %twin_key,
            shape = ?twin.shape(),
            element_type = %twin.element_type(),
            "digital_twin_saved"
        );

        let mut digital_twin_zip = None;
        if request.export_png {
            let zip_key = layout.synthetic_zip_key();
            let stored = best_effort("preview_archive_export", &run_id, async {
                let archive = build_preview_archive(&twin, layout.synthetic_zip_filename())?;
                store_preview_archive(store, archive, &zip_key).await
            })
            .await;
            if stored.is_some() {
                digital_twin_zip = Some(zip_key);
            }
        }

        let status = SynthesisStatus {
            status: STATUS_COMPLETED.to_string(),
            stage: StageName::Synthesis,
            recipe: request.recipe.clone(),
            input_key: request.input_key.clone(),
            source_key: source.key.clone(),
            source_origin: source.origin,
            from_run_id: match source.origin {
                SourceOrigin::InheritedRun => request.run_id.clone(),
                SourceOrigin::Explicit | SourceOrigin::Default => None,
            },
            digital_twin_key: twin_key.clone(),
            digital_twin_zip: digital_twin_zip.clone(),
        };
        let status_key = layout.status_key();
        let prior = best_effort("status_read", &run_id, read_status(store, &status_key))
            .await
            .flatten();
        let status_written = best_effort("status_write", &run_id, async {
            let document = synthesis_status_document(prior, &status).map_err(|err| {
                backend_failure(&status_key, format!("failed to encode status: {err}"))
            })?;
            write_status(store, &status_key, &document).await
        })
        .await
        .is_some();

        tracing::info!(
            target: "stages.synthesis",
            run_id = %run_id,
            status_written,
            "synthesis_completed"
        );

        Ok(SynthesisOutcome {
            message: format!(
                "Generated digital twin for {}. Output at {}",
                source.key,
                store.object_uri(&twin_key)
            ),
            run_id,
            digital_twin_key: twin_key,
            digital_twin_zip,
            status_key: status_written.then_some(status_key),
        })
    }
}
