use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    array::{load_array, save_array},
    config::PipelineConfig,
    preview::{build_preview_archive, store_preview_archive, write_previews_to_prefix},
    run::{
        InputRole, PROCESSED_ARTIFACT, RunLayout, generate_run_id, resolve_source_key,
        validate_run_id,
    },
    stages::{
        error::{
            StageError, input_unreadable, invalid_run_id, output_not_saved, preprocessing_failed,
        },
        request::PreprocessRequest,
        response::StageResponse,
        status::{PreprocessStatus, STATUS_COMPLETED, StageName, best_effort, write_status},
    },
    storage::BlobStore,
    transforms::{TransformOptions, apply_transforms},
};

/// Success body of a preprocess call. Preview and status fields appear only when those
/// side steps were requested and succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessOutcome {
    pub run_id: String,
    pub message: String,
    pub options: TransformOptions,
    pub output_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_png_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_png_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_zip_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_key: Option<String>,
}

pub struct PreprocessStage {
    store: Arc<dyn BlobStore>,
    settings: PipelineConfig,
}

impl PreprocessStage {
    pub fn new(store: Arc<dyn BlobStore>, settings: PipelineConfig) -> Self {
        Self { store, settings }
    }

    pub async fn handle_body(&self, body: &str) -> StageResponse {
        self.handle(PreprocessRequest::from_body(body)).await
    }

    pub async fn handle(&self, request: PreprocessRequest) -> StageResponse {
        self.run(request).await.into()
    }

    pub async fn run(&self, request: PreprocessRequest) -> Result<PreprocessOutcome, StageError> {
        let result = self.execute(request).await;
        if let Err(err) = &result {
            tracing::warn!(
                target: "stages.preprocess",
                kind = ?err.kind,
                error = %err,
                "preprocess_failed"
            );
        }
        result
    }

    async fn execute(&self, request: PreprocessRequest) -> Result<PreprocessOutcome, StageError> {
        let store = self.store.as_ref();
        if let Some(run_id) = request.run_id.as_deref() {
            validate_run_id(run_id).map_err(invalid_run_id)?;
        }

        let source = resolve_source_key(
            request.source_key.as_deref(),
            request.run_id.as_deref(),
            InputRole::Preprocess,
            &self.settings.default_source_key,
        );
        tracing::info!(
            target: "stages.preprocess",
            key = %source.key,
            origin = ?source.origin,
            "preprocess_input_resolved"
        );
        let data = load_array(store, &source.key)
            .await
            .map_err(|err| input_unreadable(&store.object_uri(&source.key), err))?;

        let options = request.transform_options();
        let processed = apply_transforms(data, options, self.settings.resample_factor)
            .map_err(preprocessing_failed)?;

        let layout = RunLayout::new(request.run_id.clone().unwrap_or_else(generate_run_id));
        let run_id = layout.run_id().to_string();
        let output_key = layout.processed_key();
        save_array(store, &processed, &output_key)
            .await
            .map_err(|err| output_not_saved(PROCESSED_ARTIFACT, err))?;
        tracing::info!(
            target: "stages.preprocess",
            run_id = %run_id,
            key = %output_key,
            shape = ?processed.shape(),
            element_type = %processed.element_type(),
            "processed_array_saved"
        );

        let mut status = PreprocessStatus {
            status: STATUS_COMPLETED.to_string(),
            stage: StageName::Preprocess,
            recipe: request.recipe.clone(),
            options,
            source_key: source.key.clone(),
            source_origin: source.origin,
            output_key: output_key.clone(),
            processed_png_prefix: None,
            processed_png_count: None,
            processed_zip_key: None,
        };

        if request.export_png {
            let prefix = layout.processed_png_prefix();
            let written = best_effort(
                "preview_prefix_export",
                &run_id,
                write_previews_to_prefix(store, &processed, &prefix),
            )
            .await;
            if let Some(count) = written {
                status.processed_png_prefix = Some(prefix);
                status.processed_png_count = Some(count);
            }
        }

        if request.export_zip {
            let zip_key = layout.processed_zip_key();
            let stored = best_effort("preview_archive_export", &run_id, async {
                let archive = build_preview_archive(&processed, layout.processed_zip_filename())?;
                store_preview_archive(store, archive, &zip_key).await
            })
            .await;
            if stored.is_some() {
                status.processed_zip_key = Some(zip_key);
            }
        }

        let status_key = layout.status_key();
        let status_written = best_effort(
            "status_write",
            &run_id,
            write_status(store, &status_key, &status),
        )
        .await
        .is_some();

        tracing::info!(
            target: "stages.preprocess",
            run_id = %run_id,
            status_written,
            "preprocess_completed"
        );

        Ok(PreprocessOutcome {
            message: format!(
                "Run {run_id} completed. Output at {}",
                store.object_uri(&output_key)
            ),
            run_id,
            options,
            output_key,
            processed_png_prefix: status.processed_png_prefix,
            processed_png_count: status.processed_png_count,
            processed_zip_key: status.processed_zip_key,
            status_key: status_written.then_some(status_key),
        })
    }
}
