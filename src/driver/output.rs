use crate::{
    driver::error::{DriverError, DriverErrorKind},
    run::RunLayout,
    storage::{BlobStore, PutOptions, ports::CONTENT_TYPE_TEXT},
};

pub const CHAT_OUTPUT_FILE: &str = "chat_output.txt";
pub const AGENT_OUTPUT_FILE: &str = "agent_output.txt";

/// Stores `text` as `output/<run_id>/<file_name>` and returns the object's location.
pub async fn save_text_output(
    store: &dyn BlobStore,
    run_id: &str,
    file_name: &str,
    text: &str,
) -> Result<String, DriverError> {
    let key = RunLayout::new(run_id).output_key(file_name);
    store
        .put(
            &key,
            text.as_bytes().to_vec(),
            PutOptions::with_content_type(CONTENT_TYPE_TEXT),
        )
        .await
        .map_err(|err| {
            DriverError::new(
                DriverErrorKind::Storage,
                format!("failed to save output: {err}"),
            )
        })?;

    let uri = store.object_uri(&key);
    tracing::info!(target: "driver.output", run_id = %run_id, key = %key, "text_output_saved");
    Ok(uri)
}
