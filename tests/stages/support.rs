use std::{io::Cursor, sync::Arc};

use async_trait::async_trait;
use medtwin::{
    array::{ImageArray, save_array},
    config::PipelineConfig,
    storage::{BlobStore, MemoryBlobStore, PutOptions, StorageError, error::backend_failure},
};
use ndarray::{ArrayD, IxDyn};
use ndarray_npy::NpzWriter;

/// Memory store whose puts fail for keys ending in `failing_suffix`.
pub struct FailingPutStore {
    pub inner: MemoryBlobStore,
    failing_suffix: String,
}

impl FailingPutStore {
    pub fn new(failing_suffix: &str) -> Self {
        Self {
            inner: MemoryBlobStore::default(),
            failing_suffix: failing_suffix.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for FailingPutStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        if key.ends_with(&self.failing_suffix) {
            return Err(backend_failure(key, "injected put failure"));
        }
        self.inner.put(key, body, options).await
    }

    fn object_uri(&self, key: &str) -> String {
        self.inner.object_uri(key)
    }
}

pub fn settings() -> PipelineConfig {
    PipelineConfig {
        twin_seed: Some(7),
        ..PipelineConfig::default()
    }
}

pub fn raw_batch() -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(&[4, 6, 6]), |index| {
        ((index[0] * 31 + index[1] * 7 + index[2] * 3) % 50) as f32 + 10.0
    })
}

/// Seeds `raw/x.npz` with a `train_images` entry.
pub async fn seed_raw_bundle(store: &dyn BlobStore) {
    let mut bundle = NpzWriter::new_compressed(Cursor::new(Vec::new()));
    bundle
        .add_array("train_images", &raw_batch())
        .expect("array should be added to bundle");
    let body = bundle
        .finish()
        .expect("bundle should be finalized")
        .into_inner();
    store
        .put("raw/x.npz", body, PutOptions::with_content_type("application/octet-stream"))
        .await
        .expect("raw bundle should be stored");
}

pub async fn seed_array(store: &dyn BlobStore, key: &str, array: ArrayD<f32>) {
    save_array(store, &ImageArray::F32(array), key)
        .await
        .expect("array should be stored");
}

pub fn shared(store: MemoryBlobStore) -> (Arc<MemoryBlobStore>, Arc<dyn BlobStore>) {
    let store = Arc::new(store);
    let dyn_store: Arc<dyn BlobStore> = store.clone();
    (store, dyn_store)
}
