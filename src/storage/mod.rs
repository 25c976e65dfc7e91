pub mod error;
pub mod filesystem;
pub mod memory;
pub mod ports;

use std::sync::Arc;

use crate::config::StorageConfig;

pub use error::{StorageError, StorageErrorKind};
pub use filesystem::FilesystemBlobStore;
pub use memory::{MemoryBlobStore, StoredObject};
pub use ports::{BlobStore, PutOptions};

/// Opens the backend named by the storage section.
pub fn open_blob_store(config: &StorageConfig) -> Arc<dyn BlobStore> {
    match config {
        StorageConfig::Filesystem { root, bucket } => {
            Arc::new(FilesystemBlobStore::new(root.clone(), bucket.clone()))
        }
        StorageConfig::Memory { bucket } => Arc::new(MemoryBlobStore::new(bucket.clone())),
    }
}
