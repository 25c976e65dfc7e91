use async_trait::async_trait;

use crate::storage::error::StorageError;

pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_PNG: &str = "image/png";
pub const CONTENT_TYPE_ZIP: &str = "application/zip";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// Headers attached to a single `put`. Stores that cannot represent them may drop them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: String,
    pub content_disposition: Option<String>,
}

impl PutOptions {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            content_disposition: None,
        }
    }

    pub fn attachment(content_type: impl Into<String>, filename: &str) -> Self {
        Self {
            content_type: content_type.into(),
            content_disposition: Some(format!("attachment; filename=\"{filename}\"")),
        }
    }
}

/// Key/value object store. Every put replaces the whole object; there is no locking, so
/// concurrent writers to one key resolve as last-writer-wins.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn put(&self, key: &str, body: Vec<u8>, options: PutOptions)
    -> Result<(), StorageError>;

    /// Human-readable location of `key`, used in response messages.
    fn object_uri(&self, key: &str) -> String;
}
