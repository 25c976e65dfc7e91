use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::storage::{
    error::{StorageError, backend_failure, invalid_key, not_found},
    ports::{BlobStore, PutOptions},
};

/// Blob store rooted at a local directory. Each bucket is a directory below `root` and
/// keys map to relative paths inside it.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    root: PathBuf,
    bucket: String,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.trim().is_empty() {
            return Err(invalid_key(key, "object key cannot be empty"));
        }

        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(invalid_key(key, "object key cannot contain '..'"));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid_key(key, "object key must be relative"));
                }
            }
        }

        Ok(self.bucket_dir().join(relative))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(body) => Ok(body),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(not_found(key)),
            Err(err) => Err(backend_failure(
                key,
                format!("failed to read '{}': {err}", path.display()),
            )),
        }
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        let parent = path.parent().ok_or_else(|| {
            invalid_key(key, format!("object path '{}' has no parent", path.display()))
        })?;
        fs::create_dir_all(parent).await.map_err(|err| {
            backend_failure(
                key,
                format!("failed to create directory '{}': {err}", parent.display()),
            )
        })?;

        // Readers never observe a half-written object: write aside, then rename over.
        let tmp_path = parent.join(format!(".{}.tmp", Uuid::new_v4().simple()));
        if let Err(err) = write_aside(&tmp_path, &body).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(backend_failure(
                key,
                format!("failed to write temp file '{}': {err}", tmp_path.display()),
            ));
        }

        if let Err(err) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(backend_failure(
                key,
                format!(
                    "failed to replace '{}' from '{}': {err}",
                    path.display(),
                    tmp_path.display()
                ),
            ));
        }

        tracing::debug!(
            target: "storage.filesystem",
            key = %key,
            bytes = body.len(),
            content_type = %options.content_type,
            content_disposition = options.content_disposition.as_deref().unwrap_or("-"),
            "object_written_headers_not_persisted"
        );
        Ok(())
    }

    fn object_uri(&self, key: &str) -> String {
        format!("file://{}", self.bucket_dir().join(key).display())
    }
}

async fn write_aside(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(body).await?;
    file.sync_all().await
}
