use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    NotFound,
    InvalidKey,
    Backend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub key: String,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StorageErrorKind::NotFound
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (key={})", self.message, self.key)
    }
}

impl std::error::Error for StorageError {}

pub fn not_found(key: impl Into<String>) -> StorageError {
    StorageError::new(StorageErrorKind::NotFound, key, "object does not exist")
}

pub fn invalid_key(key: impl Into<String>, message: impl Into<String>) -> StorageError {
    StorageError::new(StorageErrorKind::InvalidKey, key, message)
}

pub fn backend_failure(key: impl Into<String>, message: impl Into<String>) -> StorageError {
    StorageError::new(StorageErrorKind::Backend, key, message)
}
