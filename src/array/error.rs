use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ArrayCodecError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("unsupported input format for '{key}'; expected .npy or .npz")]
    UnsupportedFormat { key: String },
    #[error("could not find any of {candidates:?} in {key}")]
    NoRecognizedArray {
        key: String,
        candidates: &'static [&'static str],
    },
    #[error("stored array in '{key}' has an unsupported element type")]
    UnsupportedElementType { key: String },
    #[error("failed to decode npy data: {0}")]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),
    #[error("failed to decode npz bundle: {0}")]
    ReadNpz(#[from] ndarray_npy::ReadNpzError),
    #[error("failed to encode npy data: {0}")]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),
}
