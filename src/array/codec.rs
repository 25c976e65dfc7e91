use std::io::Cursor;

use ndarray::{ArrayD, IxDyn, OwnedRepr};
use ndarray_npy::{
    NpzReader, ReadNpyError, ReadNpyExt, ReadNpzError, ReadableElement, WriteNpyExt,
};

use crate::{
    array::{
        error::ArrayCodecError,
        types::{ImageArray, with_array},
    },
    storage::{BlobStore, PutOptions, ports::CONTENT_TYPE_OCTET_STREAM},
};

/// Entry names probed, in order, when a key points at a multi-array bundle.
pub const NPZ_IMAGE_KEYS: &[&str] = &["images", "train_images", "val_images", "test_images"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayFormat {
    /// Single self-describing array.
    Npy,
    /// Zip bundle of named arrays.
    Npz,
}

impl ArrayFormat {
    pub fn from_key(key: &str) -> Option<Self> {
        if key.ends_with(".npy") {
            Some(ArrayFormat::Npy)
        } else if key.ends_with(".npz") {
            Some(ArrayFormat::Npz)
        } else {
            None
        }
    }
}

pub async fn load_array(store: &dyn BlobStore, key: &str) -> Result<ImageArray, ArrayCodecError> {
    let format = ArrayFormat::from_key(key).ok_or_else(|| ArrayCodecError::UnsupportedFormat {
        key: key.to_string(),
    })?;
    let body = store.get(key).await?;
    tracing::debug!(
        target: "array.codec",
        key = %key,
        bytes = body.len(),
        format = ?format,
        "array_object_fetched"
    );
    decode_as(format, key, &body)
}

/// Writes `array` as `.npy` under `key` in a single put.
pub async fn save_array(
    store: &dyn BlobStore,
    array: &ImageArray,
    key: &str,
) -> Result<(), ArrayCodecError> {
    let body = encode_npy(array)?;
    store
        .put(
            key,
            body,
            PutOptions::with_content_type(CONTENT_TYPE_OCTET_STREAM),
        )
        .await?;
    Ok(())
}

pub fn decode(key: &str, body: &[u8]) -> Result<ImageArray, ArrayCodecError> {
    let format = ArrayFormat::from_key(key).ok_or_else(|| ArrayCodecError::UnsupportedFormat {
        key: key.to_string(),
    })?;
    decode_as(format, key, body)
}

pub fn encode_npy(array: &ImageArray) -> Result<Vec<u8>, ArrayCodecError> {
    let mut body = Vec::new();
    with_array!(array, inner => inner.write_npy(&mut body))?;
    Ok(body)
}

fn decode_as(format: ArrayFormat, key: &str, body: &[u8]) -> Result<ImageArray, ArrayCodecError> {
    match format {
        ArrayFormat::Npy => decode_npy(key, body),
        ArrayFormat::Npz => decode_npz(key, body),
    }
}

// The element type lives in the npy header; each attempt fails on the descriptor check
// before any payload is read, so probing is cheap.
macro_rules! probe_element_types {
    ($read:ident($($arg:expr),*)) => {
        if let Some(array) = $read::<u8>($($arg),*)? {
            return Ok(ImageArray::U8(array));
        }
        if let Some(array) = $read::<u16>($($arg),*)? {
            return Ok(ImageArray::U16(array));
        }
        if let Some(array) = $read::<i16>($($arg),*)? {
            return Ok(ImageArray::I16(array));
        }
        if let Some(array) = $read::<i32>($($arg),*)? {
            return Ok(ImageArray::I32(array));
        }
        if let Some(array) = $read::<i64>($($arg),*)? {
            return Ok(ImageArray::I64(array));
        }
        if let Some(array) = $read::<f32>($($arg),*)? {
            return Ok(ImageArray::F32(array));
        }
        if let Some(array) = $read::<f64>($($arg),*)? {
            return Ok(ImageArray::F64(array));
        }
    };
}

fn decode_npy(key: &str, body: &[u8]) -> Result<ImageArray, ArrayCodecError> {
    probe_element_types!(read_npy_as(body));
    Err(ArrayCodecError::UnsupportedElementType {
        key: key.to_string(),
    })
}

fn read_npy_as<T: ReadableElement>(body: &[u8]) -> Result<Option<ArrayD<T>>, ArrayCodecError> {
    match ArrayD::<T>::read_npy(Cursor::new(body)) {
        Ok(array) => Ok(Some(array)),
        Err(ReadNpyError::WrongDescriptor(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn decode_npz(key: &str, body: &[u8]) -> Result<ImageArray, ArrayCodecError> {
    let mut bundle = NpzReader::new(Cursor::new(body))?;
    let entries = bundle.names()?;

    let Some(entry) = NPZ_IMAGE_KEYS
        .iter()
        .find_map(|candidate| find_entry(&entries, candidate))
    else {
        return Err(ArrayCodecError::NoRecognizedArray {
            key: key.to_string(),
            candidates: NPZ_IMAGE_KEYS,
        });
    };
    tracing::debug!(target: "array.codec", key = %key, entry = %entry, "npz_entry_selected");

    probe_element_types!(read_npz_entry_as(&mut bundle, &entry));
    Err(ArrayCodecError::UnsupportedElementType {
        key: key.to_string(),
    })
}

fn read_npz_entry_as<T: ReadableElement>(
    bundle: &mut NpzReader<Cursor<&[u8]>>,
    entry: &str,
) -> Result<Option<ArrayD<T>>, ArrayCodecError> {
    match bundle.by_name::<OwnedRepr<T>, IxDyn>(entry) {
        Ok(array) => Ok(Some(array)),
        Err(ReadNpzError::Npy(ReadNpyError::WrongDescriptor(_))) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Bundle entries may be listed with or without numpy's `.npy` suffix.
fn find_entry(entries: &[String], candidate: &str) -> Option<String> {
    entries
        .iter()
        .find(|entry| entry.strip_suffix(".npy").unwrap_or(entry) == candidate)
        .cloned()
}
