use std::io::{Cursor, Write};

use ndarray::{Array2, ArrayD, ArrayView2, Axis, Ix2};
use thiserror::Error;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::{
    array::ImageArray,
    storage::{
        BlobStore, PutOptions, StorageError,
        ports::{CONTENT_TYPE_PNG, CONTENT_TYPE_ZIP},
    },
    transforms::{TransformError, ensure_image_rank},
};

/// Upper bound on rendered previews, whatever the batch size.
pub const MAX_PREVIEW_IMAGES: usize = 32;

/// Per-image spreads below this render as if the divisor were 1.
const PREVIEW_RANGE_EPSILON: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Rank(#[from] TransformError),
    #[error("failed to encode png: {0}")]
    Png(#[from] png::EncodingError),
    #[error("failed to build zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to write archive entry: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// In-memory archive of rendered previews plus the filename browsers should save it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewArchive {
    pub bytes: Vec<u8>,
    pub suggested_filename: String,
    pub entry_count: usize,
}

/// Name of the `index`-th preview inside a prefix or archive.
pub fn preview_entry_name(index: usize) -> String {
    format!("{index:04}.png")
}

/// Maps one image to 8-bit grey levels using that image's own min and max.
pub fn to_uint8(image: ArrayView2<'_, f64>) -> Array2<u8> {
    if image.is_empty() {
        return Array2::zeros(image.raw_dim());
    }

    let (min, max) = image
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &value| {
            (lo.min(value), hi.max(value))
        });
    let spread = max - min;
    let denominator = if spread > PREVIEW_RANGE_EPSILON {
        spread
    } else {
        1.0
    };

    image.mapv(|value| ((value - min) / denominator * 255.0).clamp(0.0, 255.0) as u8)
}

/// Encodes one grayscale image as PNG.
pub fn encode_png(image: &Array2<u8>) -> Result<Vec<u8>, PreviewError> {
    let (height, width) = image.dim();
    let pixels: Vec<u8> = image.iter().copied().collect();

    let mut body = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut body, width as u32, height as u32);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&pixels)?;
        writer.finish()?;
    }
    Ok(body)
}

/// Renders at most [`MAX_PREVIEW_IMAGES`] PNGs from a rank-2 or rank-3 array, in batch
/// order.
pub fn render_previews(data: &ImageArray) -> Result<Vec<Vec<u8>>, PreviewError> {
    ensure_image_rank("preview export", data)?;

    let values = data.to_f64();
    let batch = as_batch(values);
    let count = batch.len_of(Axis(0)).min(MAX_PREVIEW_IMAGES);

    let mut rendered = Vec::with_capacity(count);
    for image in batch.axis_iter(Axis(0)).take(count) {
        let image = image
            .into_dimensionality::<Ix2>()
            .map_err(|_| crate::transforms::unsupported_rank("preview export", data.ndim()))?;
        rendered.push(encode_png(&to_uint8(image))?);
    }
    Ok(rendered)
}

/// Writes each preview as `<prefix>0000.png`, `<prefix>0001.png`, … and returns how many
/// were written. `prefix` is used verbatim, so callers include the trailing `/`.
pub async fn write_previews_to_prefix(
    store: &dyn BlobStore,
    data: &ImageArray,
    prefix: &str,
) -> Result<usize, PreviewError> {
    let rendered = render_previews(data)?;
    let count = rendered.len();
    for (index, body) in rendered.into_iter().enumerate() {
        let key = format!("{prefix}{}", preview_entry_name(index));
        store
            .put(&key, body, PutOptions::with_content_type(CONTENT_TYPE_PNG))
            .await?;
    }

    tracing::debug!(target: "preview", prefix = %prefix, count, "preview_prefix_written");
    Ok(count)
}

/// Builds one deflate-compressed zip holding the same numbered previews.
pub fn build_preview_archive(
    data: &ImageArray,
    suggested_filename: impl Into<String>,
) -> Result<PreviewArchive, PreviewError> {
    let rendered = render_previews(data)?;
    let entry_count = rendered.len();

    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (index, body) in rendered.iter().enumerate() {
        archive.start_file(preview_entry_name(index), options)?;
        archive.write_all(body)?;
    }
    let bytes = archive.finish()?.into_inner();

    Ok(PreviewArchive {
        bytes,
        suggested_filename: suggested_filename.into(),
        entry_count,
    })
}

/// Stores an archive under `key`, tagged for download as its suggested filename.
pub async fn store_preview_archive(
    store: &dyn BlobStore,
    archive: PreviewArchive,
    key: &str,
) -> Result<(), PreviewError> {
    let options = PutOptions::attachment(CONTENT_TYPE_ZIP, &archive.suggested_filename);
    store.put(key, archive.bytes, options).await?;
    tracing::debug!(
        target: "preview",
        key = %key,
        entries = archive.entry_count,
        "preview_archive_written"
    );
    Ok(())
}

fn as_batch(values: ArrayD<f64>) -> ArrayD<f64> {
    if values.ndim() == 2 {
        values.insert_axis(Axis(0))
    } else {
        values
    }
}
