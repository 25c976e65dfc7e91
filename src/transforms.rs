use std::fmt;

use ndarray::{ArrayD, ArrayView2, ArrayViewMut2, Axis, Ix2, Slice};
use serde::{Deserialize, Serialize};

use crate::array::{
    ElementType, ImageArray,
    types::{map_same_type, with_array},
};

/// Below this spread the normalize divisor is taken as 1.
pub const NORMALIZE_RANGE_EPSILON: f64 = 1e-8;
pub const DEFAULT_RESAMPLE_FACTOR: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    UnsupportedRank,
    InvalidParameter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    pub kind: TransformErrorKind,
    pub message: String,
}

impl TransformError {
    pub fn new(kind: TransformErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransformError {}

pub fn unsupported_rank(operation: &str, ndim: usize) -> TransformError {
    TransformError::new(
        TransformErrorKind::UnsupportedRank,
        format!(
            "unsupported data shape for {operation}: got rank {ndim}, expected (N,H,W) or (H,W)"
        ),
    )
}

pub fn invalid_parameter(message: impl Into<String>) -> TransformError {
    TransformError::new(TransformErrorKind::InvalidParameter, message)
}

/// Rejects anything other than a single image or a batch of images.
pub fn ensure_image_rank(operation: &str, array: &ImageArray) -> Result<(), TransformError> {
    match array.ndim() {
        2 | 3 => Ok(()),
        other => Err(unsupported_rank(operation, other)),
    }
}

/// Which preprocessing steps a request asked for. Serialized verbatim into status records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    pub denoise: bool,
    pub normalize: bool,
    pub resample: bool,
}

/// Runs the requested steps in the fixed order denoise, normalize, resample.
/// The first failure aborts the chain.
pub fn apply_transforms(
    data: ImageArray,
    options: TransformOptions,
    resample_factor: usize,
) -> Result<ImageArray, TransformError> {
    let mut data = data;
    if options.denoise {
        data = denoise(&data)?;
    }
    if options.normalize {
        data = normalize(&data)?;
    }
    if options.resample {
        data = resample(&data, resample_factor)?;
    }
    Ok(data)
}

/// 3×3 mean filter applied to each image on its own. Border samples are repeated outward,
/// which for a 3-wide window is identical to mirror padding. The element type is kept.
pub fn denoise(data: &ImageArray) -> Result<ImageArray, TransformError> {
    ensure_image_rank("denoising", data)?;

    let source = data.to_f64();
    let mut smoothed = ArrayD::<f64>::zeros(source.raw_dim());
    match source.ndim() {
        2 => {
            let image = as_image(source.view())?;
            let target = as_image_mut(smoothed.view_mut())?;
            mean_filter_3x3(image, target);
        }
        _ => {
            for (image, target) in source
                .axis_iter(Axis(0))
                .zip(smoothed.axis_iter_mut(Axis(0)))
            {
                mean_filter_3x3(as_image(image)?, as_image_mut(target)?);
            }
        }
    }

    Ok(ImageArray::from_f64(smoothed, data.element_type()))
}

/// Global min-max rescale of the whole array (not per image) into [0, 1].
///
/// Float inputs keep their width; integer inputs come back as f64.
pub fn normalize(data: &ImageArray) -> Result<ImageArray, TransformError> {
    ensure_image_rank("normalization", data)?;

    let values = data.to_f64();
    let output_type = match data.element_type() {
        ElementType::F32 => ElementType::F32,
        _ => ElementType::F64,
    };
    if values.is_empty() {
        return Ok(ImageArray::from_f64(values, output_type));
    }

    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &value| {
            (lo.min(value), hi.max(value))
        });
    let spread = max - min;
    let denominator = if spread > NORMALIZE_RANGE_EPSILON {
        spread
    } else {
        1.0
    };

    let scaled = values.mapv(|value| (value - min) / denominator);
    Ok(ImageArray::from_f64(scaled, output_type))
}

/// Keeps every `factor`-th image of a batch. A single image has no batch axis and is
/// returned unchanged.
pub fn resample(data: &ImageArray, factor: usize) -> Result<ImageArray, TransformError> {
    ensure_image_rank("resample", data)?;
    if factor == 0 {
        return Err(invalid_parameter("resample factor must be at least 1"));
    }
    if data.ndim() == 2 {
        return Ok(data.clone());
    }

    let step = isize::try_from(factor)
        .map_err(|_| invalid_parameter(format!("resample factor {factor} is too large")))?;
    Ok(map_same_type!(data, array => {
        array.slice_axis(Axis(0), Slice::new(0, None, step)).to_owned()
    }))
}

/// Smallest and largest value of the array, or `None` when it holds no elements.
pub fn value_range(data: &ImageArray) -> Option<(f64, f64)> {
    with_array!(data, array => {
        array.iter().fold(None, |range, value| {
            let value = num_traits::AsPrimitive::<f64>::as_(*value);
            Some(match range {
                None => (value, value),
                Some((lo, hi)) => (f64::min(lo, value), f64::max(hi, value)),
            })
        })
    })
}

fn mean_filter_3x3(image: ArrayView2<'_, f64>, mut target: ArrayViewMut2<'_, f64>) {
    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return;
    }

    for row in 0..height {
        for col in 0..width {
            let mut sum = 0.0;
            for dr in [-1_isize, 0, 1] {
                let r = clamp_index(row, dr, height);
                for dc in [-1_isize, 0, 1] {
                    let c = clamp_index(col, dc, width);
                    sum += image[[r, c]];
                }
            }
            target[[row, col]] = sum / 9.0;
        }
    }
}

fn clamp_index(index: usize, offset: isize, len: usize) -> usize {
    index.saturating_add_signed(offset).min(len - 1)
}

fn as_image(view: ndarray::ArrayViewD<'_, f64>) -> Result<ArrayView2<'_, f64>, TransformError> {
    let ndim = view.ndim();
    view.into_dimensionality::<Ix2>()
        .map_err(|_| unsupported_rank("denoising", ndim))
}

fn as_image_mut(
    view: ndarray::ArrayViewMutD<'_, f64>,
) -> Result<ArrayViewMut2<'_, f64>, TransformError> {
    let ndim = view.ndim();
    view.into_dimensionality::<Ix2>()
        .map_err(|_| unsupported_rank("denoising", ndim))
}
