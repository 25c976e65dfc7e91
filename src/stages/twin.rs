use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};

use crate::{
    array::ImageArray,
    transforms::{TransformError, ensure_image_rank, invalid_parameter},
};

/// Standard deviations are floored here so flat images still get sampled noise.
pub const TWIN_STD_FLOOR: f64 = 1e-6;

pub fn twin_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Draws a synthetic array of the same shape and element type: every sample of an image
/// comes from a Gaussian with that image's mean and population standard deviation.
pub fn generate_twin<R: Rng + ?Sized>(
    data: &ImageArray,
    rng: &mut R,
) -> Result<ImageArray, TransformError> {
    ensure_image_rank("digital twin generation", data)?;

    let source = data.to_f64();
    let mut twin = ArrayD::<f64>::zeros(source.raw_dim());
    if source.ndim() == 2 {
        sample_like(source.view(), twin.view_mut(), rng)?;
    } else {
        for (image, target) in source.axis_iter(Axis(0)).zip(twin.axis_iter_mut(Axis(0))) {
            sample_like(image, target, rng)?;
        }
    }

    Ok(ImageArray::from_f64(twin, data.element_type()))
}

fn sample_like<R: Rng + ?Sized>(
    image: ArrayViewD<'_, f64>,
    mut target: ArrayViewMutD<'_, f64>,
    rng: &mut R,
) -> Result<(), TransformError> {
    let Some((mean, std)) = moments(image) else {
        return Ok(());
    };

    let distribution = Normal::new(mean, std.max(TWIN_STD_FLOOR)).map_err(|err| {
        invalid_parameter(format!(
            "cannot sample from mean {mean} and standard deviation {std}: {err}"
        ))
    })?;
    for value in target.iter_mut() {
        *value = distribution.sample(rng);
    }
    Ok(())
}

/// Mean and population standard deviation, or `None` for an empty image.
fn moments(image: ArrayViewD<'_, f64>) -> Option<(f64, f64)> {
    let count = image.len();
    if count == 0 {
        return None;
    }

    let mean = image.sum() / count as f64;
    let variance = image.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / count as f64;
    Some((mean, variance.sqrt()))
}
