use medtwin::{
    array::ImageArray,
    transforms::{
        TransformErrorKind, TransformOptions, apply_transforms, denoise, normalize, resample,
        value_range,
    },
};
use ndarray::{ArrayD, IxDyn};

use crate::support::ramp_batch;

fn rank(shape: &[usize]) -> ImageArray {
    ImageArray::F32(ArrayD::zeros(IxDyn(shape)))
}

#[test]
fn given_rank_one_or_four_when_transformed_then_unsupported_rank() {
    for data in [rank(&[8]), rank(&[2, 2, 3, 3])] {
        let denoised = denoise(&data).expect_err("denoise should reject rank");
        let normalized = normalize(&data).expect_err("normalize should reject rank");
        let resampled = resample(&data, 2).expect_err("resample should reject rank");

        for err in [denoised, normalized, resampled] {
            assert_eq!(err.kind, TransformErrorKind::UnsupportedRank);
            assert!(err.message.contains("expected (N,H,W) or (H,W)"));
        }
    }
}

#[test]
fn given_spike_in_flat_image_when_denoised_then_window_mean_spreads_it() {
    let mut image = ArrayD::<f64>::zeros(IxDyn(&[3, 3]));
    image[[1, 1]] = 9.0;

    let denoised = denoise(&ImageArray::F64(image)).expect("denoise should succeed");

    let expected = ArrayD::<f64>::ones(IxDyn(&[3, 3]));
    assert_eq!(denoised, ImageArray::F64(expected));
}

#[test]
fn given_batch_when_denoised_then_images_do_not_bleed_into_each_other() {
    let mut batch = ArrayD::<f64>::zeros(IxDyn(&[2, 3, 3]));
    batch[[0, 1, 1]] = 9.0;

    let denoised = denoise(&ImageArray::F64(batch)).expect("denoise should succeed");

    let values = denoised.to_f64();
    assert!(values.index_axis(ndarray::Axis(0), 0).iter().all(|v| (*v - 1.0).abs() < 1e-12));
    assert!(values.index_axis(ndarray::Axis(0), 1).iter().all(|v| *v == 0.0));
}

#[test]
fn given_u8_input_when_denoised_then_element_type_is_kept() {
    let data = ImageArray::U8(ArrayD::from_elem(IxDyn(&[2, 4, 4]), 7));

    let denoised = denoise(&data).expect("denoise should succeed");

    assert_eq!(denoised, data);
}

#[test]
fn given_batch_when_normalized_then_range_is_unit_and_repeat_is_stable() {
    let data = ImageArray::F32(ramp_batch(3, 4, 4));

    let once = normalize(&data).expect("normalize should succeed");
    let twice = normalize(&once).expect("normalize should succeed");

    assert_eq!(value_range(&once), Some((0.0, 1.0)));
    let drift = once
        .to_f64()
        .iter()
        .zip(twice.to_f64().iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(drift < 1e-6, "drift {drift}");
}

#[test]
fn given_constant_array_when_normalized_then_zeros() {
    let data = ImageArray::I32(ArrayD::from_elem(IxDyn(&[2, 3, 3]), 42));

    let normalized = normalize(&data).expect("normalize should succeed");

    assert_eq!(normalized, ImageArray::F64(ArrayD::zeros(IxDyn(&[2, 3, 3]))));
}

#[test]
fn given_batch_when_resampled_then_every_second_image_is_kept() {
    let five = ImageArray::F32(ramp_batch(5, 2, 2));
    let four = ImageArray::F32(ramp_batch(4, 2, 2));

    let from_five = resample(&five, 2).expect("resample should succeed");
    let from_four = resample(&four, 2).expect("resample should succeed");

    assert_eq!(from_five.shape(), &[3, 2, 2]);
    assert_eq!(from_four.shape(), &[2, 2, 2]);
    let kept = from_five.to_f64();
    assert_eq!(kept[[1, 0, 0]], 8.0);
    assert_eq!(kept[[2, 0, 0]], 16.0);
}

#[test]
fn given_single_image_when_resampled_then_unchanged() {
    let image = ImageArray::F32(ArrayD::from_elem(IxDyn(&[4, 4]), 0.5));

    let resampled = resample(&image, 2).expect("resample should succeed");

    assert_eq!(resampled, image);
}

#[test]
fn given_zero_factor_when_resampled_then_invalid_parameter() {
    let err = resample(&ImageArray::F32(ramp_batch(2, 2, 2)), 0).expect_err("resample should fail");

    assert_eq!(err.kind, TransformErrorKind::InvalidParameter);
}

#[test]
fn given_all_steps_when_applied_then_order_is_denoise_normalize_resample() {
    let options = TransformOptions {
        denoise: true,
        normalize: true,
        resample: true,
    };

    let output = apply_transforms(ImageArray::F32(ramp_batch(5, 4, 4)), options, 2)
        .expect("chain should succeed");

    assert_eq!(output.shape(), &[3, 4, 4]);
    let (min, max) = value_range(&output).expect("output should not be empty");
    assert!(min >= 0.0 && max <= 1.0);
}

#[test]
fn given_no_steps_when_applied_then_data_is_untouched() {
    let data = ImageArray::F32(ramp_batch(2, 3, 3));

    let output =
        apply_transforms(data.clone(), TransformOptions::default(), 2).expect("chain should succeed");

    assert_eq!(output, data);
}
