use std::io::Cursor;

use ndarray::{ArrayD, IxDyn};
use ndarray_npy::NpzWriter;

/// Rank-3 f32 batch whose values encode their own position.
pub fn ramp_batch(n: usize, h: usize, w: usize) -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(&[n, h, w]), |index| {
        (index[0] * h * w + index[1] * w + index[2]) as f32
    })
}

/// Builds an `.npz` bundle holding `entries` in order.
pub fn npz_bytes(entries: &[(&str, ArrayD<f32>)]) -> Vec<u8> {
    let mut bundle = NpzWriter::new_compressed(Cursor::new(Vec::new()));
    for (name, array) in entries {
        bundle
            .add_array(name.to_string(), array)
            .expect("array should be added to bundle");
    }
    bundle
        .finish()
        .expect("bundle should be finalized")
        .into_inner()
}
