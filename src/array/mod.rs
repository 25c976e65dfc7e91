pub mod codec;
pub mod error;
pub mod types;

pub use codec::{ArrayFormat, NPZ_IMAGE_KEYS, decode, encode_npy, load_array, save_array};
pub use error::ArrayCodecError;
pub use types::{ElementType, ImageArray};
