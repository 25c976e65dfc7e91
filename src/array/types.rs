use std::fmt;

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    U8,
    U16,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ElementType {
    pub fn is_float(self) -> bool {
        matches!(self, ElementType::F32 | ElementType::F64)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::U8 => "uint8",
            ElementType::U16 => "uint16",
            ElementType::I16 => "int16",
            ElementType::I32 => "int32",
            ElementType::I64 => "int64",
            ElementType::F32 => "float32",
            ElementType::F64 => "float64",
        };
        f.write_str(name)
    }
}

/// Dense image array with its element type carried at runtime.
///
/// Rank is dynamic so that stored containers round-trip unchanged; the transforms and the
/// preview exporter only accept rank 2 (`H×W`) or rank 3 (`N×H×W`).
#[derive(Debug, Clone, PartialEq)]
pub enum ImageArray {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Applies a shape-level operation to whichever variant is held, keeping the element type.
macro_rules! map_same_type {
    ($value:expr, $array:ident => $body:expr) => {
        match $value {
            ImageArray::U8($array) => ImageArray::U8($body),
            ImageArray::U16($array) => ImageArray::U16($body),
            ImageArray::I16($array) => ImageArray::I16($body),
            ImageArray::I32($array) => ImageArray::I32($body),
            ImageArray::I64($array) => ImageArray::I64($body),
            ImageArray::F32($array) => ImageArray::F32($body),
            ImageArray::F64($array) => ImageArray::F64($body),
        }
    };
}

macro_rules! with_array {
    ($value:expr, $array:ident => $body:expr) => {
        match $value {
            ImageArray::U8($array) => $body,
            ImageArray::U16($array) => $body,
            ImageArray::I16($array) => $body,
            ImageArray::I32($array) => $body,
            ImageArray::I64($array) => $body,
            ImageArray::F32($array) => $body,
            ImageArray::F64($array) => $body,
        }
    };
}

pub(crate) use map_same_type;
pub(crate) use with_array;

impl ImageArray {
    pub fn element_type(&self) -> ElementType {
        match self {
            ImageArray::U8(_) => ElementType::U8,
            ImageArray::U16(_) => ElementType::U16,
            ImageArray::I16(_) => ElementType::I16,
            ImageArray::I32(_) => ElementType::I32,
            ImageArray::I64(_) => ElementType::I64,
            ImageArray::F32(_) => ElementType::F32,
            ImageArray::F64(_) => ElementType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_array!(self, array => array.shape())
    }

    pub fn ndim(&self) -> usize {
        with_array!(self, array => array.ndim())
    }

    pub fn len(&self) -> usize {
        with_array!(self, array => array.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element-wise widening to f64, the working type of every numeric transform.
    pub fn to_f64(&self) -> ArrayD<f64> {
        with_array!(self, array => widen(array.view()))
    }

    /// Casts f64 values into `element_type`. Integer targets saturate; NaN becomes zero.
    pub fn from_f64(values: ArrayD<f64>, element_type: ElementType) -> Self {
        match element_type {
            ElementType::U8 => ImageArray::U8(narrow(values)),
            ElementType::U16 => ImageArray::U16(narrow(values)),
            ElementType::I16 => ImageArray::I16(narrow(values)),
            ElementType::I32 => ImageArray::I32(narrow(values)),
            ElementType::I64 => ImageArray::I64(narrow(values)),
            ElementType::F32 => ImageArray::F32(narrow(values)),
            ElementType::F64 => ImageArray::F64(values),
        }
    }

    pub fn zeros(shape: &[usize], element_type: ElementType) -> Self {
        Self::from_f64(ArrayD::zeros(IxDyn(shape)), element_type)
    }
}

fn widen<T>(array: ArrayViewD<'_, T>) -> ArrayD<f64>
where
    T: AsPrimitive<f64>,
{
    array.mapv(|value| value.as_())
}

fn narrow<T>(values: ArrayD<f64>) -> ArrayD<T>
where
    T: Copy + 'static,
    f64: AsPrimitive<T>,
{
    values.mapv(|value| value.as_())
}

macro_rules! impl_from_array {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<ArrayD<$ty>> for ImageArray {
                fn from(array: ArrayD<$ty>) -> Self {
                    ImageArray::$variant(array)
                }
            }
        )*
    };
}

impl_from_array!(
    u8 => U8,
    u16 => U16,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);
