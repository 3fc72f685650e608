use std::fmt;
use std::str::FromStr;

use ndarray::{Array, Dimension};

use crate::error::{Error, Result};

// DType: output representation of sampled images
//
// Images are stored normalized to [0, 1] as f32 at load time. The dtype only
// decides what happens to a sample on its way out of the dataset:
//
//   Int8: returned untouched; despite the name no re-quantization happens
//   Float32: divided by 255 once more, so values land in [0, 1/255]
//
// Both behaviors are what existing callers observe and are kept as-is.

/// Output dtype selected per dataset instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    #[default]
    Int8,
    Float32,
}

impl DType {
    /// Apply the output transform to a sample (or any array of samples).
    pub fn apply<D: Dimension>(&self, images: Array<f32, D>) -> Array<f32, D> {
        match self {
            DType::Int8 => images,
            DType::Float32 => images / 255.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Int8 => "int8",
            DType::Float32 => "float32",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "int8" => Ok(DType::Int8),
            "float32" => Ok(DType::Float32),
            other => Err(Error::config(format!("unknown dtype: {other}"))),
        }
    }
}
