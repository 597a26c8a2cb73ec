use serde::{Deserialize, Serialize};

use crate::error::IntegrityWarning;
use crate::lib::Vec;

/// Samples reconstructed from one Steim-compressed block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedTrace {
    /// Always exactly the requested number of samples.
    pub samples: Vec<i32>,
    /// Forward integration constant (X0): the first sample, stored verbatim.
    pub forward: i32,
    /// Reverse integration constant (Xn): the expected last sample.
    pub reverse: i32,
    /// Problems met while decoding. Samples are best-effort when non-empty.
    pub warnings: Vec<IntegrityWarning>,
}

impl DecodedTrace {
    /// True when no warnings were raised and the last sample equals Xn.
    pub fn is_intact(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// A decoded sample vector as handed downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", content = "Values")]
pub enum Samples {
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Default for Samples {
    fn default() -> Self {
        Self::I32(Vec::new())
    }
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::I32(v) => v.len(),
            Samples::F32(v) => v.len(),
            Samples::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widens every sample to `f64`, the working type of the decimation cascade.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            Samples::I32(v) => v.iter().map(|&x| x as f64).collect(),
            Samples::F32(v) => v.iter().map(|&x| x as f64).collect(),
            Samples::F64(v) => v.clone(),
        }
    }
}
