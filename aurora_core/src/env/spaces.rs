// Observation / action space descriptors, displayed the way gym prints them
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl Dtype {
    pub fn name(&self) -> &'static str {
        match self {
            Dtype::Int32 => "int32",
            Dtype::Uint32 => "uint32",
            Dtype::Float32 => "float32",
            Dtype::Float64 => "float64",
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Space {
    Box {
        low: Vec<f32>,
        high: Vec<f32>,
        shape: Vec<usize>,
        dtype: Dtype,
    },
    Discrete {
        n: usize,
    },
}

impl Space {
    /// Box space whose bounds are the same scalar for every element.
    pub fn uniform_box(low: f32, high: f32, shape: Vec<usize>, dtype: Dtype) -> Self {
        let len = shape.iter().product();
        Space::Box {
            low: vec![low; len],
            high: vec![high; len],
            shape,
            dtype,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            Space::Box { shape, .. } => shape.clone(),
            Space::Discrete { .. } => Vec::new(),
        }
    }

    /// Number of scalars in one flattened sample.
    pub fn flat_dim(&self) -> usize {
        match self {
            Space::Box { shape, .. } => shape.iter().product(),
            Space::Discrete { .. } => 1,
        }
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Space::Box { dtype, .. } => *dtype,
            Space::Discrete { .. } => Dtype::Int32,
        }
    }

    /// Clamps `values` element-wise into the box bounds. Discrete spaces are
    /// clamped into `0..n`.
    pub fn clip(&self, values: &mut [f32]) {
        match self {
            Space::Box { low, high, .. } => {
                for (i, v) in values.iter_mut().enumerate() {
                    if let (Some(lo), Some(hi)) = (low.get(i), high.get(i)) {
                        *v = v.clamp(*lo, *hi);
                    }
                }
            }
            Space::Discrete { n } => {
                let max = n.saturating_sub(1) as f32;
                for v in values.iter_mut() {
                    *v = v.round().clamp(0.0, max);
                }
            }
        }
    }

    pub fn bounds(&self) -> Option<(&[f32], &[f32])> {
        match self {
            Space::Box { low, high, .. } => Some((low.as_slice(), high.as_slice())),
            Space::Discrete { .. } => None,
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Box { shape, .. } => {
                let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
                if dims.len() == 1 {
                    write!(f, "Box({},)", dims[0])
                } else {
                    write!(f, "Box({})", dims.join(", "))
                }
            }
            Space::Discrete { n } => write!(f, "Discrete({})", n),
        }
    }
}
