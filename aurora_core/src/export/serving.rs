//! Training-library independent policy for serving.
//!
//! A [`ServingPolicy`] is plain dense layers plus the Gaussian `log_std`, so a
//! serving process can evaluate `act` and `stochastic_act` with nothing but
//! `serde` and arithmetic.

use std::fs;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::gaussian;
use crate::error::{AuroraError, Result};
use crate::export::{SavedModel, SAVED_MODEL_FILE, SERVING_SIGNATURE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Tanh,
    Identity,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Identity => x,
        }
    }
}

/// Dense layer with row-major weights `[in][out]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    /// Builds a layer from a flat `[in * out]` weight buffer.
    pub fn from_flat(weights: &[f32], in_features: usize, bias: Vec<f32>, activation: Activation) -> Result<Self> {
        let out_features = bias.len();
        if weights.len() != in_features * out_features {
            return Err(AuroraError::Export(format!(
                "weight buffer of {} values does not fit a {}x{} layer",
                weights.len(),
                in_features,
                out_features
            )));
        }
        let weights = weights.chunks(out_features.max(1)).map(|row| row.to_vec()).collect();
        Ok(Self {
            weights,
            bias,
            activation,
        })
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut out = self.bias.clone();
        for (x, row) in input.iter().zip(&self.weights) {
            for (o, w) in out.iter_mut().zip(row) {
                *o += x * w;
            }
        }
        for o in out.iter_mut() {
            *o = self.activation.apply(*o);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServingPolicy {
    pub layers: Vec<DenseLayer>,
    pub log_std: Vec<f32>,
    pub observation_shape: Vec<usize>,
    pub action_shape: Vec<usize>,
    pub action_low: Vec<f32>,
    pub action_high: Vec<f32>,
}

impl ServingPolicy {
    /// Loads the policy from an export directory written by
    /// [`crate::export::export_policy`].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let saved: SavedModel = serde_json::from_str(&fs::read_to_string(dir.join(SAVED_MODEL_FILE))?)?;
        let signature = saved.signatures.get(SERVING_SIGNATURE).ok_or_else(|| {
            AuroraError::Export(format!("{} has no {} signature", dir.display(), SERVING_SIGNATURE))
        })?;
        if !signature.inputs.contains_key("ob") {
            return Err(AuroraError::Export("serving signature has no `ob` input".into()));
        }
        let policy: ServingPolicy = serde_json::from_str(&fs::read_to_string(dir.join(&saved.variables))?)?;
        Ok(policy)
    }

    pub fn input_size(&self) -> usize {
        self.observation_shape.iter().product()
    }

    /// Deterministic action: the policy mean.
    pub fn act(&self, ob: &[f32]) -> Result<Vec<f32>> {
        if ob.len() != self.input_size() {
            return Err(AuroraError::Export(format!(
                "observation has {} values, policy expects {}",
                ob.len(),
                self.input_size()
            )));
        }
        let mut x = ob.to_vec();
        for layer in &self.layers {
            x = layer.forward(&x);
        }
        Ok(x)
    }

    /// Action sampled around the mean with the learned standard deviation.
    pub fn stochastic_act<R: Rng>(&self, ob: &[f32], rng: &mut R) -> Result<Vec<f32>> {
        let mean = self.act(ob)?;
        Ok(gaussian::sample(&mean, &self.log_std, rng))
    }
}
