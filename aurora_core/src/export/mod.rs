//! Versioned serving export.
//!
//! Layout of one export:
//!
//! ```text
//! <model_dir>/<YYYY-mm-dd-HH:MM>/
//!     saved_model.json        signature `serving_default`: ob -> act, stochastic_act
//!     variables/policy.json   the ServingPolicy
//! ```

pub mod serving;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub use serving::{Activation, DenseLayer, ServingPolicy};

use crate::error::{AuroraError, Result};

pub const SAVED_MODEL_FILE: &str = "saved_model.json";
pub const VARIABLES_FILE: &str = "variables/policy.json";
pub const SERVING_SIGNATURE: &str = "serving_default";
pub const PREDICT_METHOD: &str = "tensorflow/serving/predict";
pub const SERVE_TAG: &str = "serve";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub name: String,
    pub dtype: String,
    /// `-1` marks the batch dimension.
    pub shape: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureDef {
    pub inputs: BTreeMap<String, TensorInfo>,
    pub outputs: BTreeMap<String, TensorInfo>,
    pub method_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub format_version: u32,
    pub tags: Vec<String>,
    pub signatures: BTreeMap<String, SignatureDef>,
    pub variables: String,
}

/// Name of the export directory for `now`.
pub fn model_id(now: &DateTime<Local>) -> String {
    now.format("%Y-%m-%d-%H:%M").to_string()
}

fn tensor_info(name: &str, shape: &[usize]) -> TensorInfo {
    let mut dims = vec![-1i64];
    dims.extend(shape.iter().map(|d| *d as i64));
    TensorInfo {
        name: format!("{}:0", name),
        dtype: "DT_FLOAT".to_string(),
        shape: dims,
    }
}

impl SavedModel {
    pub fn for_policy(policy: &ServingPolicy) -> Self {
        let mut inputs = BTreeMap::new();
        inputs.insert("ob".to_string(), tensor_info("ob", &policy.observation_shape));
        let mut outputs = BTreeMap::new();
        outputs.insert("act".to_string(), tensor_info("act", &policy.action_shape));
        outputs.insert(
            "stochastic_act".to_string(),
            tensor_info("stochastic_act", &policy.action_shape),
        );
        let mut signatures = BTreeMap::new();
        signatures.insert(
            SERVING_SIGNATURE.to_string(),
            SignatureDef {
                inputs,
                outputs,
                method_name: PREDICT_METHOD.to_string(),
            },
        );
        Self {
            format_version: FORMAT_VERSION,
            tags: vec![SERVE_TAG.to_string()],
            signatures,
            variables: VARIABLES_FILE.to_string(),
        }
    }
}

/// Writes `policy` into a fresh `<model_dir>/<model_id(now)>` directory and
/// returns its path. An existing directory for the same minute is an error.
pub fn export_policy(model_dir: &Path, policy: &ServingPolicy, now: &DateTime<Local>) -> Result<PathBuf> {
    let export_dir = model_dir.join(model_id(now));
    if export_dir.exists() {
        return Err(AuroraError::Export(format!(
            "export directory {} already exists",
            export_dir.display()
        )));
    }
    let variables = export_dir.join(VARIABLES_FILE);
    if let Some(parent) = variables.parent() {
        fs::create_dir_all(parent)?;
    }

    let saved = SavedModel::for_policy(policy);
    fs::write(export_dir.join(SAVED_MODEL_FILE), serde_json::to_string_pretty(&saved)?)?;
    fs::write(&variables, serde_json::to_string_pretty(policy)?)?;
    tracing::info!("exported serving policy to {}", export_dir.display());
    Ok(export_dir)
}
