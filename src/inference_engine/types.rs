//! Inference engine types

use serde::{Deserialize, Serialize};

/// One class probability from the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "className")]
    pub label: String,
    pub probability: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Why a model could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelLoadError {
    #[error("model not found: {0}")]
    NotFound(String),

    /// Model exists but is not publicly readable
    #[error("model access denied: {0}")]
    AccessDenied(String),

    #[error("network error: {0}")]
    Network(String),

    /// model.json is present but its weight shards are not
    #[error("model weights not accessible: {0}")]
    MissingWeights(String),

    #[error("malformed model files: {0}")]
    Malformed(String),
}

impl ModelLoadError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ModelLoadError::NotFound(_) => {
                "Model not found. Please check that the model URL is correct and the model is publicly shared."
            }
            ModelLoadError::AccessDenied(_) => {
                "CORS error: The model cannot be loaded due to cross-origin restrictions. The model may not be publicly accessible."
            }
            ModelLoadError::Network(_) => {
                "Network error: Please check your internet connection and try again."
            }
            ModelLoadError::MissingWeights(_) => {
                "Model weights file not accessible. The model may not be properly exported or shared."
            }
            ModelLoadError::Malformed(_) => "Failed to load model.",
        }
    }
}

/// Inference call failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    /// The call failed; the engine itself is still usable
    #[error("inference failed: {0}")]
    Failed(String),

    /// The engine cannot serve further calls
    #[error("inference engine unavailable: {0}")]
    EngineUnavailable(String),
}

impl InferenceError {
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, InferenceError::EngineUnavailable(_))
    }
}

/// Subset of metadata.json
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub image_size: Option<u32>,

    #[serde(default)]
    pub model_name: Option<String>,

    #[serde(default)]
    pub tfjs_version: Option<String>,
}

/// Subset of model.json
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelTopology {
    #[serde(default)]
    pub format: Option<String>,

    #[serde(default)]
    pub weights_manifest: Vec<WeightsGroup>,
}

impl ModelTopology {
    pub fn first_shard(&self) -> Option<&str> {
        self.weights_manifest
            .iter()
            .flat_map(|group| group.paths.iter())
            .map(String::as_str)
            .next()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsGroup {
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Response of the classification backend
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyResponse {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}
