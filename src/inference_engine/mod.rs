//! Inference Engine - model loading and classification adapters
//!
//! ## Responsibilities
//!
//! - Model URL contract (`ModelSource`)
//! - `ModelLoader` / `InferenceEngine` seams used by the session controller
//! - HTTP-backed implementation (`RemoteModelLoader`, `RemoteClassifier`)

mod model_source;
mod remote;
mod types;

pub use model_source::{ModelSource, DEFAULT_MODEL_HOST};
pub use remote::{RemoteClassifier, RemoteModelLoader};
pub use types::{
    ClassifyResponse, InferenceError, ModelLoadError, ModelMetadata, ModelTopology, Prediction,
    WeightsGroup,
};

use image::RgbImage;
use std::future::Future;

/// A loaded model able to classify frames
pub trait InferenceEngine: Send + Sync + 'static {
    /// Number of classes the model was trained on
    fn total_classes(&self) -> usize;

    /// Classify one image, one prediction per class
    fn predict(
        &self,
        image: &RgbImage,
    ) -> impl Future<Output = std::result::Result<Vec<Prediction>, InferenceError>> + Send;
}

/// Fetches a model and produces an engine for it
pub trait ModelLoader: Send + Sync + 'static {
    type Engine: InferenceEngine;

    fn load(
        &self,
        source: &ModelSource,
    ) -> impl Future<Output = std::result::Result<Self::Engine, ModelLoadError>> + Send;
}
