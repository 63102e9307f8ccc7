//! HTTP-backed model loader and classifier
//!
//! The loader checks that the hosted model is actually usable (topology,
//! first weights shard, class labels). Classification itself is delegated to
//! an inference backend that receives the frame as a JPEG multipart upload.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::types::{ClassifyResponse, ModelMetadata, ModelTopology};
use super::{
    InferenceEngine, InferenceError, ModelLoadError, ModelLoader, ModelSource, Prediction,
};

const JPEG_QUALITY: u8 = 85;

/// Loads hosted Teachable Machine models
pub struct RemoteModelLoader {
    client: reqwest::Client,
    inference_url: String,
}

impl RemoteModelLoader {
    /// Create new loader
    pub fn new(inference_url: String) -> Self {
        Self::with_timeout(inference_url, Duration::from_secs(10))
    }

    /// Create new loader with custom timeout
    pub fn with_timeout(inference_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            inference_url: inference_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ModelLoadError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(url, status));
        }

        let body = resp.bytes().await.map_err(|e| request_error(url, e))?;
        serde_json::from_slice(&body)
            .map_err(|e| ModelLoadError::Malformed(format!("{}: {}", url, e)))
    }

    /// The topology is useless without its weights, so probe the first shard
    async fn check_weights(
        &self,
        source: &ModelSource,
        topology: &ModelTopology,
    ) -> Result<(), ModelLoadError> {
        let shard = topology.first_shard().ok_or_else(|| {
            ModelLoadError::MissingWeights(format!(
                "{} has no weightsManifest",
                source.model_json_url()
            ))
        })?;

        let url = source
            .resolve(shard)
            .map_err(|e| ModelLoadError::Malformed(e.to_string()))?;

        let resp = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| request_error(url.as_str(), e))?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Err(
                ModelLoadError::MissingWeights(format!("{} returned {}", url, resp.status())),
            ),
            status => Err(status_error(url.as_str(), status)),
        }
    }
}

impl ModelLoader for RemoteModelLoader {
    type Engine = RemoteClassifier;

    async fn load(&self, source: &ModelSource) -> Result<RemoteClassifier, ModelLoadError> {
        tracing::info!(
            model_url = %source.model_json_url(),
            metadata_url = %source.metadata_json_url(),
            "Loading model"
        );

        let topology: ModelTopology = self.fetch_json(&source.model_json_url()).await?;
        self.check_weights(source, &topology).await?;

        let metadata: ModelMetadata = self.fetch_json(&source.metadata_json_url()).await?;
        if metadata.labels.is_empty() {
            return Err(ModelLoadError::Malformed(format!(
                "{} declares no labels",
                source.metadata_json_url()
            )));
        }

        tracing::info!(
            model_id = %source.model_id(),
            model_name = ?metadata.model_name,
            classes = metadata.labels.len(),
            "Model loaded"
        );

        Ok(RemoteClassifier {
            client: self.client.clone(),
            endpoint: format!("{}/v1/classify", self.inference_url),
            model_url: source.base_url().to_string(),
            labels: metadata.labels,
            image_size: metadata.image_size,
        })
    }
}

/// Classifier bound to one loaded model
pub struct RemoteClassifier {
    client: reqwest::Client,
    endpoint: String,
    model_url: String,
    labels: Vec<String>,
    image_size: Option<u32>,
}

impl InferenceEngine for RemoteClassifier {
    fn total_classes(&self) -> usize {
        self.labels.len()
    }

    async fn predict(&self, image: &RgbImage) -> Result<Vec<Prediction>, InferenceError> {
        let jpeg = encode_jpeg(image)?;

        let mut form = Form::new()
            .part(
                "image",
                Part::bytes(jpeg)
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|e| InferenceError::Failed(e.to_string()))?,
            )
            .text("model_url", self.model_url.clone());

        if let Some(size) = self.image_size {
            form = form.text("image_size", size.to_string());
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    InferenceError::EngineUnavailable(format!("{}: {}", self.endpoint, e))
                } else {
                    InferenceError::Failed(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Failed(format!(
                "classification failed: {} - {}",
                status, body
            )));
        }

        let result: ClassifyResponse = resp
            .json()
            .await
            .map_err(|e| InferenceError::Failed(format!("bad classification response: {}", e)))?;

        if result.predictions.len() != self.labels.len() {
            tracing::debug!(
                expected = self.labels.len(),
                received = result.predictions.len(),
                "Prediction count differs from class count"
            );
        }

        Ok(result.predictions)
    }
}

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, InferenceError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(image)
        .map_err(|e| InferenceError::Failed(format!("frame encode failed: {}", e)))?;
    Ok(buf)
}

fn request_error(url: &str, err: reqwest::Error) -> ModelLoadError {
    if err.is_decode() {
        ModelLoadError::Malformed(format!("{}: {}", url, err))
    } else {
        ModelLoadError::Network(format!("{}: {}", url, err))
    }
}

fn status_error(url: &str, status: StatusCode) -> ModelLoadError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            ModelLoadError::NotFound(format!("{} returned {}", url, status))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ModelLoadError::AccessDenied(format!("{} returned {}", url, status))
        }
        _ => ModelLoadError::Network(format!("{} returned {}", url, status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_trims_inference_url() {
        let loader = RemoteModelLoader::new("http://localhost:9000/".to_string());
        assert_eq!(loader.inference_url, "http://localhost:9000");
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error("u", StatusCode::NOT_FOUND),
            ModelLoadError::NotFound(_)
        ));
        assert!(matches!(
            status_error("u", StatusCode::FORBIDDEN),
            ModelLoadError::AccessDenied(_)
        ));
        assert!(matches!(
            status_error("u", StatusCode::BAD_GATEWAY),
            ModelLoadError::Network(_)
        ));
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg_magic() {
        let image = RgbImage::from_pixel(8, 8, image::Rgb([10, 200, 30]));
        let bytes = encode_jpeg(&image).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_engine_unavailable() {
        let classifier = RemoteClassifier {
            client: reqwest::Client::new(),
            endpoint: "http://127.0.0.1:9/v1/classify".to_string(),
            model_url: "https://teachablemachine.withgoogle.com/models/abc/".to_string(),
            labels: vec!["A".to_string()],
            image_size: None,
        };
        let image = RgbImage::new(4, 4);

        let err = classifier.predict(&image).await.unwrap_err();
        assert!(err.is_unrecoverable());
    }
}
