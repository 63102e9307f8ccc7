//! Hosted model URL contract
//!
//! `https://<host>/models/<modelId>/` with exactly two path segments. The
//! trailing slash is normalised; query and fragment are dropped.

use reqwest::Url;
use std::fmt;

use crate::error::{Error, Result};

pub const DEFAULT_MODEL_HOST: &str = "teachablemachine.withgoogle.com";

/// Validated model base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    base: Url,
    model_id: String,
}

impl ModelSource {
    pub fn parse(input: &str, allowed_host: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidModelUrl("model URL is empty".to_string()));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| Error::InvalidModelUrl(format!("{}: {}", trimmed, e)))?;

        if url.scheme() != "https" {
            return Err(Error::InvalidModelUrl(format!(
                "{}: scheme must be https",
                trimmed
            )));
        }

        if !url.host_str().is_some_and(|host| host.eq_ignore_ascii_case(allowed_host)) {
            return Err(Error::InvalidModelUrl(format!(
                "{}: host must be {}",
                trimmed, allowed_host
            )));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(Error::InvalidModelUrl(format!(
                "{}: credentials are not allowed",
                trimmed
            )));
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let model_id = match segments.as_slice() {
            ["models", id] if is_valid_model_id(id) => id.to_string(),
            _ => {
                return Err(Error::InvalidModelUrl(format!(
                    "{}: path must be /models/<modelId>/",
                    trimmed
                )))
            }
        };

        let mut base = url;
        base.set_query(None);
        base.set_fragment(None);
        base.set_path(&format!("/models/{}/", model_id));

        Ok(Self { base, model_id })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Normalised base URL, always ending in `/`
    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    pub fn model_json_url(&self) -> String {
        format!("{}model.json", self.base)
    }

    pub fn metadata_json_url(&self) -> String {
        format!("{}metadata.json", self.base)
    }

    /// Resolve a path relative to the model directory (weight shards)
    pub fn resolve(&self, relative: &str) -> Result<Url> {
        self.base
            .join(relative)
            .map_err(|e| Error::Validation(format!("bad model file path {}: {}", relative, e)))
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.as_str())
    }
}

fn is_valid_model_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(url: &str) -> Result<ModelSource> {
        ModelSource::parse(url, DEFAULT_MODEL_HOST)
    }

    #[test]
    fn test_accepts_hosted_model_url() {
        let source = parse("https://teachablemachine.withgoogle.com/models/YFgzqdy36/").unwrap();
        assert_eq!(source.model_id(), "YFgzqdy36");
        assert_eq!(
            source.model_json_url(),
            "https://teachablemachine.withgoogle.com/models/YFgzqdy36/model.json"
        );
        assert_eq!(
            source.metadata_json_url(),
            "https://teachablemachine.withgoogle.com/models/YFgzqdy36/metadata.json"
        );
    }

    #[test]
    fn test_normalises_trailing_slash_and_query() {
        let source =
            parse("https://teachablemachine.withgoogle.com/models/abc123?x=1#frag").unwrap();
        assert_eq!(
            source.base_url(),
            "https://teachablemachine.withgoogle.com/models/abc123/"
        );
    }

    #[test]
    fn test_rejects_other_hosts() {
        assert!(matches!(
            parse("https://evil.com/models/abc/"),
            Err(Error::InvalidModelUrl(_))
        ));
        // substring of the allowed host is not enough
        assert!(parse("https://teachablemachine.withgoogle.com.evil.com/models/abc/").is_err());
    }

    #[test]
    fn test_rejects_wrong_path_shape() {
        assert!(parse("https://teachablemachine.withgoogle.com/notmodels/abc/").is_err());
        assert!(parse("https://teachablemachine.withgoogle.com/models/").is_err());
        assert!(parse("https://teachablemachine.withgoogle.com/models/abc/extra/").is_err());
        assert!(parse("https://teachablemachine.withgoogle.com/models/a%20b/").is_err());
    }

    #[test]
    fn test_rejects_non_https_and_garbage() {
        assert!(parse("http://teachablemachine.withgoogle.com/models/abc/").is_err());
        assert!(parse("").is_err());
        assert!(parse("not a url").is_err());
        assert!(parse("https://user:pw@teachablemachine.withgoogle.com/models/abc/").is_err());
    }

    #[test]
    fn test_resolves_weight_shards() {
        let source = parse("https://teachablemachine.withgoogle.com/models/abc/").unwrap();
        let shard = source.resolve("weights.bin").unwrap();
        assert_eq!(
            shard.as_str(),
            "https://teachablemachine.withgoogle.com/models/abc/weights.bin"
        );
    }
}
