//! # diffwatch review backends
//!
//! A [`ReviewBackend`] turns `(prompt, diff)` into review text plus optional
//! [`PerformanceMetrics`]. Each provider owns its request/response mapping:
//!
//! - [`OllamaBackend`] posts to `/api/generate` and reports Ollama's timing
//!   counters.
//! - [`OpenAiBackend`] posts to `/v1/chat/completions` on any
//!   OpenAI-compatible server and maps `usage` onto the same metrics.
//!
//! [`build_backend`] picks one from an [`AppConfig`].

mod error;
mod ollama;
mod openai;

pub use error::{BackendError, Result};
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use async_trait::async_trait;
use diffwatch_protocol::{AppConfig, PerformanceMetrics, Provider};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewResponse {
    pub text: String,
    pub metrics: Option<PerformanceMetrics>,
}

#[async_trait]
pub trait ReviewBackend: Send + Sync {
    fn provider(&self) -> Provider;

    async fn review(&self, prompt: &str, diff: &str) -> Result<ReviewResponse>;
}

/// Connection settings shared by the HTTP providers.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl EndpointConfig {
    fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(BackendError::InvalidConfig(
                "endpoint URL must not be empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(BackendError::InvalidConfig(format!(
                "endpoint URL must start with http:// or https:// (got '{url}')"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(BackendError::InvalidConfig(
                "model name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim().trim_end_matches('/'), path)
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder().timeout(self.timeout).build()?)
    }
}

/// Builds the backend selected by `config.provider`.
pub fn build_backend(config: &AppConfig) -> Result<Arc<dyn ReviewBackend>> {
    let api_key = Some(config.openai_api_key.trim().to_string()).filter(|key| !key.is_empty());
    let endpoint = EndpointConfig {
        base_url: config.endpoint().to_string(),
        model: config.model().to_string(),
        api_key,
        timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
    };
    let backend: Arc<dyn ReviewBackend> = match config.provider {
        Provider::Ollama => Arc::new(OllamaBackend::new(endpoint)?),
        Provider::OpenAi => Arc::new(OpenAiBackend::new(endpoint)?),
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_backend_follows_provider() {
        let mut cfg = AppConfig::default();
        let backend = build_backend(&cfg).expect("ollama backend");
        assert_eq!(backend.provider(), Provider::Ollama);

        cfg.provider = Provider::OpenAi;
        let backend = build_backend(&cfg).expect("openai backend");
        assert_eq!(backend.provider(), Provider::OpenAi);
    }

    #[test]
    fn build_backend_rejects_bad_urls() {
        let cfg = AppConfig {
            ollama_url: "localhost:11434".to_string(),
            ..AppConfig::default()
        };
        let err = build_backend(&cfg).err().expect("must reject");
        assert!(matches!(err, BackendError::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn url_join_tolerates_trailing_slash() {
        let endpoint = EndpointConfig {
            base_url: "http://host:11434/".to_string(),
            model: "m".to_string(),
            api_key: None,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(endpoint.url("api/generate"), "http://host:11434/api/generate");
    }
}
