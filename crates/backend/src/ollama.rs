use crate::{BackendError, EndpointConfig, Result, ReviewBackend, ReviewResponse};
use async_trait::async_trait;
use diffwatch_protocol::{PerformanceMetrics, Provider};
use log::{debug, info};
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "Ollama";

pub struct OllamaBackend {
    endpoint: EndpointConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    error: Option<String>,
    total_duration: Option<u64>,
    load_duration: Option<u64>,
    prompt_eval_count: Option<u64>,
    prompt_eval_duration: Option<u64>,
    eval_count: Option<u64>,
    eval_duration: Option<u64>,
}

impl GenerateResponse {
    fn metrics(&self) -> Option<PerformanceMetrics> {
        let any = [
            self.total_duration,
            self.load_duration,
            self.prompt_eval_count,
            self.prompt_eval_duration,
            self.eval_count,
            self.eval_duration,
        ]
        .iter()
        .any(Option::is_some);
        any.then(|| PerformanceMetrics {
            total_duration_ns: self.total_duration.unwrap_or(0),
            load_duration_ns: self.load_duration.unwrap_or(0),
            prompt_eval_count: self.prompt_eval_count.unwrap_or(0),
            prompt_eval_duration_ns: self.prompt_eval_duration.unwrap_or(0),
            eval_count: self.eval_count.unwrap_or(0),
            eval_duration_ns: self.eval_duration.unwrap_or(0),
        })
    }
}

impl OllamaBackend {
    pub fn new(endpoint: EndpointConfig) -> Result<Self> {
        endpoint.validate()?;
        let client = endpoint.http_client()?;
        Ok(Self { endpoint, client })
    }
}

/// The prompt and the diff travel as one text block, separated by a blank line.
pub(crate) fn full_prompt(prompt: &str, diff: &str) -> String {
    format!("{prompt}\n\n{diff}")
}

pub(crate) fn parse_generate_response(body: &str) -> Result<ReviewResponse> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| BackendError::MalformedResponse {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;

    if let Some(error) = parsed.error.as_deref().filter(|e| !e.trim().is_empty()) {
        return Err(BackendError::MalformedResponse {
            provider: PROVIDER,
            detail: format!("server reported error: {error}"),
        });
    }

    let metrics = parsed.metrics();
    let Some(text) = parsed.response else {
        return Err(BackendError::MalformedResponse {
            provider: PROVIDER,
            detail: "missing 'response' field".to_string(),
        });
    };

    Ok(ReviewResponse { text, metrics })
}

#[async_trait]
impl ReviewBackend for OllamaBackend {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn review(&self, prompt: &str, diff: &str) -> Result<ReviewResponse> {
        let request = GenerateRequest {
            model: &self.endpoint.model,
            prompt: full_prompt(prompt, diff),
            stream: false,
        };
        let url = self.endpoint.url("api/generate");
        debug!("POST {url} (model={}, {} diff chars)", request.model, diff.len());

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        debug!("Raw Ollama response length: {} chars", body.len());

        let parsed = parse_generate_response(&body)?;
        match &parsed.metrics {
            Some(m) => info!(
                "Ollama metrics - total: {:.2}s, input: {:.1} tok/s, output: {:.1} tok/s",
                m.total_duration_secs(),
                m.prompt_tokens_per_sec(),
                m.output_tokens_per_sec()
            ),
            None => debug!("No Ollama metrics found in response"),
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_text_and_metrics() {
        let body = r#"{
            "model": "gpt-oss:20b",
            "response": "LGTM",
            "done": true,
            "total_duration": 2000000000,
            "load_duration": 100000000,
            "prompt_eval_count": 50,
            "prompt_eval_duration": 500000000,
            "eval_count": 10,
            "eval_duration": 1000000000
        }"#;
        let parsed = parse_generate_response(body).expect("parse");
        assert_eq!(parsed.text, "LGTM");
        let metrics = parsed.metrics.expect("metrics");
        assert_eq!(metrics.prompt_eval_count, 50);
        assert_eq!(metrics.output_tokens_per_sec(), 10.0);
    }

    #[test]
    fn metrics_absent_when_no_counters() {
        let parsed = parse_generate_response(r#"{"response":"ok"}"#).expect("parse");
        assert!(parsed.metrics.is_none());
    }

    #[test]
    fn missing_response_is_malformed() {
        let err = parse_generate_response(r#"{"done":true}"#).expect_err("must fail");
        assert!(err.to_string().contains("missing 'response'"), "{err}");
    }

    #[test]
    fn non_json_is_malformed() {
        let err = parse_generate_response("<html>").expect_err("must fail");
        assert!(matches!(err, BackendError::MalformedResponse { .. }));
    }

    #[test]
    fn prompt_precedes_diff() {
        assert_eq!(full_prompt("Review:", "+a"), "Review:\n\n+a");
    }
}
