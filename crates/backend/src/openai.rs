use crate::{BackendError, EndpointConfig, Result, ReviewBackend, ReviewResponse};
use async_trait::async_trait;
use diffwatch_protocol::{PerformanceMetrics, Provider};
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER: &str = "OpenAI";

/// Client for any server that speaks the OpenAI chat-completions API
/// (LM Studio, vLLM, llama.cpp server, the hosted API).
pub struct OpenAiBackend {
    endpoint: EndpointConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAiBackend {
    pub fn new(endpoint: EndpointConfig) -> Result<Self> {
        endpoint.validate()?;
        let client = endpoint.http_client()?;
        Ok(Self { endpoint, client })
    }

    fn completions_url(&self) -> String {
        let base = self.endpoint.base_url.trim().trim_end_matches('/');
        if base.ends_with("/v1") {
            self.endpoint.url("chat/completions")
        } else {
            self.endpoint.url("v1/chat/completions")
        }
    }
}

fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Maps a chat-completions body onto a review. Usage counters become metrics;
/// the server reports no timings, so `elapsed` (client wall time) stands in for
/// both the total and the generation duration.
pub(crate) fn parse_chat_response(body: &str, elapsed: Duration) -> Result<ReviewResponse> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| BackendError::MalformedResponse {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| BackendError::MalformedResponse {
            provider: PROVIDER,
            detail: "no message content in choices".to_string(),
        })?;

    let metrics = parsed.usage.map(|usage| PerformanceMetrics {
        total_duration_ns: duration_ns(elapsed),
        prompt_eval_count: usage.prompt_tokens,
        eval_count: usage.completion_tokens,
        eval_duration_ns: duration_ns(elapsed),
        ..PerformanceMetrics::default()
    });

    Ok(ReviewResponse { text, metrics })
}

#[async_trait]
impl ReviewBackend for OpenAiBackend {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn review(&self, prompt: &str, diff: &str) -> Result<ReviewResponse> {
        let request = ChatRequest {
            model: &self.endpoint.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: prompt,
                },
                ChatMessage {
                    role: "user",
                    content: diff,
                },
            ],
            stream: false,
        };
        let url = self.completions_url();
        debug!("POST {url} (model={}, {} diff chars)", request.model, diff.len());

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.bearer_auth(key);
        }

        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        parse_chat_response(&body, started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn backend(base_url: &str) -> OpenAiBackend {
        OpenAiBackend::new(EndpointConfig {
            base_url: base_url.to_string(),
            model: "openai/gpt-oss-20b".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
        })
        .expect("backend")
    }

    #[test]
    fn completions_url_avoids_double_v1() {
        assert_eq!(
            backend("http://host:1234").completions_url(),
            "http://host:1234/v1/chat/completions"
        );
        assert_eq!(
            backend("https://api.example.com/v1/").completions_url(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn usage_maps_to_metrics() {
        let body = r#"{
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Nit: rename x"}}],
            "usage": {"prompt_tokens": 300, "completion_tokens": 40, "total_tokens": 340}
        }"#;
        let parsed = parse_chat_response(body, Duration::from_secs(2)).expect("parse");
        assert_eq!(parsed.text, "Nit: rename x");
        let metrics = parsed.metrics.expect("metrics");
        assert_eq!(metrics.prompt_eval_count, 300);
        assert_eq!(metrics.eval_count, 40);
        assert_eq!(metrics.output_tokens_per_sec(), 20.0);
    }

    #[test]
    fn empty_choices_are_malformed() {
        let err = parse_chat_response(r#"{"choices":[]}"#, Duration::ZERO).expect_err("fail");
        assert!(err.to_string().contains("no message content"), "{err}");
    }
}
