use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_REVIEW_PROMPT: &str =
    "Below is git diff, please create a code review using this information";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Ollama,
    #[serde(rename = "openai", alias = "open_ai")]
    OpenAi,
}

impl Provider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "open_ai" | "open-ai" => Ok(Self::OpenAi),
            other => Err(format!(
                "unknown provider '{other}' (expected 'ollama' or 'openai')"
            )),
        }
    }
}

/// Persisted application settings. Missing fields fall back to defaults so
/// older files keep loading.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
#[serde(default)]
pub struct AppConfig {
    pub provider: Provider,
    pub ollama_url: String,
    pub ollama_model: String,
    pub openai_url: String,
    pub openai_model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub openai_api_key: String,
    pub review_prompt: String,
    /// Watched repository root. `None` means nothing is configured yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_path: Option<PathBuf>,
    pub debounce_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub history_capacity: usize,
    pub request_timeout_secs: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_ignored_dirs: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "gpt-oss:20b".to_string(),
            openai_url: "http://localhost:1234".to_string(),
            openai_model: "openai/gpt-oss-20b".to_string(),
            openai_api_key: String::new(),
            review_prompt: DEFAULT_REVIEW_PROMPT.to_string(),
            repository_path: None,
            debounce_ms: 2_000,
            cache_ttl_secs: 3_600,
            cache_capacity: 100,
            history_capacity: 50,
            request_timeout_secs: 300,
            extra_ignored_dirs: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Endpoint URL for the selected provider.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        match self.provider {
            Provider::Ollama => &self.ollama_url,
            Provider::OpenAi => &self.openai_url,
        }
    }

    /// Model name for the selected provider.
    #[must_use]
    pub fn model(&self) -> &str {
        match self.provider {
            Provider::Ollama => &self.ollama_model,
            Provider::OpenAi => &self.openai_model,
        }
    }

    /// Repository root, treating an empty path the same as an unset one.
    #[must_use]
    pub fn repository_root(&self) -> Option<&std::path::Path> {
        self.repository_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Review prompt, falling back to [`DEFAULT_REVIEW_PROMPT`] when blank.
    #[must_use]
    pub fn effective_prompt(&self) -> &str {
        if self.review_prompt.trim().is_empty() {
            DEFAULT_REVIEW_PROMPT
        } else {
            &self.review_prompt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blank_prompt_falls_back_to_default() {
        let mut cfg = AppConfig {
            review_prompt: "  \n".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(cfg.effective_prompt(), DEFAULT_REVIEW_PROMPT);
        cfg.review_prompt = "Only check naming.".to_string();
        assert_eq!(cfg.effective_prompt(), "Only check naming.");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"provider":"openai","openai_model":"qwen"}"#).expect("parse");
        assert_eq!(cfg.provider, Provider::OpenAi);
        assert_eq!(cfg.model(), "qwen");
        assert_eq!(cfg.endpoint(), "http://localhost:1234");
        assert_eq!(cfg.review_prompt, DEFAULT_REVIEW_PROMPT);
        assert_eq!(cfg.debounce_ms, 2_000);
        assert_eq!(cfg.cache_capacity, 100);
    }

    #[test]
    fn empty_repository_path_counts_as_unset() {
        let cfg = AppConfig {
            repository_path: Some(PathBuf::new()),
            ..AppConfig::default()
        };
        assert!(cfg.repository_root().is_none());
    }

    #[test]
    fn provider_parses_common_spellings() {
        assert_eq!("Ollama".parse::<Provider>(), Ok(Provider::Ollama));
        assert_eq!("open-ai".parse::<Provider>(), Ok(Provider::OpenAi));
        assert!("claude".parse::<Provider>().is_err());
    }
}
