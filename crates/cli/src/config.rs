use anyhow::{anyhow, bail, Context, Result};
use diffwatch_protocol::{AppConfig, Provider};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "DIFFWATCH_CONFIG";
pub const API_KEY_ENV: &str = "DIFFWATCH_OPENAI_API_KEY";
const CONFIG_FILE_NAME: &str = "config.json";

/// PascalCase keys written by earlier releases.
const LEGACY_KEYS: &[&str] = &[
    "RepositoryPath",
    "ReviewPrompt",
    "OllamaUrl",
    "OllamaModel",
    "OpenAIUrl",
    "OpenAIModel",
    "OpenAIApiKey",
    "Provider",
];

/// Keys accepted by `config set`.
pub const SETTABLE_KEYS: &[&str] = &[
    "provider",
    "ollama_url",
    "ollama_model",
    "openai_url",
    "openai_model",
    "openai_api_key",
    "review_prompt",
    "repository_path",
    "debounce_ms",
    "cache_ttl_secs",
    "cache_capacity",
    "history_capacity",
    "request_timeout_secs",
    "extra_ignored_dirs",
];

/// JSON settings file on disk.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `--config`, then `$DIFFWATCH_CONFIG`, then the platform config dir.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(PathBuf::from(path)));
        }
        let base = dirs::config_dir()
            .ok_or_else(|| anyhow!("Cannot determine config directory; pass --config"))?;
        Ok(Self::new(base.join("diffwatch").join(CONFIG_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file: defaults are written and returned. Legacy layout:
    /// migrated and rewritten. Unparseable: defaults, file left alone.
    pub fn load(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            log::info!("Created default config at {}", self.path.display());
            return Ok(config);
        }

        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read config {}", self.path.display()))?;
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                log::warn!(
                    "Config {} is not valid JSON ({err}); using defaults",
                    self.path.display()
                );
                return Ok(AppConfig::default());
            }
        };

        if let Some(config) = migrate_legacy(&value) {
            self.save(&config)?;
            log::info!("Migrated configuration from old format to new format");
            return Ok(config);
        }

        match serde_json::from_value::<AppConfig>(value) {
            Ok(config) => Ok(config),
            Err(err) => {
                log::warn!(
                    "Config {} has invalid values ({err}); using defaults",
                    self.path.display()
                );
                Ok(AppConfig::default())
            }
        }
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create config dir {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(config)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Cannot write config {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Cannot replace config {}", self.path.display()))?;
        Ok(())
    }

    pub fn reset(&self) -> Result<AppConfig> {
        let config = AppConfig::default();
        self.save(&config)?;
        Ok(config)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<AppConfig> {
        let mut config = self.load()?;
        apply_setting(&mut config, key, value)?;
        self.save(&config)?;
        Ok(config)
    }
}

/// Runtime-only overrides; never written back.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            config.openai_api_key = key.trim().to_string();
        }
    }
}

pub fn apply_setting(config: &mut AppConfig, key: &str, value: &str) -> Result<()> {
    let raw = value.trim();
    match key {
        "provider" => {
            config.provider = raw.parse::<Provider>().map_err(|err| anyhow!(err))?;
        }
        "ollama_url" => config.ollama_url = parse_url(raw)?,
        "ollama_model" => config.ollama_model = parse_non_empty(key, raw)?,
        "openai_url" => config.openai_url = parse_url(raw)?,
        "openai_model" => config.openai_model = parse_non_empty(key, raw)?,
        "openai_api_key" => config.openai_api_key = raw.to_string(),
        "review_prompt" => config.review_prompt = parse_non_empty(key, value)?,
        "repository_path" => {
            config.repository_path = (!raw.is_empty()).then(|| PathBuf::from(raw));
        }
        "debounce_ms" => config.debounce_ms = parse_positive(key, raw)?,
        "cache_ttl_secs" => config.cache_ttl_secs = parse_positive(key, raw)?,
        "cache_capacity" => config.cache_capacity = parse_positive(key, raw)?,
        "history_capacity" => config.history_capacity = parse_positive(key, raw)?,
        "request_timeout_secs" => config.request_timeout_secs = parse_positive(key, raw)?,
        "extra_ignored_dirs" => {
            config.extra_ignored_dirs = raw
                .split(',')
                .map(str::trim)
                .filter(|dir| !dir.is_empty())
                .map(str::to_string)
                .collect();
        }
        other => bail!(
            "Unknown config key '{other}' (expected one of: {})",
            SETTABLE_KEYS.join(", ")
        ),
    }
    Ok(())
}

fn parse_url(raw: &str) -> Result<String> {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Ok(raw.trim_end_matches('/').to_string())
    } else {
        bail!("URL must start with http:// or https:// (got '{raw}')")
    }
}

fn parse_non_empty(key: &str, raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        bail!("{key} must not be empty");
    }
    Ok(raw.to_string())
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let parsed: T = raw
        .parse()
        .map_err(|_| anyhow!("{key} must be a positive integer (got '{raw}')"))?;
    if parsed == T::default() {
        bail!("{key} must be greater than zero");
    }
    Ok(parsed)
}

/// Rebuilds a config from the PascalCase layout. `None` when `value` carries
/// no legacy key.
pub fn migrate_legacy(value: &Value) -> Option<AppConfig> {
    let object = value.as_object()?;
    if !LEGACY_KEYS.iter().any(|key| object.contains_key(*key)) {
        return None;
    }

    let mut config = AppConfig::default();
    if let Some(path) = legacy_str(object, "RepositoryPath") {
        config.repository_path = (!path.trim().is_empty()).then(|| PathBuf::from(path));
    }
    if let Some(prompt) = legacy_str(object, "ReviewPrompt").filter(|p| !p.trim().is_empty()) {
        config.review_prompt = prompt.to_string();
    }
    if let Some(url) = legacy_str(object, "OllamaUrl").filter(|u| !u.trim().is_empty()) {
        config.ollama_url = url.to_string();
    }
    if let Some(model) = legacy_str(object, "OllamaModel").filter(|m| !m.trim().is_empty()) {
        config.ollama_model = model.to_string();
    }
    if let Some(url) = legacy_str(object, "OpenAIUrl").filter(|u| !u.trim().is_empty()) {
        config.openai_url = url.to_string();
    }
    if let Some(model) = legacy_str(object, "OpenAIModel").filter(|m| !m.trim().is_empty()) {
        config.openai_model = model.to_string();
    }
    if let Some(key) = legacy_str(object, "OpenAIApiKey") {
        config.openai_api_key = key.to_string();
    }
    config.provider = match object.get("Provider") {
        Some(Value::String(name)) => name.parse().unwrap_or_default(),
        Some(Value::Number(n)) if n.as_u64() == Some(1) => Provider::OpenAi,
        _ => Provider::Ollama,
    };
    Some(config)
}

fn legacy_str<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("nested").join("config.json"))
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir);
        let config = store.load().expect("load");
        assert_eq!(config, AppConfig::default());
        assert!(store.path().exists());

        let written: AppConfig =
            serde_json::from_str(&std::fs::read_to_string(store.path()).expect("read"))
                .expect("parse");
        assert_eq!(written, AppConfig::default());
    }

    #[test]
    fn saved_config_round_trips_through_load() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir);
        let config = AppConfig {
            provider: Provider::OpenAi,
            repository_path: Some(PathBuf::from("/src/app")),
            debounce_ms: 500,
            ..AppConfig::default()
        };
        store.save(&config).expect("save");
        assert_eq!(store.load().expect("load"), config);
    }

    #[test]
    fn legacy_layout_is_migrated_and_rewritten() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        std::fs::write(
            store.path(),
            r#"{"RepositoryPath": "/work/repo", "ReviewPrompt": "Review it", "OllamaUrl": "http://10.0.0.90:11434"}"#,
        )
        .expect("write");

        let config = store.load().expect("load");
        assert_eq!(config.repository_path, Some(PathBuf::from("/work/repo")));
        assert_eq!(config.review_prompt, "Review it");
        assert_eq!(config.ollama_url, "http://10.0.0.90:11434");
        assert_eq!(config.provider, Provider::Ollama);

        let rewritten = std::fs::read_to_string(store.path()).expect("read");
        assert!(rewritten.contains("\"repository_path\""), "{rewritten}");
        assert!(!rewritten.contains("RepositoryPath"), "{rewritten}");
    }

    #[test]
    fn legacy_provider_accepts_names_and_ordinals() {
        let named = migrate_legacy(&json!({"Provider": "OpenAI"})).expect("legacy");
        assert_eq!(named.provider, Provider::OpenAi);
        let ordinal = migrate_legacy(&json!({"Provider": 1})).expect("legacy");
        assert_eq!(ordinal.provider, Provider::OpenAi);
        assert!(migrate_legacy(&json!({"provider": "openai"})).is_none());
    }

    #[test]
    fn invalid_json_falls_back_to_defaults_without_overwriting() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        std::fs::write(store.path(), "{ not json").expect("write");

        assert_eq!(store.load().expect("load"), AppConfig::default());
        assert_eq!(
            std::fs::read_to_string(store.path()).expect("read"),
            "{ not json"
        );
    }

    #[test]
    fn set_validates_values() {
        let mut config = AppConfig::default();
        apply_setting(&mut config, "provider", "OpenAI").expect("provider");
        assert_eq!(config.provider, Provider::OpenAi);
        apply_setting(&mut config, "debounce_ms", "750").expect("debounce");
        assert_eq!(config.debounce_ms, 750);
        apply_setting(&mut config, "extra_ignored_dirs", "target, dist,,").expect("dirs");
        assert_eq!(config.extra_ignored_dirs, vec!["target", "dist"]);
        apply_setting(&mut config, "repository_path", "").expect("clear path");
        assert_eq!(config.repository_path, None);

        assert!(apply_setting(&mut config, "provider", "claude").is_err());
        assert!(apply_setting(&mut config, "cache_capacity", "0").is_err());
        assert!(apply_setting(&mut config, "cache_capacity", "-3").is_err());
        assert!(apply_setting(&mut config, "ollama_url", "localhost:11434").is_err());
        assert!(apply_setting(&mut config, "no_such_key", "1").is_err());
    }
}
