//! TOML configuration.
//!
//! Every section carries serde defaults, so an empty file (or
//! [`Config::minimal`]) yields a working offline configuration. The
//! configuration value is passed explicitly to the prompt builder, the
//! generation clients, the pipeline and the proxy; nothing reads settings
//! from process-wide state except the credential lookup in
//! [`GenerationConfig::credential`] and [`ServerConfig::credential`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Which transport the client side uses to reach the generation API.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Call the provider directly with a locally held key. Dev use only.
    Direct,
    /// Call the proxy, which injects the server-held key.
    #[default]
    Proxy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Use the proxy's SSE endpoint instead of the buffered one.
    #[serde(default)]
    pub stream: bool,
    /// HTTP client timeout. Unset means no timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "SamplingConfig::creative")]
    pub creative: SamplingConfig,
    #[serde(default = "SamplingConfig::title")]
    pub title: SamplingConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            backend: Backend::default(),
            model: default_model(),
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            proxy_url: None,
            stream: false,
            timeout_secs: None,
            creative: SamplingConfig::creative(),
            title: SamplingConfig::title(),
        }
    }
}

impl GenerationConfig {
    /// Reads the direct-path API key from the configured environment variable.
    ///
    /// Returns `None` when the variable is unset or blank.
    pub fn credential(&self) -> Option<String> {
        read_key(&self.api_key_env)
    }
}

fn default_enabled() -> bool {
    true
}
fn default_model() -> String {
    "gemini-3-pro".to_string()
}
fn default_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

/// Sampling parameters sent as `generationConfig`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl SamplingConfig {
    /// Long-form writing: high temperature, large token budget.
    pub fn creative() -> Self {
        Self {
            temperature: 0.8,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 65536,
        }
    }

    /// Title suggestions: low temperature, small budget to bound cost and latency.
    pub fn title() -> Self {
        Self {
            temperature: 0.3,
            top_k: 20,
            top_p: 0.8,
            max_output_tokens: 64,
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("{}.temperature must be in [0.0, 2.0]", section);
        }
        if self.top_k == 0 {
            bail!("{}.top_k must be > 0", section);
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            bail!("{}.top_p must be in (0.0, 1.0]", section);
        }
        if self.max_output_tokens == 0 {
            bail!("{}.max_output_tokens must be > 0", section);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    /// Target article length, in characters.
    #[serde(default = "default_target_length")]
    pub target_length: usize,
    /// Bridging text inserted at each paragraph boundary during a merge.
    #[serde(default = "default_bridge_min")]
    pub bridge_min: usize,
    #[serde(default = "default_bridge_max")]
    pub bridge_max: usize,
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    #[serde(default = "default_title_preview_chars")]
    pub title_preview_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            target_length: default_target_length(),
            bridge_min: default_bridge_min(),
            bridge_max: default_bridge_max(),
            title_max_chars: default_title_max_chars(),
            title_preview_chars: default_title_preview_chars(),
        }
    }
}

fn default_target_length() -> usize {
    10000
}
fn default_bridge_min() -> usize {
    300
}
fn default_bridge_max() -> usize {
    800
}
fn default_title_max_chars() -> usize {
    15
}
fn default_title_preview_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct FallbackConfig {
    /// Leading characters of the content used for the deterministic title.
    #[serde(default = "default_title_chars")]
    pub title_chars: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            title_chars: default_title_chars(),
        }
    }
}

fn default_title_chars() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/articles.json")
}

/// Proxy server settings. The key named by `api_key_env` lives only here.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_api_url")]
    pub upstream_url: String,
    #[serde(default = "default_server_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upstream_url: default_api_url(),
            model: default_server_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl ServerConfig {
    pub fn credential(&self) -> Option<String> {
        read_key(&self.api_key_env)
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}
fn default_server_model() -> String {
    "gemini-3-pro-preview".to_string()
}

fn read_key(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

impl Config {
    /// All defaults. Used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.generation.creative.validate("generation.creative")?;
        self.generation.title.validate("generation.title")?;

        if self.generation.model.trim().is_empty() {
            bail!("generation.model must not be empty");
        }

        if self.prompt.target_length == 0 {
            bail!("prompt.target_length must be > 0");
        }
        if self.prompt.bridge_min > self.prompt.bridge_max {
            bail!(
                "prompt.bridge_min ({}) must be <= prompt.bridge_max ({})",
                self.prompt.bridge_min,
                self.prompt.bridge_max
            );
        }
        if self.prompt.title_max_chars == 0 || self.prompt.title_preview_chars == 0 {
            bail!("prompt.title_max_chars and prompt.title_preview_chars must be > 0");
        }

        if self.fallback.title_chars == 0 {
            bail!("fallback.title_chars must be > 0");
        }

        if let Some(url) = &self.generation.proxy_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("generation.proxy_url must be an http(s) URL, got '{}'", url);
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert!(config.generation.enabled);
        assert_eq!(config.generation.backend, Backend::Proxy);
        assert_eq!(config.generation.creative, SamplingConfig::creative());
        assert_eq!(config.generation.title.max_output_tokens, 64);
        assert_eq!(config.fallback.title_chars, 5);
        assert_eq!(config.prompt.target_length, 10000);
    }

    #[test]
    fn sections_override_defaults() {
        let config: Config = toml::from_str(
            r#"
[generation]
enabled = false
backend = "direct"
model = "gemini-test"

[generation.title]
temperature = 0.1
top_k = 5
top_p = 0.5
max_output_tokens = 32

[prompt]
bridge_min = 100
bridge_max = 200
"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert!(!config.generation.enabled);
        assert_eq!(config.generation.backend, Backend::Direct);
        assert_eq!(config.generation.title.top_k, 5);
        assert_eq!(config.generation.creative, SamplingConfig::creative());
        assert_eq!(config.prompt.bridge_max, 200);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let parsed: Result<Config, _> = toml::from_str("[generation]\nbackend = \"carrier-pigeon\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn inverted_bridge_range_fails_validation() {
        let config: Config = toml::from_str("[prompt]\nbridge_min = 900\nbridge_max = 100\n").unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("bridge_min"), "{}", err);
    }

    #[test]
    fn out_of_range_sampling_fails_validation() {
        let mut config = Config::minimal();
        config.generation.creative.top_p = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::minimal();
        config.generation.title.temperature = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
