use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::Path;

use crate::latex::FontSetup;
use crate::translation::concurrency::ProviderProfile;
use crate::translation::orchestrator::FallbackPolicy;

/// Application configuration module
/// This module handles loading, validating and saving the configuration.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language of the paper (code or English name)
    pub source_language: String,

    /// Target language of the translation (code or English name)
    pub target_language: String,

    /// Translation config
    pub translation: TranslationConfig,

    /// Compilation config
    #[serde(default)]
    pub compile: CompileConfig,

    /// Output handling config
    #[serde(default)]
    pub output: OutputConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    #[default]
    OpenAI,
    Anthropic,
    Ollama,
    /// LM Studio local server (OpenAI-compatible)
    LMStudio,
}

impl TranslationProvider {
    /// Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::LMStudio => "LM Studio",
        }
    }

    /// Lowercase provider identifier, as used in the config file
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
        }
    }

    /// Environment variable consulted when the config has no API key
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama | Self::LMStudio => None,
        }
    }

    /// Whether requests fail without an API key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI | Self::Anthropic)
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "lmstudio" => Ok(Self::LMStudio),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Per-provider connection settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Model name
    #[serde(default = "String::new")]
    pub model: String,

    /// API key
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    /// Max concurrent rewrite requests
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    /// Max characters of protected text per chunk
    #[serde(default = "default_max_chars_per_request")]
    pub max_chars_per_request: usize,

    /// Timeout seconds for a single request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Rate limit (requests per minute)
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

impl ProviderConfig {
    /// Provider config with defaults tuned to the provider
    pub fn new(provider_type: TranslationProvider) -> Self {
        let profile = ProviderProfile::for_provider(provider_type);
        let (model, endpoint) = match provider_type {
            TranslationProvider::Ollama => (default_ollama_model(), default_ollama_endpoint()),
            TranslationProvider::OpenAI => (default_openai_model(), default_openai_endpoint()),
            TranslationProvider::Anthropic => {
                (default_anthropic_model(), default_anthropic_endpoint())
            }
            TranslationProvider::LMStudio => {
                (default_lmstudio_model(), default_lmstudio_endpoint())
            }
        };

        Self {
            provider_type: provider_type.to_lowercase_string(),
            model,
            api_key: String::new(),
            endpoint,
            concurrent_requests: profile.max_concurrent_requests,
            max_chars_per_request: profile.max_chars_per_chunk,
            timeout_secs: profile.timeout_secs,
            rate_limit: profile.target_rpm,
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// System prompt template for translation
    /// Placeholders: {source_language}, {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Total attempts per chunk, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Growth factor between consecutive retry delays
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,

    /// Upper bound for a single retry delay, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Relative jitter applied to retry delays (0.0 to 1.0)
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: f64,

    /// Temperature parameter for text generation (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_multiplier: default_retry_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            retry_jitter: default_retry_jitter(),
            temperature: default_temperature(),
        }
    }
}

/// LaTeX compilation settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompileConfig {
    /// Whether to compile the assembled tree at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Compiler program; XeLaTeX is needed for CJK output
    #[serde(default = "default_compiler")]
    pub compiler: String,

    /// Number of regular passes
    #[serde(default = "default_passes")]
    pub passes: u32,

    /// Extra passes allowed when the log asks for a rerun
    #[serde(default = "default_max_transient_reruns")]
    pub max_transient_reruns: u32,

    /// Timeout for a single compiler pass, in seconds
    #[serde(default = "default_compile_timeout_secs")]
    pub timeout_secs: u64,

    /// CJK main font; defaults by target language when unset
    #[serde(default)]
    pub cjk_font: Option<String>,

    /// CJK monospace font; defaults to the main font
    #[serde(default)]
    pub mono_font: Option<String>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            compiler: default_compiler(),
            passes: default_passes(),
            max_transient_reruns: default_max_transient_reruns(),
            timeout_secs: default_compile_timeout_secs(),
            cjk_font: None,
            mono_font: None,
        }
    }
}

impl CompileConfig {
    /// Font setup for `target_language`, if any is needed
    pub fn font_setup(&self, target_language: &str) -> Option<FontSetup> {
        let main_font = self
            .cjk_font
            .clone()
            .filter(|font| !font.trim().is_empty())
            .or_else(|| crate::language_utils::default_cjk_font(target_language).map(String::from))?;
        let mono_font = self
            .mono_font
            .clone()
            .filter(|font| !font.trim().is_empty())
            .unwrap_or_else(|| main_font.clone());
        Some(FontSetup::new(main_font, mono_font))
    }
}

/// Output handling settings
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct OutputConfig {
    /// Replace an existing, non-empty output tree
    #[serde(default)]
    pub force_overwrite: bool,

    /// What to do with a chunk that exhausted its retries
    #[serde(default)]
    pub fallback: FallbackPolicy,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_max_chars_per_request() -> usize {
    2000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    2 // one retry, then the chunk fails
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff, doubled on each retry
}

fn default_retry_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_retry_jitter() -> f64 {
    0.1
}

fn default_temperature() -> f32 {
    0.3
}

fn default_true() -> bool {
    true
}

fn default_compiler() -> String {
    "xelatex".to_string()
}

fn default_passes() -> u32 {
    2
}

fn default_max_transient_reruns() -> u32 {
    1
}

fn default_compile_timeout_secs() -> u64 {
    600
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_lmstudio_endpoint() -> String {
    // LM Studio default server (OpenAI compatible) runs on port 1234 under /v1
    "http://localhost:1234/v1".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_lmstudio_model() -> String {
    // Placeholder; users should set to the loaded model name in LM Studio
    "local-model".to_string()
}

fn default_system_prompt() -> String {
    "You are an assistant specialized in translating academic papers written in LaTeX \
from {source_language} to {target_language}. Use the formal register of scholarly \
publications in {target_language}.\n\
\n\
The text contains placeholder tokens such as ZXQ0001QXZ. Each one stands for LaTeX \
markup (commands, math, citations, references, environments). Rules:\n\
1. Copy every placeholder token exactly, character for character. Never translate, \
split, merge, reorder within a word, or drop one.\n\
2. Do not introduce LaTeX commands, markdown or any markup of your own.\n\
3. Keep well-known technical terms, product names, author names, URLs and DOIs as \
they are.\n\
4. Keep paragraph breaks where they are and do not split sentences into new \
paragraphs.\n\
5. Reply with the translated text only, without explanations or code fences."
        .to_string()
}

impl Config {
    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        crate::language_utils::get_language_name(&self.source_language)
            .context("Invalid source language")?;
        crate::language_utils::get_language_name(&self.target_language)
            .context("Invalid target language")?;

        let provider = self.translation.provider;
        if provider.requires_api_key() && self.translation.get_api_key().is_empty() {
            return Err(anyhow!(
                "Translation API key is required for {} provider (set it in the config or via {})",
                provider.display_name(),
                provider.api_key_env_var().unwrap_or("the config file")
            ));
        }

        if self.translation.get_max_chars_per_request() == 0 {
            return Err(anyhow!("max_chars_per_request must be greater than 0"));
        }
        if self.translation.optimal_concurrent_requests() == 0 {
            return Err(anyhow!("concurrent_requests must be greater than 0"));
        }

        let common = &self.translation.common;
        if common.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }
        if !(0.0..=1.0).contains(&common.retry_jitter) {
            return Err(anyhow!("retry_jitter must be between 0.0 and 1.0"));
        }
        if !(0.0..=2.0).contains(&common.temperature) {
            return Err(anyhow!("temperature must be between 0.0 and 2.0"));
        }

        if self.compile.enabled {
            if self.compile.passes == 0 {
                return Err(anyhow!("compile.passes must be at least 1"));
            }
            if self.compile.compiler.trim().is_empty() {
                return Err(anyhow!("compile.compiler must not be empty"));
            }
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_language: "ko".to_string(),
            translation: TranslationConfig::default(),
            compile: CompileConfig::default(),
            output: OutputConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Concurrent request limit for the active provider
    pub fn optimal_concurrent_requests(&self) -> usize {
        self.get_active_provider_config()
            .map(|p| p.concurrent_requests)
            .unwrap_or_else(|| ProviderProfile::for_provider(self.provider).max_concurrent_requests)
    }

    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers
            .iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Mutable access to the active provider configuration, created on demand
    pub fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        let index = match self
            .available_providers
            .iter()
            .position(|p| p.provider_type == provider_str)
        {
            Some(index) => index,
            None => {
                self.available_providers.push(ProviderConfig::new(self.provider));
                self.available_providers.len() - 1
            }
        };
        &mut self.available_providers[index]
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.model.clone())
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| ProviderConfig::new(self.provider).model)
    }

    /// Get the API key for the active provider, falling back to its environment variable
    pub fn get_api_key(&self) -> String {
        if let Some(key) = self
            .get_active_provider_config()
            .map(|p| p.api_key.clone())
            .filter(|key| !key.is_empty())
        {
            return key;
        }

        self.provider
            .api_key_env_var()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.endpoint.clone())
            .filter(|endpoint| !endpoint.is_empty())
            .unwrap_or_else(|| ProviderConfig::new(self.provider).endpoint)
    }

    /// Get the max chars per chunk for the active provider
    pub fn get_max_chars_per_request(&self) -> usize {
        self.get_active_provider_config()
            .map(|p| p.max_chars_per_request)
            .unwrap_or_else(default_max_chars_per_request)
    }

    /// Get the request timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .unwrap_or_else(default_timeout_secs)
    }

    /// Get the rate limit for the active provider
    pub fn get_rate_limit(&self) -> Option<u32> {
        match self.get_active_provider_config() {
            Some(provider_config) => provider_config.rate_limit,
            None => ProviderProfile::for_provider(self.provider).target_rpm,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::OpenAI),
                ProviderConfig::new(TranslationProvider::Anthropic),
                ProviderConfig::new(TranslationProvider::Ollama),
                ProviderConfig::new(TranslationProvider::LMStudio),
            ],
            common: TranslationCommonConfig::default(),
        }
    }
}
