/*!
 * Core translation service implementation.
 *
 * `TranslationService` is the production `Rewriter`: it builds the
 * placeholder-preserving prompt, sends one request to the configured
 * provider and tracks token usage across the run.
 */

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::concurrency::RequestPacer;
use crate::app_config::{TranslationConfig, TranslationProvider as ConfigTranslationProvider};
use crate::errors::ProviderError;
use crate::language_utils;
use crate::providers::anthropic::{Anthropic, AnthropicRequest};
use crate::providers::ollama::{GenerationRequest, Ollama};
use crate::providers::openai::{OpenAI, OpenAIRequest};
use crate::providers::{Provider, Rewriter};

/// Token usage statistics for tracking API consumption
#[derive(Debug, Clone)]
pub struct TokenUsageStats {
    /// Number of prompt tokens
    pub prompt_tokens: u64,

    /// Number of completion tokens
    pub completion_tokens: u64,

    /// Total number of tokens
    pub total_tokens: u64,

    /// Number of completed requests
    pub requests: u64,

    /// Start time of token tracking
    pub start_time: Instant,

    /// Total time spent on API requests
    pub api_duration: Duration,

    /// Provider name
    pub provider: String,

    /// Model name
    pub model: String,
}

impl Default for TokenUsageStats {
    fn default() -> Self {
        Self::with_provider_info(String::new(), String::new())
    }
}

impl TokenUsageStats {
    /// Create new token usage stats with provider info
    pub fn with_provider_info(provider: String, model: String) -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            requests: 0,
            start_time: Instant::now(),
            api_duration: Duration::from_secs(0),
            provider,
            model,
        }
    }

    /// Record one completed request
    pub fn record(&mut self, prompt_tokens: Option<u64>, completion_tokens: Option<u64>, duration: Duration) {
        if let Some(pt) = prompt_tokens {
            self.prompt_tokens += pt;
            self.total_tokens += pt;
        }
        if let Some(ct) = completion_tokens {
            self.completion_tokens += ct;
            self.total_tokens += ct;
        }
        self.requests += 1;
        self.api_duration += duration;
    }

    /// Calculate tokens per minute rate
    pub fn tokens_per_minute(&self) -> f64 {
        let duration_minutes = if self.api_duration.as_secs_f64() > 0.0 {
            self.api_duration.as_secs_f64() / 60.0
        } else {
            self.start_time.elapsed().as_secs_f64() / 60.0
        };

        if duration_minutes > 0.0 {
            self.total_tokens as f64 / duration_minutes
        } else {
            0.0
        }
    }

    /// Generate a summary of token usage
    pub fn summary(&self) -> String {
        format!(
            "Token usage ({} / {}): {} requests, {} prompt + {} completion = {} tokens, \
             {:.1}s in API calls, {:.0} tokens/min",
            self.provider,
            self.model,
            self.requests,
            self.prompt_tokens,
            self.completion_tokens,
            self.total_tokens,
            self.api_duration.as_secs_f64(),
            self.tokens_per_minute()
        )
    }
}

/// Log entry for capturing translation issues for the issues log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
        }
    }
}

/// Paper metadata passed to the model as translation context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
}

impl PaperInfo {
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.abstract_text.trim().is_empty()
    }
}

/// Translation provider implementation variants
#[derive(Debug)]
enum TranslationProviderImpl {
    Ollama { client: Ollama },
    /// OpenAI, or LM Studio through its compatible API
    OpenAI { client: OpenAI },
    Anthropic { client: Anthropic },
}

/// Production rewriter backed by an LLM provider
pub struct TranslationService {
    /// Provider implementation
    provider: TranslationProviderImpl,

    /// Configuration for the translation service
    pub config: TranslationConfig,

    /// Paper context appended to the system prompt
    paper_info: PaperInfo,

    /// Rate limit enforcement shared by all workers
    pacer: RequestPacer,

    /// Usage accumulated over the run
    usage: Mutex<TokenUsageStats>,
}

impl TranslationService {
    /// Create a new translation service with the given configuration
    pub fn new(config: TranslationConfig) -> Result<Self> {
        let timeout_secs = config.get_timeout_secs();
        let provider = match config.provider {
            ConfigTranslationProvider::Ollama => TranslationProviderImpl::Ollama {
                client: Ollama::new(config.get_endpoint(), timeout_secs),
            },
            ConfigTranslationProvider::OpenAI => TranslationProviderImpl::OpenAI {
                client: OpenAI::new(config.get_api_key(), config.get_endpoint(), timeout_secs),
            },
            ConfigTranslationProvider::LMStudio => {
                // LM Studio often doesn't require an API key; use a default if empty
                let api_key = {
                    let k = config.get_api_key();
                    if k.is_empty() { "lm-studio".to_string() } else { k }
                };
                TranslationProviderImpl::OpenAI {
                    client: OpenAI::new(api_key, config.get_endpoint(), timeout_secs),
                }
            }
            ConfigTranslationProvider::Anthropic => TranslationProviderImpl::Anthropic {
                client: Anthropic::new(config.get_api_key(), config.get_endpoint(), timeout_secs),
            },
        };

        let usage = TokenUsageStats::with_provider_info(
            config.provider.display_name().to_string(),
            config.get_model(),
        );

        Ok(Self {
            provider,
            pacer: RequestPacer::new(config.get_rate_limit()),
            config,
            paper_info: PaperInfo::default(),
            usage: Mutex::new(usage),
        })
    }

    /// Attach paper metadata used as prompt context
    pub fn with_paper_info(mut self, paper_info: PaperInfo) -> Self {
        self.paper_info = paper_info;
        self
    }

    /// Snapshot of the token usage so far
    pub fn usage(&self) -> TokenUsageStats {
        self.usage.lock().clone()
    }

    /// Test the connection to the translation provider
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        match &self.provider {
            TranslationProviderImpl::Ollama { client } => client.test_connection().await,
            TranslationProviderImpl::OpenAI { client } => client.test_connection().await,
            TranslationProviderImpl::Anthropic { client } => client.test_connection().await,
        }
    }

    /// Build the system prompt for a language pair
    pub fn build_system_prompt(&self, source_language: &str, target_language: &str) -> String {
        let source_name = display_language(source_language);
        let target_name = display_language(target_language);

        let mut prompt = self
            .config
            .common
            .system_prompt
            .replace("{source_language}", &source_name)
            .replace("{target_language}", &target_name);

        if !self.paper_info.is_empty() {
            prompt.push_str("\n\nPaper context (for terminology only, do not translate it):\n");
            if !self.paper_info.title.trim().is_empty() {
                prompt.push_str(&format!("- Title: {}\n", self.paper_info.title.trim()));
            }
            if !self.paper_info.abstract_text.trim().is_empty() {
                prompt.push_str(&format!("- Abstract: {}\n", self.paper_info.abstract_text.trim()));
            }
        }

        prompt
    }

    /// Generation budget for a chunk: generous, since CJK output can
    /// need several tokens per source word
    fn max_tokens_for(text: &str) -> u32 {
        let estimate = text.chars().count() as u32;
        estimate.clamp(1024, 8192)
    }
}

/// English language name for the prompt, or the input if unknown
fn display_language(code_or_name: &str) -> String {
    language_utils::get_language_name(code_or_name).unwrap_or_else(|_| code_or_name.to_string())
}

#[async_trait]
impl Rewriter for TranslationService {
    async fn rewrite(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, ProviderError> {
        let system_prompt = self.build_system_prompt(source_language, target_language);
        let model = self.config.get_model();
        let temperature = self.config.common.temperature;

        self.pacer.wait().await;
        let start_time = Instant::now();

        let (translated, prompt_tokens, completion_tokens) = match &self.provider {
            TranslationProviderImpl::Ollama { client } => {
                let request = GenerationRequest::new(model, text)
                    .system(system_prompt)
                    .temperature(temperature)
                    .unbounded();
                let response = client.complete(request).await?;
                (
                    Ollama::extract_text(&response),
                    response.prompt_eval_count,
                    response.eval_count,
                )
            }
            TranslationProviderImpl::OpenAI { client } => {
                let request = OpenAIRequest::new(model)
                    .add_message("system", system_prompt)
                    .add_message("user", text)
                    .temperature(temperature)
                    .max_tokens(Self::max_tokens_for(text));
                let response = client.complete(request).await?;
                let usage = response.usage.as_ref();
                (
                    OpenAI::extract_text(&response),
                    usage.map(|u| u.prompt_tokens as u64),
                    usage.map(|u| u.completion_tokens as u64),
                )
            }
            TranslationProviderImpl::Anthropic { client } => {
                let request = AnthropicRequest::new(model, Self::max_tokens_for(text))
                    .system(system_prompt)
                    .add_message("user", text)
                    .temperature(temperature);
                let response = client.complete(request).await?;
                (
                    Anthropic::extract_text(&response),
                    Some(response.usage.input_tokens as u64),
                    Some(response.usage.output_tokens as u64),
                )
            }
        };

        let duration = start_time.elapsed();
        debug!(
            "{} response received in {:?} ({} chars)",
            self.config.provider.display_name(),
            duration,
            translated.chars().count()
        );
        self.usage.lock().record(prompt_tokens, completion_tokens, duration);

        Ok(translated)
    }

    fn name(&self) -> String {
        format!("{} ({})", self.config.provider.display_name(), self.config.get_model())
    }
}
