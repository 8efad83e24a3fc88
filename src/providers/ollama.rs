use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{Provider, error_body};

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// System message to guide the model
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Generation options for the Ollama API
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for generation (default: 0.8)
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Model name
    pub model: String,
    /// Generated text
    pub response: String,
    /// Whether the generation is complete
    pub done: bool,
    /// Why generation stopped (`stop`, `length`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    /// Number of prompt tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

/// Version response from the Ollama API
#[derive(Debug, Deserialize)]
pub struct VersionResponse {
    pub version: String,
}

impl GenerationRequest {
    /// Create a new non-streaming generation request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            options: None,
            stream: Some(false),
        }
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).temperature = Some(temperature);
        self
    }

    /// Allow unlimited generation length; long chunks must not be cut off
    pub fn unbounded(mut self) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).num_predict = Some(-1);
        self
    }
}

impl Ollama {
    /// Create a new Ollama client from an endpoint such as `http://localhost:11434`
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        let endpoint = endpoint.into();
        let base_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint
        } else {
            format!("http://{}", endpoint)
        };

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                // Ollama speaks HTTP/1.1
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Get the server version
    pub async fn version(&self) -> Result<String, ProviderError> {
        let response = self.client.get(format!("{}/api/version", self.base_url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), error_body(response).await));
        }
        let version = response
            .json::<VersionResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(version.version)
    }

    /// Parse a generate response body.
    ///
    /// Some Ollama builds stream JSON lines even when asked not to; in that
    /// case the `response` pieces are concatenated and the final line
    /// supplies the counters.
    pub fn parse_generation_response(body: &str) -> Result<GenerationResponse, ProviderError> {
        if let Ok(response) = serde_json::from_str::<GenerationResponse>(body) {
            return Ok(response);
        }

        let mut pieces = String::new();
        let mut last: Option<GenerationResponse> = None;
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let part = serde_json::from_str::<GenerationResponse>(line).map_err(|e| {
                let preview: String = body.chars().take(500).collect();
                error!("Failed to parse Ollama API response: {}. Raw response: {}", e, preview);
                ProviderError::InvalidResponse(format!("Failed to parse Ollama API response: {}", e))
            })?;
            pieces.push_str(&part.response);
            last = Some(part);
        }

        match last {
            Some(mut final_part) if final_part.done => {
                final_part.response = pieces;
                Ok(final_part)
            }
            Some(_) => Err(ProviderError::InvalidResponse(
                "Ollama stream ended before completion".to_string(),
            )),
            None => Err(ProviderError::InvalidResponse("Empty Ollama response".to_string())),
        }
    }
}

#[async_trait]
impl Provider for Ollama {
    type Request = GenerationRequest;
    type Response = GenerationResponse;

    async fn complete(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = error_body(response).await;
            error!("Ollama API error ({}): {}", status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), error_text));
        }

        let body = response.text().await?;
        let generated = Self::parse_generation_response(&body)?;
        if generated.done_reason.as_deref() == Some("length") {
            return Err(ProviderError::InvalidResponse(
                "Ollama response was truncated at the length limit".to_string(),
            ));
        }
        Ok(generated)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        self.version().await.map(|_| ())
    }

    fn extract_text(response: &GenerationResponse) -> String {
        response.response.clone()
    }
}
