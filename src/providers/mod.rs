/*!
 * Provider implementations for the language-rewrite capability.
 *
 * This module contains thin HTTP clients for the supported LLM services:
 * - Ollama: Local LLM server
 * - OpenAI: OpenAI API, also used for LM Studio's compatible server
 * - Anthropic: Anthropic Messages API
 *
 * Clients perform exactly one request per call. Retrying is the
 * orchestrator's job, so a client never sleeps or loops.
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// Common trait for all LLM provider clients
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing them to be used interchangeably in the translation service.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Complete a request using this provider
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Extract text from the provider response
    fn extract_text(response: &Self::Response) -> String;
}

/// The rewrite capability the translation orchestrator depends on.
///
/// Given protected text, return the same text in the target language with
/// every placeholder token left untouched.
#[async_trait]
pub trait Rewriter: Send + Sync {
    /// Rewrite `text` from `source_language` into `target_language`
    async fn rewrite(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, ProviderError>;

    /// Short name used in logs
    fn name(&self) -> String;
}

/// Read an error body, falling back to the status text
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    response
        .text()
        .await
        .ok()
        .filter(|body| !body.trim().is_empty())
        .unwrap_or_else(|| status.to_string())
}

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;
