/*!
 * Provider-specific concurrency tuning and request pacing.
 *
 * Profiles seed the defaults written to a fresh config file; the pacer
 * enforces a provider's requests-per-minute limit across all workers.
 */

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::app_config::TranslationProvider;

/// Provider-specific concurrency profile with tuned defaults
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Maximum concurrent requests
    pub max_concurrent_requests: usize,
    /// Target requests per minute (for rate limiting)
    pub target_rpm: Option<u32>,
    /// Characters of protected text per chunk
    pub max_chars_per_chunk: usize,
    /// Timeout for a single request
    pub timeout_secs: u64,
}

impl ProviderProfile {
    /// Get the profile for a given provider
    pub fn for_provider(provider: TranslationProvider) -> Self {
        match provider {
            TranslationProvider::OpenAI => Self {
                max_concurrent_requests: 8,
                target_rpm: Some(300),
                max_chars_per_chunk: 3000,
                timeout_secs: 120,
            },
            TranslationProvider::Anthropic => Self {
                // Lower rate limits, larger context
                max_concurrent_requests: 5,
                target_rpm: Some(45),
                max_chars_per_chunk: 6000,
                timeout_secs: 180,
            },
            TranslationProvider::Ollama => Self {
                // Local models are slow per request and do not rate limit
                max_concurrent_requests: 2,
                target_rpm: None,
                max_chars_per_chunk: 1500,
                timeout_secs: 300,
            },
            TranslationProvider::LMStudio => Self {
                max_concurrent_requests: 2,
                target_rpm: None,
                max_chars_per_chunk: 1500,
                timeout_secs: 300,
            },
        }
    }

    /// Get effective concurrent requests, respecting any user override
    pub fn effective_concurrent_requests(&self, user_override: Option<usize>) -> usize {
        user_override.unwrap_or(self.max_concurrent_requests).max(1)
    }
}

/// Spaces request starts so a requests-per-minute limit is never exceeded
#[derive(Debug)]
pub struct RequestPacer {
    interval: Option<Duration>,
    next_slot: Mutex<Option<Instant>>,
}

impl RequestPacer {
    /// Pacer for `rate_limit` requests per minute; `None` or 0 disables pacing
    pub fn new(rate_limit: Option<u32>) -> Self {
        let interval = rate_limit
            .filter(|rpm| *rpm > 0)
            .map(|rpm| Duration::from_millis(60_000 / rpm as u64));
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Wait until the next request may start
    pub async fn wait(&self) {
        let Some(interval) = self.interval else {
            return;
        };

        let start_at = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let start_at = match *next_slot {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            *next_slot = Some(start_at + interval);
            start_at
        };

        tokio::time::sleep_until(start_at).await;
    }
}
