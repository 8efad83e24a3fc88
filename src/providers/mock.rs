/*!
 * Mock rewriter implementations for testing.
 *
 * `MockRewriter` simulates the rewrite capability without network access:
 * - `MockRewriter::working()` - tags the text and keeps every token
 * - `MockRewriter::dropping_tokens()` - loses every placeholder token
 * - `MockRewriter::mangling()` - splits every token with spaces
 * - `MockRewriter::failing()` - always fails with a transient error
 * - `MockRewriter::intermittent(n)` - fails every n-th request
 *
 * Every request is recorded so tests can assert on call counts.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::latex::token::TOKEN_REGEX;
use crate::providers::Rewriter;

/// Behavior mode for the mock rewriter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with `[lang] text`
    Working,
    /// Succeeds but strips every placeholder token
    DroppingTokens,
    /// Succeeds but writes every token as `ZXQ 0001 QXZ`
    Mangling,
    /// Drops tokens on the first `n` requests, then works
    DroppingTokensFirst { n: usize },
    /// Fails intermittently (every Nth request, 1-based)
    Intermittent { fail_every: usize },
    /// Always fails with a rate limit error
    Failing,
    /// Always fails with an authentication error
    Unauthorized,
    /// Returns an empty response
    Empty,
    /// Wraps the translation in a markdown code fence
    Fenced,
    /// Works, but earlier requests take longer than later ones
    Staggered { max_delay_ms: u64 },
}

/// Mock rewriter for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockRewriter {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter, shared between clones
    request_count: Arc<AtomicUsize>,
    /// Texts received, in arrival order
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockRewriter {
    /// Create a new mock rewriter with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn dropping_tokens() -> Self {
        Self::new(MockBehavior::DroppingTokens)
    }

    pub fn mangling() -> Self {
        Self::new(MockBehavior::Mangling)
    }

    pub fn dropping_tokens_first(n: usize) -> Self {
        Self::new(MockBehavior::DroppingTokensFirst { n })
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn unauthorized() -> Self {
        Self::new(MockBehavior::Unauthorized)
    }

    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    pub fn fenced() -> Self {
        Self::new(MockBehavior::Fenced)
    }

    pub fn staggered(max_delay_ms: u64) -> Self {
        Self::new(MockBehavior::Staggered { max_delay_ms })
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Texts received so far, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// The translation a working mock returns for `text`
    pub fn translate(text: &str, target_language: &str) -> String {
        format!("[{}] {}", target_language, text)
    }

    fn strip_tokens(text: &str) -> String {
        TOKEN_REGEX.replace_all(text, "").into_owned()
    }

    fn mangle_tokens(text: &str) -> String {
        TOKEN_REGEX.replace_all(text, "ZXQ $1 QXZ").into_owned()
    }
}

#[async_trait]
impl Rewriter for MockRewriter {
    async fn rewrite(
        &self,
        text: &str,
        _source_language: &str,
        target_language: &str,
    ) -> Result<String, ProviderError> {
        let request_number = self.request_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().push(text.to_string());

        match self.behavior {
            MockBehavior::Working => Ok(Self::translate(text, target_language)),
            MockBehavior::DroppingTokens => {
                Ok(Self::translate(&Self::strip_tokens(text), target_language))
            }
            MockBehavior::Mangling => {
                Ok(Self::translate(&Self::mangle_tokens(text), target_language))
            }
            MockBehavior::DroppingTokensFirst { n } => {
                if request_number <= n {
                    Ok(Self::translate(&Self::strip_tokens(text), target_language))
                } else {
                    Ok(Self::translate(text, target_language))
                }
            }
            MockBehavior::Intermittent { fail_every } => {
                if fail_every > 0 && request_number % fail_every == 0 {
                    Err(ProviderError::ConnectionError(format!(
                        "Simulated connection drop on request {}",
                        request_number
                    )))
                } else {
                    Ok(Self::translate(text, target_language))
                }
            }
            MockBehavior::Failing => {
                Err(ProviderError::RateLimited("Simulated rate limit".to_string()))
            }
            MockBehavior::Unauthorized => {
                Err(ProviderError::AuthenticationError("Simulated invalid key".to_string()))
            }
            MockBehavior::Empty => Ok(String::new()),
            MockBehavior::Fenced => Ok(format!(
                "```latex\n{}\n```",
                Self::translate(text, target_language)
            )),
            MockBehavior::Staggered { max_delay_ms } => {
                let delay = max_delay_ms / request_number as u64;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(Self::translate(text, target_language))
            }
        }
    }

    fn name(&self) -> String {
        format!("mock ({:?})", self.behavior)
    }
}
