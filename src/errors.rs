/*!
 * Error types for the arxlate application.
 *
 * Each pipeline stage has its own error enum so a failed run can report
 * which stage failed and on which unit. The library uses these typed errors;
 * the binary and the controller wrap them in `anyhow` with context.
 */

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the span protector on source it refuses to guess about
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    /// A delimiter was opened and never closed
    #[error("Malformed markup: unterminated {construct} at byte {offset}")]
    Unterminated {
        /// What was left open (e.g. `$`, `\begin{equation}`, `{`)
        construct: String,
        /// Byte offset of the opening delimiter
        offset: usize,
    },

    /// A closing delimiter without an opener
    #[error("Malformed markup: unexpected {construct} at byte {offset}")]
    Unexpected {
        /// The stray closing construct
        construct: String,
        /// Byte offset of the stray construct
        offset: usize,
    },

    /// No placeholder id is left above those already in use
    #[error("Malformed markup: no placeholder id left above {highest}")]
    TokenIdsExhausted {
        /// Highest id already taken
        highest: usize,
    },
}

/// Errors that can occur when calling the language-rewrite capability
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The provider throttled the request
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The response was empty, unparseable or lost placeholder tokens
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_)
            | Self::Timeout(_)
            | Self::InvalidResponse(_)
            | Self::ConnectionError(_)
            | Self::RequestFailed(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
            Self::AuthenticationError(_) => false,
        }
    }

    /// Map an HTTP error status and body onto the error taxonomy
    pub fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            408 | 504 => Self::Timeout(message),
            429 => Self::RateLimited(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Errors that can occur during translation of a document
#[derive(Error, Debug)]
pub enum TranslationError {
    /// The rewrite capability failed for one attempt
    #[error("Rewrite failed: {0}")]
    RewriteFailure(#[from] ProviderError),

    /// The rewrite dropped, duplicated or invented placeholder tokens
    #[error("Translation altered placeholder tokens (missing: [{}], unexpected: [{}], mangled: [{}])", missing.join(", "), unexpected.join(", "), mangled.join(", "))]
    TokenLoss {
        /// Tokens that were sent but did not come back intact
        missing: Vec<String>,
        /// Tokens that came back more often than sent
        unexpected: Vec<String>,
        /// Broken token fragments found in the response
        mangled: Vec<String>,
    },

    /// A chunk exhausted its retry budget
    #[error("Translation failed for {} chunk {chunk}: {reason}", file.display())]
    TranslationFailed {
        /// Source file the chunk belongs to
        file: PathBuf,
        /// Chunk index within the file
        chunk: usize,
        /// Last error seen for the chunk
        reason: String,
    },

    /// The source could not be protected; no rewrite call was made
    #[error("Cannot protect {}: {source}", file.display())]
    Markup {
        /// File containing the malformed markup
        file: PathBuf,
        /// Underlying protector error
        #[source]
        source: MarkupError,
    },

    /// A result slot was written twice
    #[error("Result slot {0} was already filled")]
    SlotConflict(usize),

    /// A result slot was never written
    #[error("Result slot {0} is empty")]
    MissingSlot(usize),
}

impl TranslationError {
    /// Whether the error warrants another attempt at the same chunk
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RewriteFailure(e) => e.is_transient(),
            Self::TokenLoss { .. } => true,
            _ => false,
        }
    }
}

/// Errors that can occur while compiling the assembled document
#[derive(Error, Debug)]
pub enum CompileError {
    /// No candidate root document in the tree
    #[error("No root .tex document found in {}", .0.display())]
    NoRootDocument(PathBuf),

    /// The compiler ran and reported failure
    #[error("Compilation of {} failed (exit code {exit_code:?}):\n{log_tail}", root.display())]
    Failed {
        /// Root document that was compiled
        root: PathBuf,
        /// Process exit code, if any
        exit_code: Option<i32>,
        /// Last lines of the compiler log
        log_tail: String,
    },

    /// The compiler reported success but produced no PDF
    #[error("Compiler finished but no PDF was found at {}", .0.display())]
    MissingOutput(PathBuf),

    /// The compiler binary could not be started
    #[error("Failed to launch compiler '{program}': {message}")]
    Launch {
        /// Compiler program name
        program: String,
        /// OS error message
        message: String,
    },
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from the span protector
    #[error("Markup error: {0}")]
    Markup(#[from] MarkupError),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error from compilation
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
