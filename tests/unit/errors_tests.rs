/*!
 * Tests for the error taxonomy
 */

use std::path::PathBuf;
use arxlate::errors::{AppError, CompileError, MarkupError, ProviderError, TranslationError};

/// Test which provider errors are worth retrying
#[test]
fn test_provider_error_isTransient_shouldSeparateTransientFromPermanent() {
    assert!(ProviderError::RateLimited("slow down".into()).is_transient());
    assert!(ProviderError::Timeout("30s".into()).is_transient());
    assert!(ProviderError::InvalidResponse("empty".into()).is_transient());
    assert!(ProviderError::ConnectionError("reset".into()).is_transient());
    assert!(ProviderError::ApiError { status_code: 503, message: "busy".into() }.is_transient());

    assert!(!ProviderError::AuthenticationError("bad key".into()).is_transient());
    assert!(!ProviderError::ApiError { status_code: 400, message: "bad request".into() }.is_transient());
}

/// Test the HTTP status mapping
#[test]
fn test_provider_error_fromStatus_shouldMapKnownCodes() {
    assert!(matches!(ProviderError::from_status(401, String::new()), ProviderError::AuthenticationError(_)));
    assert!(matches!(ProviderError::from_status(429, String::new()), ProviderError::RateLimited(_)));
    assert!(matches!(ProviderError::from_status(504, String::new()), ProviderError::Timeout(_)));
    assert!(matches!(
        ProviderError::from_status(500, "oops".into()),
        ProviderError::ApiError { status_code: 500, .. }
    ));
}

/// Test retryability of translation errors
#[test]
fn test_translation_error_isRetryable_shouldFollowCause() {
    let token_loss = TranslationError::TokenLoss {
        missing: vec!["ZXQ0003QXZ".into()],
        unexpected: vec![],
        mangled: vec![],
    };
    assert!(token_loss.is_retryable());
    assert!(TranslationError::from(ProviderError::Timeout("t".into())).is_retryable());
    assert!(!TranslationError::from(ProviderError::AuthenticationError("k".into())).is_retryable());

    let failed = TranslationError::TranslationFailed {
        file: PathBuf::from("main.tex"),
        chunk: 2,
        reason: "gave up".into(),
    };
    assert!(!failed.is_retryable());
    assert_eq!(failed.to_string(), "Translation failed for main.tex chunk 2: gave up");
}

/// Test error messages carry what a user needs to act on
#[test]
fn test_error_display_shouldIncludeDetails() {
    let markup = MarkupError::Unterminated {
        construct: "\\begin{equation}".into(),
        offset: 42,
    };
    assert_eq!(markup.to_string(), "Malformed markup: unterminated \\begin{equation} at byte 42");

    let compile = CompileError::Failed {
        root: PathBuf::from("main.tex"),
        exit_code: Some(1),
        log_tail: "! Undefined control sequence.".into(),
    };
    assert!(compile.to_string().contains("! Undefined control sequence."));

    let app: AppError = compile.into();
    assert!(app.to_string().starts_with("Compile error:"));
}
