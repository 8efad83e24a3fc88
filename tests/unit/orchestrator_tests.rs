/*!
 * Tests for the translation orchestrator against mock rewriters
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arxlate::document::{Document, SourceUnit};
use arxlate::errors::{ProviderError, TranslationError};
use arxlate::latex::{SpanProtector, split};
use arxlate::providers::Rewriter;
use arxlate::providers::mock::MockRewriter;
use arxlate::translation::{
    ChunkStatus, FallbackPolicy, LogEntry, Orchestrator, OrchestratorOptions, RetryPolicy,
};
use crate::common::{SAMPLE_MAIN, SAMPLE_METHOD};

fn options(max_attempts: u32, concurrency: usize, max_chunk_chars: usize) -> OrchestratorOptions {
    OrchestratorOptions {
        source_language: "en".to_string(),
        target_language: "fr".to_string(),
        concurrency,
        max_chunk_chars,
        retry: RetryPolicy::immediate(max_attempts),
        fallback: FallbackPolicy::Fail,
    }
}

fn sample_document() -> Document {
    let mut document = Document::new("paper");
    document.insert_tex("main.tex", SAMPLE_MAIN.to_string());
    document.insert_tex("sections/method.tex", SAMPLE_METHOD.to_string());
    document.insert_support("figure.png", "paper/figure.png");
    document
}

/// Rewriter that records the highest number of calls in flight at once
#[derive(Default)]
struct InFlightRewriter {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Rewriter for InFlightRewriter {
    async fn rewrite(&self, text: &str, _source: &str, target: &str) -> Result<String, ProviderError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(15)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(MockRewriter::translate(text, target))
    }

    fn name(&self) -> String {
        "in-flight".to_string()
    }
}

/// Test translating every unit of a paper while leaving support files alone
#[tokio::test]
async fn test_translate_document_withSamplePaper_shouldTranslateTexOnly() {
    let rewriter = MockRewriter::working();
    let orchestrator = Orchestrator::new(Arc::new(rewriter.clone()), options(2, 3, 60));

    let result = orchestrator.translate_document(&sample_document()).await.unwrap();
    let translated = &result.document;

    assert_eq!(translated.len(), 3);
    assert_eq!(translated.tex_count(), 2);
    assert!(matches!(
        translated.get(Path::new("figure.png")),
        Some(SourceUnit::Support(source)) if source == &PathBuf::from("paper/figure.png")
    ));

    let main = translated.tex(Path::new("main.tex")).unwrap();
    assert!(main.starts_with("\\documentclass{article}"));
    assert!(main.contains("~\\cite{smith2020}"));
    assert!(main.contains("$f(x) = x^2$"));
    assert!(main.contains("\\input{sections/method}"));
    assert!(main.contains("[fr] "));

    let method = translated.tex(Path::new("sections/method.tex")).unwrap();
    assert!(method.contains("% reviewers asked for more detail here"));
    assert!(method.contains("L = \\sum_i \\ell(x_i)"));

    let report = &result.report;
    assert_eq!(report.units, 2);
    assert_eq!(report.translated + report.skipped, report.chunks);
    assert_eq!(report.retries, 0);
    assert_eq!(rewriter.call_count(), report.translated);
}

/// Test that completion order never leaks into the output
#[tokio::test]
async fn test_translate_chunks_withStaggeredLatency_shouldKeepIndexOrder() {
    let rewriter = MockRewriter::staggered(40);
    let orchestrator = Orchestrator::new(Arc::new(rewriter.clone()), options(1, 4, 20));

    let plan = split("First part.\n\nSecond part.\n\nThird part.\n\nFourth part.", 20);
    assert_eq!(plan.len(), 4);

    let outcomes = orchestrator
        .translate_chunks(Path::new("main.tex"), &plan)
        .await
        .unwrap();

    let texts: Vec<&str> = outcomes.iter().map(|o| o.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["[fr] First part.", "[fr] Second part.", "[fr] Third part.", "[fr] Fourth part."]
    );
    assert!(outcomes.iter().all(|o| o.status == ChunkStatus::Success && o.attempts == 1));
}

/// Test that the pool never exceeds the configured concurrency
#[tokio::test]
async fn test_translate_chunks_withManyChunks_shouldRespectConcurrencyLimit() {
    let rewriter = Arc::new(InFlightRewriter::default());
    let orchestrator = Orchestrator::new(rewriter.clone(), options(1, 3, 15));

    let text: Vec<String> = (0..12).map(|i| format!("Paragraph {}.", i)).collect();
    let plan = split(&text.join("\n\n"), 15);
    assert_eq!(plan.len(), 12);

    let outcomes = orchestrator
        .translate_chunks(Path::new("main.tex"), &plan)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), plan.len());
    let peak = rewriter.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight was {}", peak);
    assert!(peak >= 2, "requests never overlapped");
}

/// Test that transient failures are retried until they succeed
#[tokio::test]
async fn test_translate_chunks_withIntermittentFailures_shouldRetryAndSucceed() {
    let rewriter = MockRewriter::intermittent(3);
    let orchestrator = Orchestrator::new(Arc::new(rewriter.clone()), options(3, 1, 20));

    let plan = split("One thing.\n\nTwo things.\n\nRed thing.\n\nBlue thing.", 20);
    assert_eq!(plan.len(), 4);
    let outcomes = orchestrator
        .translate_chunks(Path::new("main.tex"), &plan)
        .await
        .unwrap();

    assert!(outcomes.iter().all(|o| o.status == ChunkStatus::Success));
    let attempts: u32 = outcomes.iter().map(|o| o.attempts).sum();
    assert_eq!(attempts as usize, rewriter.call_count());
    assert!(attempts > plan.len() as u32);
}

/// Test that a failed chunk stops chunks that have not started yet
#[tokio::test]
async fn test_translate_chunks_withPermanentFailure_shouldCancelPendingChunks() {
    let rewriter = MockRewriter::unauthorized();
    let orchestrator = Orchestrator::new(Arc::new(rewriter.clone()), options(3, 1, 20));

    let plan = split("One thing.\n\nTwo things.\n\nRed thing.", 20);
    let err = orchestrator
        .translate_chunks(Path::new("main.tex"), &plan)
        .await
        .unwrap_err();

    assert!(matches!(err, TranslationError::TranslationFailed { chunk: 0, .. }));
    assert_eq!(rewriter.call_count(), 1);
}

/// Test the fallback policy over a whole document
#[tokio::test]
async fn test_translate_document_withKeepOriginal_shouldKeepSourceUnchanged() {
    let rewriter = MockRewriter::dropping_tokens();
    let mut opts = options(2, 2, 60);
    opts.fallback = FallbackPolicy::KeepOriginal;
    let orchestrator = Orchestrator::new(Arc::new(rewriter.clone()), opts);

    let mut document = Document::new("paper");
    document.insert_tex("main.tex", SAMPLE_MAIN.to_string());

    let result = orchestrator.translate_document(&document).await.unwrap();

    let main = result.document.tex(Path::new("main.tex")).unwrap();
    assert!(main.contains("\\cite{smith2020}"));
    assert!(main.contains("$f(x) = x^2$"));
    assert!(result.report.fell_back > 0);
    assert_eq!(result.report.fell_back + result.report.translated + result.report.skipped, result.report.chunks);
}

/// Test that one protector across calls keeps tokens unique
#[tokio::test]
async fn test_translate_text_withSharedProtector_shouldRestoreEachText() {
    let orchestrator = Orchestrator::new(Arc::new(MockRewriter::working()), options(1, 2, 200));
    let mut protector = SpanProtector::new();

    let first = orchestrator
        .translate_text(Path::new("a.tex"), "See \\ref{a} here.", &mut protector)
        .await
        .unwrap();
    let second = orchestrator
        .translate_text(Path::new("b.tex"), "See \\ref{b} there.", &mut protector)
        .await
        .unwrap();

    assert_eq!(first, "[fr] See \\ref{a} here.");
    assert_eq!(second, "[fr] See \\ref{b} there.");
    assert_eq!(protector.next_id(), 3);
}

/// Test that a token broken apart by the rewriter is named in the issues log
#[tokio::test]
async fn test_translate_text_withMangledTokens_shouldNameFragmentsInLog() {
    let captured: Arc<Mutex<Vec<LogEntry>>> = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = Orchestrator::new(Arc::new(MockRewriter::mangling()), options(2, 1, 200))
        .with_log_capture(captured.clone());
    let mut protector = SpanProtector::new();

    let err = orchestrator
        .translate_text(Path::new("a.tex"), "See \\ref{a} here.", &mut protector)
        .await
        .unwrap_err();

    assert!(matches!(err, TranslationError::TranslationFailed { chunk: 0, .. }));
    let entries = captured.lock();
    let failure = entries
        .iter()
        .find(|entry| entry.level == "ERROR")
        .expect("failure is captured");
    assert!(failure.message.contains("missing: [ZXQ0001QXZ]"), "{}", failure.message);
    assert!(failure.message.contains("mangled: [ZXQ 0001 QXZ]"), "{}", failure.message);
}
