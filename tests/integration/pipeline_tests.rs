/*!
 * End-to-end tests of the translate, assemble and compile pipeline
 */

use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use arxlate::app_config::Config;
use arxlate::app_controller::{Controller, PaperJob};
use arxlate::assembler::ISSUES_LOG_NAME;
use arxlate::providers::mock::MockRewriter;
use arxlate::translation::{FallbackPolicy, PaperInfo};
use crate::common::{self, SAMPLE_FIGURE};
use crate::common::fake_compiler::{FakeBehavior, FakeCompiler};

const PAPER_ID: &str = "2401.00001";

fn job(source_dir: &Path, output_dir: &Path) -> PaperJob {
    common::init_test_logging();
    PaperJob {
        paper_id: PAPER_ID.to_string(),
        source_dir: source_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        paper_info: PaperInfo::default(),
    }
}

fn sequential_config(max_attempts: u32) -> Config {
    let mut config = common::test_config(max_attempts);
    config.translation.active_provider_config_mut().concurrent_requests = 1;
    config
}

/// Test the full pipeline on a well-formed paper
#[tokio::test]
async fn test_run_withWellFormedPaper_shouldProducePdfAndPreserveMarkup() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_sample_paper(temp_dir.path(), PAPER_ID)?;
    let output = temp_dir.path().join("out");

    let rewriter = MockRewriter::working();
    let compiler = FakeCompiler::succeeding();
    let controller = Controller::with_config(common::test_config(2))?;

    let summary = controller
        .run_with(&job(&source, &output), Arc::new(rewriter.clone()), Arc::new(compiler.clone()), false)
        .await?;

    let pdf = summary.pdf.expect("compilation is enabled");
    assert_eq!(pdf, output.join("2401.00001.pdf"));
    assert!(pdf.exists());
    assert_eq!(compiler.pass_count(), 2);

    assert_eq!(fs::read(output.join("figure.png"))?, SAMPLE_FIGURE);
    assert_eq!(
        fs::read_to_string(output.join("refs.bib"))?,
        fs::read_to_string(source.join("refs.bib"))?
    );

    let main = fs::read_to_string(output.join("main.tex"))?;
    assert!(main.contains("\\documentclass{article}"));
    assert!(main.contains("~\\cite{smith2020}"));
    assert!(main.contains("$f(x) = x^2$"));
    assert!(main.contains("[fr] "));

    let method = fs::read_to_string(output.join("sections/method.tex"))?;
    assert!(method.contains("\\begin{equation}\n  L = \\sum_i \\ell(x_i)\n\\end{equation}"));
    assert!(method.contains("\\ref{sec:results}"));

    assert_eq!(summary.issues, 0);
    assert!(!output.join(ISSUES_LOG_NAME).exists());
    assert_eq!(summary.report.units, 2);
    assert_eq!(rewriter.call_count(), summary.report.translated);

    // Sources are never modified
    assert_eq!(fs::read_to_string(source.join("main.tex"))?, common::SAMPLE_MAIN);
    Ok(())
}

/// Test that with the default retry budget a chunk losing its tokens on
/// every attempt is retried once, then fails the document
#[tokio::test]
async fn test_run_withTokenLoss_shouldFailAfterOneRetryAndWriteNoTree() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_sample_paper(temp_dir.path(), PAPER_ID)?;
    let output = temp_dir.path().join("out");

    let rewriter = MockRewriter::dropping_tokens();
    let compiler = FakeCompiler::succeeding();
    let default_attempts = Config::default().translation.common.max_attempts;
    let controller = Controller::with_config(sequential_config(default_attempts))?;

    let err = controller
        .run_with(&job(&source, &output), Arc::new(rewriter.clone()), Arc::new(compiler.clone()), false)
        .await
        .unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.contains("Translation failed for"), "{}", message);

    let mut per_text: HashMap<String, usize> = HashMap::new();
    for text in rewriter.requests() {
        *per_text.entry(text).or_default() += 1;
    }
    let with_tokens: Vec<usize> = per_text
        .iter()
        .filter(|(text, _)| text.contains("ZXQ"))
        .map(|(_, count)| *count)
        .collect();
    assert_eq!(with_tokens, vec![2]);

    assert_eq!(compiler.pass_count(), 0);
    assert!(!output.join("main.tex").exists());
    assert!(!output.join("2401.00001.pdf").exists());

    let issues = fs::read_to_string(output.join(ISSUES_LOG_NAME))?;
    assert!(issues.contains("[ERROR]"));
    Ok(())
}

/// Test that malformed markup fails before any rewrite call
#[tokio::test]
async fn test_run_withUnterminatedEquation_shouldFailWithoutCalls() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_sample_paper(temp_dir.path(), PAPER_ID)?;
    common::create_test_file(
        &source,
        "sections/method.tex",
        "\\section{Method}\n\\begin{equation}\nL = 1\n\nThe end.\n",
    )?;
    let output = temp_dir.path().join("out");

    let rewriter = MockRewriter::working();
    let controller = Controller::with_config(common::test_config(2))?;

    let err = controller
        .run_with(&job(&source, &output), Arc::new(rewriter.clone()), Arc::new(FakeCompiler::succeeding()), false)
        .await
        .unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.contains("sections/method.tex"), "{}", message);
    assert!(message.contains("unterminated \\begin{equation}"), "{}", message);
    assert_eq!(rewriter.call_count(), 0);
    assert!(!output.join("main.tex").exists());
    Ok(())
}

/// Test the keep-original fallback: the run succeeds and the issues are logged
#[tokio::test]
async fn test_run_withKeepOriginalFallback_shouldSucceedAndLogIssues() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_sample_paper(temp_dir.path(), PAPER_ID)?;
    let output = temp_dir.path().join("out");

    let mut config = common::test_config(2);
    config.output.fallback = FallbackPolicy::KeepOriginal;
    let controller = Controller::with_config(config)?;

    let summary = controller
        .run_with(
            &job(&source, &output),
            Arc::new(MockRewriter::dropping_tokens()),
            Arc::new(FakeCompiler::succeeding()),
            false,
        )
        .await?;

    assert!(summary.pdf.is_some());
    assert!(summary.report.fell_back > 0);
    assert!(summary.issues > 0);

    let main = fs::read_to_string(output.join("main.tex"))?;
    assert!(main.contains("~\\cite{smith2020}"));

    let issues = fs::read_to_string(output.join(ISSUES_LOG_NAME))?;
    assert!(issues.contains("Context: 2401.00001 (en -> fr)"));
    assert!(issues.contains("[WARN]"));
    Ok(())
}

/// Test that an occupied output directory is refused unless forced
#[tokio::test]
async fn test_run_withNonEmptyOutput_shouldRequireForce() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_sample_paper(temp_dir.path(), PAPER_ID)?;
    let output = temp_dir.path().join("out");
    common::create_test_file(&output, "keep_me.txt", "precious")?;

    let controller = Controller::with_config(common::test_config(1))?;

    let refused = controller
        .run_with(&job(&source, &output), Arc::new(MockRewriter::working()), Arc::new(FakeCompiler::succeeding()), false)
        .await;
    assert!(refused.is_err());
    assert_eq!(fs::read_to_string(output.join("keep_me.txt"))?, "precious");
    assert!(!output.join("main.tex").exists());

    let forced = controller
        .run_with(&job(&source, &output), Arc::new(MockRewriter::working()), Arc::new(FakeCompiler::succeeding()), true)
        .await?;
    assert!(forced.pdf.is_some());
    assert!(!output.join("keep_me.txt").exists());
    assert!(output.join("main.tex").exists());
    Ok(())
}

/// Test that a compile failure keeps the translated tree and logs the compiler output
#[tokio::test]
async fn test_run_withFailingCompiler_shouldKeepTreeAndReportLog() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_sample_paper(temp_dir.path(), PAPER_ID)?;
    let output = temp_dir.path().join("out");

    let compiler = FakeCompiler::new(FakeBehavior::Fail("! LaTeX Error: File `missing.sty' not found.".to_string()));
    let controller = Controller::with_config(common::test_config(1))?;

    let err = controller
        .run_with(&job(&source, &output), Arc::new(MockRewriter::working()), Arc::new(compiler), false)
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("missing.sty"));
    assert!(output.join("main.tex").exists());
    assert!(!output.join("2401.00001.pdf").exists());

    let issues = fs::read_to_string(output.join(ISSUES_LOG_NAME))?;
    assert!(issues.contains("missing.sty"));
    Ok(())
}

/// Test that compilation can be switched off
#[tokio::test]
async fn test_run_withCompileDisabled_shouldOnlyWriteSources() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_sample_paper(temp_dir.path(), PAPER_ID)?;
    let output = temp_dir.path().join("out");

    let mut config = common::test_config(1);
    config.compile.enabled = false;
    let controller = Controller::with_config(config)?;
    let compiler = FakeCompiler::succeeding();

    let summary = controller
        .run_with(&job(&source, &output), Arc::new(MockRewriter::working()), Arc::new(compiler.clone()), false)
        .await?;

    assert!(summary.pdf.is_none());
    assert_eq!(compiler.pass_count(), 0);
    assert!(output.join("sections/method.tex").exists());
    Ok(())
}

/// Test resolving a local source tree into a job
#[tokio::test]
async fn test_resolve_job_withLocalDirectory_shouldDeriveOutputName() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_sample_paper(temp_dir.path(), PAPER_ID)?;
    common::create_test_file(
        &source,
        "paper.json",
        r#"{"title": "On Small Things", "abstract": "We study small things."}"#,
    )?;

    let controller = Controller::with_config(common::test_config(1))?;
    let source_arg = source.to_string_lossy().to_string();
    let job = controller.resolve_job(&source_arg, temp_dir.path(), None).await?;

    assert_eq!(job.paper_id, PAPER_ID);
    assert_eq!(job.source_dir, source);
    assert_eq!(job.output_dir, temp_dir.path().join("2401.00001_fr"));
    assert_eq!(job.paper_info.title, "On Small Things");
    Ok(())
}

/// Test that unreadable paper metadata in a local directory is skipped
#[tokio::test]
async fn test_resolve_job_withMalformedPaperInfo_shouldFallBackToEmptyContext() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_sample_paper(temp_dir.path(), PAPER_ID)?;
    common::create_test_file(&source, "paper.json", "{ not json")?;

    let controller = Controller::with_config(common::test_config(1))?;
    let source_arg = source.to_string_lossy().to_string();
    let job = controller.resolve_job(&source_arg, temp_dir.path(), None).await?;

    assert_eq!(job.paper_id, PAPER_ID);
    assert_eq!(job.paper_info, PaperInfo::default());
    Ok(())
}

/// Test resolving an arXiv URL against the sources directory
#[test]
fn test_resolve_job_withArxivUrl_shouldFindStagedSources() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_sample_paper(temp_dir.path(), PAPER_ID)?;
    let controller = Controller::with_config(common::test_config(1))?;

    let (job, missing) = tokio_test::block_on(async {
        let job = controller
            .resolve_job("https://arxiv.org/abs/2401.00001", temp_dir.path(), Some(temp_dir.path().join("custom")))
            .await;
        let missing = controller.resolve_job("2402.99999", temp_dir.path(), None).await;
        (job, missing)
    });

    let job = job?;
    assert_eq!(job.source_dir, source);
    assert_eq!(job.output_dir, temp_dir.path().join("custom"));
    assert!(missing.is_err());
    Ok(())
}
