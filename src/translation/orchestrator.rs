/*!
 * Translation orchestration.
 *
 * The orchestrator protects every `.tex` unit of a document, splits the safe
 * text into chunks and sends all chunks of all units through one bounded
 * worker pool. Each chunk is validated against the placeholder tokens it
 * carried and retried under the configured `RetryPolicy`. Results land in
 * write-once slots and are reassembled in index order, so the output never
 * depends on the order in which requests complete.
 */

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Semaphore;

use super::core::LogEntry;
use super::retry::RetryPolicy;
use crate::app_config::Config;
use crate::document::{Document, SourceUnit};
use crate::errors::{ProviderError, TranslationError};
use crate::latex::{self, Chunk, ChunkPlan, SpanProtector, TokenMap};
use crate::providers::Rewriter;
use crate::validation::TokenValidator;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z-]*[ \t]*\r?\n(.*?)\r?\n?[ \t]*```\s*$")
        .expect("Invalid code fence regex")
});

/// Strip a markdown code fence the model wrapped around its answer
pub fn unwrap_code_fence(text: &str) -> &str {
    CODE_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

/// What to do with a chunk that exhausted its attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Fail the document
    #[default]
    Fail,
    /// Keep the chunk's source text and log a warning
    KeepOriginal,
}

/// Final state of one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Translated and validated
    Success,
    /// Nothing to translate, source text kept
    Skipped,
    /// Attempts exhausted or a permanent error
    Failed(String),
    /// Failed, but the source text was kept under `FallbackPolicy::KeepOriginal`
    FellBack(String),
    /// Never attempted because another chunk already failed the document
    Cancelled,
}

/// Result for one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub index: usize,
    /// Protected text to reassemble, translated unless the chunk was kept
    pub text: String,
    pub status: ChunkStatus,
    /// Rewrite calls made for this chunk
    pub attempts: u32,
}

impl ChunkOutcome {
    fn kept(chunk: &Chunk, status: ChunkStatus, attempts: u32) -> Self {
        Self {
            index: chunk.index,
            text: chunk.text.clone(),
            status,
            attempts,
        }
    }
}

/// One write-once slot per chunk index
#[derive(Debug)]
pub struct ResultSlots {
    slots: Mutex<Vec<Option<ChunkOutcome>>>,
}

impl ResultSlots {
    pub fn new(len: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; len]),
        }
    }

    /// Store an outcome in the slot of its index
    pub fn fill(&self, outcome: ChunkOutcome) -> Result<(), TranslationError> {
        let mut slots = self.slots.lock();
        let index = outcome.index;
        match slots.get_mut(index) {
            None => Err(TranslationError::MissingSlot(index)),
            Some(Some(_)) => Err(TranslationError::SlotConflict(index)),
            Some(slot) => {
                *slot = Some(outcome);
                Ok(())
            }
        }
    }

    /// Outcomes in index order; every slot must be filled
    pub fn into_outcomes(self) -> Result<Vec<ChunkOutcome>, TranslationError> {
        self.slots
            .into_inner()
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or(TranslationError::MissingSlot(index)))
            .collect()
    }
}

/// Counters over a translation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationReport {
    pub units: usize,
    pub chunks: usize,
    pub translated: usize,
    pub skipped: usize,
    pub fell_back: usize,
    /// Attempts beyond the first, over all chunks
    pub retries: usize,
}

impl TranslationReport {
    fn record(&mut self, outcomes: &[ChunkOutcome]) {
        self.units += 1;
        self.chunks += outcomes.len();
        for outcome in outcomes {
            match outcome.status {
                ChunkStatus::Success => self.translated += 1,
                ChunkStatus::Skipped => self.skipped += 1,
                ChunkStatus::FellBack(_) => self.fell_back += 1,
                ChunkStatus::Failed(_) | ChunkStatus::Cancelled => {}
            }
            self.retries += outcome.attempts.saturating_sub(1) as usize;
        }
    }
}

/// A translated document plus what it took to get there
#[derive(Debug, Clone)]
pub struct TranslatedDocument {
    pub document: Document,
    pub report: TranslationReport,
}

/// Progress callback receiving (completed chunks, total chunks)
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub source_language: String,
    pub target_language: String,
    /// Maximum number of rewrite calls in flight
    pub concurrency: usize,
    /// Maximum chunk size in characters
    pub max_chunk_chars: usize,
    pub retry: RetryPolicy,
    pub fallback: FallbackPolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            source_language: "en".to_string(),
            target_language: "ko".to_string(),
            concurrency: 4,
            max_chunk_chars: 3000,
            retry: RetryPolicy::default(),
            fallback: FallbackPolicy::default(),
        }
    }
}

impl OrchestratorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
            concurrency: config.translation.optimal_concurrent_requests(),
            max_chunk_chars: config.translation.get_max_chars_per_request(),
            retry: RetryPolicy::from_config(&config.translation.common),
            fallback: config.output.fallback,
        }
    }
}

/// One protected unit waiting for translation
struct UnitPlan {
    file: PathBuf,
    token_map: TokenMap,
    plan: ChunkPlan,
}

/// A chunk scheduled on the pool
struct Job<'a> {
    unit: usize,
    file: &'a Path,
    chunk: &'a Chunk,
}

/// Dispatches chunks to a rewriter under bounded concurrency
pub struct Orchestrator {
    rewriter: Arc<dyn Rewriter>,
    options: OrchestratorOptions,
    semaphore: Arc<Semaphore>,
    progress_callback: Option<ProgressCallback>,
    log_capture: Option<Arc<Mutex<Vec<LogEntry>>>>,
}

impl Orchestrator {
    pub fn new(rewriter: Arc<dyn Rewriter>, options: OrchestratorOptions) -> Self {
        let permits = options.concurrency.max(1);
        Self {
            rewriter,
            options,
            semaphore: Arc::new(Semaphore::new(permits)),
            progress_callback: None,
            log_capture: None,
        }
    }

    /// Report progress after every finished chunk
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Collect warnings and failures for the issues log
    pub fn with_log_capture(mut self, log_capture: Arc<Mutex<Vec<LogEntry>>>) -> Self {
        self.log_capture = Some(log_capture);
        self
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Translate every `.tex` unit of `document`.
    ///
    /// All units are protected before the first rewrite call, so malformed
    /// markup anywhere fails the document without any request being made.
    pub async fn translate_document(
        &self,
        document: &Document,
    ) -> Result<TranslatedDocument, TranslationError> {
        let mut protector = SpanProtector::new();
        let mut units = Vec::with_capacity(document.tex_count());
        for (file, raw) in document.tex_units() {
            units.push(self.prepare_unit(&mut protector, file, raw)?);
        }

        info!(
            "Translating {} units in {} chunks ({} need a rewrite)",
            units.len(),
            units.iter().map(|u| u.plan.len()).sum::<usize>(),
            units.iter().map(|u| u.plan.translatable_count()).sum::<usize>()
        );

        let (texts, report) = self.translate_units(&units).await?;

        let mut translated = Document::new(document.root());
        let mut texts = texts.into_iter();
        for (path, unit) in document.units() {
            match unit {
                SourceUnit::Tex(_) => {
                    let text = texts
                        .next()
                        .ok_or(TranslationError::MissingSlot(translated.tex_count()))?;
                    translated.insert_tex(path, text);
                }
                SourceUnit::Support(source) => translated.insert_support(path, source.clone()),
            }
        }

        Ok(TranslatedDocument {
            document: translated,
            report,
        })
    }

    /// Protect, translate and restore a single text
    pub async fn translate_text(
        &self,
        file: &Path,
        raw: &str,
        protector: &mut SpanProtector,
    ) -> Result<String, TranslationError> {
        let unit = self.prepare_unit(protector, file, raw)?;
        let (mut texts, _) = self.translate_units(std::slice::from_ref(&unit)).await?;
        texts.pop().ok_or(TranslationError::MissingSlot(0))
    }

    /// Translate the chunks of one plan, returning outcomes in index order.
    ///
    /// Fails with `TranslationFailed` for the first chunk that exhausted its
    /// attempts, unless the fallback policy keeps the source text.
    pub async fn translate_chunks(
        &self,
        file: &Path,
        plan: &ChunkPlan,
    ) -> Result<Vec<ChunkOutcome>, TranslationError> {
        let slots = vec![ResultSlots::new(plan.len())];
        let jobs = plan
            .chunks
            .iter()
            .map(|chunk| Job { unit: 0, file, chunk })
            .collect();
        self.run_jobs(jobs, &slots).await?;

        let outcomes = slots
            .into_iter()
            .next()
            .ok_or(TranslationError::MissingSlot(0))?
            .into_outcomes()?;
        Self::check_failures(file, &outcomes)?;
        Ok(outcomes)
    }

    fn prepare_unit(
        &self,
        protector: &mut SpanProtector,
        file: &Path,
        raw: &str,
    ) -> Result<UnitPlan, TranslationError> {
        let protected = protector
            .protect(raw)
            .map_err(|source| TranslationError::Markup {
                file: file.to_path_buf(),
                source,
            })?;
        let plan = latex::split(&protected.safe_text, self.options.max_chunk_chars);
        debug!(
            "{}: {} spans protected, {} chunks",
            file.display(),
            protected.spans.len(),
            plan.len()
        );
        Ok(UnitPlan {
            file: file.to_path_buf(),
            token_map: protected.token_map,
            plan,
        })
    }

    /// Translate prepared units and restore their tokens
    async fn translate_units(
        &self,
        units: &[UnitPlan],
    ) -> Result<(Vec<String>, TranslationReport), TranslationError> {
        let slots: Vec<ResultSlots> = units.iter().map(|u| ResultSlots::new(u.plan.len())).collect();
        let jobs = units
            .iter()
            .enumerate()
            .flat_map(|(unit, plan)| {
                plan.plan.chunks.iter().map(move |chunk| Job {
                    unit,
                    file: plan.file.as_path(),
                    chunk,
                })
            })
            .collect();
        self.run_jobs(jobs, &slots).await?;

        let mut report = TranslationReport::default();
        let mut all_outcomes = Vec::with_capacity(units.len());
        for (unit, unit_slots) in units.iter().zip(slots) {
            let outcomes = unit_slots.into_outcomes()?;
            Self::check_failures(&unit.file, &outcomes)?;
            report.record(&outcomes);
            all_outcomes.push(outcomes);
        }

        let texts = units
            .iter()
            .zip(all_outcomes)
            .map(|(unit, outcomes)| {
                let texts: Vec<String> = outcomes.into_iter().map(|o| o.text).collect();
                unit.token_map.restore(&unit.plan.reassemble(&texts))
            })
            .collect();

        info!(
            "Translated {} chunks ({} skipped, {} kept in source language, {} retries)",
            report.translated, report.skipped, report.fell_back, report.retries
        );
        Ok((texts, report))
    }

    /// Run every job on the pool and fill the slots.
    ///
    /// Once a chunk fails under `FallbackPolicy::Fail`, chunks that have not
    /// started yet are cancelled; requests already in flight finish.
    async fn run_jobs(&self, jobs: Vec<Job<'_>>, slots: &[ResultSlots]) -> Result<(), TranslationError> {
        let total = jobs.len();
        let completed = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let completed = &completed;
        let abort = &abort;

        let results: Vec<Result<(), TranslationError>> = stream::iter(jobs)
            .map(|job| async move {
                let outcome = self.translate_chunk(job.file, job.chunk, abort).await;

                let current = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(callback) = &self.progress_callback {
                    callback(current, total);
                }

                let slot = slots
                    .get(job.unit)
                    .ok_or(TranslationError::MissingSlot(job.chunk.index))?;
                slot.fill(outcome)
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        results.into_iter().collect()
    }

    /// Translate one chunk with retries; never fails, the status says how it went
    async fn translate_chunk(&self, file: &Path, chunk: &Chunk, abort: &AtomicBool) -> ChunkOutcome {
        if !chunk.translatable {
            return ChunkOutcome::kept(chunk, ChunkStatus::Skipped, 0);
        }

        let mut attempt: u32 = 0;
        loop {
            if abort.load(Ordering::SeqCst) {
                return ChunkOutcome::kept(chunk, ChunkStatus::Cancelled, attempt);
            }
            attempt += 1;

            let result = match self.semaphore.acquire().await {
                Ok(_permit) => self.attempt(chunk).await,
                Err(e) => Err(ProviderError::RequestFailed(format!("Worker pool closed: {}", e)).into()),
            };

            let error = match result {
                Ok(text) => {
                    return ChunkOutcome {
                        index: chunk.index,
                        text,
                        status: ChunkStatus::Success,
                        attempts: attempt,
                    };
                }
                Err(error) => error,
            };

            if self.options.retry.should_retry(attempt, &error) {
                let delay = self.options.retry.delay_for(attempt);
                let message = format!(
                    "{} chunk {}: attempt {}/{} failed, retrying in {:?}: {}",
                    file.display(),
                    chunk.index,
                    attempt,
                    self.options.retry.max_attempts,
                    delay,
                    error
                );
                warn!("{}", message);
                self.capture("WARN", message);
                tokio::time::sleep(delay).await;
                continue;
            }

            let reason = error.to_string();
            return match self.options.fallback {
                FallbackPolicy::Fail => {
                    abort.store(true, Ordering::SeqCst);
                    self.capture(
                        "ERROR",
                        format!(
                            "{} chunk {}: failed after {} attempts: {}",
                            file.display(),
                            chunk.index,
                            attempt,
                            reason
                        ),
                    );
                    ChunkOutcome::kept(chunk, ChunkStatus::Failed(reason), attempt)
                }
                FallbackPolicy::KeepOriginal => {
                    let message = format!(
                        "{} chunk {}: keeping source text after {} attempts: {}",
                        file.display(),
                        chunk.index,
                        attempt,
                        reason
                    );
                    warn!("{}", message);
                    self.capture("WARN", message);
                    ChunkOutcome::kept(chunk, ChunkStatus::FellBack(reason), attempt)
                }
            };
        }
    }

    /// One rewrite call plus validation of the response
    async fn attempt(&self, chunk: &Chunk) -> Result<String, TranslationError> {
        let response = self
            .rewriter
            .rewrite(
                &chunk.text,
                &self.options.source_language,
                &self.options.target_language,
            )
            .await?;

        let text = unwrap_code_fence(&response).trim();
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse("Empty response".to_string()).into());
        }

        let validation = TokenValidator::validate(&chunk.text, text);
        if !validation.passed() {
            return Err(TranslationError::TokenLoss {
                missing: validation.missing,
                unexpected: validation.unexpected,
                mangled: validation.mangled,
            });
        }
        if !validation.order_preserved {
            debug!("Chunk {} came back with its tokens reordered", chunk.index);
        }

        Ok(text.to_string())
    }

    fn check_failures(file: &Path, outcomes: &[ChunkOutcome]) -> Result<(), TranslationError> {
        for outcome in outcomes {
            if let ChunkStatus::Failed(reason) = &outcome.status {
                return Err(TranslationError::TranslationFailed {
                    file: file.to_path_buf(),
                    chunk: outcome.index,
                    reason: reason.clone(),
                });
            }
        }
        Ok(())
    }

    fn capture(&self, level: &str, message: String) {
        if let Some(capture) = &self.log_capture {
            capture.lock().push(LogEntry::new(level, message));
        }
    }
}
