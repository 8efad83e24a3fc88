/*!
 * Translation of protected LaTeX using AI providers.
 *
 * This module contains everything between the span protector and the
 * assembler. It is split into several submodules:
 *
 * - `core`: The production rewriter and usage tracking
 * - `concurrency`: Provider profiles and request pacing
 * - `retry`: Backoff policy for failed attempts
 * - `orchestrator`: Bounded dispatch, validation and ordered reassembly
 */

// Re-export main types for easier usage
pub use self::core::{LogEntry, PaperInfo, TokenUsageStats, TranslationService};
pub use self::orchestrator::{
    ChunkOutcome, ChunkStatus, FallbackPolicy, Orchestrator, OrchestratorOptions, ResultSlots,
    TranslatedDocument, TranslationReport,
};
pub use self::retry::RetryPolicy;

// Submodules
pub mod concurrency;
pub mod core;
pub mod orchestrator;
pub mod retry;
