/*!
 * # arxlate - LaTeX-safe translation of arXiv papers
 *
 * A Rust library that translates the prose of a paper's LaTeX sources with
 * an AI provider while keeping every LaTeX construct byte for byte, then
 * compiles the translated sources into a PDF.
 *
 * ## Features
 *
 * - Protects commands, math, references, comments and verbatim blocks behind
 *   opaque placeholder tokens before anything is sent to a model
 * - Splits protected text on paragraph, sentence and word boundaries
 * - Translates chunks concurrently through various AI providers:
 *   - OpenAI API (and LM Studio's compatible server)
 *   - Anthropic API
 *   - Ollama (local LLM)
 * - Validates every response against the tokens it was sent, with retries
 * - Reassembles in source order, optionally configures CJK fonts, compiles
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `latex`: Span protection, chunking and preamble font setup
 * - `validation`: Placeholder token checks on rewrite responses
 * - `translation`: Orchestration, retry policy and the production rewriter
 * - `providers`: Client implementations for various LLM providers
 * - `document`: In-memory model of a source tree
 * - `assembler`: Writing the translated tree to disk
 * - `compiler`: Root detection and compiler passes
 * - `source`: Paper sources and arXiv id handling
 * - `app_config`: Configuration management
 * - `app_controller`: Main application controller
 * - `file_utils`: File system operations
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod assembler;
pub mod compiler;
pub mod document;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod latex;
pub mod providers;
pub mod source;
pub mod translation;
pub mod validation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use document::{Document, SourceUnit};
pub use errors::{AppError, CompileError, MarkupError, ProviderError, TranslationError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use translation::{Orchestrator, TranslationService};
