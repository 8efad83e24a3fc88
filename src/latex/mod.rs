/*!
 * LaTeX source handling.
 *
 * - `token`: placeholder token format
 * - `protector`: replaces markup with placeholder tokens and restores it
 * - `chunker`: splits protected text into bounded translation units
 * - `preamble`: CJK font setup for the compiled output
 */

pub mod chunker;
pub mod preamble;
pub mod protector;
pub mod token;

pub use chunker::{Chunk, ChunkPlan, split};
pub use preamble::FontSetup;
pub use protector::{ProtectedSpan, ProtectedText, SpanKind, SpanProtector, TokenMap, protect, restore};
