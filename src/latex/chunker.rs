/*!
 * Splitting protected text into bounded translation units.
 *
 * Boundaries are tried coarse to fine: paragraph breaks, then sentence ends,
 * then plain whitespace. Placeholder tokens contain neither whitespace nor
 * sentence punctuation, so no boundary can fall inside one. A run without
 * whitespace that is longer than the limit is kept whole.
 *
 * Chunk texts carry no leading or trailing whitespace. The whitespace between
 * chunks is kept on the plan, so reassembly is exact whatever the translator
 * does to the edges of its output.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use super::token::{self, TOKEN_REGEX};

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n[ \t]*\n\s*").expect("Invalid paragraph break regex")
});

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[.!?。！？]\s+").expect("Invalid sentence end regex")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").expect("Invalid whitespace regex")
});

/// Granularity of a split boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

impl Boundary {
    fn regex(self) -> &'static Regex {
        match self {
            Self::Paragraph => &PARAGRAPH_BREAK,
            Self::Sentence => &SENTENCE_END,
            Self::Word => &WHITESPACE,
        }
    }

    fn finer(self) -> Option<Self> {
        match self {
            Self::Paragraph => Some(Self::Sentence),
            Self::Sentence => Some(Self::Word),
            Self::Word => None,
        }
    }
}

/// One translation unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk within its text, starting at 0
    pub index: usize,
    /// Protected text, trimmed
    pub text: String,
    /// Whitespace that followed the chunk in the source
    pub trailing: String,
    /// False when the chunk holds only tokens, digits and punctuation
    pub translatable: bool,
}

impl Chunk {
    /// Placeholder tokens carried by this chunk, in order
    pub fn tokens(&self) -> Vec<&str> {
        token::find_tokens(&self.text)
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Ordered chunks plus the whitespace needed to put them back together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Whitespace before the first chunk
    pub prefix: String,
    pub chunks: Vec<Chunk>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of chunks that need a rewrite call
    pub fn translatable_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.translatable).count()
    }

    /// Join `texts` (one per chunk, in index order) with the original separators
    pub fn reassemble<S: AsRef<str>>(&self, texts: &[S]) -> String {
        let mut result = self.prefix.clone();
        for (chunk, text) in self.chunks.iter().zip(texts) {
            result.push_str(text.as_ref());
            result.push_str(&chunk.trailing);
        }
        result
    }

    /// The text the plan was built from
    pub fn original_text(&self) -> String {
        let texts: Vec<&str> = self.chunks.iter().map(|c| c.text.as_str()).collect();
        self.reassemble(&texts)
    }
}

/// Split `safe_text` into chunks of at most `max_unit_size` characters
pub fn split(safe_text: &str, max_unit_size: usize) -> ChunkPlan {
    let max = max_unit_size.max(1);

    let mut pieces = Vec::new();
    collect_pieces(safe_text, 0, safe_text.len(), Boundary::Paragraph, max, &mut pieces);

    let mut plan = ChunkPlan::default();
    for (start, end) in pack(safe_text, &pieces, max) {
        push_range(&mut plan, &safe_text[start..end]);
    }
    plan
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Break `text[start..end]` at `boundary`, refining oversized pieces
fn collect_pieces(
    text: &str,
    start: usize,
    end: usize,
    boundary: Boundary,
    max: usize,
    out: &mut Vec<(usize, usize)>,
) {
    let push_piece = |piece_start: usize, piece_end: usize, out: &mut Vec<(usize, usize)>| {
        match boundary.finer() {
            Some(finer) if char_len(&text[piece_start..piece_end]) > max => {
                collect_pieces(text, piece_start, piece_end, finer, max, out)
            }
            _ => out.push((piece_start, piece_end)),
        }
    };

    let mut piece_start = start;
    for found in boundary.regex().find_iter(&text[start..end]) {
        let piece_end = start + found.end();
        push_piece(piece_start, piece_end, out);
        piece_start = piece_end;
    }
    if piece_start < end {
        push_piece(piece_start, end, out);
    }
}

/// Greedily merge consecutive pieces while they fit
fn pack(text: &str, pieces: &[(usize, usize)], max: usize) -> Vec<(usize, usize)> {
    let mut packed = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for &(start, end) in pieces {
        current = match current {
            None => Some((start, end)),
            Some((current_start, _)) if char_len(text[current_start..end].trim()) <= max => {
                Some((current_start, end))
            }
            Some(done) => {
                packed.push(done);
                Some((start, end))
            }
        };
    }
    packed.extend(current);
    packed
}

fn has_prose(text: &str) -> bool {
    TOKEN_REGEX
        .replace_all(text, " ")
        .chars()
        .any(char::is_alphabetic)
}

fn push_range(plan: &mut ChunkPlan, slice: &str) {
    let after_leading = slice.trim_start();
    let leading = &slice[..slice.len() - after_leading.len()];
    let content = after_leading.trim_end();
    let trailing = &after_leading[content.len()..];

    let separator = if content.is_empty() { slice } else { leading };
    if !separator.is_empty() {
        match plan.chunks.last_mut() {
            Some(last) => last.trailing.push_str(separator),
            None => plan.prefix.push_str(separator),
        }
    }
    if content.is_empty() {
        return;
    }

    plan.chunks.push(Chunk {
        index: plan.chunks.len(),
        text: content.to_string(),
        trailing: trailing.to_string(),
        translatable: has_prose(content),
    });
}
