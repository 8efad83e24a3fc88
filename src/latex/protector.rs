/*!
 * Span protection for LaTeX sources.
 *
 * The protector walks raw LaTeX once, left to right, and replaces every
 * construct a translator must not touch with a placeholder token. At each
 * position the first matching rule wins:
 *
 * 1. comments (`%` to end of line)
 * 2. verbatim-like environments and `\verb`, taken literally
 * 3. display and inline math, including math environments
 * 4. code environments such as `tikzpicture`, protected whole
 * 5. environment `\begin`/`\end` markers
 * 6. any other backslash command together with its `[..]`/`{..}` arguments
 *
 * The outermost construct is protected whole, so a citation inside a
 * caption is part of the caption's span. Bare group braces and alignment
 * tabs are protected one character at a time.
 */

use log::debug;
use serde::Serialize;
use std::collections::HashMap;

use super::token::{self, TOKEN_REGEX};
use crate::errors::MarkupError;

/// Environments whose body is never scanned
const VERBATIM_ENVIRONMENTS: &[&str] = &[
    "verbatim", "verbatim*", "Verbatim", "lstlisting", "minted", "comment",
];

/// Environments protected whole as display math
const MATH_ENVIRONMENTS: &[&str] = &[
    "equation", "equation*", "align", "align*", "gather", "gather*",
    "multline", "multline*", "eqnarray", "eqnarray*", "flalign", "flalign*",
    "alignat", "alignat*", "math", "displaymath",
];

/// Environments whose body is code rather than prose, protected whole
const CODE_ENVIRONMENTS: &[&str] = &[
    "tikzpicture", "tikzcd", "circuitikz", "pgfpicture", "axis", "semilogxaxis",
    "semilogyaxis", "loglogaxis", "polaraxis", "groupplot", "forest",
    "algorithmic", "algorithm", "algorithm*",
];

/// Commands classified as citations or cross-references
const REFERENCE_COMMANDS: &[&str] = &[
    "cite", "citep", "citet", "citealp", "citealt", "citeauthor", "citeyear",
    "nocite", "ref", "eqref", "pageref", "autoref", "cref", "Cref", "label",
    "url", "href", "hyperref",
];

/// Classification of a protected span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SpanKind {
    /// Backslash command with its arguments, or a bare brace / `&`
    Command,
    /// `\begin{..}` or `\end{..}` of a non-math environment
    EnvironmentDelimiter,
    /// `$..$` or `\(..\)`
    InlineMath,
    /// `$$..$$`, `\[..\]` or a math environment
    DisplayMath,
    /// `%` comment
    Comment,
    /// Citation, reference, label or URL command
    Reference,
    /// Verbatim-like or code environment, or `\verb`
    Verbatim,
}

/// A substring of the original text replaced by a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedSpan {
    pub kind: SpanKind,
    /// Byte offset of the first byte in the original text
    pub start: usize,
    /// Byte offset one past the last byte in the original text
    pub end: usize,
    pub original: String,
    pub token: String,
}

/// Placeholder token to original span text
#[derive(Debug, Clone, Default)]
pub struct TokenMap {
    entries: HashMap<String, String>,
}

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: String, original: String) {
        self.entries.insert(token, original);
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tokens of this map that occur in `text`, in order of appearance
    pub fn tokens_in<'t>(&self, text: &'t str) -> Vec<&'t str> {
        token::find_tokens(text)
            .into_iter()
            .filter(|t| self.contains(t))
            .collect()
    }

    /// Replace every known token in `text` with its original span.
    ///
    /// Token-shaped strings that are not in the map are left untouched.
    pub fn restore(&self, text: &str) -> String {
        TOKEN_REGEX
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let found = &caps[0];
                self.get(found).unwrap_or(found).to_string()
            })
            .into_owned()
    }
}

/// Output of [`SpanProtector::protect`]
#[derive(Debug, Clone)]
pub struct ProtectedText {
    /// Input text with every protected span replaced by its token
    pub safe_text: String,
    pub token_map: TokenMap,
    /// Spans in source order
    pub spans: Vec<ProtectedSpan>,
}

impl ProtectedText {
    /// Restore tokens in a (possibly translated) version of `safe_text`
    pub fn restore(&self, text: &str) -> String {
        self.token_map.restore(text)
    }
}

/// Replaces LaTeX markup with placeholder tokens.
///
/// Token ids keep increasing across calls, so one protector used for every
/// file of a document hands out document-unique tokens.
#[derive(Debug, Clone)]
pub struct SpanProtector {
    next_id: usize,
}

impl Default for SpanProtector {
    fn default() -> Self {
        Self::new()
    }
}

impl SpanProtector {
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Id the next token will carry
    pub fn next_id(&self) -> usize {
        self.next_id
    }

    /// Protect `raw`, failing on unterminated or unbalanced delimiters
    pub fn protect(&mut self, raw: &str) -> Result<ProtectedText, MarkupError> {
        // Never hand out an id that already appears in the text.
        if let Some(max_existing) = token::max_token_id(raw) {
            let above = max_existing
                .checked_add(1)
                .ok_or(MarkupError::TokenIdsExhausted { highest: max_existing })?;
            self.next_id = self.next_id.max(above);
        }

        let ranges = Scanner::new(raw).scan()?;
        if self.next_id.checked_add(ranges.len()).is_none() {
            return Err(MarkupError::TokenIdsExhausted {
                highest: self.next_id,
            });
        }

        let mut safe_text = String::with_capacity(raw.len());
        let mut token_map = TokenMap::new();
        let mut spans = Vec::with_capacity(ranges.len());
        let mut cursor = 0;

        for (kind, start, end) in ranges {
            safe_text.push_str(&raw[cursor..start]);

            let token = token::placeholder(self.next_id);
            self.next_id += 1;

            let original = raw[start..end].to_string();
            safe_text.push_str(&token);
            token_map.insert(token.clone(), original.clone());
            spans.push(ProtectedSpan {
                kind,
                start,
                end,
                original,
                token,
            });
            cursor = end;
        }
        safe_text.push_str(&raw[cursor..]);

        debug!(
            "Protected {} spans ({} bytes -> {} bytes)",
            spans.len(),
            raw.len(),
            safe_text.len()
        );

        Ok(ProtectedText {
            safe_text,
            token_map,
            spans,
        })
    }
}

/// Protect `raw` with a fresh protector
pub fn protect(raw: &str) -> Result<ProtectedText, MarkupError> {
    SpanProtector::new().protect(raw)
}

/// Restore every token of `token_map` found in `text`
pub fn restore(token_map: &TokenMap, text: &str) -> String {
    token_map.restore(text)
}

/// Span kind for environments protected from `\begin` to the matching `\end`
fn whole_environment_kind(env: &str) -> Option<SpanKind> {
    if MATH_ENVIRONMENTS.contains(&env) {
        Some(SpanKind::DisplayMath)
    } else if CODE_ENVIRONMENTS.contains(&env) {
        Some(SpanKind::Verbatim)
    } else {
        None
    }
}

fn is_command_letter(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'@'
}

/// Single left-to-right pass producing non-overlapping span ranges
struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    spans: Vec<(SpanKind, usize, usize)>,
    open_environments: Vec<(&'a str, usize)>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            spans: Vec::new(),
            open_environments: Vec::new(),
        }
    }

    fn scan(mut self) -> Result<Vec<(SpanKind, usize, usize)>, MarkupError> {
        while self.pos < self.bytes.len() {
            let start = self.pos;
            match self.bytes[start] {
                b'%' => {
                    let end = self.line_end(start);
                    self.push(SpanKind::Comment, start, end);
                }
                b'\\' => self.scan_backslash(start)?,
                b'$' => self.scan_dollar(start)?,
                b'{' | b'}' | b'&' => self.push(SpanKind::Command, start, start + 1),
                _ => self.pos += 1,
            }
        }

        if let Some((name, offset)) = self.open_environments.pop() {
            return Err(MarkupError::Unterminated {
                construct: format!("\\begin{{{}}}", name),
                offset,
            });
        }

        Ok(self.spans)
    }

    fn push(&mut self, kind: SpanKind, start: usize, end: usize) {
        self.spans.push((kind, start, end));
        self.pos = end;
    }

    fn line_end(&self, from: usize) -> usize {
        self.src[from..]
            .find('\n')
            .map(|offset| from + offset)
            .unwrap_or(self.bytes.len())
    }

    /// Position of `needle` at or after `from`, skipping escaped characters
    fn find_closing(&self, from: usize, needle: &[u8]) -> Option<usize> {
        let mut i = from;
        while i < self.bytes.len() {
            if self.bytes[i..].starts_with(needle) {
                return Some(i);
            }
            i += if self.bytes[i] == b'\\' { 2 } else { 1 };
        }
        None
    }

    /// Position one past the delimiter closing the group opened at `open_at`
    fn matching_close(&self, open_at: usize, open: u8, close: u8) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = open_at;
        while i < self.bytes.len() {
            let byte = self.bytes[i];
            if byte == b'\\' {
                i += 2;
                continue;
            }
            if byte == b'%' {
                i = self.line_end(i);
                continue;
            }
            if open != b'{' && byte == b'{' {
                i = self.matching_close(i, b'{', b'}')?;
                continue;
            }
            if byte == open {
                depth += 1;
            } else if byte == close {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            i += 1;
        }
        None
    }

    /// Swallow `[..]` and `{..}` arguments directly following a command
    fn scan_arguments(&self, from: usize) -> Result<usize, MarkupError> {
        let mut end = from;
        loop {
            match self.bytes.get(end) {
                Some(b'{') => {
                    end = self.matching_close(end, b'{', b'}').ok_or(MarkupError::Unterminated {
                        construct: "{".to_string(),
                        offset: end,
                    })?;
                }
                Some(b'[') => match self.matching_close(end, b'[', b']') {
                    Some(close) => end = close,
                    // A lone '[' is text, not an optional argument.
                    None => return Ok(end),
                },
                _ => return Ok(end),
            }
        }
    }

    fn scan_dollar(&mut self, start: usize) -> Result<(), MarkupError> {
        if self.bytes.get(start + 1) == Some(&b'$') {
            let close = self
                .find_closing(start + 2, b"$$")
                .ok_or(MarkupError::Unterminated {
                    construct: "$$".to_string(),
                    offset: start,
                })?;
            self.push(SpanKind::DisplayMath, start, close + 2);
        } else {
            let close = self
                .find_closing(start + 1, b"$")
                .ok_or(MarkupError::Unterminated {
                    construct: "$".to_string(),
                    offset: start,
                })?;
            self.push(SpanKind::InlineMath, start, close + 1);
        }
        Ok(())
    }

    fn scan_backslash(&mut self, start: usize) -> Result<(), MarkupError> {
        let name_start = start + 1;
        let Some(&first) = self.bytes.get(name_start) else {
            self.push(SpanKind::Command, start, name_start);
            return Ok(());
        };

        if !is_command_letter(first) {
            return self.scan_control_symbol(start, first);
        }

        let mut name_end = name_start;
        while name_end < self.bytes.len() && is_command_letter(self.bytes[name_end]) {
            name_end += 1;
        }
        let src = self.src;
        let name = &src[name_start..name_end];

        match name {
            "begin" => return self.scan_begin(start, name_end),
            "end" => return self.scan_end(start, name_end),
            "verb" => return self.scan_verb(start, name_end),
            _ => {}
        }

        let mut end = name_end;
        if self.bytes.get(end) == Some(&b'*') {
            end += 1;
        }
        let end = self.scan_arguments(end)?;

        let kind = if REFERENCE_COMMANDS.contains(&name) {
            SpanKind::Reference
        } else {
            SpanKind::Command
        };
        self.push(kind, start, end);
        Ok(())
    }

    fn scan_control_symbol(&mut self, start: usize, symbol: u8) -> Result<(), MarkupError> {
        match symbol {
            b'[' => {
                let close = self
                    .find_closing(start + 2, b"\\]")
                    .ok_or(MarkupError::Unterminated {
                        construct: "\\[".to_string(),
                        offset: start,
                    })?;
                self.push(SpanKind::DisplayMath, start, close + 2);
            }
            b'(' => {
                let close = self
                    .find_closing(start + 2, b"\\)")
                    .ok_or(MarkupError::Unterminated {
                        construct: "\\(".to_string(),
                        offset: start,
                    })?;
                self.push(SpanKind::InlineMath, start, close + 2);
            }
            b'\\' => {
                // Line break, optionally starred and with a spacing argument
                let mut end = start + 2;
                if self.bytes.get(end) == Some(&b'*') {
                    end += 1;
                }
                if self.bytes.get(end) == Some(&b'[') {
                    if let Some(close) = self.matching_close(end, b'[', b']') {
                        end = close;
                    }
                }
                self.push(SpanKind::Command, start, end);
            }
            _ => {
                let width = self.src[start + 1..]
                    .chars()
                    .next()
                    .map(char::len_utf8)
                    .unwrap_or(1);
                self.push(SpanKind::Command, start, start + 1 + width);
            }
        }
        Ok(())
    }

    /// `{name}` at `at`, returning the name and the position after `}`.
    ///
    /// Spaces and tabs before the brace are skipped, as TeX does after a
    /// control word.
    fn environment_name(&self, at: usize) -> Option<(&'a str, usize)> {
        let mut open = at;
        while matches!(self.bytes.get(open), Some(b' ' | b'\t')) {
            open += 1;
        }
        if self.bytes.get(open) != Some(&b'{') {
            return None;
        }
        let src = self.src;
        let close = src[open + 1..].find(|c| c == '}' || c == '\n')? + open + 1;
        if self.bytes[close] != b'}' {
            return None;
        }
        Some((&src[open + 1..close], close + 1))
    }

    /// Environment named by a `\begin` or `\end` starting at `at`
    fn delimiter_at(&self, at: usize, keyword: &str) -> Option<(&'a str, usize)> {
        let name_start = at + 1;
        let after = name_start + keyword.len();
        if self.bytes.get(at) != Some(&b'\\')
            || !self.bytes.get(name_start..)?.starts_with(keyword.as_bytes())
            || self.bytes.get(after).is_some_and(|&b| is_command_letter(b))
        {
            return None;
        }
        self.environment_name(after)
    }

    fn scan_begin(&mut self, start: usize, after_name: usize) -> Result<(), MarkupError> {
        let Some((env, after_env)) = self.environment_name(after_name) else {
            self.push(SpanKind::Command, start, after_name);
            return Ok(());
        };

        if VERBATIM_ENVIRONMENTS.contains(&env) {
            let closing = format!("\\end{{{}}}", env);
            let offset = self.src[after_env..]
                .find(&closing)
                .ok_or_else(|| MarkupError::Unterminated {
                    construct: format!("\\begin{{{}}}", env),
                    offset: start,
                })?;
            self.push(SpanKind::Verbatim, start, after_env + offset + closing.len());
        } else if let Some(kind) = whole_environment_kind(env) {
            let end = self
                .find_environment_end(after_env, env)
                .ok_or_else(|| MarkupError::Unterminated {
                    construct: format!("\\begin{{{}}}", env),
                    offset: start,
                })?;
            self.push(kind, start, end);
        } else {
            let end = self.scan_arguments(after_env)?;
            self.open_environments.push((env, start));
            self.push(SpanKind::EnvironmentDelimiter, start, end);
        }
        Ok(())
    }

    fn scan_end(&mut self, start: usize, after_name: usize) -> Result<(), MarkupError> {
        let Some((env, after_env)) = self.environment_name(after_name) else {
            self.push(SpanKind::Command, start, after_name);
            return Ok(());
        };

        match self.open_environments.pop() {
            Some((open, _)) if open == env => {
                self.push(SpanKind::EnvironmentDelimiter, start, after_env);
                Ok(())
            }
            Some((open, offset)) => Err(MarkupError::Unterminated {
                construct: format!("\\begin{{{}}}", open),
                offset,
            }),
            None => Err(MarkupError::Unexpected {
                construct: format!("\\end{{{}}}", env),
                offset: start,
            }),
        }
    }

    /// Position one past the `\end{env}` balancing an already opened `env`
    fn find_environment_end(&self, from: usize, env: &str) -> Option<usize> {
        let mut depth = 1usize;
        let mut i = from;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => {
                    if let Some((name, after)) = self.delimiter_at(i, "end") {
                        if name == env {
                            depth -= 1;
                            if depth == 0 {
                                return Some(after);
                            }
                        }
                        i = after;
                    } else if let Some((name, after)) = self.delimiter_at(i, "begin") {
                        if name == env {
                            depth += 1;
                        }
                        i = after;
                    } else {
                        i += 2;
                    }
                }
                b'%' => i = self.line_end(i),
                _ => i += 1,
            }
        }
        None
    }

    fn scan_verb(&mut self, start: usize, after_name: usize) -> Result<(), MarkupError> {
        let mut i = after_name;
        if self.bytes.get(i) == Some(&b'*') {
            i += 1;
        }
        let delimiter = match self.bytes.get(i) {
            Some(&d) if d.is_ascii_punctuation() => d,
            _ => {
                self.push(SpanKind::Command, start, i);
                return Ok(());
            }
        };
        let offset = self.src[i + 1..]
            .find(delimiter as char)
            .ok_or(MarkupError::Unterminated {
                construct: "\\verb".to_string(),
                offset: start,
            })?;
        self.push(SpanKind::Verbatim, start, i + 1 + offset + 1);
        Ok(())
    }
}
