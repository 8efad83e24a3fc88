/*!
 * Placeholder token validation for rewrite responses.
 *
 * A rewrite is only usable if every placeholder token sent with a chunk
 * comes back unaltered, as many times as it was sent, and no token the
 * chunk never carried shows up. Anything else would restore the wrong
 * markup or leave a token behind in the output.
 */

use std::collections::BTreeMap;

use log::debug;

use crate::latex::token;

/// Token validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValidationResult {
    /// Number of token occurrences expected
    pub expected_count: usize,
    /// Number of token occurrences found
    pub found_count: usize,
    /// Tokens that came back fewer times than sent, one entry per lost occurrence
    pub missing: Vec<String>,
    /// Tokens that came back more often than sent, or were never sent
    pub unexpected: Vec<String>,
    /// Whether the tokens that did come back kept their relative order
    pub order_preserved: bool,
    /// Token-like fragments the rewriter broke apart, such as `ZXQ 0001 QXZ`
    pub mangled: Vec<String>,
}

impl TokenValidationResult {
    /// Check if validation passed
    ///
    /// Reordering is tolerated, since translation may legitimately move a
    /// citation within a sentence.
    pub fn passed(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }

    /// Human readable summary of what went wrong
    pub fn error_message(&self) -> Option<String> {
        if self.passed() {
            return None;
        }
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing tokens: {}", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("unexpected tokens: {}", self.unexpected.join(", ")));
        }
        if !self.mangled.is_empty() {
            parts.push(format!("mangled tokens: {}", self.mangled.join(", ")));
        }
        Some(parts.join("; "))
    }
}

/// Validator for placeholder tokens in rewrite responses
pub struct TokenValidator;

impl TokenValidator {
    /// Compare the tokens in `response` against those in `sent`
    pub fn validate(sent: &str, response: &str) -> TokenValidationResult {
        let sent_tokens = token::find_tokens(sent);
        let found_tokens = token::find_tokens(response);

        let sent_counts = Self::count(&sent_tokens);
        let found_counts = Self::count(&found_tokens);

        let mut missing = Vec::new();
        for (token, &expected) in &sent_counts {
            let found = found_counts.get(token).copied().unwrap_or(0);
            for _ in found..expected {
                missing.push(token.to_string());
            }
        }

        let mut unexpected = Vec::new();
        for (token, &found) in &found_counts {
            let expected = sent_counts.get(token).copied().unwrap_or(0);
            for _ in expected..found {
                unexpected.push(token.to_string());
            }
        }

        let kept: Vec<&str> = sent_tokens
            .iter()
            .copied()
            .filter(|t| found_counts.contains_key(t))
            .collect();
        let returned: Vec<&str> = found_tokens
            .iter()
            .copied()
            .filter(|t| sent_counts.contains_key(t))
            .collect();
        let order_preserved = kept == returned;
        let mangled = Self::find_mangled(response);

        debug!(
            "Token validation: expected={}, found={}, missing={}, unexpected={}, mangled={}",
            sent_tokens.len(),
            found_tokens.len(),
            missing.len(),
            unexpected.len(),
            mangled.len()
        );

        TokenValidationResult {
            expected_count: sent_tokens.len(),
            found_count: found_tokens.len(),
            missing,
            unexpected,
            order_preserved,
            mangled,
        }
    }

    /// Tokens that look mangled by the rewriter, such as `ZXQ 0001 QXZ`.
    ///
    /// Each fragment runs to the closing `QXZ` when one follows closely,
    /// otherwise it is cut after a few characters.
    pub fn find_mangled(response: &str) -> Vec<String> {
        response
            .match_indices(token::TOKEN_PREFIX)
            .filter(|(at, _)| {
                token::TOKEN_REGEX.find(&response[*at..]).map(|m| m.start()) != Some(0)
            })
            .map(|(at, _)| {
                let window: String = response[at..].chars().take(20).collect();
                match window.find(token::TOKEN_SUFFIX) {
                    Some(end) => window[..end + token::TOKEN_SUFFIX.len()].to_string(),
                    None => window.chars().take(16).collect(),
                }
            })
            .collect()
    }

    fn count<'a>(tokens: &[&'a str]) -> BTreeMap<&'a str, usize> {
        let mut counts = BTreeMap::new();
        for t in tokens {
            *counts.entry(*t).or_insert(0) += 1;
        }
        counts
    }
}
