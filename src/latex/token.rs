/*!
 * Placeholder tokens.
 *
 * A protected span is replaced by a token like `ZXQ0007QXZ`: letters and
 * digits only, so a language model has nothing to interpret as markup and
 * no reason to translate it.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading sentinel of every placeholder token
pub const TOKEN_PREFIX: &str = "ZXQ";

/// Trailing sentinel of every placeholder token
pub const TOKEN_SUFFIX: &str = "QXZ";

/// Matches any placeholder-shaped string
pub static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ZXQ(\d+)QXZ").expect("Invalid placeholder token regex")
});

/// Build the placeholder token for an id
pub fn placeholder(id: usize) -> String {
    format!("{}{:04}{}", TOKEN_PREFIX, id, TOKEN_SUFFIX)
}

/// All placeholder-shaped substrings of `text`, in order of appearance
pub fn find_tokens(text: &str) -> Vec<&str> {
    TOKEN_REGEX.find_iter(text).map(|m| m.as_str()).collect()
}

/// Byte ranges of all placeholder-shaped substrings of `text`
pub fn token_ranges(text: &str) -> Vec<(usize, usize)> {
    TOKEN_REGEX.find_iter(text).map(|m| (m.start(), m.end())).collect()
}

/// Highest id carried by a placeholder-shaped string in `text`
pub fn max_token_id(text: &str) -> Option<usize> {
    TOKEN_REGEX
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).and_then(|m| m.as_str().parse().ok()))
        .max()
}
