/*!
 * Validation of rewrite responses.
 *
 * - `tokens`: checks placeholder tokens survive the rewrite unaltered
 */

pub mod tokens;

pub use tokens::{TokenValidationResult, TokenValidator};
