/*!
 * Tests for ISO language code utilities
 */

use arxlate::language_utils::{
    default_cjk_font, get_language_name, language_codes_match, normalize_to_part1_or_part2t,
    normalize_to_part2t,
};

/// Test language names used in the prompt
#[test]
fn test_get_language_name_withValidCodes_shouldReturnEnglishName() {
    assert_eq!(get_language_name("ko").unwrap(), "Korean");
    assert_eq!(get_language_name("jpn").unwrap(), "Japanese");
    assert_eq!(get_language_name("ger").unwrap(), "German");
    assert!(get_language_name("zz").is_err());
}

/// Test matching across code styles
#[test]
fn test_language_codes_match_withEquivalentCodes_shouldMatch() {
    assert!(language_codes_match("fr", "fra"));
    assert!(language_codes_match("fre", "French"));
    assert!(!language_codes_match("fr", "de"));
    assert!(!language_codes_match("fr", "invalid"));
}

/// Test normalization in both directions
#[test]
fn test_normalize_withMixedInput_shouldProduceCanonicalCodes() {
    assert_eq!(normalize_to_part2t("zh").unwrap(), "zho");
    assert_eq!(normalize_to_part2t("chi").unwrap(), "zho");
    assert_eq!(normalize_to_part1_or_part2t("Chinese").unwrap(), "zh");
}

/// Test CJK font defaults
#[test]
fn test_default_cjk_font_withTargets_shouldOnlyCoverCjk() {
    assert_eq!(default_cjk_font("zh"), Some("Noto Sans SC"));
    assert_eq!(default_cjk_font("ja"), Some("Noto Sans JP"));
    assert_eq!(default_cjk_font("de"), None);
    assert_eq!(default_cjk_font("not a language"), None);
}
