use anyhow::{Result, anyhow};
use isolang::Language;

/// ISO 639-2/B codes that differ from their 639-2/T counterpart
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("dut", "nld"),
    ("fre", "fra"),
    ("geo", "kat"),
    ("ger", "deu"),
    ("gre", "ell"),
    ("ice", "isl"),
    ("mac", "mkd"),
    ("may", "msa"),
    ("per", "fas"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Resolve a language given as an ISO 639-1 code (`ko`), an ISO 639-2/T or
/// 639-2/B code (`kor`, `fre`) or an English name (`Korean`)
pub fn resolve_language(code_or_name: &str) -> Result<Language> {
    let trimmed = code_or_name.trim();
    let lowered = trimmed.to_lowercase();

    let by_code = match lowered.len() {
        2 => Language::from_639_1(&lowered),
        3 => {
            let part2t = BIBLIOGRAPHIC_CODES
                .iter()
                .find(|(bibliographic, _)| *bibliographic == lowered)
                .map(|(_, terminologic)| *terminologic)
                .unwrap_or(lowered.as_str());
            Language::from_639_3(part2t)
        }
        _ => None,
    };

    by_code
        .or_else(|| Language::from_name(trimmed))
        .ok_or_else(|| anyhow!("Invalid language: {}", code_or_name))
}

/// Normalize a language to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    Ok(resolve_language(code)?.to_639_3().to_string())
}

/// Normalize a language to ISO 639-1 if it has one, ISO 639-2/T otherwise
pub fn normalize_to_part1_or_part2t(code: &str) -> Result<String> {
    let language = resolve_language(code)?;
    Ok(language
        .to_639_1()
        .unwrap_or_else(|| language.to_639_3())
        .to_string())
}

/// Check if two language identifiers denote the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (resolve_language(code1), resolve_language(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// English name of a language, as used in the translation prompt
pub fn get_language_name(code: &str) -> Result<String> {
    Ok(resolve_language(code)?.to_name().to_string())
}

/// Default CJK font for targets that need one under XeLaTeX
pub fn default_cjk_font(code: &str) -> Option<&'static str> {
    match normalize_to_part2t(code).ok()?.as_str() {
        "kor" => Some("Noto Sans KR"),
        "jpn" => Some("Noto Sans JP"),
        "zho" => Some("Noto Sans SC"),
        _ => None,
    }
}
