/*!
 * Tests for span protection, chunking and font setup working together
 */

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use arxlate::errors::MarkupError;
use arxlate::latex::preamble::apply_font_setup;
use arxlate::latex::token::find_tokens;
use arxlate::latex::{FontSetup, SpanKind, SpanProtector, protect, split};
use crate::common::{SAMPLE_MAIN, SAMPLE_METHOD};

/// Test that the sample paper survives protect and restore unchanged
#[test]
fn test_protect_withSamplePaper_shouldRestoreExactly() {
    for source in [SAMPLE_MAIN, SAMPLE_METHOD] {
        let protected = protect(source).unwrap();
        assert_eq!(protected.restore(&protected.safe_text), source);
    }
}

/// Test which parts of the sample paper stay visible to the translator
#[test]
fn test_protect_withSamplePaper_shouldHideMarkupAndKeepProse() {
    let protected = protect(SAMPLE_METHOD).unwrap();

    assert!(protected.safe_text.contains("The loss is"));
    assert!(protected.safe_text.contains("and it converges, see Section"));
    assert!(!protected.safe_text.contains("reviewers asked"));
    assert!(!protected.safe_text.contains("\\sum"));

    let kinds: Vec<SpanKind> = protected.spans.iter().map(|s| s.kind).collect();
    assert!(kinds.contains(&SpanKind::Comment));
    assert!(kinds.contains(&SpanKind::DisplayMath));
    assert!(kinds.contains(&SpanKind::Reference));
}

/// Test that one protector shared by several files never reuses a token
#[test]
fn test_span_protector_withTwoFiles_shouldHandOutDisjointTokens() {
    let mut protector = SpanProtector::new();
    let main = protector.protect(SAMPLE_MAIN).unwrap();
    let method = protector.protect(SAMPLE_METHOD).unwrap();

    for token in find_tokens(&method.safe_text) {
        assert!(!main.token_map.contains(token), "token {} reused", token);
    }
    assert_eq!(
        protector.next_id(),
        1 + main.spans.len() + method.spans.len()
    );
}

/// Test the malformed-markup scenario: nothing is guessed
#[test]
fn test_protect_withUnterminatedEquation_shouldReportOffset() {
    let source = "Some text.\n\\begin{equation}\na = b\n\nMore text.";
    let err = protect(source).unwrap_err();

    assert_eq!(
        err,
        MarkupError::Unterminated {
            construct: "\\begin{equation}".to_string(),
            offset: 11,
        }
    );
}

/// Test that mismatched environments are refused
#[test]
fn test_protect_withCrossedEnvironments_shouldFail() {
    let source = "\\begin{itemize}\n\\begin{center}\n\\end{itemize}\n\\end{center}";
    assert!(protect(source).is_err());
}

/// Test chunking the protected sample at many sizes
#[test]
fn test_split_withProtectedSample_shouldPreserveTokensAndText() {
    let protected = protect(SAMPLE_MAIN).unwrap();
    let total = find_tokens(&protected.safe_text).len();

    for max in [1, 10, 25, 60, 200, 10_000] {
        let plan = split(&protected.safe_text, max);

        let mut seen = Vec::new();
        for chunk in &plan.chunks {
            seen.extend(chunk.tokens().into_iter().map(str::to_string));
            if chunk.text.contains(char::is_whitespace) {
                assert!(chunk.char_len() <= max, "chunk over {}: {:?}", max, chunk.text);
            }
        }
        assert_eq!(seen.len(), total);
        assert_eq!(plan.original_text(), protected.safe_text);
        assert_eq!(protected.restore(&plan.original_text()), SAMPLE_MAIN);
    }
}

/// Test that a translated plan restores to valid markup
#[test]
fn test_reassemble_withTranslatedChunks_shouldRestoreMarkup() {
    let protected = protect(r"Hello \cite{foo} world. $x^2$ end.").unwrap();
    let plan = split(&protected.safe_text, 20);
    assert!(plan.len() > 1);

    let translated: Vec<String> = plan
        .chunks
        .iter()
        .map(|c| c.text.replace("Hello", "Bonjour").replace("world", "monde").replace("end", "fin"))
        .collect();
    let restored = protected.restore(&plan.reassemble(&translated));

    assert_eq!(restored, r"Bonjour \cite{foo} monde. $x^2$ fin.");
}

/// Test font setup on the sample root document
#[test]
fn test_apply_font_setup_withSampleRoot_shouldInjectAfterDocumentclass() {
    let fonts = FontSetup::new("Noto Sans KR", "Noto Sans KR");
    let result = apply_font_setup(SAMPLE_MAIN, &fonts).expect("root has a documentclass");

    let mut lines = result.lines();
    assert_eq!(lines.next(), Some("\\documentclass{article}"));
    assert!(result.contains("\\setCJKmainfont{Noto Sans KR}"));
    assert!(result.find("xeCJK").unwrap() < result.find("\\begin{document}").unwrap());

    assert!(apply_font_setup(SAMPLE_METHOD, &fonts).is_none());
}

/// Self-contained LaTeX fragments the generator joins with separators
const FRAGMENTS: &[&str] = &[
    "We study", "large models", "naïve réseau", "이 논문은", "results",
    "\\cite{brown2020}", "Figure~\\ref{fig:a}", "$x^2$", "$a\\$b$", "\\(y\\)",
    "\\[ E = mc^2 \\]", "$$\\sum_i x_i$$", "% a note\n", "5\\% more", "a & b \\\\",
    "\\emph{key} idea", "{\\bf bold} text", "\\verb|$%|",
    "\\begin{itemize}\n\\item First.\n\\item Second.\n\\end{itemize}",
    "\\begin {quote}Quoted.\\end{quote}",
    "\\begin{equation}\nL = 1\n\\end {equation}",
    "\\begin{tikzpicture}\\draw (0,0) -- (1,1) node[right] {x};\\end{tikzpicture}",
    "\\section{Intro}", "ZXQ0007QXZ", "end.", "Why?", "Yes!",
];

const SEPARATORS: &[&str] = &[" ", "\n", "\n\n", ". ", "。", "\t", "\n\n\n  "];

fn generate_source(rng: &mut StdRng) -> String {
    let mut source = String::new();
    for _ in 0..rng.random_range(0..40) {
        source.push_str(FRAGMENTS[rng.random_range(0..FRAGMENTS.len())]);
        source.push_str(SEPARATORS[rng.random_range(0..SEPARATORS.len())]);
    }
    source
}

/// Test the protector and chunker laws on generated sources
#[test]
fn test_protect_withGeneratedSources_shouldHoldRoundTripIdempotenceAndChunkLaws() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..500 {
        let source = generate_source(&mut rng);
        let protected = protect(&source).unwrap_or_else(|e| panic!("{} for {:?}", e, source));

        assert_eq!(protected.restore(&protected.safe_text), source);

        let again = protect(&protected.safe_text).unwrap();
        assert!(again.spans.is_empty(), "reprotected {:?}", protected.safe_text);
        assert_eq!(again.safe_text, protected.safe_text);

        let total = find_tokens(&protected.safe_text).len();
        let max = rng.random_range(1..200);
        let plan = split(&protected.safe_text, max);
        let mut seen = 0;
        for chunk in &plan.chunks {
            assert!(!chunk.text.is_empty());
            assert_eq!(chunk.text, chunk.text.trim());
            seen += chunk.tokens().len();
        }
        assert_eq!(seen, total, "a token was cut at max {} in {:?}", max, protected.safe_text);
        assert_eq!(plan.original_text(), protected.safe_text);
    }
}
