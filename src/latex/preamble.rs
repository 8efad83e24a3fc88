/*!
 * Font setup for translated documents.
 *
 * Papers that load CJK packages of their own (`CJKutf8`, `kotex`) clash with
 * `xeCJK` under XeLaTeX. When a CJK font is configured, those lines are
 * stripped and an `xeCJK` block is inserted right after `\documentclass`.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Lines containing any of these are dropped from the root document
const CJK_LINE_MARKERS: &[&str] = &[
    r"\usepackage{CJKutf8}",
    r"\usepackage{kotex}",
    r"\begin{CJK}",
    r"\end{CJK}",
    r"\CJKfamily",
    r"\CJK@",
    r"\CJKrmdefault",
    r"\CJKsfdefault",
    r"\CJKttdefault",
];

static CJK_STAR_BEGIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\begin\{CJK\*\}\{[^}]*\}\{[^}]*\}").expect("Invalid CJK* begin regex")
});

static CJK_STAR_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\end\{CJK\*\}").expect("Invalid CJK* end regex")
});

/// Fonts to configure for CJK output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontSetup {
    pub main_font: String,
    pub mono_font: String,
}

impl FontSetup {
    pub fn new(main_font: impl Into<String>, mono_font: impl Into<String>) -> Self {
        Self {
            main_font: main_font.into(),
            mono_font: mono_font.into(),
        }
    }

    /// The preamble lines loading `xeCJK` with the configured fonts
    pub fn block(&self) -> String {
        format!(
            "\\usepackage{{kotex}}\n\
             \\usepackage{{xeCJK}}\n\
             \\setCJKmainfont{{{}}}\n\
             \\setCJKmonofont{{{}}}\n\
             \\xeCJKsetup{{CJKspace=true}}\n",
            self.main_font, self.mono_font
        )
    }
}

/// Remove `CJK*` environment wrappers; applies to every translated file
pub fn strip_cjk_environments(text: &str) -> String {
    let text = CJK_STAR_BEGIN.replace_all(text, "");
    CJK_STAR_END.replace_all(&text, "").into_owned()
}

/// Drop every line that loads or configures a CJK package
pub fn strip_cjk_lines(text: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !CJK_LINE_MARKERS.iter().any(|marker| line.contains(marker)))
        .collect()
}

/// Insert the font block after the first `\documentclass` line.
///
/// Returns `None` when the text has no `\documentclass` line.
pub fn inject_font_block(text: &str, fonts: &FontSetup) -> Option<String> {
    let mut result = String::with_capacity(text.len() + 160);
    let mut injected = false;

    for line in text.split_inclusive('\n') {
        result.push_str(line);
        if !injected && line.trim_start().starts_with(r"\documentclass") {
            if !line.ends_with('\n') {
                result.push('\n');
            }
            result.push_str(&fonts.block());
            injected = true;
        }
    }

    injected.then_some(result)
}

/// Full font setup for the root document
pub fn apply_font_setup(root_text: &str, fonts: &FontSetup) -> Option<String> {
    let cleaned = strip_cjk_lines(&strip_cjk_environments(root_text));
    inject_font_block(&cleaned, fonts)
}
