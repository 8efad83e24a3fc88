/*!
 * Where paper sources come from.
 *
 * Downloading and unpacking arXiv archives happens outside this crate; a
 * `PaperSource` only hands back a directory holding an extracted source
 * tree, plus whatever title and abstract it knows about.
 */

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use url::Url;

use crate::file_utils::FileManager;
use crate::translation::PaperInfo;

/// Optional metadata file next to a staged source tree
pub const PAPER_INFO_FILE: &str = "paper.json";

/// `2401.12345`, `2401.12345v2`, `0704.0001`
static NEW_STYLE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").expect("Invalid arXiv id regex")
});

/// `hep-th/9901001`, `math.GT/0309136v1`
static OLD_STYLE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z-]+(\.[A-Z]{2})?/\d{7}(v\d+)?$").expect("Invalid old arXiv id regex")
});

/// Path prefixes arXiv uses in front of an id
const URL_PREFIXES: &[&str] = &["abs", "pdf", "src", "e-print", "format", "html"];

/// Extract an arXiv id from a bare id, an `arXiv:` reference or an arxiv.org URL
pub fn extract_arxiv_id(input: &str) -> Result<String> {
    let trimmed = input.trim();

    let candidate = match Url::parse(trimmed) {
        Ok(url) if url.host_str().map(|h| h.ends_with("arxiv.org")).unwrap_or(false) => {
            let segments: Vec<&str> = url
                .path_segments()
                .map(|segments| segments.filter(|s| !s.is_empty()).collect())
                .unwrap_or_default();
            let rest = match segments.first() {
                Some(first) if URL_PREFIXES.contains(first) => &segments[1..],
                _ => &segments[..],
            };
            rest.join("/")
        }
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
            return Err(anyhow!("Not an arXiv URL: {}", input));
        }
        _ => trimmed.to_string(),
    };

    let candidate = candidate
        .trim_start_matches("arXiv:")
        .trim_start_matches("arxiv:")
        .trim_end_matches(".pdf")
        .trim_end_matches('/');

    if NEW_STYLE_ID.is_match(candidate) || OLD_STYLE_ID.is_match(candidate) {
        debug!("Extracted arXiv id {} from {}", candidate, input);
        Ok(candidate.to_string())
    } else {
        Err(anyhow!("Could not find an arXiv id in: {}", input))
    }
}

/// File-name-safe form of a paper id, used for the PDF name
pub fn paper_file_stem(paper_id: &str) -> String {
    paper_id.replace('/', "_")
}

/// Provides extracted paper sources
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Directory holding the extracted source tree of `paper_id`
    async fn stage(&self, paper_id: &str) -> Result<PathBuf>;

    /// Title and abstract of the paper, empty when unknown
    async fn paper_info(&self, _paper_id: &str) -> Result<PaperInfo> {
        Ok(PaperInfo::default())
    }
}

/// Sources already extracted to `<base_dir>/<paper file stem>`
#[derive(Debug, Clone)]
pub struct LocalSource {
    base_dir: PathBuf,
}

impl LocalSource {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn paper_dir(&self, paper_id: &str) -> PathBuf {
        self.base_dir.join(paper_file_stem(paper_id))
    }
}

#[async_trait]
impl PaperSource for LocalSource {
    async fn stage(&self, paper_id: &str) -> Result<PathBuf> {
        let dir = self.paper_dir(paper_id);
        if !FileManager::dir_exists(&dir) {
            return Err(anyhow!(
                "No extracted sources for {} at {}",
                paper_id,
                dir.display()
            ));
        }
        Ok(dir)
    }

    async fn paper_info(&self, paper_id: &str) -> Result<PaperInfo> {
        let path = self.paper_dir(paper_id).join(PAPER_INFO_FILE);
        if !FileManager::file_exists(&path) {
            return Ok(PaperInfo::default());
        }
        let content = FileManager::read_to_string(&path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse paper info: {:?}", path))
    }
}
