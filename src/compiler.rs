/*!
 * Compilation of an assembled source tree into a PDF.
 *
 * `CompileDriver` finds the root document, runs the `Compiler` the configured
 * number of passes and allows extra passes only when the log asks for a
 * rerun. Any other failure surfaces the tail of the compiler log.
 */

use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::app_config::CompileConfig;
use crate::errors::CompileError;
use crate::file_utils::FileManager;

/// Lines of compiler log kept in a `CompileError::Failed`
pub const LOG_TAIL_LINES: usize = 40;

/// Commands whose presence marks a `.tex` file as a root document
const ROOT_MARKERS: &[&str] = &["\\begin{document}", "\\usepackage", "\\title", "\\author"];

/// Log lines asking for another pass
const RERUN_MARKERS: &[&str] = &[
    "Rerun to get",
    "Label(s) may have changed",
    "Rerun LaTeX",
    "Please rerun LaTeX",
];

const UNDEFINED_REFERENCES: &str = "There were undefined references";

/// Result of one compiler pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Compiler log, or captured output when no log file was written
    pub log: String,
}

/// A LaTeX compiler
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Run one pass over `root`, relative to `work_dir`
    async fn compile(&self, work_dir: &Path, root: &Path) -> Result<CompileOutput, CompileError>;

    fn name(&self) -> String;
}

/// Runs a TeX engine as a child process
#[derive(Debug, Clone)]
pub struct LatexCompiler {
    program: String,
    timeout: Duration,
}

impl LatexCompiler {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &CompileConfig) -> Self {
        Self::new(config.compiler.clone(), Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl Compiler for LatexCompiler {
    async fn compile(&self, work_dir: &Path, root: &Path) -> Result<CompileOutput, CompileError> {
        let file_name = root
            .file_name()
            .ok_or_else(|| CompileError::NoRootDocument(root.to_path_buf()))?;
        let job_dir = match root.parent() {
            Some(parent) => work_dir.join(parent),
            None => work_dir.to_path_buf(),
        };

        debug!("Running {} on {} in {}", self.program, root.display(), job_dir.display());

        let child = Command::new(&self.program)
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg("-file-line-error")
            .arg(file_name)
            .current_dir(&job_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CompileError::Launch {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CompileError::Launch {
                    program: self.program.clone(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Ok(CompileOutput {
                    success: false,
                    exit_code: None,
                    log: format!("{} timed out after {:?}", self.program, self.timeout),
                });
            }
        };

        let log_path = job_dir.join(Path::new(file_name).with_extension("log"));
        let log = match FileManager::read_bytes_lossy(&log_path) {
            Some(log) => log,
            None => format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            ),
        };

        Ok(CompileOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            log,
        })
    }

    fn name(&self) -> String {
        self.program.clone()
    }
}

/// Last `lines` lines of `log`
pub fn log_tail(log: &str, lines: usize) -> String {
    let all: Vec<&str> = log.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// Whether the log of pass `pass` (1-based) asks for another pass
pub fn needs_rerun(log: &str, pass: u32) -> bool {
    RERUN_MARKERS.iter().any(|marker| log.contains(marker))
        || (pass == 1 && log.contains(UNDEFINED_REFERENCES))
}

/// Whether `text` looks like the root of a document
fn is_root_candidate(text: &str) -> bool {
    let active = strip_comments(text);
    active.contains("\\documentclass") && ROOT_MARKERS.iter().any(|marker| active.contains(marker))
}

fn strip_comments(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with('%'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Choose the root among `(relative path, text)` pairs.
///
/// The first file in path order that declares a document class and looks
/// like a document wins; without one, the largest file is taken.
pub fn select_root<'a, I>(units: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = (&'a Path, &'a str)>,
{
    let candidates: Vec<(&Path, &str)> = units
        .into_iter()
        .filter(|(path, _)| {
            !path
                .file_stem()
                .map(|stem| stem.to_string_lossy().ends_with("_original"))
                .unwrap_or(false)
        })
        .collect();

    if let Some((path, _)) = candidates.iter().find(|(_, text)| is_root_candidate(text)) {
        return Some(path.to_path_buf());
    }

    let largest = candidates.iter().max_by_key(|(_, text)| text.len())?;
    debug!("No clear root document, selected by size: {}", largest.0.display());
    Some(largest.0.to_path_buf())
}

/// Find the root `.tex` of the tree at `dir`, relative to `dir`
pub fn find_root_document(dir: &Path) -> Result<PathBuf, CompileError> {
    let files = FileManager::find_files(dir, "tex")
        .map_err(|_| CompileError::NoRootDocument(dir.to_path_buf()))?;

    let mut units = Vec::with_capacity(files.len());
    for file in files {
        let Ok(relative) = file.strip_prefix(dir) else {
            continue;
        };
        match FileManager::read_bytes_lossy(&file) {
            Some(text) => units.push((relative.to_path_buf(), text)),
            None => warn!("Could not read {}", file.display()),
        }
    }

    select_root(units.iter().map(|(path, text)| (path.as_path(), text.as_str())))
        .ok_or_else(|| CompileError::NoRootDocument(dir.to_path_buf()))
}

/// Runs compiler passes over an assembled tree
pub struct CompileDriver {
    compiler: Arc<dyn Compiler>,
    passes: u32,
    max_transient_reruns: u32,
}

impl CompileDriver {
    pub fn new(compiler: Arc<dyn Compiler>, passes: u32, max_transient_reruns: u32) -> Self {
        Self {
            compiler,
            passes: passes.max(1),
            max_transient_reruns,
        }
    }

    pub fn from_config(compiler: Arc<dyn Compiler>, config: &CompileConfig) -> Self {
        Self::new(compiler, config.passes, config.max_transient_reruns)
    }

    /// Compile the tree at `tree` and copy the PDF to `<tree>/<paper_id>.pdf`
    pub async fn compile(
        &self,
        tree: &Path,
        root: Option<&Path>,
        paper_id: &str,
    ) -> Result<PathBuf, CompileError> {
        let root = match root {
            Some(root) => root.to_path_buf(),
            None => find_root_document(tree)?,
        };
        info!("Compiling {} with {}", root.display(), self.compiler.name());

        let mut reruns_left = self.max_transient_reruns;
        let mut pass: u32 = 0;
        let mut regular_left = self.passes;

        while regular_left > 0 {
            regular_left -= 1;
            pass += 1;

            let output = self.compiler.compile(tree, &root).await?;
            let wants_rerun = needs_rerun(&output.log, pass);

            if !output.success && !wants_rerun {
                return Err(Self::failure(&root, &output));
            }

            if regular_left == 0 && wants_rerun {
                if reruns_left == 0 {
                    if !output.success {
                        return Err(Self::failure(&root, &output));
                    }
                    warn!("Compiler still asks for a rerun after {} passes", pass);
                    break;
                }
                reruns_left -= 1;
                regular_left += 1;
                debug!("Log asks for a rerun, running pass {}", pass + 1);
            }
        }

        let produced = tree.join(root.with_extension("pdf"));
        if !produced.exists() {
            return Err(CompileError::MissingOutput(produced));
        }

        let destination = tree.join(format!("{}.pdf", paper_id));
        if destination != produced {
            FileManager::copy_file(&produced, &destination)
                .map_err(|_| CompileError::MissingOutput(destination.clone()))?;
        }

        info!("PDF written to {}", destination.display());
        Ok(destination)
    }

    fn failure(root: &Path, output: &CompileOutput) -> CompileError {
        CompileError::Failed {
            root: root.to_path_buf(),
            exit_code: output.exit_code,
            log_tail: log_tail(&output.log, LOG_TAIL_LINES),
        }
    }
}
