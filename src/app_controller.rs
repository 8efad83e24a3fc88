use anyhow::{Result, Context, anyhow};
use log::{error, warn, info, debug};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;

use crate::app_config::Config;
use crate::assembler::{Assembler, AssemblyOptions, ISSUES_LOG_NAME};
use crate::compiler::{CompileDriver, Compiler, LatexCompiler};
use crate::document::Document;
use crate::file_utils::FileManager;
use crate::providers::Rewriter;
use crate::source::{self, LocalSource, PaperSource};
use crate::translation::{LogEntry, Orchestrator, OrchestratorOptions, PaperInfo, TranslationReport, TranslationService};

// @module: Application controller for paper translation

/// Paths and identity of one paper to translate
#[derive(Debug, Clone)]
pub struct PaperJob {
    /// arXiv id, or the directory name for local trees
    pub paper_id: String,
    /// Extracted source tree
    pub source_dir: PathBuf,
    /// Where the translated tree and PDF go
    pub output_dir: PathBuf,
    pub paper_info: PaperInfo,
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    /// Compiled PDF, if compilation is enabled
    pub pdf: Option<PathBuf>,
    pub report: TranslationReport,
    /// Warnings captured during translation
    pub issues: usize,
    pub elapsed: Duration,
}

/// Main application controller for paper translation
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve `paper` to a job: a local directory, or an arXiv id or URL
    /// looked up under `sources_dir`
    pub async fn resolve_job(&self, paper: &str, sources_dir: &Path, output_dir: Option<PathBuf>) -> Result<PaperJob> {
        let local = PathBuf::from(paper);
        let (paper_id, source_dir, paper_info) = if local.is_dir() {
            let paper_id = local
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .ok_or_else(|| anyhow!("Cannot derive a paper id from {:?}", local))?;
            let paper_info = match LocalSource::new(local.parent().unwrap_or(Path::new(".")))
                .paper_info(&paper_id)
                .await
            {
                Ok(info) => info,
                Err(e) => {
                    warn!("Translating {} without paper context: {:#}", paper_id, e);
                    PaperInfo::default()
                }
            };
            (paper_id, local, paper_info)
        } else {
            let paper_id = source::extract_arxiv_id(paper)?;
            let local_source = LocalSource::new(sources_dir);
            let source_dir = local_source.stage(&paper_id).await?;
            let paper_info = local_source.paper_info(&paper_id).await?;
            (paper_id, source_dir, paper_info)
        };

        let output_dir = output_dir.unwrap_or_else(|| {
            let name = format!("{}_{}", source::paper_file_stem(&paper_id), self.config.target_language);
            source_dir.with_file_name(name)
        });

        Ok(PaperJob {
            paper_id,
            source_dir,
            output_dir,
            paper_info,
        })
    }

    /// Run the pipeline with the configured provider and compiler
    pub async fn run(&self, job: &PaperJob, force_overwrite: bool) -> Result<RunSummary> {
        let service = Arc::new(
            TranslationService::new(self.config.translation.clone())
                .context("Failed to create translation service")?
                .with_paper_info(job.paper_info.clone()),
        );

        if let Err(e) = service.test_connection().await {
            warn!("Provider connection check failed: {}", e);
        }

        info!(
            "arxlate: {} - {}",
            self.config.translation.provider.display_name(),
            self.config.translation.get_model()
        );

        let compiler: Arc<dyn Compiler> = Arc::new(LatexCompiler::from_config(&self.config.compile));
        let result = self.run_with(job, service.clone(), compiler, force_overwrite).await;

        let usage = service.usage();
        if usage.total_tokens > 0 {
            info!("{}", usage.summary());
        }
        result
    }

    /// Run the pipeline with the given collaborators.
    ///
    /// Stages run in order: load, translate, assemble, compile. A translation
    /// failure leaves no output tree; only the issues log is written.
    pub async fn run_with(
        &self,
        job: &PaperJob,
        rewriter: Arc<dyn Rewriter>,
        compiler: Arc<dyn Compiler>,
        force_overwrite: bool,
    ) -> Result<RunSummary> {
        let start_time = Instant::now();

        if !job.source_dir.is_dir() {
            return Err(anyhow!("Source directory does not exist: {:?}", job.source_dir));
        }

        let document = Document::load(&job.source_dir)
            .with_context(|| format!("Failed to load sources from {:?}", job.source_dir))?;
        if document.tex_count() == 0 {
            return Err(anyhow!("No .tex files found in {:?}", job.source_dir));
        }
        info!(
            "Loaded {} ({} tex files, {} files total)",
            job.paper_id,
            document.tex_count(),
            document.len()
        );

        let force_overwrite = force_overwrite || self.config.output.force_overwrite;
        let log_capture = Arc::new(Mutex::new(Vec::new()));
        let progress_bar = Self::progress_bar();
        let pb = progress_bar.clone();

        let orchestrator = Orchestrator::new(rewriter, OrchestratorOptions::from_config(&self.config))
            .with_log_capture(log_capture.clone())
            .with_progress(move |completed, total| {
                pb.set_length(total as u64);
                pb.set_position(completed as u64);
            });

        debug!("Translating with {} workers", orchestrator.options().concurrency);
        progress_bar.set_message("Translating");
        let translation_start = Instant::now();
        let translated = orchestrator.translate_document(&document).await;
        progress_bar.finish_and_clear();
        let translation_elapsed = translation_start.elapsed();

        let logs = log_capture.lock().clone();
        let translated = match translated {
            Ok(translated) => translated,
            Err(e) => {
                error!("Translation failed: {}", e);
                let mut logs = logs;
                logs.push(LogEntry::new("ERROR", e.to_string()));
                self.write_issues_log(&job.output_dir, &job.paper_id, &logs);
                return Err(anyhow::Error::new(e).context(format!("Translation of {} failed", job.paper_id)));
            }
        };

        let assembly = AssemblyOptions {
            force_overwrite,
            font_setup: self.config.compile.font_setup(&self.config.target_language),
        };
        let tree = Assembler::assemble(&translated.document, &job.output_dir, &assembly)
            .context("Failed to write the translated source tree")?;
        self.write_issues_log(&tree.output_dir, &job.paper_id, &logs);

        let pdf = if self.config.compile.enabled {
            let driver = CompileDriver::from_config(compiler, &self.config.compile);
            let stem = source::paper_file_stem(&job.paper_id);
            match driver.compile(&tree.output_dir, tree.root_document.as_deref(), &stem).await {
                Ok(pdf) => Some(pdf),
                Err(e) => {
                    let entry = LogEntry::new("ERROR", e.to_string());
                    self.write_issues_log(&tree.output_dir, &job.paper_id, std::slice::from_ref(&entry));
                    return Err(anyhow::Error::new(e).context(format!("Compilation of {} failed", job.paper_id)));
                }
            }
        } else {
            info!("Compilation disabled, translated sources are in {}", tree.output_dir.display());
            None
        };

        let error_logs = logs.iter().filter(|log| log.level == "ERROR").count();
        let warning_logs = logs.iter().filter(|log| log.level == "WARN").count();
        if error_logs > 0 || warning_logs > 0 {
            info!("Translation completed with {} errors and {} warnings.", error_logs, warning_logs);
        }

        let elapsed = start_time.elapsed();
        info!(
            "Done in {} (translation: {})",
            Self::format_duration(elapsed),
            Self::format_duration(translation_elapsed)
        );
        if let Some(pdf) = &pdf {
            info!("Success: {}", pdf.display());
        }

        Ok(RunSummary {
            output_dir: tree.output_dir,
            pdf,
            report: translated.report,
            issues: logs.len(),
            elapsed,
        })
    }

    fn progress_bar() -> ProgressBar {
        let progress_bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));
        progress_bar
    }

    /// Append captured entries to the issues log; failures here only warn
    fn write_issues_log(&self, output_dir: &Path, paper_id: &str, logs: &[LogEntry]) {
        if logs.is_empty() {
            return;
        }
        let path = output_dir.join(ISSUES_LOG_NAME);
        let context = format!(
            "{} ({} -> {}) with {} - {}",
            paper_id,
            self.config.source_language,
            self.config.target_language,
            self.config.translation.provider.display_name(),
            self.config.translation.get_model()
        );

        let result = FileManager::append_to_log_file(&path, &format!("Context: {}", context)).and_then(|_| {
            logs.iter().try_for_each(|entry| {
                FileManager::append_to_log_file(&path, &format!("[{}] {}", entry.level, entry.message))
            })
        });

        match result {
            Ok(()) => info!("Issues written to {}", path.display()),
            Err(e) => warn!("Failed to write issues log: {}", e),
        }
    }

    // Format duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
