// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, Context};
use log::{error, warn, info, LevelFilter, Log, Metadata, Record, Level, SetLoggerError};
use std::path::{Path, PathBuf};
use std::io::Write;
use clap::{Parser, ValueEnum, CommandFactory, Subcommand};
use clap_complete::{generate, Shell};

use arxlate::app_config::{self, Config, TranslationProvider};
use arxlate::app_controller::Controller;
use arxlate::translation::FallbackPolicy;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    OpenAI,
    Anthropic,
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a paper's LaTeX sources and compile the result
    Translate(TranslateArgs),

    /// Generate shell completions for arxlate
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// arXiv id, arxiv.org URL, or a directory holding extracted sources
    #[arg(value_name = "PAPER")]
    paper: String,

    /// Directory holding extracted sources as <sources-dir>/<arxiv id>
    #[arg(long, default_value = "papers")]
    sources_dir: PathBuf,

    /// Output directory for the translated tree and PDF
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force overwrite of an existing output directory
    #[arg(short, long)]
    force_overwrite: bool,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Source language code (e.g., 'en')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'ko', 'ja', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Keep the source text of chunks that cannot be translated
    #[arg(long)]
    keep_original_on_failure: bool,

    /// Write the translated sources without compiling them
    #[arg(long)]
    no_compile: bool,

    /// CJK font for the compiled PDF
    #[arg(long)]
    font: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// arxlate - LaTeX-safe translation of arXiv papers
///
/// Translates the prose of a paper's LaTeX sources with an AI provider while
/// keeping every command, math span and reference intact, then compiles the
/// translated sources into a PDF.
#[derive(Parser, Debug)]
#[command(name = "arxlate")]
#[command(version = "0.1.0")]
#[command(about = "LaTeX-safe translation of arXiv papers")]
#[command(long_about = "arxlate translates the LaTeX sources of arXiv papers with AI providers and compiles the result.

EXAMPLES:
    arxlate translate 2401.12345                          # Sources in papers/2401.12345
    arxlate translate https://arxiv.org/abs/2401.12345    # Same paper, by URL
    arxlate translate -t ja ./my-paper -o ./my-paper-ja   # Local tree to Japanese
    arxlate translate -p anthropic --no-compile 2401.12345
    arxlate completions bash > arxlate.bash

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default
    one will be created automatically.

SUPPORTED PROVIDERS:
    openai    - OpenAI API (requires API key)
    anthropic - Anthropic API (requires API key)
    ollama    - Local Ollama server
    lmstudio  - LM Studio local server (OpenAI-compatible on http://localhost:1234/v1)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The max level is lowered or raised once the config is known
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "arxlate", &mut std::io::stdout());
            Ok(())
        }
        Commands::Translate(args) => {
            if let Err(e) = run_translate(args).await {
                error!("{:#}", e);
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Load the config file, or write a default one when it is missing
fn load_or_create_config(config_path: &str) -> Result<Config> {
    let path = Path::new(config_path);
    if path.exists() {
        return Config::from_file(path);
    }

    warn!("Config file not found at '{}', creating default config.", config_path);
    let config = Config::default();
    config.save(path)
        .with_context(|| format!("Failed to write default config to file: {}", config_path))?;
    Ok(config)
}

fn apply_overrides(config: &mut Config, options: &TranslateArgs) {
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.translation.active_provider_config_mut().model = model.clone();
    }
    if let Some(source_lang) = &options.source_language {
        config.source_language = source_lang.clone();
    }
    if let Some(target_lang) = &options.target_language {
        config.target_language = target_lang.clone();
    }
    if options.keep_original_on_failure {
        config.output.fallback = FallbackPolicy::KeepOriginal;
    }
    if options.no_compile {
        config.compile.enabled = false;
    }
    if let Some(font) = &options.font {
        config.compile.cjk_font = Some(font.clone());
    }
    if options.force_overwrite {
        config.output.force_overwrite = true;
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = load_or_create_config(&options.config_path)?;
    apply_overrides(&mut config, &options);

    config.validate()
        .context("Configuration validation failed")?;
    log::set_max_level(config.log_level.to_level_filter());

    let controller = Controller::with_config(config)?;
    let job = controller
        .resolve_job(&options.paper, &options.sources_dir, options.output.clone())
        .await?;

    info!("Translating {} from {}", job.paper_id, job.source_dir.display());
    let summary = controller.run(&job, options.force_overwrite).await?;

    info!(
        "{} chunks translated, {} kept in source language, {} retries",
        summary.report.translated, summary.report.fell_back, summary.report.retries
    );
    if summary.pdf.is_none() {
        info!("Translated sources: {}", summary.output_dir.display());
    }
    Ok(())
}
