// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use std::fs::File;
use std::io::BufReader;
use std::io::Write;
use std::path::{Path, PathBuf};

use subtide::app_config::{self, CacheMode, Config, TranslationProvider};
use subtide::app_controller::{Controller, RunOutcome, TranslateOptions};

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

/// CLI Wrapper for CacheMode to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliCacheMode {
    Volatile,
    Persistent,
    Disabled,
}

impl From<CliCacheMode> for CacheMode {
    fn from(cli_mode: CliCacheMode) -> Self {
        match cli_mode {
            CliCacheMode::Volatile => CacheMode::Volatile,
            CliCacheMode::Persistent => CacheMode::Persistent,
            CliCacheMode::Disabled => CacheMode::Disabled,
        }
    }
}

/// Options shared by every command that reads the configuration
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// Subtitle file to translate
    #[arg(value_name = "INPUT.srt")]
    input_path: PathBuf,

    /// Target language (e.g. 'French', 'Brazilian Portuguese')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Maximum distinct lines per request
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Maximum provider requests per minute
    #[arg(short = 'r', long)]
    requests_per_minute: Option<u32>,

    /// Cache mode for this run
    #[arg(long, value_enum)]
    cache_mode: Option<CliCacheMode>,

    /// Output file (default: <stem>.<language>.srt next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Start over instead of resuming an interrupted session
    #[arg(long)]
    fresh: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a subtitle file (resumes an interrupted run of the same file)
    Translate(TranslateArgs),

    /// Check that the configured provider is reachable
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Remove every entry from the persistent translation cache
    ClearCache {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Generate shell completions for subtide
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Subtide - batch subtitle translation with AI providers
#[derive(Parser, Debug)]
#[command(name = "subtide")]
#[command(version)]
#[command(about = "Batch subtitle translation with AI providers")]
#[command(long_about = "Subtide translates SRT subtitle files in batches through an AI provider,
caching every translated line and resuming interrupted runs where they stopped.

EXAMPLES:
    subtide translate movie.srt                        # Translate using default config
    subtide translate -t German movie.srt              # Translate into German
    subtide translate -p openai -m gpt-4o movie.srt    # Use specific provider and model
    subtide translate -b 20 -r 60 movie.srt            # 20 lines per request, 60 requests/min
    subtide translate --fresh movie.srt                # Ignore an interrupted session
    subtide check                                      # Check the provider connection
    subtide clear-cache                                # Empty the translation cache
    subtide completions bash > subtide.bash            # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    ollama    - Local Ollama server (default: llama3.2:3b)
    openai    - OpenAI API (requires API key)
    anthropic - Anthropic Claude API (requires API key)
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
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level.min(log::max_level())
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:<5} {}\x1B[0m",
                color,
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
    // The logger accepts everything; the effective level is the global max level
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "subtide", &mut std::io::stdout());
            Ok(())
        }
        Commands::Translate(args) => run_translate(args).await,
        Commands::Check { config } => {
            let config = load_config(&config, |_| {})?;
            Controller::with_config(config)?.check_provider().await
        }
        Commands::ClearCache { config } => {
            let config = load_config(&config, |_| {})?;
            Controller::with_config(config)?.clear_cache().await?;
            Ok(())
        }
    }
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    if !options.input_path.is_file() {
        return Err(anyhow!("Input file does not exist: {:?}", options.input_path));
    }

    let config = load_config(&options.config, |config| apply_overrides(config, &options))?;
    config.validate().context("Configuration validation failed")?;

    let controller = Controller::with_config(config)?;
    let translate_options = TranslateOptions {
        input_file: options.input_path.clone(),
        output_file: options.output.clone(),
        force_overwrite: options.force_overwrite,
        fresh: options.fresh,
    };

    match controller.run(&translate_options).await? {
        RunOutcome::Completed { .. } | RunOutcome::Skipped { .. } => Ok(()),
        RunOutcome::Interrupted { reason: None, .. } => Ok(()),
        RunOutcome::Interrupted {
            resume_index,
            total_lines,
            reason: Some(reason),
        } => Err(anyhow!(
            "Translation stopped at line {} of {}: {}. Run the same command again to resume.",
            resume_index,
            total_lines,
            reason
        )),
    }
}

/// Apply command line overrides on top of the file configuration
fn apply_overrides(config: &mut Config, options: &TranslateArgs) {
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }

    if let Some(model) = &options.model {
        let provider = config.translation.provider;
        config.translation.provider_config_mut(provider).model = model.clone();
    }

    if let Some(target_language) = &options.target_language {
        config.target_language = target_language.clone();
    }

    if let Some(batch_size) = options.batch_size {
        config.translation.common.batch_size = batch_size;
    }

    if let Some(requests_per_minute) = options.requests_per_minute {
        // The command line wins over provider-specific limits too
        let provider = config.translation.provider;
        config.translation.common.requests_per_minute = requests_per_minute;
        config.translation.provider_config_mut(provider).rate_limit = Some(requests_per_minute);
    }

    if let Some(cache_mode) = &options.cache_mode {
        config.cache.mode = cache_mode.clone().into();
    }
}

/// Load the configuration file, creating a default one if it doesn't exist
fn load_config(args: &ConfigArgs, overrides: impl FnOnce(&mut Config)) -> Result<Config> {
    // A command line log level applies before the config is read
    if let Some(cmd_log_level) = &args.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let config_path = Path::new(&args.config_path);
    let mut config = if config_path.exists() {
        let file = File::open(config_path)
            .with_context(|| format!("Failed to open config file: {}", args.config_path))?;

        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file: {}", args.config_path))?
    } else {
        warn!("Config file not found at '{}', creating default config.", args.config_path);

        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;

        std::fs::write(config_path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", args.config_path))?;

        config
    };

    if let Some(log_level) = &args.log_level {
        config.log_level = log_level.clone().into();
    } else {
        log::set_max_level(config.log_level.to_level_filter());
    }

    overrides(&mut config);
    info!("Using configuration from {}", args.config_path);

    Ok(config)
}
