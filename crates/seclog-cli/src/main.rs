//! seclog: encrypted rotating log cache CLI
//!
//! Commands:
//!   capture [FILE]        - append a JSON batch of log events (stdin if no FILE)
//!   capture-text [TEXT]   - append raw text (stdin if no TEXT)
//!   clear                 - delete every cached chunk
//!   blob [-o FILE]        - decrypt and print the whole cache
//!   configure [flags]     - change limits / minimum level (persisted)
//!   status                - show limits and chunks on disk
//!   config show           - display the merged configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use seclog_cache::{install_panic_hook, CacheLayer, LogCache, SecureLogger};
use seclog_core::config::{expand_tilde, SecretBackend, SeclogConfig};
use seclog_core::ConfigureOptions;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "seclog",
    version,
    about = "Encrypted rotating log cache",
    long_about = "seclog: capture diagnostic logs into an encrypted, size-bounded cache and read them back"
)]
struct Cli {
    /// Path to seclog.toml configuration file
    #[arg(long, short = 'c', env = "SECLOG_CONFIG", default_value = "~/.config/seclog/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to [logging] log_level
    #[arg(long, env = "SECLOG_LOG")]
    log: Option<String>,

    /// Log format (json, text); defaults to [logging] log_format
    #[arg(long, env = "SECLOG_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append a batch of events (a JSON array of objects, or one object)
    ///
    /// Each event may carry `timestamp` (ms), `level` (2-7), `tag` and
    /// `message`; malformed entries are skipped.
    Capture {
        /// JSON file to read (default: stdin)
        file: Option<PathBuf>,
    },

    /// Append text exactly as given
    #[command(name = "capture-text")]
    CaptureText {
        /// Text to append (default: stdin)
        text: Option<String>,
    },

    /// Delete all cached chunks
    Clear,

    /// Decrypt every chunk and write the assembled log
    Blob {
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Change cache limits or the minimum level; valid options apply even
    /// when others are rejected
    Configure {
        /// Minimum level kept (2 = VERBOSE ... 7 = FATAL)
        #[arg(long, allow_hyphen_values = true)]
        min_level: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        max_file_size_bytes: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        max_total_cache_size_bytes: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        max_file_count: Option<i64>,
    },

    /// Show limits and the chunks currently on disk
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = SeclogConfig::load(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let logger = SecureLogger::open(&config);

    let level = cli.log.as_deref().unwrap_or(&config.logging.log_level);
    let format = match cli.log_format {
        Some(format) => format,
        None => LogFormat::from_str(&config.logging.log_format, true)
            .map_err(|e| anyhow::anyhow!("invalid [logging] log_format: {e}"))?,
    };
    init_logging(level, &format, Arc::clone(logger.cache()));
    install_panic_hook(logger.cache().clone());

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        cache_dir = %expand_tilde(&config.cache.dir).display(),
        "seclog starting"
    );

    let result = match cli.command {
        Commands::Capture { file } => cmd_capture(&logger, file.as_deref()),
        Commands::CaptureText { text } => cmd_capture_text(&logger, text),
        Commands::Clear => cmd_clear(&logger),
        Commands::Blob { output } => cmd_blob(&logger, output.as_deref()),
        Commands::Configure {
            min_level,
            max_file_size_bytes,
            max_total_cache_size_bytes,
            max_file_count,
        } => cmd_configure(
            &logger,
            &ConfigureOptions {
                min_level,
                max_file_size_bytes,
                max_total_cache_size_bytes,
                max_file_count,
            },
        ),
        Commands::Status => cmd_status(&logger, &config),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    };

    // the subscriber and panic hook keep the cache alive; close the active
    // chunk explicitly
    logger.cache().destroy();
    result
}

/// stderr for diagnostics (stdout carries blobs); every event also goes
/// through the cache layer.
fn init_logging(level: &str, format: &LogFormat, cache: Arc<LogCache>) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(CacheLayer::new(cache))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(CacheLayer::new(cache))
                .init();
        }
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("reading stdin")?;
            Ok(input)
        }
    }
}

// ── `seclog capture` ──────────────────────────────────────────────────────────

fn cmd_capture(logger: &SecureLogger, file: Option<&Path>) -> Result<()> {
    let input = read_input(file)?;
    let parsed: serde_json::Value =
        serde_json::from_str(&input).context("parsing event batch as JSON")?;
    let events = match parsed {
        serde_json::Value::Array(events) => events,
        other => vec![other],
    };

    let written = logger.capture(&events).context("capturing events")?;
    println!("captured {written} of {} events", events.len());
    Ok(())
}

// ── `seclog capture-text` ─────────────────────────────────────────────────────

fn cmd_capture_text(logger: &SecureLogger, text: Option<String>) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => read_input(None)?,
    };
    logger.capture_text(&text).context("appending text")?;
    Ok(())
}

// ── `seclog clear` ────────────────────────────────────────────────────────────

fn cmd_clear(logger: &SecureLogger) -> Result<()> {
    if logger.clear_cache().context("clearing cache")? {
        println!("cache cleared");
    } else {
        println!("cache unavailable (destroyed)");
    }
    Ok(())
}

// ── `seclog blob` ─────────────────────────────────────────────────────────────

fn cmd_blob(logger: &SecureLogger, output: Option<&Path>) -> Result<()> {
    let blob = logger.get_cache_blob().context("assembling cache blob")?;
    match output {
        Some(path) => {
            std::fs::write(path, &blob)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("wrote {} to {}", fmt_bytes(blob.len() as u64), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&blob).context("writing blob to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

// ── `seclog configure` ────────────────────────────────────────────────────────

fn cmd_configure(logger: &SecureLogger, options: &ConfigureOptions) -> Result<()> {
    let result = logger.configure(options);
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("serializing configure result")?
    );
    if !result.success {
        anyhow::bail!("some options were not applied");
    }
    Ok(())
}

// ── `seclog status` ───────────────────────────────────────────────────────────

fn cmd_status(logger: &SecureLogger, config: &SeclogConfig) -> Result<()> {
    let cache = logger.cache();
    let limits = cache.limits();
    let chunks = cache.chunks().context("listing chunks")?;
    let total: u64 = chunks.iter().map(|c| c.size).sum();

    println!("seclog v{}", env!("CARGO_PKG_VERSION"));
    println!("  cache dir:    {}", expand_tilde(&config.cache.dir).display());
    println!("  secret:       {}", secret_status(config));
    println!("  min level:    {}", cache.min_level());
    println!(
        "  limits:       {} per file, {} total, {} files",
        fmt_bytes(limits.max_file_size_bytes),
        fmt_bytes(limits.max_total_cache_size_bytes),
        limits.max_file_count
    );
    println!("  chunks:       {} ({})", chunks.len(), fmt_bytes(total));
    for chunk in &chunks {
        println!("    {}  {}", chunk.name, fmt_bytes(chunk.size));
    }
    Ok(())
}

fn secret_status(config: &SeclogConfig) -> String {
    let source = seclog_secrets::store_from_config(&config.secrets).source();
    match config.secrets.backend {
        SecretBackend::Keychain if !seclog_secrets::keychain::is_available(&config.secrets.service) => {
            format!("{source} (keychain unavailable)")
        }
        _ => source,
    }
}

// ── `seclog config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &SeclogConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
