mod commands;
mod config;
mod data;
mod helper;
mod logging;
mod monitor;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;

use config::{config_path, ensure_dirs, LogLevel, UserConfig};
use logging::LogMode;

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the helper and monitor, logging a summary per sample (default)
    Run,

    /// Output monitor frames in JSON format (suitable for piping)
    #[command(alias = "raw")]
    Pipe {
        /// Number of samples to output (0 = infinite)
        #[arg(short, long, default_value_t = 0)]
        samples: u32,

        /// Poll interval in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Compact JSON output (one line per sample)
        #[arg(short, long)]
        compact: bool,
    },

    /// Print processor, helper, memory and disk diagnostics
    Debug,

    /// Show or reset configuration
    Config {
        /// Print config file path
        #[arg(long)]
        path: bool,

        /// Reset config to defaults
        #[arg(long)]
        reset: bool,
    },
}

/// Live CPU load, frequency and temperature monitor
#[derive(Debug, Parser)]
#[command(name = "corescope", version, verbatim_doc_comment)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Poll interval in seconds (0.3 to 10)
    #[arg(short, long, global = true)]
    interval: Option<f64>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = ensure_dirs();

    let cli = Cli::parse();
    let mut config = UserConfig::load();
    config.merge_with_args(cli.interval);
    let log_level_override = cli.log_level.as_deref().map(LogLevel::from_str);

    match cli.command {
        Some(Commands::Pipe {
            samples,
            interval_ms,
            compact,
        }) => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::pipe::run(config, samples, interval_ms, compact)
        }
        Some(Commands::Debug) => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::debug::run()
        }
        Some(Commands::Config { path, reset }) => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::config::run(path, reset)
        }
        Some(Commands::Run) | None => {
            // Run always reports to the terminal; keep at least info there.
            let level = log_level_override.unwrap_or(match config.log_level {
                LogLevel::Off | LogLevel::Error | LogLevel::Warn => LogLevel::Info,
                level => level,
            });
            let _guard = logging::init(config.log_level, LogMode::Both, Some(level));
            commands::run::run(config, config_path(), cli.interval)
        }
    }
}
