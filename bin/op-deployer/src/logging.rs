//! Logging configuration of the deployer CLI.
//!
//! Provides CLI arguments for configuring tracing output with support for:
//! - Verbosity levels via `-v/-vv/-vvv` flags or `--log.verbosity`
//! - Custom log filters via `RUST_LOG` environment variable
//! - Log file output via `--log.file` flag
//! - JSON output via `--log.format json`

use std::{fs::File, path::PathBuf, sync::Arc};

use clap::{Parser, ValueEnum};
use tracing::Level;
use tracing_subscriber::{fmt, fmt::writer::BoxMakeWriter, EnvFilter};

use crate::{Error, Result};

/// Crates whose events pass the verbosity filter.
const LOG_TARGETS: [&str; 3] = ["op_deployer", "op_deployer_cli", "op_script"];

/// Format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration arguments.
#[derive(Debug, Clone, Default, Parser)]
pub struct LogArgs {
    /// Set the verbosity (-v = error, -vv = warn, -vvv = info, -vvvv = debug, -vvvvv = trace).
    /// Defaults to info
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log level, overriding `-v`. Accepts a level name or 1-5
    #[arg(long = "log.verbosity", env = "DEPLOYER_LOG_VERBOSITY", global = true)]
    pub verbosity: Option<Level>,

    /// Log file path. If specified, logs are written to this file instead of stderr.
    #[arg(
        long = "log.file",
        visible_aliases = ["log-file"],
        env = "DEPLOYER_LOG_FILE",
        global = true
    )]
    pub log_file: Option<PathBuf>,

    /// Disable colorful console logging. Only applies when logging to stderr (no --log.file).
    #[arg(
        long = "log.no-color",
        visible_aliases = ["log-no-color"],
        env = "DEPLOYER_LOG_NO_COLOR",
        global = true
    )]
    pub log_no_color: bool,

    /// Format of log lines.
    #[arg(
        long = "log.format",
        value_enum,
        default_value_t,
        env = "DEPLOYER_LOG_FORMAT",
        global = true
    )]
    pub log_format: LogFormat,
}

impl LogArgs {
    /// The level selected by the flags: `--log.verbosity`, then `-v`, then INFO.
    pub fn level(&self) -> Level {
        if let Some(level) = self.verbosity {
            return level;
        }
        match self.verbose {
            0 | 3 => Level::INFO,
            1 => Level::ERROR,
            2 => Level::WARN,
            4 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Installs the global tracing subscriber.
    ///
    /// `RUST_LOG` wins over the flags when set. Log targets are only shown at DEBUG and above.
    pub fn init(&self) -> Result<()> {
        let level = self.level();
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(LOG_TARGETS.map(|target| format!("{target}={level}")).join(","))
        };

        let (writer, ansi) = match &self.log_file {
            Some(path) => (BoxMakeWriter::new(Arc::new(File::create(path)?)), false),
            None => (BoxMakeWriter::new(std::io::stderr), !self.log_no_color),
        };
        let builder = fmt()
            .with_env_filter(filter)
            .with_target(level >= Level::DEBUG)
            .with_writer(writer)
            .with_ansi(ansi);
        let installed = match self.log_format {
            LogFormat::Text => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        installed.map_err(|err| Error::Logging(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::default(0, None, Level::INFO)]
    #[case::error(1, None, Level::ERROR)]
    #[case::warn(2, None, Level::WARN)]
    #[case::debug(4, None, Level::DEBUG)]
    #[case::trace(7, None, Level::TRACE)]
    #[case::explicit_wins(1, Some(Level::DEBUG), Level::DEBUG)]
    fn test_level(#[case] verbose: u8, #[case] verbosity: Option<Level>, #[case] expected: Level) {
        let args = LogArgs { verbose, verbosity, ..Default::default() };
        assert_eq!(args.level(), expected);
    }

    #[test]
    fn test_parse_log_flags() {
        let args = LogArgs::try_parse_from([
            "log",
            "--log.verbosity",
            "warn",
            "--log.format",
            "json",
            "--log.no-color",
        ])
        .unwrap();
        assert_eq!(args.verbosity, Some(Level::WARN));
        assert_eq!(args.log_format, LogFormat::Json);
        assert!(args.log_no_color);
    }
}
