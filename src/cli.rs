//! Command-line interface definitions using clap.

use clap::{Parser, ValueEnum};
use procmux::ReadinessMode;
use procmux::config::{DEFAULT_POLL_TIMEOUT, DEFAULT_READ_CHUNK_SIZE, MAX_TASKS_PER_THREAD};
use procmux::logging::LogFormat;
use procmux::output::OutputFormat;
use std::collections::BTreeMap;

/// Run monitoring plugin command lines concurrently and report their results.
#[derive(Parser, Debug)]
#[command(name = "procmux")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Command lines to run, each through `sh -c`.
    #[arg(required = true, value_name = "COMMAND")]
    pub commands: Vec<String>,

    /// Maximum number of plugins running at once.
    #[arg(short = 'j', long, env = "PROCMUX_MAX_TASKS", default_value_t = MAX_TASKS_PER_THREAD)]
    pub max_tasks: usize,

    /// Readiness strategy for the worker loop.
    #[arg(long, env = "PROCMUX_READINESS", value_enum, default_value_t = ReadinessArg::Poll)]
    pub readiness: ReadinessArg,

    /// Bytes read from a plugin per step.
    #[arg(long, default_value_t = DEFAULT_READ_CHUNK_SIZE, hide = true)]
    pub chunk_size: usize,

    /// Upper bound on one readiness wait, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_POLL_TIMEOUT.as_millis() as u64, hide = true)]
    pub poll_timeout_ms: u64,

    /// Extra environment variable for every command (KEY=VALUE, repeatable).
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormatArg::Plain)]
    pub format: OutputFormatArg,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all logging except errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format.
    #[arg(long, env = "PROCMUX_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Extra environment as a map; later duplicates win.
    pub fn extra_environment(&self) -> Option<BTreeMap<String, String>> {
        if self.env.is_empty() {
            return None;
        }
        Some(self.env.iter().cloned().collect())
    }

    /// Log filter implied by `-v`/`-q`, if any.
    pub fn log_filter(&self) -> Option<String> {
        if self.quiet {
            return Some("error".to_string());
        }
        match self.verbose {
            0 => None,
            1 => Some("procmux=info".to_string()),
            2 => Some("procmux=debug".to_string()),
            _ => Some("procmux=trace".to_string()),
        }
    }
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Readiness strategy argument.
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ReadinessArg {
    /// poll(2) on every pipe.
    #[default]
    Poll,
    /// Fixed sleep between sweeps.
    Sleep,
}

impl From<ReadinessArg> for ReadinessMode {
    fn from(arg: ReadinessArg) -> Self {
        match arg {
            ReadinessArg::Poll => ReadinessMode::Poll,
            ReadinessArg::Sleep => ReadinessMode::Sleep,
        }
    }
}

/// Output format argument.
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormatArg {
    /// Tab-separated text.
    #[default]
    Plain,
    /// JSON array.
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Plain => OutputFormat::Plain,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}
