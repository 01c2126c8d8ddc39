//! procmux - run monitoring plugins concurrently

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};
use procmux::exec::task::parse_command;
use procmux::logging::{self, LogConfig};
use procmux::output::{self, RunRecord};
use procmux::{Executor, ExecutorConfig, ProcessTask};
use std::time::Duration;

use cli::Cli;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!(
                "{}: {}",
                "error"
                    .if_supports_color(Stderr, |text| text.red())
                    .if_supports_color(Stderr, |text| text.bold()),
                e
            );
            for cause in e.chain().skip(1) {
                eprintln!(
                    "  {}: {}",
                    "caused by".if_supports_color(Stderr, |text| text.yellow()),
                    cause
                );
            }
            std::process::exit(1);
        }
    }
}

fn init_logging(cli: &Cli) {
    let mut config = LogConfig::default()
        .with_format(cli.log_format)
        .with_thread_names(cli.verbose >= 2);
    if let Some(filter) = cli.log_filter() {
        config = config.with_filter(filter);
    }
    logging::init(config.with_env_overrides());
}

/// Run every command line and print the records.
///
/// Returns the highest exit code seen, which becomes the process status.
fn run(cli: &Cli) -> Result<i32> {
    let config = ExecutorConfig::default()
        .with_max_tasks(cli.max_tasks)
        .with_readiness(cli.readiness.into())
        .with_read_chunk_size(cli.chunk_size)
        .with_poll_timeout(Duration::from_millis(cli.poll_timeout_ms));
    let (executor, completions) =
        Executor::with_channel_sink(config).context("Failed to create executor")?;

    let extra_environment = cli.extra_environment();
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut records: Vec<Option<RunRecord>> = vec![None; cli.commands.len()];
    let mut pending = 0usize;

    for (index, command) in cli.commands.iter().enumerate() {
        let task = match extra_environment {
            Some(ref extra) => ProcessTask::with_environment(parse_command(command), extra),
            None => ProcessTask::shell(command),
        };
        let task = match task {
            Ok(task) => task,
            Err(e) => {
                records[index] = Some(RunRecord::failed(command.as_str(), e.to_string()));
                continue;
            }
        };

        let tx = tx.clone();
        let label = command.clone();
        executor
            .submit(task, move |completion| {
                let _ = tx.send((index, RunRecord::from_completion(label, &completion)));
            })
            .with_context(|| format!("Failed to submit '{}'", command))?;
        pending += 1;
    }

    // Completion callbacks run here, on the main thread.
    while pending > 0 {
        completions.run_next(Duration::from_millis(250));
        for (index, record) in rx.try_iter() {
            records[index] = Some(record);
            pending -= 1;
        }
    }
    executor.shutdown();

    let records: Vec<RunRecord> = records.into_iter().flatten().collect();
    output::print_records(&records, cli.format.into()).context("Failed to write results")?;

    Ok(records
        .iter()
        .map(|record| i32::from(record.exit_code))
        .max()
        .unwrap_or(0))
}
