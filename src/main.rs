use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use log_watcher::cli::Cli;
use log_watcher::{ConsoleSink, Error, JsonLinesSink, StatsSnapshot, Watcher};

/// Exit code when the watcher could not start.
const EXIT_STARTUP: u8 = 1;
/// Exit code when the file stayed unreadable after every reopen attempt.
const EXIT_RETRIES_EXHAUSTED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    log_watcher::logging::init_cli();

    let watcher = match build_watcher(&cli) {
        Ok(watcher) => Arc::new(watcher),
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    tokio::spawn(forward_signals(watcher.clone()));

    let result = watcher.start().await;
    if cli.stats {
        if let Some(snapshot) = watcher.stats() {
            print_stats(&snapshot);
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ Error::RetriesExhausted { .. }) => {
            error!(error = %e, "file could not be recovered");
            ExitCode::from(EXIT_RETRIES_EXHAUSTED)
        }
        Err(e) => {
            error!(error = %e, "failed to start watching");
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

fn build_watcher(cli: &Cli) -> anyhow::Result<Watcher> {
    cli.validate_target()?;
    let config = cli.watcher_config().context("invalid configuration")?;

    let use_colors = config.use_colors();
    let watcher = Watcher::new(&cli.filename, config);
    watcher.add_sink(Arc::new(ConsoleSink::new(use_colors)));

    if cli.json_output {
        let sink = JsonLinesSink::create(&cli.output_file).with_context(|| {
            format!("failed to open output file {}", cli.output_file.display())
        })?;
        info!(path = %cli.output_file.display(), "writing JSON events");
        watcher.add_sink(Arc::new(sink));
    }

    Ok(watcher)
}

/// Stops the watcher on every Ctrl-C, or SIGTERM on unix, until the
/// process exits.
async fn forward_signals(watcher: Arc<Watcher>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => Some(terminate),
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                None
            }
        };

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "cannot listen for Ctrl-C");
                        return;
                    }
                    info!("interrupted");
                }
                Some(()) = async {
                    match terminate.as_mut() {
                        Some(terminate) => terminate.recv().await,
                        None => std::future::pending().await,
                    }
                } => info!("terminated"),
            }
            watcher.stop();
        }
    }

    #[cfg(not(unix))]
    {
        while tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted");
            watcher.stop();
        }
    }
}

fn print_stats(snapshot: &StatsSnapshot) {
    let entries = &snapshot.log_entries;
    println!();
    println!("=== Log Watcher Statistics ===");
    println!("Duration: {:.1}s", snapshot.timing.duration_seconds);
    println!("Lines reported: {}", entries.total_lines);
    for (severity, count) in entries.by_severity.iter().rev() {
        println!("  {:<5} {}", severity, count);
    }
    println!("Lifecycle events: {}", snapshot.events.total_events);
    for (event_type, count) in &snapshot.events.by_type {
        println!("  {} {}", event_type, count);
    }
    if snapshot.errors.dropped_lines > 0 || snapshot.errors.sink_failures > 0 {
        println!(
            "Dropped lines: {}, sink failures: {}",
            snapshot.errors.dropped_lines, snapshot.errors.sink_failures
        );
    }
}
