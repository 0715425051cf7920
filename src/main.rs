mod config;
mod events;
mod logging;
mod retention;
mod runner;
mod scan;
mod signals;
mod status;
mod watcher;

use clap::Parser;
use config::SweepConfig;
use logging::{LogDir, Verbosity};
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_CONFIG: &str = "pixsweep.toml";

/// Watch a folder and delete image files older than a retention window.
#[derive(Parser, Debug)]
#[command(name = "pixsweep", version, about)]
pub struct Cli {
    /// Folder to monitor (overrides config)
    #[arg(value_name = "DIRECTORY")]
    directory: Option<PathBuf>,

    /// Retention window in days; 0 deletes every image older than now
    #[arg(short, long)]
    days: Option<u32>,

    /// Seconds between scans (overrides config)
    #[arg(long)]
    interval: Option<f64>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to wait for the watcher after a stop request
    #[arg(long)]
    join_timeout: Option<u64>,

    /// Directory for per-run log files (overrides config)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Don't write a per-run log file
    #[arg(long)]
    no_log_file: bool,

    /// Write watcher state as JSON to this file
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Run a single scan and exit
    #[arg(long)]
    once: bool,

    /// Print the resolved config and exit, don't watch
    #[arg(long)]
    print_config: bool,

    /// Extra logging (scan summaries, lifecycle details)
    #[arg(short, long)]
    verbose: bool,

    /// Only show deletions and problems
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Fold command-line overrides into the loaded config.
    fn apply_overrides(&self, config: &mut SweepConfig) {
        if let Some(dir) = &self.directory {
            config.watch.directory = Some(dir.clone());
        }
        if let Some(days) = self.days {
            config.watch.retention_days = days;
        }
        if let Some(interval) = self.interval {
            config.watch.scan_interval_secs = interval;
        }
        if let Some(timeout) = self.join_timeout {
            config.shutdown.join_timeout_secs = timeout;
        }
        if let Some(dir) = &self.log_dir {
            config.logging.directory = dir.clone();
        }
        if self.no_log_file {
            config.logging.file = false;
        }
        if let Some(path) = &self.status_file {
            config.status.file = Some(path.clone());
        }
    }

    fn load_config(&self) -> Result<SweepConfig, config::ConfigError> {
        let (path, required) = match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG), false),
        };
        let mut config = SweepConfig::load(&path, required)?;
        self.apply_overrides(&mut config);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    if cli.print_config {
        match toml::to_string_pretty(&config) {
            Ok(text) => print!("{text}"),
            Err(e) => {
                eprintln!("error: failed to render config: {e}");
                return ExitCode::from(2);
            }
        }
        return ExitCode::SUCCESS;
    }

    let verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);
    let log_dir = LogDir::new(&config.logging.directory);
    let mut log_path = None;
    let log_file = if config.logging.file {
        match log_dir.open_session_log(chrono::Local::now()) {
            Ok((path, file)) => {
                log_path = Some(path);
                Some(file)
            }
            Err(e) => {
                eprintln!(
                    "warning: could not create log file in {}: {e}",
                    log_dir.root().display()
                );
                None
            }
        }
    } else {
        None
    };
    logging::init_tracing(verbosity, log_file);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pixsweep starting");
    tracing::debug!(?cli, "parsed CLI arguments");
    if let Some(path) = &log_path {
        tracing::info!(log_file = %path.display(), "logging initialized");
        match log_dir.prune(config.logging.keep_sessions) {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "pruned old session logs"),
            Err(e) => tracing::warn!(error = %e, "failed to prune session logs"),
        }
    }

    let watch = match config.watch_config() {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(error = %e, "invalid watch settings");
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    if cli.once {
        return match runner::run_once(&config, &watch, cli.quiet) {
            Ok(report) => {
                if !cli.quiet {
                    println!(
                        "Scan complete: {} images checked, {} deleted, {} errors",
                        report.candidates, report.deleted, report.errors
                    );
                }
                ExitCode::SUCCESS
            }
            Err(_) => ExitCode::FAILURE,
        };
    }

    match runner::run(&config, watch, cli.quiet).await {
        Ok(outcome) => {
            tracing::info!(?outcome, "pixsweep exiting");
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            tracing::error!(error = %e, "watch run failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
