//! channel-dl: archive channel attachments into a local directory.
//!
//! Reads the TOML configuration, signs in, and downloads every matching
//! attachment of every matching channel. Exit codes: 0 on completion (even
//! when some attachments were given up), 1 on configuration errors, 2 on
//! sign-in or unrecoverable session failures, 130 when interrupted.

#![warn(clippy::all)]

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use channel_dl::config::DEFAULT_CONFIG_PATH;
use channel_dl::{
    ChannelDownloader, Config, DirectoryProvider, Error, RunSummary, ToExitCode, run_with_shutdown,
};

/// Archive file attachments from messaging channels
#[derive(Parser, Debug)]
#[command(name = "channel-dl", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Mirror directory served as the remote (one sub-directory per channel)
    #[arg(short, long)]
    source: PathBuf,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn init_logging(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = log_file
        .and_then(|path| {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => Some(file),
                Err(e) => {
                    eprintln!("warning: cannot open log file {}: {}", path.display(), e);
                    None
                }
            }
        })
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn exit_with(error: &Error) -> ExitCode {
    tracing::error!(error = %error, "channel-dl failed");
    ExitCode::from(u8::try_from(error.exit_code()).unwrap_or(1))
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<(), Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    for channel in &summary.channels {
        println!(
            "{}: {} downloaded, {} skipped, {} failed, {} cancelled, {} filtered out",
            channel.channel,
            channel.succeeded,
            channel.skipped,
            channel.gave_up,
            channel.cancelled,
            channel.filtered_out
        );
        for failure in &channel.failures {
            println!("  failed: {}", failure);
        }
    }
    println!(
        "total: {} downloaded, {} skipped, {} failed in {}s",
        summary.succeeded(),
        summary.skipped(),
        summary.gave_up(),
        (summary.finished_at - summary.started_at).num_seconds()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging(None);
            return exit_with(&e);
        }
    };
    init_logging(Some(&config.session.log_file));
    tracing::info!(
        config = %args.config.display(),
        source = %args.source.display(),
        download_directory = %config.download_dir().display(),
        concurrency = config.concurrency_limit(),
        "Starting"
    );

    let provider = Arc::new(DirectoryProvider::new(&args.source));
    let downloader = match ChannelDownloader::new(config, provider).await {
        Ok(downloader) => downloader,
        Err(e) => return exit_with(&e),
    };

    let summary = match run_with_shutdown(&downloader).await {
        Ok(summary) => summary,
        Err(e) => return exit_with(&e),
    };
    if let Err(e) = print_summary(&summary, args.json) {
        return exit_with(&e);
    }

    if downloader.cancellation_token().is_cancelled() {
        ExitCode::from(130)
    } else {
        ExitCode::SUCCESS
    }
}
