//! Screen session recorder
//!
//! Records a screen-share session together with a log of the user's page
//! interactions, then exports the video and a plain-text interaction
//! report. Driven by a browser shim over a JSON-lines bridge on
//! stdin/stdout.

mod bridge;
mod capture;
mod config;
mod controller;
mod data;
mod error;
mod export;
mod host;
mod input;
mod logging;
mod session;
#[cfg(test)]
mod testing;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{error, info, warn};

use bridge::{outbound_channel, spawn_status_forwarder, write_outbound, Bridge, BridgeHost, BridgeSurface};
use capture::ReplayDevice;
use config::Config;
use controller::{create_controller_channels, Services, SessionController, SessionHandle};
use export::FsDownloadSink;

/// How long to wait for the last bridge messages after shutdown
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default, PartialEq)]
struct Args {
    help: bool,
    replay: Option<PathBuf>,
    output: Option<PathBuf>,
}

fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "--replay" => {
                let path = args.next().context("--replay requires a file path")?;
                parsed.replay = Some(PathBuf::from(path));
            }
            "--output" => {
                let path = args.next().context("--output requires a directory")?;
                parsed.output = Some(PathBuf::from(path));
            }
            other => bail!("Unknown argument: {}", other),
        }
    }

    Ok(parsed)
}

fn main() -> Result<()> {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!();
            print_help();
            std::process::exit(2);
        }
    };

    if args.help {
        print_help();
        return Ok(());
    }

    let _log_guard = logging::init_logging()?;
    info!("Screen session recorder starting...");
    if let Ok(dir) = logging::get_log_dir() {
        info!("Logging to {:?}", dir);
    }

    // Load configuration
    let mut config = Config::load()?;
    info!("Configuration loaded from {:?}", config.config_path());

    if let Some(replay) = args.replay {
        config.capture.replay_source = Some(replay);
    }
    if let Some(output) = args.output {
        config.output.download_directory = Some(output);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let result = runtime.block_on(run(config));
    if let Err(e) = &result {
        error!("Recorder error: {:#}", e);
    }

    info!("Shutdown complete");
    result
}

async fn run(config: Config) -> Result<()> {
    let download_dir = config.download_directory();
    info!("Downloads go to {:?}", download_dir);
    match &config.capture.replay_source {
        Some(path) => info!("Capture device replays {:?}", path),
        None => warn!("No replay source configured, capture requests will report no source"),
    }

    let (out_tx, out_rx) = outbound_channel();
    let writer = tokio::spawn(write_outbound(out_rx, tokio::io::stdout()));

    let host = Arc::new(BridgeHost::new(out_tx.clone()));
    let services = Services {
        host: host.clone(),
        device: Arc::new(ReplayDevice::new(config.capture.replay_source.clone())),
        surface: Arc::new(BridgeSurface::new(out_tx.clone())),
        sink: Arc::new(FsDownloadSink::new(download_dir)),
    };

    // Create controller channels
    let (cmd_tx, cmd_rx, status_tx, status_rx) = create_controller_channels();
    let forwarder = spawn_status_forwarder(status_rx, out_tx.clone());
    let handle = SessionHandle::new(cmd_tx);

    let mut controller = SessionController::new(&config, services, cmd_rx, status_tx);
    let controller_handle = tokio::spawn(async move { controller.run().await });

    let bridge = Bridge::new(handle.clone(), host, out_tx);
    let stdin = BufReader::new(tokio::io::stdin());

    tokio::select! {
        result = bridge.run(stdin) => {
            if let Err(e) = result {
                error!("Bridge error: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down...");
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!("Failed to request shutdown: {}", e);
    }
    drop(handle);
    drop(bridge);

    match controller_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Session controller error: {:#}", e),
        Err(e) => error!("Session controller task failed: {}", e),
    }

    // The writer finishes once the forwarder and the page surface let go
    // of their senders
    if tokio::time::timeout(FLUSH_TIMEOUT, forwarder).await.is_err() {
        warn!("Status forwarder did not finish in time");
    }
    match tokio::time::timeout(FLUSH_TIMEOUT, writer).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => warn!("Bridge writer task failed: {}", e),
        Err(_) => warn!("Timed out flushing bridge output"),
    }

    Ok(())
}

fn print_help() {
    println!("screen-session-recorder - Screen recording with interaction tracking");
    println!();
    println!("USAGE:");
    println!("    screen-session-recorder [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help           Print this help message");
    println!("    --replay <FILE>      Media file the capture device streams");
    println!("    --output <DIR>       Directory recordings are downloaded to");
    println!();
    println!("Requests are read from stdin and replies written to stdout,");
    println!("one JSON object per line.");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                  Set log level (e.g., debug, info, warn)");
    println!("    SCREEN_SESSION_LOG_PATH   Override the log directory");
}
