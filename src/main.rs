//! LED Matrix Display Server
//!
//! A Rust-based server that:
//! - Receives images over a length-prefixed TCP protocol and/or HTTP uploads
//! - Resamples them to the panel geometry and converts them to RGB
//! - Drives a HUB75 RGB LED matrix, or writes preview PNGs in debug mode
//! - Exposes the panel driver options for live tuning over HTTP

mod config;
mod display;
mod image_proc;
mod options;
mod transport;
mod web;

use anyhow::Context;
use clap::Parser;
use config::{Config, Transport};
use display::{DisplayController, PanelSettings};
use image_proc::ImageProcessor;
use options::OptionsRegistry;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "led-matrix-server")]
#[command(about = "Image display server for HUB75 RGB LED matrix panels")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Transport(s) to accept images on (overrides config)
    #[arg(long, value_enum)]
    transport: Option<Transport>,

    /// Binary frame protocol port (overrides config, default: 14366)
    #[arg(short, long)]
    port: Option<u16>,

    /// HTTP port (overrides config, default: 14366)
    #[arg(long = "http-port")]
    http_port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Show test pattern and exit
    #[arg(long)]
    test: bool,

    /// Clear display and exit
    #[arg(long)]
    clear: bool,

    /// Send an image file to a running server and exit
    #[arg(long, value_name = "FILE")]
    send: Option<PathBuf>,

    /// Server address used by --send
    #[arg(long = "send-to", default_value = "127.0.0.1:14366")]
    send_to: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose);

    tracing::info!("Starting LED Matrix Display Server");

    // Load configuration
    let mut config = Config::load_or_default(&args.config)
        .with_context(|| format!("loading config from {}", args.config))?;

    config.apply_env();
    if let Some(transport) = args.transport {
        config.transport = transport;
    }
    if let Some(port) = args.port {
        config.socket_port = port;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    config.validate().context("invalid configuration")?;

    let initial_options = config.display_options()?;
    let settings = PanelSettings::from_options(&initial_options)
        .context("invalid panel options")?;

    // Sender mode only needs the panel geometry
    if let Some(path) = &args.send {
        let (width, height) = settings.dimensions();
        transport::send_image(path, &args.send_to, width, height)
            .await
            .with_context(|| format!("sending {} to {}", path.display(), args.send_to))?;
        return Ok(());
    }

    // Initialize display driver, a panel that will not come up is fatal
    let driver = display::open_driver(&config, &settings).context("opening display")?;
    let display = DisplayController::new(driver);
    let (width, height) = display.dimensions().await?;
    tracing::info!(
        "Panel {}x{} ({} mode)",
        width,
        height,
        if config.debug { "preview" } else { "hardware" }
    );

    let registry = Arc::new(OptionsRegistry::new(initial_options));
    let processor = Arc::new(ImageProcessor::new(
        registry,
        display,
        config.decode_config(),
    ));

    // Handle one-shot commands
    if args.test {
        tracing::info!("Running test pattern...");
        processor.show_test_pattern().await?;
        tracing::info!("Test pattern complete");
        return Ok(());
    }

    if args.clear {
        tracing::info!("Clearing display...");
        processor.clear_display().await?;
        tracing::info!("Display cleared");
        return Ok(());
    }

    let bind: IpAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind_address {:?}", config.bind_address))?;

    // Setup shutdown signal handling
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut handles = Vec::new();

    if config.transport.uses_socket() {
        let server = transport::SocketServer::new(Arc::clone(&processor), config.max_frame_bytes);
        let addr = SocketAddr::new(bind, config.socket_port);
        let shutdown = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            if let Err(e) = server.run_with_shutdown(addr, shutdown).await {
                tracing::error!("Frame server error: {}", e);
            }
        }));
    }

    if config.transport.uses_http() {
        let upload_limit = usize::try_from(config.max_frame_bytes).unwrap_or(usize::MAX);
        let server = web::WebServer::new(Arc::clone(&processor), upload_limit);
        let addr = SocketAddr::new(bind, config.http_port);
        let shutdown = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            if let Err(e) = server.run_with_shutdown(addr, shutdown).await {
                tracing::error!("Web server error: {}", e);
            }
        }));
    }

    // Wait for shutdown signal
    wait_for_shutdown().await?;
    tracing::info!("Shutdown signal received");

    // Send shutdown to all tasks
    let _ = shutdown_tx.send(());

    // Wait for tasks to complete with timeout
    for handle in handles {
        tokio::select! {
            _ = handle => {},
            _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {
                tracing::warn!("Server shutdown timeout");
            }
        }
    }

    if !config.debug {
        if let Err(e) = processor.clear_display().await {
            tracing::warn!("Failed to blank panel on exit: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
///
/// Default level is "warn"; use --verbose for "debug" while troubleshooting.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("led_matrix_server={}", level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}
