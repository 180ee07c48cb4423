use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camera_bridge::{
    config::Config,
    services::{
        AuthStore, BridgeApiClient, DisabledReporter, IdleReaper, SessionRegistry,
        StatusReporter, StreamSupervisor,
    },
    web::{AppState, WebServer},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "camera-bridge")]
#[command(version)]
#[command(about = "Supervises per-camera transcoders and serves their HLS output")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (falls back to $CONFIG_FILE, then config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Directory for HLS output (overrides config file)
    #[arg(long, value_name = "DIR")]
    output_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    info!("Starting camera-bridge v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match cli.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            Config::load_from_file(path)?
        }
        None => Config::load()?,
    };

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(output_root) = cli.output_root {
        config.transcoder.output_root = output_root;
    }

    let reporter: Arc<dyn StatusReporter> = match config.bridge.api_url.as_deref() {
        Some(url) => {
            info!("Reporting to bridge API at {}", url);
            Arc::new(BridgeApiClient::new(url, &config.bridge)?)
        }
        None => {
            info!("No bridge API configured, collaborator calls are disabled");
            Arc::new(DisabledReporter)
        }
    };

    let supervisor = Arc::new(StreamSupervisor::new(
        config.transcoder.clone(),
        config.supervisor.clone(),
        Arc::new(SessionRegistry::new()),
        reporter,
    ));
    let transcoder_version = supervisor.check_transcoder().await;
    if supervisor.transcoder_available() {
        info!(
            "Transcoder '{}' available, version {}",
            config.transcoder.ffmpeg_command,
            transcoder_version.as_deref().unwrap_or("unknown")
        );
    } else {
        warn!(
            "Transcoder '{}' is not available; start requests will fail until it is installed",
            config.transcoder.ffmpeg_command
        );
    }
    info!("HLS output root: {}", config.transcoder.output_root.display());

    let auth = Arc::new(AuthStore::new(&config.auth));
    info!(pair_code = %auth.pairing_code().code, "Pairing code ready");

    let shutdown = CancellationToken::new();
    let state = AppState::new(supervisor.clone(), auth.clone())
        .with_transcoder_version(transcoder_version)
        .with_shutdown(shutdown.clone());
    let web_server = WebServer::new(&config.web, state)?;

    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );

    let (server_ready_tx, server_ready_rx) = tokio::sync::oneshot::channel();
    let server_token = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = web_server
            .serve_with_cancellation(server_ready_tx, server_token)
            .await
        {
            error!("Web server failed: {}", e);
        }
    });

    match server_ready_rx.await {
        Ok(Ok(())) => info!("Web server is now listening, starting idle reaper"),
        Ok(Err(bind_error)) => {
            error!("Failed to bind web server: {}", bind_error);
            return Err(bind_error);
        }
        Err(_) => {
            error!("Web server task completed without signaling");
            return Err(anyhow::anyhow!("Web server failed to start"));
        }
    }

    let reaper = IdleReaper::new(
        supervisor.clone(),
        auth,
        config.supervisor.idle_timeout,
        config.supervisor.reaper_interval,
    );
    let reaper_handle = tokio::spawn(reaper.run(shutdown.clone()));

    wait_for_shutdown_signal().await;
    shutdown.cancel();

    if let Err(e) = server_handle.await {
        error!("Web server task panicked: {}", e);
    }
    if let Err(e) = reaper_handle.await {
        error!("Idle reaper task panicked: {}", e);
    }
    supervisor.shutdown().await;

    info!("camera-bridge stopped");
    Ok(())
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("camera_bridge={level},tower_http={level}").into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                    _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install unix signal handlers ({}), falling back to Ctrl+C", e);
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        // Nothing left to wait on; run until the process is killed
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down gracefully");
}
