//! Echo relay server binary entry point
//!
//! Serves the capture page on `/` and runs one echo session per WebSocket
//! connection on `/ws`.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default 0.0.0.0:8080
//! cargo run -p rtc-echo-server
//!
//! # Custom bind address and STUN servers
//! cargo run -p rtc-echo-server -- \
//!   --bind 127.0.0.1:9000 \
//!   --stun-servers stun:stun.l.google.com:19302,stun:stun1.l.google.com:19302
//!
//! # Start from a JSON relay configuration, then override fields
//! RTC_ECHO_PLI_INTERVAL_MS=1000 cargo run -p rtc-echo-server -- --config relay.json
//! ```

use anyhow::{Context, Result};
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use rtc_echo_webrtc::{serve_connection, RelayConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const INDEX_HTML: &str = include_str!("index.html");

/// Time open sessions get to tear down after the listener stops
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// rtc-echo server
///
/// Echoes a browser's camera and microphone back to it over WebRTC.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "RTC_ECHO_BIND")]
    bind: SocketAddr,

    /// JSON file with a relay configuration to start from
    #[arg(long, env = "RTC_ECHO_CONFIG")]
    config: Option<PathBuf>,

    /// STUN servers (comma-separated)
    #[arg(long, value_delimiter = ',', env = "RTC_ECHO_STUN_SERVERS")]
    stun_servers: Option<Vec<String>>,

    /// Payload type of the VP8 video track
    #[arg(long, env = "RTC_ECHO_VIDEO_PAYLOAD_TYPE")]
    video_payload_type: Option<u8>,

    /// Payload type of the Opus audio track
    #[arg(long, env = "RTC_ECHO_AUDIO_PAYLOAD_TYPE")]
    audio_payload_type: Option<u8>,

    /// Picture-loss indication interval in milliseconds
    #[arg(long, env = "RTC_ECHO_PLI_INTERVAL_MS")]
    pli_interval_ms: Option<u64>,

    /// Upper bound on ICE gathering before answering, in milliseconds
    #[arg(long, env = "RTC_ECHO_ICE_GATHER_TIMEOUT_MS")]
    ice_gather_timeout_ms: Option<u64>,
}

impl Args {
    /// Build the relay configuration: file (or defaults), then CLI/env overrides
    fn relay_config(&self) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("Invalid relay configuration in {}", path.display()))?
            }
            None => RelayConfig::default(),
        };

        if let Some(stun_servers) = &self.stun_servers {
            config.stun_servers = stun_servers.clone();
        }
        if let Some(pt) = self.video_payload_type {
            config.video_payload_type = pt;
        }
        if let Some(pt) = self.audio_payload_type {
            config.audio_payload_type = pt;
        }
        if let Some(ms) = self.pli_interval_ms {
            config.pli_interval_ms = ms;
        }
        if let Some(ms) = self.ice_gather_timeout_ms {
            config.ice_gather_timeout_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Shared state of the HTTP handlers
#[derive(Clone)]
struct AppState {
    config: Arc<RelayConfig>,

    /// Fired once when the server shuts down
    shutdown: broadcast::Sender<()>,

    /// Held by every running session; the receiver sees `None` once all are gone
    active: mpsc::Sender<()>,
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _active = state.active.clone();
    let mut shutdown_rx = state.shutdown.subscribe();
    let config = (*state.config).clone();

    let shutdown = async move {
        let _ = shutdown_rx.recv().await;
    };

    match serve_connection(socket, config, shutdown).await {
        Ok(report) => info!(
            session_id = %report.session_id,
            final_state = %report.final_state,
            answers_sent = report.answers_sent,
            relays = report.relays.len(),
            "Session ended: {:?}",
            report.close_reason
        ),
        Err(e) => error!("Session failed to start: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %args.bind,
        "rtc-echo server starting"
    );

    let config = args.relay_config()?;
    info!(
        stun_servers = ?config.stun_servers,
        video_payload_type = config.video_payload_type,
        audio_payload_type = config.audio_payload_type,
        pli_interval_ms = config.pli_interval_ms,
        "Relay configuration"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (active_tx, mut active_rx) = mpsc::channel::<()>(1);

    let state = AppState {
        config: Arc::new(config),
        shutdown: shutdown_tx.clone(),
        active: active_tx,
    };
    let router = build_router(state);

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!("Listening on http://{}", listener.local_addr()?);

    let shutdown_tx_clone = shutdown_tx.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received, initiating graceful shutdown...");
            let _ = shutdown_tx_clone.send(());
        })
        .await?;

    // Close sessions still running on upgraded connections
    let _ = shutdown_tx.send(());
    if tokio::time::timeout(SESSION_DRAIN_TIMEOUT, active_rx.recv())
        .await
        .is_err()
    {
        warn!("Sessions still open after {:?}, exiting", SESSION_DRAIN_TIMEOUT);
    }

    info!("rtc-echo server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,webrtc=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
