//! Echo session lifecycle
//!
//! One [`Session`] per accepted signaling connection: it drives the
//! negotiation [`NegotiationState`] machine and owns the per-track relays.

#[allow(clippy::module_inception)]
pub mod session;
pub mod state;

pub use session::{CloseReason, Session, SessionId, SessionReport, StepOutcome};
pub use state::NegotiationState;

use crate::config::RelayConfig;
use crate::peer::PeerConnection;
use crate::signaling::{SignalingChannel, WsFrame};
use crate::Result;
use futures::{Sink, Stream};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{info, instrument};

/// Run one echo session over an accepted WebSocket connection
///
/// Creates the peer connection, runs the session to completion (or until
/// `shutdown` completes) and returns its report.
pub async fn serve_connection<T, M, E, F>(
    ws: T,
    config: RelayConfig,
    shutdown: F,
) -> Result<SessionReport>
where
    T: Stream<Item = std::result::Result<M, E>> + Sink<M, Error = E> + Unpin + Send + 'static,
    M: WsFrame,
    E: Display + Send + 'static,
    F: Future<Output = ()> + Send,
{
    let (peer, remote_tracks) = PeerConnection::new(&config).await?;
    let (receiver, sender) = SignalingChannel::new(ws).split();
    let session = Session::start(Arc::new(peer), remote_tracks, receiver, sender, config).await?;
    Ok(session.run_until(shutdown).await)
}

/// Accept a WebSocket handshake on `stream` and serve it (see [`serve_connection`])
#[instrument(skip(stream, config, shutdown))]
pub async fn serve_tcp<F>(stream: TcpStream, config: RelayConfig, shutdown: F) -> Result<SessionReport>
where
    F: Future<Output = ()> + Send,
{
    let peer_addr = stream.peer_addr()?;
    info!("New signaling connection from {}", peer_addr);

    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| crate::Error::Transport(format!("WebSocket handshake failed: {}", e)))?;

    serve_connection(ws, config, shutdown).await
}
