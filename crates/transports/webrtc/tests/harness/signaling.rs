//! In-memory WebSocket signaling for session tests

use super::{HarnessError, HarnessResult};
use futures::{SinkExt, StreamExt};
use rtc_echo_webrtc::SignalingMessage;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Server half of an in-memory WebSocket connection
pub type ServerSocket = WebSocketStream<DuplexStream>;

/// Connected (server, browser-side client) pair over an in-memory pipe
pub async fn ws_pair() -> (ServerSocket, TestClient) {
    let (server_io, client_io) = tokio::io::duplex(256 * 1024);
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    (server, TestClient { ws: client })
}

/// Browser side of the signaling connection
pub struct TestClient {
    ws: WebSocketStream<DuplexStream>,
}

impl TestClient {
    /// Send a message the way the capture page does
    pub async fn send(&mut self, message: &SignalingMessage) -> HarnessResult<()> {
        let json = message
            .to_json()
            .map_err(|e| HarnessError::ClientError(e.to_string()))?;
        self.send_raw(&json).await
    }

    /// Send an arbitrary text frame
    pub async fn send_raw(&mut self, text: &str) -> HarnessResult<()> {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| HarnessError::ConnectionError(e.to_string()))
    }

    /// Wait for the next signaling message from the server
    pub async fn expect_message(&mut self, timeout: Duration) -> HarnessResult<SignalingMessage> {
        loop {
            let frame = tokio::time::timeout(timeout, self.ws.next())
                .await
                .map_err(|_| HarnessError::Timeout("no signaling message".to_string()))?;

            match frame {
                Some(Ok(Message::Text(text))) => {
                    return SignalingMessage::decode(text.as_bytes())
                        .map_err(|e| HarnessError::ValidationError(e.to_string()));
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(HarnessError::ConnectionError(
                        "server closed the connection".to_string(),
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(HarnessError::ConnectionError(e.to_string())),
            }
        }
    }

    /// Assert the server sends nothing for `window`
    pub async fn expect_silence(&mut self, window: Duration) -> HarnessResult<()> {
        match tokio::time::timeout(window, self.ws.next()).await {
            Err(_) => Ok(()),
            Ok(Some(Ok(Message::Text(text)))) => Err(HarnessError::ValidationError(format!(
                "unexpected message: {}",
                text
            ))),
            Ok(other) => Err(HarnessError::ConnectionError(format!(
                "connection changed while expecting silence: {:?}",
                other
            ))),
        }
    }

    /// Wait until the server closes the connection, failing on any text frame
    pub async fn expect_closed(&mut self, timeout: Duration) -> HarnessResult<()> {
        loop {
            let frame = tokio::time::timeout(timeout, self.ws.next())
                .await
                .map_err(|_| HarnessError::Timeout("connection still open".to_string()))?;

            match frame {
                Some(Ok(Message::Text(text))) => {
                    return Err(HarnessError::ValidationError(format!(
                        "unexpected message before close: {}",
                        text
                    )));
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return Ok(()),
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Close the browser side, ending the server's message stream
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
