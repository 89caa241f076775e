//! Framed signaling channel over a persistent WebSocket connection
//!
//! The channel is split once at accept time: the receiving half moves into the
//! receiver task (see [`pump`]), the sending half is owned by the session.

use super::frame::{FrameKind, WsFrame};
use crate::channels::QueueProducer;
use crate::signaling::SignalingMessage;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::marker::PhantomData;
use tracing::{debug, error, info, warn};

/// Source of decoded signaling messages
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Wait for the next message
    ///
    /// Fails with `ConnectionClosed`, `Transport`, `Decode` or
    /// `UnknownMessageType`.
    async fn receive(&mut self) -> Result<SignalingMessage>;
}

/// Destination for outbound signaling messages
#[async_trait]
pub trait MessageSink: Send + 'static {
    /// Send one message as one frame; fails with `Send`
    async fn send(&mut self, message: &SignalingMessage) -> Result<()>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;
}

/// Bidirectional signaling channel over any WebSocket-like transport
pub struct SignalingChannel<T> {
    inner: T,
}

impl<T, M, E> SignalingChannel<T>
where
    T: Stream<Item = std::result::Result<M, E>> + Sink<M, Error = E> + Unpin + Send + 'static,
    M: WsFrame,
    E: Display + Send + 'static,
{
    /// Wrap an accepted WebSocket connection
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Receive the next message (see [`MessageSource::receive`])
    pub async fn receive(&mut self) -> Result<SignalingMessage> {
        read_message(&mut self.inner).await
    }

    /// Send one message
    pub async fn send(&mut self, message: &SignalingMessage) -> Result<()> {
        write_message::<_, M, E>(&mut self.inner, message).await
    }

    /// Split into independently owned receiving and sending halves
    pub fn split(self) -> (SignalingReceiver<SplitStream<T>>, SignalingSender<SplitSink<T, M>, M>) {
        let (sink, stream) = self.inner.split();
        (
            SignalingReceiver { stream },
            SignalingSender {
                sink,
                _frame: PhantomData,
            },
        )
    }
}

/// Receiving half of a [`SignalingChannel`]
pub struct SignalingReceiver<S> {
    stream: S,
}

#[async_trait]
impl<S, M, E> MessageSource for SignalingReceiver<S>
where
    S: Stream<Item = std::result::Result<M, E>> + Unpin + Send + 'static,
    M: WsFrame,
    E: Display + Send + 'static,
{
    async fn receive(&mut self) -> Result<SignalingMessage> {
        read_message(&mut self.stream).await
    }
}

/// Sending half of a [`SignalingChannel`]
pub struct SignalingSender<K, M> {
    sink: K,
    _frame: PhantomData<fn(M)>,
}

#[async_trait]
impl<K, M, E> MessageSink for SignalingSender<K, M>
where
    K: Sink<M, Error = E> + Unpin + Send + 'static,
    M: WsFrame,
    E: Display + Send + 'static,
{
    async fn send(&mut self, message: &SignalingMessage) -> Result<()> {
        write_message::<_, M, E>(&mut self.sink, message).await
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| Error::Send(format!("Failed to close signaling connection: {}", e)))
    }
}

async fn read_message<S, M, E>(stream: &mut S) -> Result<SignalingMessage>
where
    S: Stream<Item = std::result::Result<M, E>> + Unpin,
    M: WsFrame,
    E: Display,
{
    loop {
        let frame = match stream.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(Error::Transport(e.to_string())),
            None => return Err(Error::ConnectionClosed),
        };

        match frame.classify() {
            FrameKind::Data(bytes) => return SignalingMessage::decode(&bytes),
            FrameKind::Close => return Err(Error::ConnectionClosed),
            FrameKind::Control => continue,
        }
    }
}

async fn write_message<K, M, E>(sink: &mut K, message: &SignalingMessage) -> Result<()>
where
    K: Sink<M, Error = E> + Unpin,
    M: WsFrame,
    E: Display,
{
    let json = message.to_json()?;
    sink.send(M::text(json))
        .await
        .map_err(|e| Error::Send(format!("Failed to send {} message: {}", message.kind, e)))
}

/// Receiver task body: decode frames and push them onto the message queue
///
/// Runs until the connection closes or a frame fails to decode. Unknown
/// message types are logged and skipped. Returning drops `producer`, which the
/// consumer observes as end of stream; the link is never reconnected.
pub async fn pump<R: MessageSource>(mut source: R, producer: QueueProducer) -> Result<()> {
    loop {
        match source.receive().await {
            Ok(message) => {
                debug!(kind = %message.kind, bytes = message.payload.len(), "Signaling message received");
                if !producer.push(message).await {
                    debug!("Message queue consumer gone, stopping signaling receiver");
                    return Ok(());
                }
            }
            Err(Error::UnknownMessageType(kind)) => {
                warn!("Ignoring signaling message with unknown type '{}'", kind);
            }
            Err(Error::ConnectionClosed) => {
                info!("Signaling connection closed by peer");
                return Err(Error::ConnectionClosed);
            }
            Err(e) => {
                error!("Signaling receiver stopping: {}", e);
                return Err(e);
            }
        }
    }
}
