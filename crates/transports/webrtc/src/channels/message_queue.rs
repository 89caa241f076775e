//! Signaling message queue
//!
//! Decouples the blocking signaling receiver from the negotiation loop. The
//! receiver task holds the only [`QueueProducer`]; dropping it is how end of
//! stream reaches the consumer, as [`QueueEvent::Closed`] rather than a message.

use crate::signaling::SignalingMessage;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// What the consumer observes on each receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// Next message in receipt order
    Message(SignalingMessage),
    /// Nothing buffered right now, producer still alive (only from `try_recv`)
    Drained,
    /// Producer gone and every buffered message consumed
    Closed,
}

/// Bounded single-producer / single-consumer FIFO of signaling messages
pub struct MessageQueue;

impl MessageQueue {
    /// Create a queue holding at most `capacity` undelivered messages
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; `RelayConfig::validate` rejects that.
    pub fn bounded(capacity: usize) -> (QueueProducer, QueueConsumer) {
        let (tx, rx) = mpsc::channel(capacity);
        (QueueProducer { tx }, QueueConsumer { rx })
    }
}

/// Sending half, owned by the signaling receiver task
#[derive(Debug)]
pub struct QueueProducer {
    tx: mpsc::Sender<SignalingMessage>,
}

impl QueueProducer {
    /// Push a message, waiting for space when the queue is full
    ///
    /// Returns `false` if the consumer has gone away.
    pub async fn push(&self, message: SignalingMessage) -> bool {
        self.tx.send(message).await.is_ok()
    }

    /// Check whether the consumer is still listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, owned by the negotiation loop
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<SignalingMessage>,
}

impl QueueConsumer {
    /// Wait for the next message or for the producer to close
    pub async fn recv(&mut self) -> QueueEvent {
        match self.rx.recv().await {
            Some(message) => QueueEvent::Message(message),
            None => QueueEvent::Closed,
        }
    }

    /// Non-blocking receive that tells a drained queue apart from a closed one
    pub fn try_recv(&mut self) -> QueueEvent {
        match self.rx.try_recv() {
            Ok(message) => QueueEvent::Message(message),
            Err(TryRecvError::Empty) => QueueEvent::Drained,
            Err(TryRecvError::Disconnected) => QueueEvent::Closed,
        }
    }

    /// Stop accepting messages; already buffered ones can still be received
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let (producer, mut consumer) = MessageQueue::bounded(8);
        assert!(producer.push(SignalingMessage::offer("sdp")).await);
        assert!(producer.push(SignalingMessage::candidate("c1")).await);
        assert!(producer.push(SignalingMessage::candidate("c2")).await);

        assert_eq!(consumer.recv().await, QueueEvent::Message(SignalingMessage::offer("sdp")));
        assert_eq!(consumer.recv().await, QueueEvent::Message(SignalingMessage::candidate("c1")));
        assert_eq!(consumer.recv().await, QueueEvent::Message(SignalingMessage::candidate("c2")));
    }

    #[tokio::test]
    async fn test_drained_is_not_closed() {
        let (producer, mut consumer) = MessageQueue::bounded(4);
        assert_eq!(consumer.try_recv(), QueueEvent::Drained);

        producer.push(SignalingMessage::candidate("c")).await;
        assert!(matches!(consumer.try_recv(), QueueEvent::Message(_)));
        assert_eq!(consumer.try_recv(), QueueEvent::Drained);

        drop(producer);
        assert_eq!(consumer.try_recv(), QueueEvent::Closed);
        assert_eq!(consumer.recv().await, QueueEvent::Closed);
    }

    #[tokio::test]
    async fn test_buffered_messages_survive_producer_drop() {
        let (producer, mut consumer) = MessageQueue::bounded(4);
        producer.push(SignalingMessage::offer("sdp")).await;
        drop(producer);

        assert!(matches!(consumer.recv().await, QueueEvent::Message(_)));
        assert_eq!(consumer.recv().await, QueueEvent::Closed);
    }

    #[tokio::test]
    async fn test_push_fails_after_consumer_close() {
        let (producer, mut consumer) = MessageQueue::bounded(4);
        consumer.close();
        assert!(producer.is_closed());
        assert!(!producer.push(SignalingMessage::offer("sdp")).await);
    }
}
