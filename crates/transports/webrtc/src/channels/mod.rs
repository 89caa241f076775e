//! In-process channels between session tasks

pub mod message_queue;

pub use message_queue::{MessageQueue, QueueConsumer, QueueEvent, QueueProducer};
