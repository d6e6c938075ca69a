pub mod bridge;
pub mod producer;

pub use bridge::{ProducerHandle, StreamingBridge};
pub use producer::{recognizer, OngoingProducer, ProducerEvent, ProducerStream, Recognizer};
