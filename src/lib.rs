pub mod conversation;
pub mod messages;
pub mod speech;
pub mod storage;
pub mod streaming;

use thiserror::Error;

use crate::messages::MessageId;

#[derive(Error, Debug, Clone)]
pub enum ParleyError {
    #[error("Message not found: id={0}")]
    NotFound(MessageId),

    #[error("Invalid message state: {0}")]
    InvalidState(String),

    #[error("Conversation not found: id={0}")]
    ConversationNotFound(MessageId),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<std::io::Error> for ParleyError {
    fn from(e: std::io::Error) -> Self {
        ParleyError::IOError(e.to_string())
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(e: serde_json::Error) -> Self {
        ParleyError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
