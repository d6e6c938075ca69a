pub mod ids;
pub mod types;

pub use ids::IdGenerator;
pub use types::{
    CompletedMessage, ConversationSettings, Decision, Message, MessageId, OngoingMessage,
    PromptMessage, Recording, Role,
};
