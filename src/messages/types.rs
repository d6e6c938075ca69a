use serde::{Deserialize, Serialize};

/// Message ids double as creation timestamps (unix milliseconds). Within one
/// log they are unique and strictly increasing per generator.
pub type MessageId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    #[default]
    Open,
    Yes,
    Skip,
}

/// A finished speech capture handed to the log as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub content: String,
    pub rate: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedMessage {
    pub id: MessageId,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub text: String,
    /// Present only when `text` diverged from the producer-furnished value.
    /// An empty string marks a message that was pushed from a recording and
    /// may be overridden freely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
    pub decision: Decision,
    #[serde(default)]
    pub highlighted: bool,
    #[serde(default)]
    pub queued: bool,
    #[serde(default)]
    pub played: bool,
}

impl CompletedMessage {
    pub fn new(id: MessageId, role: Role, text: impl Into<String>) -> Self {
        Self {
            id,
            role,
            prefix: None,
            text: text.into(),
            original_text: None,
            rate: None,
            model: None,
            initial_delay_ms: None,
            decision: Decision::Open,
            highlighted: false,
            queued: false,
            played: false,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_initial_delay(mut self, initial_delay_ms: u64) -> Self {
        if initial_delay_ms > 0 {
            self.initial_delay_ms = Some(initial_delay_ms);
        }
        self
    }

    /// Accept the message at construction time (used for script seeds).
    pub fn accepted(mut self) -> Self {
        self.decision = Decision::Yes;
        self
    }

    /// Mark the message as overridable: its text came from a recording, not
    /// from a producer finalization.
    pub fn overridable(mut self) -> Self {
        self.original_text = Some(String::new());
        self
    }

    pub fn is_open(&self) -> bool {
        self.decision == Decision::Open
    }
}

/// Live placeholder for an in-progress producer stream. `text` holds the
/// partial transcript accumulated so far.
#[derive(Debug, Clone)]
pub struct OngoingMessage {
    pub id: MessageId,
    pub role: Role,
    pub text_prefix: Option<String>,
    pub rate: Option<f32>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum Message {
    Ongoing(OngoingMessage),
    Completed(CompletedMessage),
}

impl Message {
    pub fn id(&self) -> MessageId {
        match self {
            Message::Ongoing(m) => m.id,
            Message::Completed(m) => m.id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::Ongoing(m) => m.role,
            Message::Completed(m) => m.role,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Message::Completed(_))
    }

    pub fn as_completed(&self) -> Option<&CompletedMessage> {
        match self {
            Message::Completed(m) => Some(m),
            Message::Ongoing(_) => None,
        }
    }

    pub fn as_completed_mut(&mut self) -> Option<&mut CompletedMessage> {
        match self {
            Message::Completed(m) => Some(m),
            Message::Ongoing(_) => None,
        }
    }

    pub fn as_ongoing(&self) -> Option<&OngoingMessage> {
        match self {
            Message::Ongoing(m) => Some(m),
            Message::Completed(_) => None,
        }
    }
}

/// Whole-log metadata, persisted alongside the message sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationSettings {
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<String>,
}

/// One entry of the assembled model-call context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}
