pub mod editor;
pub mod log;
pub mod prompt;
pub mod script;

pub use editor::STAGE_TAGS;
pub use log::{ConversationLog, ConversationSnapshot};
pub use prompt::{prompt_messages, prompt_messages_until};
pub use script::{parse_script, remove_meta, ScriptMessage};
