//! Prompt assembly: deriving the accepted model-call context from the log.

use crate::messages::{Decision, Message, PromptMessage};

use super::log::ConversationLog;

/// Accepted messages with index `<= upto_inclusive`, in sequence order,
/// mapped to `{role, content}` with the prefix folded into the content.
pub fn prompt_messages_until(messages: &[Message], upto_inclusive: usize) -> Vec<PromptMessage> {
    messages
        .iter()
        .take(upto_inclusive.saturating_add(1))
        .filter_map(|message| {
            let completed = message.as_completed()?;
            if completed.decision != Decision::Yes {
                return None;
            }
            let content = match &completed.prefix {
                Some(prefix) => format!("{prefix}{}", completed.text),
                None => completed.text.clone(),
            };
            Some(PromptMessage {
                role: completed.role,
                content,
            })
        })
        .collect()
}

/// The full accepted context, e.g. for persistence or token counting.
pub fn prompt_messages(messages: &[Message]) -> Vec<PromptMessage> {
    if messages.is_empty() {
        return Vec::new();
    }
    prompt_messages_until(messages, messages.len() - 1)
}

impl ConversationLog {
    pub fn prompt_messages(&self) -> Vec<PromptMessage> {
        prompt_messages(&self.inner.lock().messages)
    }

    /// Everything needed to start the next model call: the index where its
    /// placeholder should be inserted (the highlight's position, or the end
    /// when nothing is open) and the accepted context strictly before it.
    pub fn next_prompt(&self) -> (usize, Vec<PromptMessage>) {
        let inner = self.inner.lock();
        let insert_at = inner.highlight_index().unwrap_or(inner.messages.len());
        let context = if insert_at == 0 {
            Vec::new()
        } else {
            prompt_messages_until(&inner.messages, insert_at - 1)
        };
        (insert_at, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::log::tests::{accepted, completed, test_log};
    use crate::messages::{CompletedMessage, Role};

    #[test]
    fn test_only_accepted_messages_up_to_the_index_are_kept() {
        let (log, _) = test_log();
        accepted(&log, Role::System, "sys");
        accepted(&log, Role::User, "u1");
        completed(&log, Role::Assistant, "a1");
        completed(&log, Role::User, "u2");
        // a1 -> skip, u2 stays open.
        log.decide(Decision::Skip, false, false);

        let prompt = prompt_messages_until(&log.messages(), 3);
        assert_eq!(
            prompt,
            vec![
                PromptMessage {
                    role: Role::System,
                    content: "sys".to_string()
                },
                PromptMessage {
                    role: Role::User,
                    content: "u1".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_index_bound_is_inclusive() {
        let (log, _) = test_log();
        accepted(&log, Role::User, "first");
        accepted(&log, Role::User, "second");

        assert_eq!(prompt_messages_until(&log.messages(), 0).len(), 1);
        assert_eq!(prompt_messages_until(&log.messages(), 1).len(), 2);
        // Out-of-range indices are clamped, not an error.
        assert_eq!(prompt_messages_until(&log.messages(), 99).len(), 2);
    }

    #[test]
    fn test_prefix_is_folded_into_the_content() {
        let (log, _) = test_log();
        let message = CompletedMessage::new(log.next_id(), Role::Assistant, "the answer.")
            .with_prefix("Deliar says: ")
            .accepted();
        log.append(message);

        let prompt = log.prompt_messages();
        assert_eq!(prompt[0].content, "Deliar says: the answer.");
    }

    #[test]
    fn test_ongoing_placeholders_never_reach_the_prompt() {
        let (log, _) = test_log();
        accepted(&log, Role::User, "kept");
        log.insert_ongoing(Role::Assistant, None, None, None);

        assert_eq!(log.prompt_messages().len(), 1);
    }

    #[test]
    fn test_empty_log_yields_an_empty_prompt() {
        let (log, _) = test_log();
        assert!(log.prompt_messages().is_empty());
    }

    #[test]
    fn test_next_prompt_stops_at_the_highlight() {
        let (log, _) = test_log();
        accepted(&log, Role::System, "sys");
        accepted(&log, Role::User, "u1");
        completed(&log, Role::User, "still open");

        let (insert_at, context) = log.next_prompt();
        assert_eq!(insert_at, 2);
        assert_eq!(context.len(), 2);
    }

    #[test]
    fn test_next_prompt_appends_when_nothing_is_open() {
        let (log, _) = test_log();
        accepted(&log, Role::User, "u1");

        let (insert_at, context) = log.next_prompt();
        assert_eq!(insert_at, 1);
        assert_eq!(context.len(), 1);
    }
}
