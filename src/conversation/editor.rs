//! Structural edits on the highlighted message: split, merge, delete, text
//! edits and stage-tag cycling. Every operation preserves the highlight and
//! id-uniqueness invariants; operations without a structural match are silent
//! no-ops since they are triggered generically from the review keyboard.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::messages::{Decision, Message, MessageId, Role};
use crate::{ParleyError, Result};

use super::log::ConversationLog;

/// Last sentence boundary: a word of at least two non-space characters ending
/// in sentence punctuation, whitespace, then a remainder.
static SPLIT_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(.*\S\S[.?!])\s+(\S.*)$").unwrap());

/// A trailing stage-direction tag such as `[sarcasm]`.
static STAGE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(.*)(\[[^\]]+\])\s*$").unwrap());

/// Stage directions cycled onto highlighted user messages, in order.
pub const STAGE_TAGS: [&str; 3] = ["[sarcasm]", "[dry humour]", "[angry]"];

impl ConversationLog {
    /// Split the highlighted message at its last sentence boundary. The
    /// highlight keeps the head; the remainder becomes a fresh open message
    /// right after it, with an id probed upward from `highlight.id + 1` until
    /// unused. With `cascade`, splitting repeats until no boundary remains.
    pub fn split(&self, cascade: bool) {
        loop {
            let mut inner = self.inner.lock();
            let Some(index) = inner.highlight_index() else {
                break;
            };
            let Some(target) = inner.messages[index].as_completed() else {
                break;
            };
            let Some(captures) = SPLIT_BOUNDARY.captures(&target.text) else {
                break;
            };
            let head = captures[1].to_string();
            let remainder = captures[2].to_string();

            let used: HashSet<MessageId> = inner.messages.iter().map(|m| m.id()).collect();
            let mut next_id = target.id + 1;
            while used.contains(&next_id) {
                next_id += 1;
            }

            let mut rest = target.clone();
            rest.id = next_id;
            rest.text = remainder;
            rest.original_text = None;
            rest.highlighted = false;

            if let Some(target) = inner.messages[index].as_completed_mut() {
                target.text = head;
            }
            inner.messages.insert(index + 1, Message::Completed(rest));
            inner.ids.observe(next_id);
            self.after_mutation(&mut inner);
            drop(inner);
            if !cascade {
                break;
            }
        }
    }

    /// Merge the highlighted message with its immediate successor: same role,
    /// completed successor only. The merged text joins with a single space
    /// and the override marker is cleared. With `cascade`, merging repeats
    /// until a boundary stops it.
    pub fn merge(&self, cascade: bool) {
        loop {
            let mut inner = self.inner.lock();
            let Some(index) = inner.highlight_index() else {
                break;
            };
            if index + 1 >= inner.messages.len() {
                break;
            }
            let role = inner.messages[index].role();
            let successor_text = match inner.messages[index + 1].as_completed() {
                Some(successor) if successor.role == role => successor.text.clone(),
                _ => break,
            };
            if let Some(target) = inner.messages[index].as_completed_mut() {
                target.text.push(' ');
                target.text.push_str(&successor_text);
                target.original_text = None;
            }
            inner.messages.remove(index + 1);
            self.after_mutation(&mut inner);
            drop(inner);
            if !cascade {
                break;
            }
        }
    }

    /// Remove the highlighted message. A completed message sliding into its
    /// position is promoted back to open (playback flags reset) and becomes
    /// the next highlight. With `cascade`, deletion repeats on the promotion.
    pub fn delete(&self, cascade: bool) {
        loop {
            let mut inner = self.inner.lock();
            let Some(index) = inner.highlight_index() else {
                break;
            };
            inner.messages.remove(index);
            let mut promoted = false;
            if index < inner.messages.len() {
                if let Some(successor) = inner.messages[index].as_completed_mut() {
                    successor.decision = Decision::Open;
                    successor.played = false;
                    successor.queued = false;
                    promoted = true;
                }
            }
            self.after_mutation(&mut inner);
            drop(inner);
            if !(cascade && promoted) {
                break;
            }
        }
    }

    /// Replace the text of an open completed message. The pre-edit text is
    /// recorded as `original_text` on the first edit only.
    pub fn edit(&self, id: MessageId, new_text: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(index) = inner.index_of(id) else {
            return Err(ParleyError::NotFound(id));
        };
        let Some(message) = inner.messages[index].as_completed_mut() else {
            return Err(ParleyError::InvalidState(
                "cannot edit an ongoing message".to_string(),
            ));
        };
        if message.decision != Decision::Open {
            return Err(ParleyError::InvalidState(
                "can only edit an open message".to_string(),
            ));
        }
        // The empty-string override marker counts as "not yet edited".
        if message.original_text.as_deref().unwrap_or("").is_empty() {
            message.original_text = Some(message.text.clone());
        }
        message.text = new_text.into();
        self.after_mutation(&mut inner);
        Ok(())
    }

    /// Cycle a trailing stage-direction tag on the highlighted user message:
    /// `[sarcasm]` -> `[dry humour]` -> `[angry]` -> `[sarcasm]`, appending
    /// the first tag when none is present. No-op for other roles.
    pub fn cycle_stage_tag(&self) {
        let mut inner = self.inner.lock();
        let Some(index) = inner.highlight_index() else {
            return;
        };
        let Some(target) = inner.messages[index].as_completed() else {
            return;
        };
        if target.role != Role::User {
            return;
        }
        let text = match STAGE_TAG.captures(&target.text) {
            Some(captures) => {
                let position = STAGE_TAGS.iter().position(|t| *t == &captures[2]);
                let next = match position {
                    Some(i) => STAGE_TAGS[(i + 1) % STAGE_TAGS.len()],
                    None => STAGE_TAGS[0],
                };
                format!("{}{}", &captures[1], next)
            }
            None => format!("{} {}", target.text, STAGE_TAGS[0]),
        };
        if let Some(target) = inner.messages[index].as_completed_mut() {
            target.text = text;
        }
        self.after_mutation(&mut inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::log::tests::{accepted, completed, test_log};
    use crate::messages::{CompletedMessage, Recording};

    #[test]
    fn test_split_at_the_last_sentence_boundary() {
        let (log, _) = test_log();
        completed(&log, Role::User, "First point. Second point. And a tail");

        log.split(false);

        let messages = log.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0].as_completed().unwrap().text,
            "First point. Second point."
        );
        assert_eq!(messages[1].as_completed().unwrap().text, "And a tail");
        // The head keeps the highlight.
        assert!(messages[0].as_completed().unwrap().highlighted);
    }

    #[test]
    fn test_split_without_boundary_is_a_noop() {
        let (log, _) = test_log();
        completed(&log, Role::User, "No full sentence here");
        log.split(false);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_split_requires_two_word_characters_before_punctuation() {
        let (log, _) = test_log();
        // "a." is too short to count as a sentence end.
        completed(&log, Role::User, "a. tail");
        log.split(false);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_split_probes_for_an_unused_id() {
        let (log, _) = test_log();
        let first = completed(&log, Role::User, "Sentence one. Sentence two.");
        // Occupy the two ids right above the split target.
        log.append(CompletedMessage::new(first + 1, Role::User, "Blocker."));
        log.append(CompletedMessage::new(first + 2, Role::User, "Blocker."));

        log.split(false);

        let mut ids: Vec<MessageId> = log.messages().iter().map(|m| m.id()).collect();
        assert_eq!(ids[1], first + 3);
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_split_cascade_separates_every_sentence() {
        let (log, _) = test_log();
        completed(&log, Role::User, "One done. Two done. Three done.");

        log.split(true);

        let texts: Vec<String> = log
            .messages()
            .iter()
            .map(|m| m.as_completed().unwrap().text.clone())
            .collect();
        assert_eq!(texts, vec!["One done.", "Two done.", "Three done."]);
    }

    #[test]
    fn test_split_then_merge_restores_the_text() {
        let (log, _) = test_log();
        let original = "First sentence. Second sentence.";
        completed(&log, Role::User, original);

        log.split(false);
        assert_eq!(log.len(), 2);
        log.merge(false);

        let messages = log.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].as_completed().unwrap().text, original);
    }

    #[test]
    fn test_merge_refuses_a_role_boundary() {
        let (log, _) = test_log();
        completed(&log, Role::User, "Mine.");
        completed(&log, Role::Assistant, "Yours.");
        log.merge(false);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_merge_refuses_an_ongoing_successor() {
        let (log, _) = test_log();
        completed(&log, Role::User, "Mine.");
        log.insert_ongoing(Role::User, None, None, None);
        log.merge(false);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_merge_without_successor_is_a_noop() {
        let (log, _) = test_log();
        completed(&log, Role::User, "Alone.");
        log.merge(false);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_merge_clears_the_override_marker() {
        let (log, _) = test_log();
        log.push_recording(
            Role::User,
            Recording {
                content: "From a mic.".to_string(),
                rate: None,
            },
        );
        completed(&log, Role::User, "Typed.");

        log.merge(false);

        let message = log.messages()[0].as_completed().cloned().unwrap();
        assert_eq!(message.text, "From a mic. Typed.");
        assert!(message.original_text.is_none());
    }

    #[test]
    fn test_delete_promotes_the_successor() {
        let (log, _) = test_log();
        accepted(&log, Role::System, "Seed.");
        completed(&log, Role::User, "Doomed.");
        let next = completed(&log, Role::User, "Promoted.");
        // Pre-decide the successor so promotion has something to undo.
        log.decide(Decision::Yes, true, false);
        log.undecide();
        log.undecide();

        log.delete(false);

        let messages = log.messages();
        assert_eq!(messages.len(), 2);
        let promoted = messages[1].as_completed().unwrap();
        assert_eq!(promoted.id, next);
        assert_eq!(promoted.decision, Decision::Open);
        assert!(promoted.highlighted);
        assert!(!promoted.played && !promoted.queued);
    }

    #[test]
    fn test_delete_cascade_drains_the_open_tail() {
        let (log, _) = test_log();
        accepted(&log, Role::System, "Seed.");
        for i in 0..4 {
            completed(&log, Role::User, &format!("Open {i}."));
        }

        log.delete(true);

        assert_eq!(log.len(), 1);
        assert!(log.highlight().is_none());
    }

    #[test]
    fn test_delete_without_highlight_is_a_noop() {
        let (log, _) = test_log();
        accepted(&log, Role::User, "Decided.");
        log.delete(false);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_edit_records_the_original_text_once() {
        let (log, _) = test_log();
        let id = completed(&log, Role::User, "mumbled words");

        log.edit(id, "Mumbled words?").unwrap();
        log.edit(id, "Clear words.").unwrap();

        let message = log.messages()[0].as_completed().cloned().unwrap();
        assert_eq!(message.text, "Clear words.");
        assert_eq!(message.original_text.as_deref(), Some("mumbled words"));
    }

    #[test]
    fn test_edit_on_an_overridable_recording_records_the_old_text() {
        let (log, _) = test_log();
        let id = log.push_recording(
            Role::User,
            Recording {
                content: "raw capture".to_string(),
                rate: None,
            },
        );

        log.edit(id, "Cleaned up.").unwrap();

        let message = log.messages()[0].as_completed().cloned().unwrap();
        assert_eq!(message.original_text.as_deref(), Some("raw capture"));
    }

    #[test]
    fn test_edit_rejects_decided_messages() {
        let (log, _) = test_log();
        let id = accepted(&log, Role::User, "Locked in.");
        assert!(matches!(
            log.edit(id, "Too late."),
            Err(ParleyError::InvalidState(_))
        ));
    }

    #[test]
    fn test_edit_rejects_ongoing_messages() {
        let (log, _) = test_log();
        let id = log.insert_ongoing(Role::Assistant, None, None, None);
        assert!(matches!(
            log.edit(id, "Not yet."),
            Err(ParleyError::InvalidState(_))
        ));
    }

    #[test]
    fn test_edit_unknown_id_is_not_found() {
        let (log, _) = test_log();
        assert!(matches!(
            log.edit(404, "Ghost."),
            Err(ParleyError::NotFound(404))
        ));
    }

    #[test]
    fn test_cycle_stage_tag_appends_then_cycles() {
        let (log, _) = test_log();
        completed(&log, Role::User, "Say it again");

        log.cycle_stage_tag();
        assert_eq!(
            log.messages()[0].as_completed().unwrap().text,
            "Say it again [sarcasm]"
        );

        log.cycle_stage_tag();
        assert_eq!(
            log.messages()[0].as_completed().unwrap().text,
            "Say it again [dry humour]"
        );

        log.cycle_stage_tag();
        log.cycle_stage_tag();
        assert_eq!(
            log.messages()[0].as_completed().unwrap().text,
            "Say it again [sarcasm]"
        );
    }

    #[test]
    fn test_cycle_stage_tag_ignores_assistant_messages() {
        let (log, _) = test_log();
        completed(&log, Role::Assistant, "Not my line.");
        log.cycle_stage_tag();
        assert_eq!(
            log.messages()[0].as_completed().unwrap().text,
            "Not my line."
        );
    }
}
