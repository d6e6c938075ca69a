//! Role-play script parsing.
//!
//! Scripts are plain text: `Name:` or `Name (emotion):` headers open a
//! speaker block, following lines are that speaker's messages, and
//! stand-alone parenthesized lines are stage directions attributed to the
//! audience. One speaker plays the assistant; everyone else is the user side.

use std::sync::LazyLock;

use regex::Regex;

use crate::messages::Role;

static SPEAKER_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)(?:\s*\((.*?)\))?\s*:$").unwrap());

static META_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>|\[[^\]]*\]|\([^)]*\)").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptMessage {
    pub role: Role,
    pub text: String,
}

/// Strip `<...>`, `[...]` and `(...)` markup before text is spoken aloud.
pub fn remove_meta(content: &str) -> String {
    META_MARKUP.replace_all(content, "").into_owned()
}

/// Parse a script into attributed messages. Lines spoken by
/// `assistant_speaker` become assistant messages, everything else user
/// messages; speaker and emotion annotations are folded into the text.
pub fn parse_script(script: &str, assistant_speaker: &str) -> Vec<ScriptMessage> {
    let mut messages = Vec::new();
    let mut current_speaker = String::new();
    let mut current_emotion = String::new();

    for line in script.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.ends_with(':') {
            if let Some(captures) = SPEAKER_HEADER.captures(line) {
                current_speaker = captures[1].trim().to_string();
                current_emotion = captures
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
            }
            continue;
        }

        if line.starts_with('(') && line.ends_with(')') {
            messages.push(ScriptMessage {
                role: Role::User,
                text: line.to_string(),
            });
            continue;
        }

        if !current_speaker.is_empty() {
            let text = if current_emotion.is_empty() {
                format!("({current_speaker}) {line}")
            } else {
                format!("({current_speaker}) [{current_emotion}] {line}")
            };
            let role = if current_speaker == assistant_speaker {
                Role::Assistant
            } else {
                Role::User
            };
            messages.push(ScriptMessage { role, text });
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_script() {
        assert!(parse_script("", "Deliar").is_empty());
    }

    #[test]
    fn test_parses_speaker_blocks_and_stage_directions() {
        let script = "
      Deliar:
      Hi there.

      Second message.
      Third message.

      (the audience applauds)

      Gian (gleeful):
      Fourth message.
      ";
        assert_eq!(
            parse_script(script, "Deliar"),
            vec![
                ScriptMessage {
                    role: Role::Assistant,
                    text: "(Deliar) Hi there.".to_string()
                },
                ScriptMessage {
                    role: Role::Assistant,
                    text: "(Deliar) Second message.".to_string()
                },
                ScriptMessage {
                    role: Role::Assistant,
                    text: "(Deliar) Third message.".to_string()
                },
                ScriptMessage {
                    role: Role::User,
                    text: "(the audience applauds)".to_string()
                },
                ScriptMessage {
                    role: Role::User,
                    text: "(Gian) [gleeful] Fourth message.".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_lines_before_any_speaker_are_dropped() {
        let script = "stray line\nDeliar:\nKept.";
        let messages = parse_script(script, "Deliar");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "(Deliar) Kept.");
    }

    #[test]
    fn test_remove_meta_strips_markup() {
        assert_eq!(
            remove_meta("(Deliar) [angry] Say <loudly> it!"),
            "  Say  it!"
        );
        assert_eq!(remove_meta("untouched"), "untouched");
    }
}
