//! Persistence collaborator contract.
//!
//! Saves are fire-and-forget: the log hands over its completed subsequence
//! after a mutation and moves on. Write failures surface on the store's own
//! error channel, never as a log-level error, and are never retried.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::messages::{CompletedMessage, ConversationSettings, MessageId};
use crate::{ParleyError, Result};

/// The round-trip shape: completed messages only, plus whole-log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedConversation {
    pub id: MessageId,
    pub settings: ConversationSettings,
    pub messages: Vec<CompletedMessage>,
}

pub trait ConversationStore: Send + Sync {
    /// Persist `conversation`, replacing any previous save under the same id.
    /// Must not block the caller on IO.
    fn save(&self, conversation: SavedConversation);

    fn load(&self, id: MessageId) -> Result<SavedConversation>;
}

/// In-memory store backed by a map, mainly for tests and ephemeral sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    conversations: Arc<RwLock<HashMap<MessageId, SavedConversation>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.conversations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.read().is_empty()
    }

    pub fn ids(&self) -> Vec<MessageId> {
        let mut ids: Vec<MessageId> = self.conversations.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl ConversationStore for MemoryStore {
    fn save(&self, conversation: SavedConversation) {
        self.conversations
            .write()
            .insert(conversation.id, conversation);
    }

    fn load(&self, id: MessageId) -> Result<SavedConversation> {
        self.conversations
            .read()
            .get(&id)
            .cloned()
            .ok_or(ParleyError::ConversationNotFound(id))
    }
}

/// Store that writes one `<id>.json` file per conversation through a worker
/// thread, so `save` never blocks on the filesystem.
pub struct JsonFileStore {
    dir: PathBuf,
    save_tx: Sender<SavedConversation>,
    error_rx: Receiver<anyhow::Error>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let (save_tx, save_rx) = unbounded::<SavedConversation>();
        let (error_tx, error_rx) = unbounded::<anyhow::Error>();

        let worker_dir = dir.clone();
        thread::spawn(move || {
            for conversation in save_rx {
                let id = conversation.id;
                if let Err(e) = write_conversation(&worker_dir, &conversation) {
                    warn!("Failed to save conversation {}: {:#}", id, e);
                    let _ = error_tx.send(e);
                } else {
                    debug!("Saved conversation {}", id);
                }
            }
        });

        Ok(Self {
            dir,
            save_tx,
            error_rx,
        })
    }

    /// Receiver for write failures. Errors accumulate here whether or not
    /// anyone is listening.
    pub fn errors(&self) -> Receiver<anyhow::Error> {
        self.error_rx.clone()
    }

    pub fn conversation_path(&self, id: MessageId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl ConversationStore for JsonFileStore {
    fn save(&self, conversation: SavedConversation) {
        // Worker gone means the process is shutting down; nothing to do.
        let _ = self.save_tx.send(conversation);
    }

    fn load(&self, id: MessageId) -> Result<SavedConversation> {
        let path = self.conversation_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ParleyError::ConversationNotFound(id));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn write_conversation(dir: &Path, conversation: &SavedConversation) -> anyhow::Result<()> {
    let path = dir.join(format!("{}.json", conversation.id));
    let json = serde_json::to_vec_pretty(conversation)
        .with_context(|| format!("serializing conversation {}", conversation.id))?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{CompletedMessage, Role};
    use std::time::Duration;

    fn sample(id: MessageId) -> SavedConversation {
        SavedConversation {
            id,
            settings: ConversationSettings {
                model: Some("gpt-4o-mini".to_string()),
                parent_id: None,
                props: None,
            },
            messages: vec![
                CompletedMessage::new(id, Role::System, "You are a puppet.").accepted(),
                CompletedMessage::new(id + 10, Role::User, "Hello."),
            ],
        }
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.save(sample(1000));

        let loaded = store.load(1000).unwrap();
        assert_eq!(loaded.id, 1000);
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].decision, crate::messages::Decision::Yes);
        assert_eq!(loaded.settings.model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn test_memory_store_missing_id() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load(42),
            Err(ParleyError::ConversationNotFound(42))
        ));
    }

    #[test]
    fn test_memory_store_save_replaces() {
        let store = MemoryStore::new();
        store.save(sample(1000));
        let mut updated = sample(1000);
        updated.messages.push(CompletedMessage::new(1200, Role::Assistant, "Hi."));
        store.save(updated);

        assert_eq!(store.len(), 1);
        assert_eq!(store.load(1000).unwrap().messages.len(), 3);
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        store.save(sample(7000));

        // Writes go through the worker thread; poll until the file lands.
        let mut loaded = None;
        for _ in 0..100 {
            match store.load(7000) {
                Ok(c) => {
                    loaded = Some(c);
                    break;
                }
                Err(_) => thread::sleep(Duration::from_millis(10)),
            }
        }
        let loaded = loaded.expect("conversation file never appeared");
        assert_eq!(loaded.messages[1].text, "Hello.");
    }

    #[test]
    fn test_json_file_store_reports_write_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("conversations")).unwrap();
        let errors = store.errors();

        fs::remove_dir_all(dir.path().join("conversations")).unwrap();
        store.save(sample(7100));

        let err = errors
            .recv_timeout(Duration::from_secs(2))
            .expect("expected a write failure on the error channel");
        assert!(format!("{err:#}").contains("7100"));
    }
}
