//! The conversation log: an ordered message sequence plus the turn-taking
//! state machine that stages every completed message for a human decision.
//!
//! All mutation entry points serialize through one interior lock; producer
//! tasks and playback completions call back through the same entry points at
//! arbitrary times. Invariant after every mutation: at most one message is
//! highlighted, and it is the first completed message in order that is still
//! open.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::messages::{
    CompletedMessage, ConversationSettings, Decision, IdGenerator, Message, MessageId,
    OngoingMessage, Recording, Role,
};
use crate::speech::{Playback, PlaybackRequest};
use crate::storage::{ConversationStore, SavedConversation};

/// Point-in-time view handed to subscribers after every mutation.
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub conversation_id: MessageId,
    pub messages: Vec<Message>,
    pub highlight: Option<CompletedMessage>,
    pub latest_ongoing: Option<MessageId>,
    pub settings: ConversationSettings,
}

pub(crate) struct LogInner {
    pub(crate) messages: Vec<Message>,
    pub(crate) settings: ConversationSettings,
    pub(crate) conversation_id: MessageId,
    pub(crate) ids: IdGenerator,
    pub(crate) latest_ongoing: Option<MessageId>,
    subscribers: Vec<Sender<ConversationSnapshot>>,
}

impl LogInner {
    pub(crate) fn index_of(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id() == id)
    }

    /// Index of the highlighted message. Valid after `recompute_highlight`.
    pub(crate) fn highlight_index(&self) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.as_completed().is_some_and(|c| c.highlighted))
    }

    /// Re-establishes the highlight invariant: the first completed open
    /// message is highlighted and has its playback flags reset, every other
    /// completed message is not highlighted.
    pub(crate) fn recompute_highlight(&mut self) {
        let mut found = false;
        for message in &mut self.messages {
            if let Message::Completed(m) = message {
                if m.decision == Decision::Open {
                    m.played = false;
                    m.queued = false;
                    m.highlighted = !found;
                    found = true;
                } else {
                    m.highlighted = false;
                }
            }
        }
    }

    fn snapshot(&self) -> ConversationSnapshot {
        let highlight = self
            .messages
            .iter()
            .find_map(|m| m.as_completed().filter(|c| c.highlighted).cloned());
        ConversationSnapshot {
            conversation_id: self.conversation_id,
            messages: self.messages.clone(),
            highlight,
            latest_ongoing: self.latest_ongoing,
            settings: self.settings.clone(),
        }
    }

    fn saved(&self) -> SavedConversation {
        SavedConversation {
            id: self.conversation_id,
            settings: self.settings.clone(),
            messages: self
                .messages
                .iter()
                .filter_map(|m| m.as_completed().cloned())
                .collect(),
        }
    }
}

pub struct ConversationLog {
    pub(crate) inner: Mutex<LogInner>,
    playback: Arc<dyn Playback>,
    store: Arc<dyn ConversationStore>,
}

impl ConversationLog {
    pub fn new(playback: Arc<dyn Playback>, store: Arc<dyn ConversationStore>) -> Arc<Self> {
        let mut ids = IdGenerator::new();
        let conversation_id = ids.next();
        Arc::new(Self {
            inner: Mutex::new(LogInner {
                messages: Vec::new(),
                settings: ConversationSettings::default(),
                conversation_id,
                ids,
                latest_ongoing: None,
                subscribers: Vec::new(),
            }),
            playback,
            store,
        })
    }

    /// Publish the current state to subscribers, re-establishing the
    /// highlight invariant first.
    pub(crate) fn publish(&self, inner: &mut LogInner) {
        inner.recompute_highlight();
        if inner.subscribers.is_empty() {
            return;
        }
        let snapshot = inner.snapshot();
        inner
            .subscribers
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    /// Publish, then hand the completed subsequence to the persistence
    /// collaborator when the log holds at least two messages. The save is
    /// fire-and-forget; the store's contract forbids blocking here.
    pub(crate) fn after_mutation(&self, inner: &mut LogInner) {
        self.publish(inner);
        if inner.messages.len() > 1 {
            self.store.save(inner.saved());
        }
    }

    // --- observation -----------------------------------------------------

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.inner.lock().snapshot()
    }

    /// Subscribe to state changes. The current snapshot is delivered
    /// immediately, then one snapshot per mutation.
    pub fn subscribe(&self) -> Receiver<ConversationSnapshot> {
        let mut inner = self.inner.lock();
        let (tx, rx) = unbounded();
        let _ = tx.send(inner.snapshot());
        inner.subscribers.push(tx);
        rx
    }

    pub fn highlight(&self) -> Option<CompletedMessage> {
        self.snapshot().highlight
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().messages.clone()
    }

    pub fn conversation_id(&self) -> MessageId {
        self.inner.lock().conversation_id
    }

    pub fn settings(&self) -> ConversationSettings {
        self.inner.lock().settings.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().messages.is_empty()
    }

    /// Id of the most recently started, still-active producer, if any.
    pub fn latest_ongoing(&self) -> Option<MessageId> {
        self.inner.lock().latest_ongoing
    }

    // --- settings --------------------------------------------------------

    /// Record which model (and backend-specific properties) the next
    /// conversation runs against.
    pub fn set_model(&self, model: Option<String>, props: Option<String>) {
        let mut inner = self.inner.lock();
        inner.settings.model = model;
        if props.is_some() {
            inner.settings.props = props;
        }
    }

    // --- mutation entry points -------------------------------------------

    /// Issue a fresh id from the log's generator.
    pub fn next_id(&self) -> MessageId {
        self.inner.lock().ids.next()
    }

    /// Insert a completed message at the end of the sequence.
    pub fn append(&self, message: CompletedMessage) {
        let mut inner = self.inner.lock();
        inner.ids.observe(message.id);
        inner.messages.push(Message::Completed(message));
        self.after_mutation(&mut inner);
    }

    /// Stage a finished speech capture. The message is inserted before the
    /// first ongoing-or-open message, so it queues behind everything already
    /// decided but ahead of the undecided tail.
    pub fn push_recording(&self, role: Role, recording: Recording) -> MessageId {
        let mut inner = self.inner.lock();
        let id = inner.ids.next();
        let mut message = CompletedMessage::new(id, role, recording.content).overridable();
        message.rate = recording.rate;

        let index = inner
            .messages
            .iter()
            .position(|m| match m {
                Message::Ongoing(_) => true,
                Message::Completed(c) => c.decision == Decision::Open,
            })
            .unwrap_or(inner.messages.len());
        inner.messages.insert(index, Message::Completed(message));
        self.after_mutation(&mut inner);
        id
    }

    /// Apply `decision` to the highlighted message; no-op without one.
    ///
    /// An accepted assistant message is handed to the playback collaborator
    /// (which flips `played` once audio finishes) unless
    /// `auto_play_without_queue` marks it played outright. With `cascade` the
    /// decision is re-applied until no highlight remains. Queued playback
    /// requires a tokio runtime for the completion watcher.
    pub fn decide(
        self: &Arc<Self>,
        decision: Decision,
        cascade: bool,
        auto_play_without_queue: bool,
    ) {
        loop {
            let mut inner = self.inner.lock();
            let Some(index) = inner.highlight_index() else {
                break;
            };
            let mut playback_request = None;
            if let Some(message) = inner.messages[index].as_completed_mut() {
                message.decision = decision;
                if message.role == Role::Assistant && decision == Decision::Yes {
                    if auto_play_without_queue {
                        message.played = true;
                    } else {
                        message.queued = true;
                        playback_request = Some((
                            message.id,
                            PlaybackRequest {
                                role: message.role,
                                content: message.text.clone(),
                                rate: message.rate,
                            },
                        ));
                    }
                }
            }
            if let Some((id, request)) = playback_request {
                let done = self.playback.enqueue(request);
                let log = Arc::clone(self);
                tokio::spawn(async move {
                    if done.await.is_ok() {
                        log.mark_played(id);
                    } else {
                        debug!("Playback for message {} ended without completing", id);
                    }
                });
            }
            self.after_mutation(&mut inner);
            drop(inner);
            if !cascade {
                break;
            }
        }
    }

    /// Re-open the completed message immediately preceding the highlight
    /// (or the last message when nothing is highlighted). Single-step: there
    /// is no multi-level undo stack.
    pub fn undecide(&self) {
        let mut inner = self.inner.lock();
        let index = inner
            .highlight_index()
            .unwrap_or(inner.messages.len());
        if index < 1 {
            return;
        }
        match inner.messages[index - 1].as_completed_mut() {
            Some(previous) => {
                previous.decision = Decision::Open;
                previous.played = false;
                previous.queued = false;
            }
            None => return,
        }
        self.after_mutation(&mut inner);
    }

    /// Re-establish the highlight invariant and notify subscribers.
    pub fn recompute_highlight(&self) {
        let mut inner = self.inner.lock();
        self.after_mutation(&mut inner);
    }

    /// Mark a message as played. Called by the playback completion watcher.
    pub fn mark_played(&self, id: MessageId) {
        let mut inner = self.inner.lock();
        let Some(index) = inner.index_of(id) else {
            debug!("Played message {} no longer in the log", id);
            return;
        };
        if let Some(message) = inner.messages[index].as_completed_mut() {
            message.played = true;
            self.after_mutation(&mut inner);
        }
    }

    /// Start over: empty sequence, or a single accepted system message when a
    /// role-play script is configured. Resets the conversation id and the
    /// parent pointer.
    pub fn clear(&self, seed_script: Option<&str>) {
        let mut inner = self.inner.lock();
        inner.conversation_id = inner.ids.next();
        inner.settings.parent_id = None;
        inner.latest_ongoing = None;
        inner.messages = match seed_script {
            Some(script) => {
                let id = inner.ids.next();
                vec![Message::Completed(
                    CompletedMessage::new(id, Role::System, script).accepted(),
                )]
            }
            None => Vec::new(),
        };
        self.after_mutation(&mut inner);
    }

    /// Replace the log with a previously saved conversation. Decisions are
    /// preserved as saved; `parent_id` records the saved conversation's
    /// original identity; every id is shifted by a constant delta so the
    /// first message id reads as "now" while relative spacing survives.
    pub fn load_conversation(&self, saved: Vec<CompletedMessage>) {
        let Some(first) = saved.first() else {
            warn!("Refusing to load an empty conversation");
            return;
        };
        let mut inner = self.inner.lock();
        inner.settings.parent_id = Some(first.id);
        let now = inner.ids.next();
        let delta = now - first.id;
        inner.conversation_id = now;
        inner.latest_ongoing = None;
        inner.messages = saved
            .into_iter()
            .map(|mut m| {
                m.id += delta;
                Message::Completed(m)
            })
            .collect();
        if let Some(max) = inner.messages.iter().map(|m| m.id()).max() {
            inner.ids.observe(max);
        }
        self.after_mutation(&mut inner);
    }

    // --- bridge-facing entry points --------------------------------------

    /// Insert a live placeholder for a producer stream and point the
    /// "most recent still-active" marker at it.
    pub fn insert_ongoing(
        &self,
        role: Role,
        text_prefix: Option<String>,
        rate: Option<f32>,
        insert_at: Option<usize>,
    ) -> MessageId {
        let mut inner = self.inner.lock();
        let id = inner.ids.next();
        let index = insert_at
            .unwrap_or(inner.messages.len())
            .min(inner.messages.len());
        inner.messages.insert(
            index,
            Message::Ongoing(OngoingMessage {
                id,
                role,
                text_prefix,
                rate,
                text: String::new(),
            }),
        );
        inner.latest_ongoing = Some(id);
        self.after_mutation(&mut inner);
        id
    }

    /// Extend a placeholder's partial text with one producer delta. Publishes
    /// the new partial text but does not trigger a save: the completed
    /// subsequence is unchanged by a delta.
    pub fn update_ongoing_text(&self, id: MessageId, delta: &str) {
        let mut inner = self.inner.lock();
        let Some(index) = inner.index_of(id) else {
            debug!("Delta for unknown placeholder {}", id);
            return;
        };
        if let Message::Ongoing(message) = &mut inner.messages[index] {
            message.text.push_str(delta);
            self.publish(&mut inner);
        }
    }

    /// Replace a placeholder, at its current identity-resolved position, with
    /// the finalized message. The placeholder may have shifted since
    /// insertion; a placeholder that is gone entirely (log cleared or
    /// replaced meanwhile) finalizes into nothing.
    pub fn finalize_ongoing(&self, id: MessageId, final_text: String, initial_delay_ms: u64) {
        let mut inner = self.inner.lock();
        let Some(index) = inner.index_of(id) else {
            debug!("Placeholder {} gone before finalization", id);
            return;
        };
        let Message::Ongoing(ongoing) = &inner.messages[index] else {
            return;
        };
        let mut message =
            CompletedMessage::new(id, ongoing.role, final_text).with_initial_delay(initial_delay_ms);
        message.prefix = ongoing.text_prefix.clone();
        message.rate = ongoing.rate;
        message.model = inner.settings.model.clone();
        inner.messages[index] = Message::Completed(message);
        if inner.latest_ongoing == Some(id) {
            inner.latest_ongoing = None;
        }
        self.after_mutation(&mut inner);
    }

    /// Drop a placeholder whose producer terminated without finalizing.
    pub fn remove_ongoing(&self, id: MessageId) {
        let mut inner = self.inner.lock();
        if inner.latest_ongoing == Some(id) {
            inner.latest_ongoing = None;
        }
        let Some(index) = inner.index_of(id) else {
            return;
        };
        if inner.messages[index].is_completed() {
            return;
        }
        inner.messages.remove(index);
        self.after_mutation(&mut inner);
    }
}
