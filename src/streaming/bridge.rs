//! Streaming bridge: integrates concurrent live producers into the
//! conversation log.
//!
//! Each pushed producer gets an ongoing placeholder immediately, so partial
//! text is observable while the stream runs. Finalization replaces the
//! placeholder at its current identity-resolved position — concurrent edits
//! may have shifted it, so a frozen index would be wrong. A producer that
//! terminates without finalizing leaves nothing behind.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::conversation::ConversationLog;
use crate::messages::MessageId;

use super::producer::{OngoingProducer, ProducerEvent};

/// Handle for one pushed producer: the placeholder's id and the task driving
/// the stream.
pub struct ProducerHandle {
    pub message_id: MessageId,
    task: JoinHandle<()>,
}

impl ProducerHandle {
    /// Wait until the producer has fully resolved (finalized, cancelled or
    /// errored) and its placeholder is settled.
    pub async fn finished(self) {
        let _ = self.task.await;
    }
}

pub struct StreamingBridge {
    log: Arc<ConversationLog>,
}

impl StreamingBridge {
    pub fn new(log: Arc<ConversationLog>) -> Self {
        Self { log }
    }

    /// Insert a placeholder for `producer` (at `insert_at`, default end) and
    /// spawn the task that feeds its deltas into the log. Failed deltas are
    /// logged and skipped; a producer that never produced a delta is dropped
    /// silently instead of finalizing into an empty message.
    pub fn push_ongoing(
        &self,
        producer: OngoingProducer,
        insert_at: Option<usize>,
    ) -> ProducerHandle {
        let OngoingProducer {
            role,
            text_prefix,
            rate,
            mut events,
        } = producer;
        let id = self.log.insert_ongoing(role, text_prefix, rate, insert_at);
        debug!("Producer {} started", id);

        let log = Arc::clone(&self.log);
        let task = tokio::spawn(async move {
            let mut saw_delta = false;
            let mut finalized = false;
            while let Some(event) = events.next().await {
                match event {
                    Ok(ProducerEvent::Delta(delta)) => {
                        saw_delta = true;
                        log.update_ongoing_text(id, &delta);
                    }
                    Ok(ProducerEvent::Finalized {
                        final_text,
                        initial_delay_ms,
                    }) => {
                        if saw_delta || !final_text.is_empty() {
                            log.finalize_ongoing(id, final_text, initial_delay_ms);
                        } else {
                            debug!("Producer {} finalized without content, dropped", id);
                            log.remove_ongoing(id);
                        }
                        finalized = true;
                        break;
                    }
                    Err(e) => {
                        warn!("Producer {} delta failed, skipping: {:#}", id, e);
                    }
                }
            }
            if !finalized {
                debug!("Producer {} ended without finalizing", id);
                log.remove_ongoing(id);
            }
        });

        ProducerHandle {
            message_id: id,
            task,
        }
    }
}
