//! Producer contract: the one-directional data feed from a live source
//! (speech recognition, model token streaming) into the bridge. Producers
//! never read log state; they only emit against their own internal state.

use futures::stream::BoxStream;
use tokio::sync::mpsc;

use crate::messages::Role;

#[derive(Debug, Clone)]
pub enum ProducerEvent {
    /// One incremental text delta.
    Delta(String),
    /// Finalization: the full text and the delay until the first delta
    /// arrived. The stream ends after this event.
    Finalized {
        final_text: String,
        initial_delay_ms: u64,
    },
}

/// Events plus per-item transport/parse outcomes. An `Err` item is a failed
/// delta; the stream continues. Ending without `Finalized` is cancellation.
pub type ProducerStream = BoxStream<'static, anyhow::Result<ProducerEvent>>;

/// A live producer as handed to the bridge.
pub struct OngoingProducer {
    pub role: Role,
    pub text_prefix: Option<String>,
    pub rate: Option<f32>,
    pub events: ProducerStream,
}

impl OngoingProducer {
    pub fn new(role: Role, events: ProducerStream) -> Self {
        Self {
            role,
            text_prefix: None,
            rate: None,
            events,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.text_prefix = Some(prefix.into());
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }
}

/// Push-side helper for clients that receive text piecewise (an STT session,
/// a token stream reader): accumulate deltas, then finalize or cancel.
pub struct Recognizer {
    tx: mpsc::UnboundedSender<anyhow::Result<ProducerEvent>>,
    text: String,
    initial_delay_ms: Option<u64>,
}

/// Create a connected recognizer/producer pair.
pub fn recognizer(role: Role) -> (Recognizer, OngoingProducer) {
    let (tx, mut rx) = mpsc::unbounded_channel::<anyhow::Result<ProducerEvent>>();
    let events: ProducerStream = Box::pin(async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let is_final = matches!(event, Ok(ProducerEvent::Finalized { .. }));
            yield event;
            if is_final {
                break;
            }
        }
    });
    (
        Recognizer {
            tx,
            text: String::new(),
            initial_delay_ms: None,
        },
        OngoingProducer::new(role, events),
    )
}

impl Recognizer {
    pub fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
        let _ = self.tx.send(Ok(ProducerEvent::Delta(delta.to_string())));
    }

    /// Record the delay between the request and the first delta. Only the
    /// first call sticks.
    pub fn set_initial_delay(&mut self, initial_delay_ms: u64) {
        self.initial_delay_ms.get_or_insert(initial_delay_ms);
    }

    /// Report a failed delta. The consumer logs it and keeps reading.
    pub fn report_error(&mut self, error: anyhow::Error) {
        let _ = self.tx.send(Err(error));
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Finalize with the accumulated text.
    pub fn complete(self) {
        let _ = self.tx.send(Ok(ProducerEvent::Finalized {
            final_text: self.text,
            initial_delay_ms: self.initial_delay_ms.unwrap_or(0),
        }));
    }

    /// End the stream without finalizing. The placeholder is removed.
    pub fn cancel(self) {}
}
