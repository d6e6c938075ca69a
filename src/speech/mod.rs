//! Playback collaborator contract.
//!
//! The log hands accepted assistant messages to a [`Playback`] implementation
//! and only ever observes the returned completion signal; synthesis, output
//! device handling and queueing stay on the collaborator's side.

use tokio::sync::oneshot;

use crate::messages::Role;

#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub role: Role,
    pub content: String,
    pub rate: Option<f32>,
}

pub trait Playback: Send + Sync {
    /// Queue `request` for synthesis. The returned receiver fires once audio
    /// playback has finished. Dropping the sender without firing counts as
    /// playback never completing.
    fn enqueue(&self, request: PlaybackRequest) -> oneshot::Receiver<()>;
}

/// Playback that completes immediately. Used when speech output is disabled
/// and in tests that don't care about playback timing.
#[derive(Debug, Default)]
pub struct NullPlayback;

impl Playback for NullPlayback {
    fn enqueue(&self, _request: PlaybackRequest) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        rx
    }
}
