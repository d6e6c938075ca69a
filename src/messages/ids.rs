use chrono::Utc;

use super::types::MessageId;

/// Monotonic id source. Ids are wall-clock milliseconds, bumped past the
/// last issued value whenever the clock has not advanced, so repeated calls
/// within one tick still produce strictly increasing ids.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: MessageId,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { last: 0 }
    }

    pub fn next(&mut self) -> MessageId {
        let now = Utc::now().timestamp_millis();
        self.last = if now > self.last { now } else { self.last + 1 };
        self.last
    }

    /// Mark an id as issued without generating one, so later `next()` calls
    /// stay above ids that entered the log from outside the generator.
    pub fn observe(&mut self, id: MessageId) {
        if id > self.last {
            self.last = id;
        }
    }
}
