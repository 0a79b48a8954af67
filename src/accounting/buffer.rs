use super::event::RedirectEvent;

/// Redirects recorded in this process that the remote store has not yet
/// confirmed, plus the running local count used for offline feedback.
///
/// The buffer only grows at the tail. A sync takes a snapshot of the current
/// contents and, once the write is confirmed, acknowledges exactly that many
/// events from the head. `reset` bumps the epoch so an acknowledgement for a
/// snapshot taken before the reset is discarded.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    events: Vec<RedirectEvent>,
    local_count: f64,
    epoch: u64,
}

/// Events captured for one sync attempt.
#[derive(Debug, Clone)]
pub struct PendingSnapshot {
    pub epoch: u64,
    pub events: Vec<RedirectEvent>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: RedirectEvent) -> f64 {
        self.local_count += event.value();
        self.events.push(event);
        self.local_count
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn local_count(&self) -> f64 {
        self.local_count
    }

    pub fn snapshot(&self) -> PendingSnapshot {
        PendingSnapshot {
            epoch: self.epoch,
            events: self.events.clone(),
        }
    }

    /// Drops the first `count` events if no reset happened since the snapshot
    /// was taken. Returns the number of events removed.
    pub fn acknowledge(&mut self, epoch: u64, count: usize) -> usize {
        if epoch != self.epoch {
            return 0;
        }
        let count = count.min(self.events.len());
        self.events.drain(..count);
        count
    }

    pub fn reset(&mut self) {
        self.events.clear();
        self.local_count = 0.0;
        self.epoch = self.epoch.wrapping_add(1);
    }
}
