//! Non-blocking usage event emitter.
//!
//! `emit()` runs on the resolve path, so it must never wait:
//!
//! - `try_send` into a bounded channel, never `send`
//! - a full buffer drops the *newest* event and counts it
//! - a closed channel (pipeline shut down) also counts as a drop
//! - no return value; telemetry failures never reach the caller

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::types::UsageEvent;

/// Receiving end, owned by the drain task.
pub type EventReceiver = mpsc::Receiver<UsageEvent>;

pub struct EventEmitter {
    /// `None` when telemetry is disabled
    sender: Option<mpsc::Sender<UsageEvent>>,

    events_emitted: AtomicU64,
    events_dropped: AtomicU64,
}

impl EventEmitter {
    /// Create an emitter with the given buffer size, and the receiver for
    /// the drain task.
    pub fn new(buffer_size: usize) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let emitter = Self {
            sender: Some(sender),
            events_emitted: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        };
        (emitter, receiver)
    }

    /// An emitter that silently discards everything.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            events_emitted: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Emit an event. Never blocks, never fails.
    #[inline]
    pub fn emit(&self, event: UsageEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {
                self.events_emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.events_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Events sitting in the buffer, not yet taken by the drain task.
    pub fn pending(&self) -> usize {
        self.sender
            .as_ref()
            .map_or(0, |s| s.max_capacity() - s.capacity())
    }

    pub fn stats(&self) -> EmitterStats {
        EmitterStats {
            emitted: self.events_emitted.load(Ordering::Relaxed),
            dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitterStats {
    /// Events accepted into the buffer
    pub emitted: u64,
    /// Events dropped (buffer full or pipeline stopped)
    pub dropped: u64,
}

impl EmitterStats {
    pub fn drop_rate(&self) -> f64 {
        let total = self.emitted + self.dropped;
        if total == 0 {
            0.0
        } else {
            self.dropped as f64 / total as f64
        }
    }

    /// Drop rate under 1%.
    pub fn is_healthy(&self) -> bool {
        self.drop_rate() < 0.01
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::CallerIdentity;
    use std::time::Duration;
    use uuid::Uuid;

    fn event(n: usize) -> UsageEvent {
        UsageEvent::resolve_failed(
            Uuid::new_v4(),
            CallerIdentity::anonymous(),
            format!("a/{}", n),
            true,
            "missing",
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let (emitter, mut receiver) = EventEmitter::new(8);
        emitter.emit(event(0));
        assert_eq!(emitter.pending(), 1);
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.moniker, "a/0");
    }

    #[tokio::test]
    async fn test_full_buffer_drops_newest() {
        let (emitter, mut receiver) = EventEmitter::new(2);
        for i in 0..10 {
            emitter.emit(event(i));
        }
        let stats = emitter.stats();
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.dropped, 8);
        assert!(!stats.is_healthy());

        // The oldest events are the ones kept
        assert_eq!(receiver.recv().await.unwrap().moniker, "a/0");
        assert_eq!(receiver.recv().await.unwrap().moniker, "a/1");
    }

    #[tokio::test]
    async fn test_closed_receiver_counts_drop() {
        let (emitter, receiver) = EventEmitter::new(4);
        drop(receiver);
        emitter.emit(event(0));
        assert_eq!(emitter.stats().dropped, 1);
    }

    #[test]
    fn test_disabled_discards_silently() {
        let emitter = EventEmitter::disabled();
        emitter.emit(event(0));
        assert_eq!(emitter.stats(), EmitterStats::default());
        assert_eq!(emitter.pending(), 0);
    }

    #[test]
    fn test_emit_is_fast() {
        let (emitter, _receiver) = EventEmitter::new(64);
        let events: Vec<_> = (0..1000).map(event).collect();
        let start = std::time::Instant::now();
        for e in events {
            emitter.emit(e);
        }
        let elapsed = start.elapsed();
        assert!(elapsed.as_millis() < 50, "Emit too slow: {:?}", elapsed);
        assert_eq!(emitter.stats().dropped, 1000 - 64);
    }
}
