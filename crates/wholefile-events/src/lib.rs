#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, unused)]

//! Lifecycle event bus for the wholefile stage.
//!
//! The bus provides a typed event enum, sequential identifiers, and replay of
//! recent events for late subscribers. Internally it uses `tokio::broadcast`
//! with a bounded buffer; when the channel overflows, the oldest events are
//! dropped so publishers never block the record path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

/// Identifier assigned to each event emitted by the stage.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed stage events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Startup validation passed for the output directory.
    StageInitialised {
        /// Output directory in use.
        directory: String,
    },
    /// Startup validation reported issues; the stage will not run.
    StageRejected {
        /// Rendered issue descriptions.
        issues: Vec<String>,
    },
    /// A record entered the processor.
    RecordStarted {
        /// Identifier of the record.
        record_id: Uuid,
        /// Filename read from the record, when present.
        filename: Option<String>,
    },
    /// A record was rewritten and emitted downstream.
    RecordEmitted {
        /// Identifier of the record.
        record_id: Uuid,
        /// Location of the newly written file.
        destination: String,
        /// Bytes written to the destination.
        bytes: u64,
    },
    /// A record failed.
    RecordFailed {
        /// Identifier of the record.
        record_id: Uuid,
        /// Processing state in which the failure happened.
        state: String,
        /// Rendered error chain.
        message: String,
    },
    /// Health of the stage changed.
    HealthChanged {
        /// Degraded components; empty when healthy.
        degraded: Vec<String>,
    },
    /// The stage was torn down.
    StageDestroyed,
}

impl Event {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StageInitialised { .. } => "stage_initialised",
            Self::StageRejected { .. } => "stage_rejected",
            Self::RecordStarted { .. } => "record_started",
            Self::RecordEmitted { .. } => "record_emitted",
            Self::RecordFailed { .. } => "record_failed",
            Self::HealthChanged { .. } => "health_changed",
            Self::StageDestroyed => "stage_destroyed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The broadcast channel uses the same capacity as the in-memory replay
    /// buffer. A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        // No live subscribers is not an error; the replay ring still holds the event.
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let backlog = since_id.map_or_else(VecDeque::new, |since| {
            self.lock_buffer()
                .iter()
                .filter(|item| item.id > since)
                .cloned()
                .collect()
        });
        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Returns the last assigned identifier, if any events have been published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_buffer().back().map(|event| event.id)
    }

    /// Buffered events currently held for replay, oldest first.
    #[must_use]
    pub fn backlog(&self) -> Vec<EventEnvelope> {
        self.lock_buffer().iter().cloned().collect()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Adapt into a [`Stream`], skipping over lag notifications.
    pub fn into_stream(self) -> impl Stream<Item = EventEnvelope> {
        tokio_stream::iter(self.backlog)
            .chain(BroadcastStream::new(self.receiver).filter_map(Result::ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(1);

    fn started(id: u128) -> Event {
        Event::RecordStarted {
            record_id: Uuid::from_u128(id),
            filename: None,
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(started(i));
        }
        assert_eq!(last_id, 5);
        assert_eq!(bus.last_event_id(), Some(5));

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Ok(Some(event)) = timeout(RECV_TIMEOUT, stream.next()).await {
                received.push(event.id);
            }
        }
        assert_eq!(received, vec![3, 4, 5]);
    }

    #[test]
    fn replay_ring_drops_oldest_events() {
        let bus = EventBus::with_capacity(2);
        for i in 0..4 {
            bus.publish(started(i));
        }
        let ids: Vec<_> = bus.backlog().into_iter().map(|event| event.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn stream_adapter_yields_live_events() {
        let bus = EventBus::with_capacity(8);
        bus.publish(Event::StageDestroyed);
        let mut stream = Box::pin(bus.subscribe(Some(0)).into_stream());
        bus.publish(started(7));

        let first = timeout(RECV_TIMEOUT, stream.next()).await.ok().flatten();
        let second = timeout(RECV_TIMEOUT, stream.next()).await.ok().flatten();
        assert_eq!(first.map(|e| e.event.kind()), Some("stage_destroyed"));
        assert_eq!(second.map(|e| e.event.kind()), Some("record_started"));
    }

    #[test]
    fn events_serialise_with_type_tag() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(Event::RecordFailed {
            record_id: Uuid::nil(),
            state: "transformed".to_string(),
            message: "disk full".to_string(),
        })?;
        assert_eq!(value["type"], "record_failed");
        assert_eq!(value["state"], "transformed");
        Ok(())
    }
}
