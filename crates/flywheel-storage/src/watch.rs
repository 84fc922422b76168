// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process per-kind publish/subscribe for change events.
//!
//! The bus keys one topic per logical type name. Delivery is
//! best-effort per subscriber: every subscriber owns a bounded buffer,
//! publishers never block, and a subscriber that falls behind loses the
//! oldest undelivered events. Payloads travel as JSON and are decoded
//! per subscriber; a decode failure surfaces as an [`EventType::Error`]
//! event with no object and the stream continues.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::StorageError;

/// Default per-subscriber buffer capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// The kind of change an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// A row was inserted.
    Created,
    /// A row was updated.
    Updated,
    /// A row was deleted.
    Deleted,
    /// A synthetic event with no storage origin (timers, external pokes).
    Generic,
    /// The subscriber failed to decode a payload; no object is carried.
    Error,
}

impl EventType {
    /// The event type's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Updated => "Updated",
            Self::Deleted => "Deleted",
            Self::Generic => "Generic",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed change event.
#[derive(Debug, Clone)]
pub struct Event<T> {
    /// What happened.
    pub event_type: EventType,
    /// The decoded object; absent for `Error` events.
    pub object: Option<T>,
}

#[derive(Clone)]
struct RawEvent {
    event_type: EventType,
    payload: Arc<str>,
}

/// Per-type in-process pub/sub mesh.
///
/// Cheap to clone; clones share the same topics. Inject one bus per
/// store (or share one across stores) instead of relying on process
/// globals, so tests stay isolated.
#[derive(Clone)]
pub struct WatchBus {
    capacity: usize,
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<RawEvent>>>>,
}

impl Default for WatchBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl WatchBus {
    /// Create a bus with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<RawEvent> {
        let mut topics = self.topics.lock().expect("watch bus lock poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Serialize and publish an object event to `topic`.
    pub fn publish<T: Serialize>(
        &self,
        topic: &str,
        event_type: EventType,
        object: &T,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(object)?;
        self.send_serialized(topic, event_type, payload);
        Ok(())
    }

    /// Publish an already-serialized payload to `topic`.
    ///
    /// Infallible by design: with no subscribers the event is simply
    /// dropped, and a full subscriber buffer drops that subscriber's
    /// oldest events rather than blocking the publisher.
    pub fn send_serialized(&self, topic: &str, event_type: EventType, payload: String) {
        let _ = self.sender(topic).send(RawEvent {
            event_type,
            payload: Arc::from(payload),
        });
    }

    /// Subscribe to `topic`, receiving every event published from now on.
    pub fn watch<T>(&self, topic: &str) -> Channel<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut source = self.sender(topic).subscribe();
        let (tx, rx) = mpsc::channel(self.capacity);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = worker_cancel.cancelled() => break,
                    received = source.recv() => match received {
                        Ok(raw) => {
                            let event = decode_event::<T>(&topic, &raw);
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(topic = %topic, missed, "watch subscriber lagging, events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Channel { rx, cancel }
    }
}

fn decode_event<T: DeserializeOwned>(topic: &str, raw: &RawEvent) -> Event<T> {
    match serde_json::from_str::<T>(&raw.payload) {
        Ok(object) => Event {
            event_type: raw.event_type,
            object: Some(object),
        },
        Err(error) => {
            warn!(topic = %topic, error = %error, "failed to decode watch payload");
            Event {
                event_type: EventType::Error,
                object: None,
            }
        }
    }
}

/// A typed subscription handle.
///
/// Dropping the channel or calling [`Channel::stop`] cancels the
/// subscription; pending events are discarded and `recv` returns
/// `None` once drained.
pub struct Channel<T> {
    rx: mpsc::Receiver<Event<T>>,
    cancel: CancellationToken,
}

impl<T> Channel<T> {
    /// Receive the next event; `None` after the subscription stops.
    pub async fn recv(&mut self) -> Option<Event<T>> {
        self.rx.recv().await
    }

    /// Cancel the subscription.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl<T> Drop for Channel<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
