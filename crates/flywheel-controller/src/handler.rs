// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event handlers mapping events to queued requests.
//!
//! Identical requests coalesce in the queue, so a burst of events for
//! one object costs a single reconcile.

use std::sync::Arc;

use crate::event::{CreateEvent, DeleteEvent, GenericEvent, UpdateEvent};
use crate::queue::RateLimitedQueue;
use crate::reconcile::Request;

/// Enqueues requests in response to events.
///
/// The stock [`EnqueueRequestHandler`] reconciles the object the event
/// is for; custom handlers can map events onto requests for different
/// objects (owners, dependents, fan-outs).
pub trait EventHandler: Send + Sync {
    /// Called for a create event.
    fn create(&self, event: CreateEvent, queue: &Arc<RateLimitedQueue<Request>>);

    /// Called for an update event.
    fn update(&self, event: UpdateEvent, queue: &Arc<RateLimitedQueue<Request>>);

    /// Called for a delete event.
    fn delete(&self, event: DeleteEvent, queue: &Arc<RateLimitedQueue<Request>>);

    /// Called for a generic event.
    fn generic(&self, event: GenericEvent, queue: &Arc<RateLimitedQueue<Request>>);
}

/// Enqueues a request for the event's own object; events without a
/// key are ignored.
pub struct EnqueueRequestHandler;

fn enqueue(object: &dyn flywheel_apis::Object, queue: &Arc<RateLimitedQueue<Request>>) {
    if object.key().is_empty() {
        return;
    }
    queue.add(Request::new(object.kind(), object.key()));
}

impl EventHandler for EnqueueRequestHandler {
    fn create(&self, event: CreateEvent, queue: &Arc<RateLimitedQueue<Request>>) {
        enqueue(&*event.object, queue);
    }

    fn update(&self, event: UpdateEvent, queue: &Arc<RateLimitedQueue<Request>>) {
        enqueue(&*event.object_new, queue);
    }

    fn delete(&self, event: DeleteEvent, queue: &Arc<RateLimitedQueue<Request>>) {
        enqueue(&*event.object, queue);
    }

    fn generic(&self, event: GenericEvent, queue: &Arc<RateLimitedQueue<Request>>) {
        if let Some(object) = &event.object {
            enqueue(&**object, queue);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flywheel_apis::ObjectMeta;

    fn meta(kind: &str, key: &str) -> Box<ObjectMeta> {
        Box::new(ObjectMeta {
            kind: kind.to_string(),
            key: key.to_string(),
            ..ObjectMeta::default()
        })
    }

    #[tokio::test]
    async fn test_enqueues_kind_and_key() {
        let queue = Arc::new(RateLimitedQueue::new("test"));
        EnqueueRequestHandler.create(
            CreateEvent {
                object: meta("App", "a"),
            },
            &queue,
        );
        assert_eq!(queue.get().await, Some(Request::new("App", "a")));
    }

    #[tokio::test]
    async fn test_empty_key_is_ignored() {
        let queue = Arc::new(RateLimitedQueue::new("test"));
        EnqueueRequestHandler.update(
            UpdateEvent {
                object_new: meta("App", ""),
            },
            &queue,
        );
        EnqueueRequestHandler.generic(GenericEvent::default(), &queue);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_events_coalesce() {
        let queue = Arc::new(RateLimitedQueue::new("test"));
        for _ in 0..3 {
            EnqueueRequestHandler.create(
                CreateEvent {
                    object: meta("App", "a"),
                },
                &queue,
            );
        }
        assert_eq!(queue.len(), 1);
    }
}
