// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event sources feeding the controller queue.
//!
//! A source adapts an external stream of happenings into handler
//! dispatches. [`WatchSource`] drives a resource watch channel;
//! [`TimerSource`] emits synthetic generic events on a fixed tick.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use flywheel_rest::WatchChannel;
use flywheel_storage::EventType;

use crate::error::ControllerError;
use crate::event::{CreateEvent, DeleteEvent, GenericEvent, UpdateEvent};
use crate::handler::EventHandler;
use crate::predicate::Predicate;
use crate::queue::RateLimitedQueue;
use crate::reconcile::Request;

/// Produces events for a controller.
///
/// `start` is called once by the controller; the source spawns its own
/// task and returns. Events surviving the predicate conjunction are
/// routed to the handler together with the queue handle.
#[async_trait]
pub trait Source: Send + Sync {
    /// Begin producing events until `ctx` is cancelled.
    async fn start(
        &self,
        ctx: CancellationToken,
        handler: Arc<dyn EventHandler>,
        queue: Arc<RateLimitedQueue<Request>>,
        predicates: Vec<Arc<dyn Predicate>>,
    ) -> Result<(), ControllerError>;
}

/// Adapts a resource watch channel into controller events.
///
/// Empty-key events are dropped before predicates run.
pub struct WatchSource {
    channel: Mutex<Option<WatchChannel>>,
}

impl WatchSource {
    /// Wrap a watch channel; the source is single-use.
    pub fn new(channel: WatchChannel) -> Self {
        Self {
            channel: Mutex::new(Some(channel)),
        }
    }
}

#[async_trait]
impl Source for WatchSource {
    async fn start(
        &self,
        ctx: CancellationToken,
        handler: Arc<dyn EventHandler>,
        queue: Arc<RateLimitedQueue<Request>>,
        predicates: Vec<Arc<dyn Predicate>>,
    ) -> Result<(), ControllerError> {
        let mut channel = self
            .channel
            .lock()
            .expect("watch source lock poisoned")
            .take()
            .ok_or(ControllerError::SourceAlreadyStarted)?;

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = ctx.cancelled() => break,
                    event = channel.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                match event.event_type {
                    EventType::Created => {
                        let Some(object) = event.object else { continue };
                        if object.key().is_empty() {
                            continue;
                        }
                        let event = CreateEvent { object };
                        if predicates.iter().all(|p| p.create(&event)) {
                            handler.create(event, &queue);
                        }
                    }
                    EventType::Updated => {
                        let Some(object) = event.object else { continue };
                        if object.key().is_empty() {
                            continue;
                        }
                        let event = UpdateEvent { object_new: object };
                        if predicates.iter().all(|p| p.update(&event)) {
                            handler.update(event, &queue);
                        }
                    }
                    EventType::Deleted => {
                        let Some(object) = event.object else { continue };
                        if object.key().is_empty() {
                            continue;
                        }
                        let event = DeleteEvent {
                            object,
                            delete_state_unknown: false,
                        };
                        if predicates.iter().all(|p| p.delete(&event)) {
                            handler.delete(event, &queue);
                        }
                    }
                    EventType::Generic => {
                        let event = GenericEvent {
                            object: event.object,
                        };
                        if predicates.iter().all(|p| p.generic(&event)) {
                            handler.generic(event, &queue);
                        }
                    }
                    EventType::Error => {
                        debug!("watch source received an error event, skipping");
                    }
                }
            }
        });

        Ok(())
    }
}

/// Emits an object-less generic event on a fixed tick.
///
/// The event fires only when every predicate accepts it.
pub struct TimerSource {
    period: Duration,
}

impl TimerSource {
    /// Tick every `period`.
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

#[async_trait]
impl Source for TimerSource {
    async fn start(
        &self,
        ctx: CancellationToken,
        handler: Arc<dyn EventHandler>,
        queue: Arc<RateLimitedQueue<Request>>,
        predicates: Vec<Arc<dyn Predicate>>,
    ) -> Result<(), ControllerError> {
        let period = self.period;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut tick = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = tick.tick() => {
                        let event = GenericEvent::default();
                        if predicates.iter().all(|p| p.generic(&event)) {
                            handler.generic(event, &queue);
                        }
                    }
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::PredicateFns;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        generics: Arc<AtomicUsize>,
    }

    impl EventHandler for CountingHandler {
        fn create(&self, _event: CreateEvent, _queue: &Arc<RateLimitedQueue<Request>>) {}
        fn update(&self, _event: UpdateEvent, _queue: &Arc<RateLimitedQueue<Request>>) {}
        fn delete(&self, _event: DeleteEvent, _queue: &Arc<RateLimitedQueue<Request>>) {}
        fn generic(&self, _event: GenericEvent, _queue: &Arc<RateLimitedQueue<Request>>) {
            self.generics.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_source_ticks() {
        let generics = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler {
            generics: generics.clone(),
        });
        let queue = Arc::new(RateLimitedQueue::new("test"));
        let ctx = CancellationToken::new();

        TimerSource::new(Duration::from_secs(1))
            .start(ctx.clone(), handler, queue, Vec::new())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        ctx.cancel();
        assert_eq!(generics.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_source_respects_predicate_conjunction() {
        let generics = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler {
            generics: generics.clone(),
        });
        let queue = Arc::new(RateLimitedQueue::new("test"));
        let ctx = CancellationToken::new();

        let accept: Arc<dyn Predicate> = Arc::new(PredicateFns::default());
        let reject: Arc<dyn Predicate> = Arc::new(PredicateFns {
            generic_fn: Some(Box::new(|_| false)),
            ..PredicateFns::default()
        });

        TimerSource::new(Duration::from_secs(1))
            .start(ctx.clone(), handler, queue, vec![accept, reject])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        ctx.cancel();
        assert_eq!(generics.load(Ordering::SeqCst), 0);
    }
}
