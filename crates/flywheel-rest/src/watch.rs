// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Converter-aware watch channel delivering type-erased API objects.
//!
//! Wraps a storage watch channel: each storage event is converted to
//! the API object and tagged with its kind. A conversion failure is
//! reported as an `Error` event with no object and the stream
//! continues.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use flywheel_apis::Object;
use flywheel_storage::{Channel, EventType, Record};

use crate::convert::Converter;

/// A change event carrying a type-erased API object.
pub struct WatchEvent {
    /// What happened.
    pub event_type: EventType,
    /// The converted object; absent for `Error` events.
    pub object: Option<Box<dyn Object>>,
}

/// Subscription handle yielding API-level events.
pub struct WatchChannel {
    rx: mpsc::Receiver<WatchEvent>,
    cancel: CancellationToken,
}

impl WatchChannel {
    /// Wrap a storage channel with conversion and kind tagging.
    pub fn new<A, S>(
        mut storage_channel: Channel<S>,
        kind: String,
        converter: Arc<dyn Converter<A, S>>,
    ) -> Self
    where
        A: Object + Default + Serialize + DeserializeOwned + 'static,
        S: Record,
    {
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = worker_cancel.cancelled() => break,
                    event = storage_channel.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                let out = match event.object {
                    Some(row) => {
                        let mut obj = A::default();
                        match converter.from_storage(&row, &mut obj) {
                            Ok(()) => {
                                obj.set_kind(&kind);
                                WatchEvent {
                                    event_type: event.event_type,
                                    object: Some(Box::new(obj) as Box<dyn Object>),
                                }
                            }
                            Err(error) => {
                                warn!(
                                    kind = %kind,
                                    error = %error,
                                    "failed to convert storage object for watch"
                                );
                                WatchEvent {
                                    event_type: EventType::Error,
                                    object: None,
                                }
                            }
                        }
                    }
                    None => WatchEvent {
                        event_type: event.event_type,
                        object: None,
                    },
                };

                if tx.send(out).await.is_err() {
                    break;
                }
            }
        });

        Self { rx, cancel }
    }

    /// Receive the next event; `None` after the subscription stops.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Cancel the subscription.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WatchChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
