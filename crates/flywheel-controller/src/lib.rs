// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flywheel Controller - Rate-Limited Reconcile Runtime
//!
//! A controller owns a work queue of [`Request`] keys and a fixed pool
//! of reconciler workers. Watch sources feed the queue: each source
//! adapts change events (or timer ticks) through predicates into an
//! event handler that enqueues request keys. Workers drain the queue,
//! invoke the [`Reconciler`], and apply the retry policy.
//!
//! ```text
//! WatchChannel ──▶ Source ──predicates──▶ EventHandler ──▶ queue
//!                                                            │
//!                            workers (N) ◀───── get ─────────┘
//!                               │
//!                               ▼
//!                        Reconciler::reconcile
//!                 error ──▶ rate-limited retry (per-key backoff)
//!         requeue_after ──▶ forget + delayed re-add
//!               requeue ──▶ rate-limited retry
//!                    ok ──▶ forget
//! ```
//!
//! The queue coalesces duplicate keys: a key being processed is never
//! handed to a second worker, and re-adds during processing collapse
//! into a single re-run.
//!
//! # Modules
//!
//! - [`controller`]: the controller lifecycle and worker loop
//! - [`error`]: controller error kinds
//! - [`event`]: typed events routed to handlers
//! - [`handler`]: event handlers enqueuing requests
//! - [`predicate`]: event filters
//! - [`queue`]: coalescing, delaying, rate-limited work queue
//! - [`reconcile`]: the reconciler contract
//! - [`source`]: watch and timer sources

#![deny(missing_docs)]

/// Controller lifecycle: watches, workers, retry policy.
pub mod controller;

/// Controller error kinds.
pub mod error;

/// Typed events delivered to event handlers.
pub mod event;

/// Event handlers mapping events to queued requests.
pub mod handler;

/// Event filters applied as a conjunction per source.
pub mod predicate;

/// Coalescing work queue with delay and per-key backoff.
pub mod queue;

/// The reconciler contract: requests, results, the trait.
pub mod reconcile;

/// Event sources driving the queue.
pub mod source;

pub use controller::{Controller, ControllerConfig, WatchDescribe};
pub use error::ControllerError;
pub use event::{CreateEvent, DeleteEvent, GenericEvent, UpdateEvent};
pub use handler::{EnqueueRequestHandler, EventHandler};
pub use predicate::{Predicate, PredicateFns};
pub use queue::{ExponentialBackoff, RateLimitedQueue, WorkQueue};
pub use reconcile::{ReconcileFn, ReconcileResult, Reconciler, Request};
pub use source::{Source, TimerSource, WatchSource};
