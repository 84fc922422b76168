// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The controller lifecycle: registered watches, worker pool, retry
//! policy.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::ControllerError;
use crate::handler::EventHandler;
use crate::predicate::Predicate;
use crate::queue::RateLimitedQueue;
use crate::reconcile::{Reconciler, Request};
use crate::source::Source;

/// Controller tuning knobs.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent reconciler workers.
    pub max_concurrent_reconciles: usize,

    /// Convert reconciler panics into rate-limited retries instead of
    /// re-raising them.
    pub recover_panic: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 1,
            recover_panic: false,
        }
    }
}

/// A named binding of source, handler, and predicates.
pub struct WatchDescribe {
    name: String,
    source: Arc<dyn Source>,
    handler: Arc<dyn EventHandler>,
    predicates: Vec<Arc<dyn Predicate>>,
}

impl WatchDescribe {
    /// Bundle a source with its handler and predicates.
    pub fn new(
        name: &str,
        source: Arc<dyn Source>,
        handler: Arc<dyn EventHandler>,
        predicates: Vec<Arc<dyn Predicate>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            source,
            handler,
            predicates,
        }
    }

    /// The watch name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn start(
        &self,
        ctx: CancellationToken,
        queue: Arc<RateLimitedQueue<Request>>,
    ) -> Result<(), ControllerError> {
        self.source
            .start(
                ctx,
                self.handler.clone(),
                queue,
                self.predicates.clone(),
            )
            .await
    }
}

struct ControllerState {
    started: bool,
    pending: Vec<WatchDescribe>,
    queue: Option<Arc<RateLimitedQueue<Request>>>,
    ctx: Option<CancellationToken>,
}

/// A reconcile loop over one kind of work.
///
/// Watches registered before [`Controller::start`] are held until
/// startup; watches registered afterwards start immediately. Starting
/// twice fails.
pub struct Controller {
    name: String,
    config: ControllerConfig,
    reconciler: Arc<dyn Reconciler>,
    state: Mutex<ControllerState>,
}

impl Controller {
    /// Create a controller around a reconciler.
    pub fn new(name: &str, reconciler: Arc<dyn Reconciler>, config: ControllerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            reconciler,
            state: Mutex::new(ControllerState {
                started: false,
                pending: Vec::new(),
                queue: None,
                ctx: None,
            }),
        }
    }

    /// The controller name; also names its queue.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a watch. Before start it is queued; after start it
    /// begins immediately.
    pub async fn watch(&self, describe: WatchDescribe) -> Result<(), ControllerError> {
        let (ctx, queue) = {
            let mut state = self.state.lock().expect("controller lock poisoned");
            if !state.started {
                state.pending.push(describe);
                return Ok(());
            }
            (
                state.ctx.clone().expect("started controller has a context"),
                state.queue.clone().expect("started controller has a queue"),
            )
        };
        info!(controller = %self.name, watch = %describe.name(), "starting watch");
        describe.start(ctx, queue).await
    }

    /// Run the controller until `ctx` is cancelled and the workers
    /// drain. Fails when called twice.
    pub async fn start(&self, ctx: CancellationToken) -> Result<(), ControllerError> {
        let (queue, watches) = {
            let mut state = self.state.lock().expect("controller lock poisoned");
            if state.started {
                return Err(ControllerError::AlreadyStarted(self.name.clone()));
            }
            state.started = true;
            let queue = Arc::new(RateLimitedQueue::new(&self.name));
            state.queue = Some(queue.clone());
            state.ctx = Some(ctx.clone());
            (queue, std::mem::take(&mut state.pending))
        };

        // Queue shutdown is what terminates the workers.
        {
            let queue = queue.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.cancelled().await;
                queue.shutdown();
            });
        }

        for describe in &watches {
            info!(controller = %self.name, watch = %describe.name(), "starting watch");
            describe.start(ctx.clone(), queue.clone()).await?;
        }

        let mut workers = JoinSet::new();
        for _ in 0..self.config.max_concurrent_reconciles.max(1) {
            let queue = queue.clone();
            let reconciler = self.reconciler.clone();
            let ctx = ctx.clone();
            let name = self.name.clone();
            let recover_panic = self.config.recover_panic;
            workers.spawn(async move {
                worker_loop(name, queue, reconciler, ctx, recover_panic).await;
            });
        }

        info!(
            controller = %self.name,
            max_concurrent_reconciles = self.config.max_concurrent_reconciles,
            "controller started"
        );

        ctx.cancelled().await;
        while workers.join_next().await.is_some() {}
        Ok(())
    }
}

async fn worker_loop(
    name: String,
    queue: Arc<RateLimitedQueue<Request>>,
    reconciler: Arc<dyn Reconciler>,
    ctx: CancellationToken,
    recover_panic: bool,
) {
    while let Some(request) = queue.get().await {
        let outcome = std::panic::AssertUnwindSafe(
            reconciler.reconcile(ctx.clone(), request.clone()),
        )
        .catch_unwind()
        .await;

        match outcome {
            Err(panic) => {
                if recover_panic {
                    error!(
                        controller = %name,
                        request = %request,
                        "observed a panic in reconciler, scheduling retry"
                    );
                    queue.add_rate_limited(request.clone());
                    queue.done(&request);
                } else {
                    error!(controller = %name, request = %request, "observed a panic in reconciler");
                    queue.done(&request);
                    std::panic::resume_unwind(panic);
                }
            }
            Ok(Err(error)) => {
                error!(controller = %name, request = %request, error = %error, "reconciler error");
                queue.add_rate_limited(request.clone());
                queue.done(&request);
            }
            Ok(Ok(result)) => {
                if result.requeue_after > Duration::ZERO {
                    // A requeue_after returned alongside an error is
                    // dropped by the arm above: errors drive backoff
                    // toward a stable loop before any fixed delay.
                    queue.forget(&request);
                    queue.add_after(request.clone(), result.requeue_after);
                } else if result.requeue {
                    queue.add_rate_limited(request.clone());
                } else {
                    queue.forget(&request);
                }
                queue.done(&request);
            }
        }
    }
}
