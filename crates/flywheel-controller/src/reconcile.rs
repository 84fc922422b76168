// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The reconciler contract.
//!
//! Reconciliation is level-triggered: a [`Request`] names an object,
//! never its contents, and the reconciler reads current state itself
//! and drives the world toward it. Implementations must be idempotent;
//! the controller may invoke them for the same key any number of
//! times.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// The identity of an object to reconcile.
///
/// Two requests are equal iff both fields match; equal requests
/// coalesce in the work queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Request {
    /// The object's logical type name.
    pub kind: String,
    /// The object's key within its kind.
    pub key: String,
}

impl Request {
    /// Build a request for `(kind, key)`.
    pub fn new(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.key)
    }
}

/// What the controller should do with the key after a reconcile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Requeue the key with rate-limited backoff.
    pub requeue: bool,

    /// Requeue the key after this delay; a non-zero delay implies
    /// requeue. Dropped when the reconcile also returned an error,
    /// since error backoff takes precedence.
    pub requeue_after: Duration,
}

impl ReconcileResult {
    /// A result that requeues after `delay`.
    pub fn after(delay: Duration) -> Self {
        Self {
            requeue: false,
            requeue_after: delay,
        }
    }

    /// A result that requeues with backoff.
    pub fn requeue() -> Self {
        Self {
            requeue: true,
            requeue_after: Duration::ZERO,
        }
    }

    /// True when nothing was requested.
    pub fn is_zero(&self) -> bool {
        !self.requeue && self.requeue_after.is_zero()
    }
}

/// Drives observed state toward desired state for one request.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Perform a full reconciliation for the object named by `request`.
    ///
    /// A non-`Ok` return or `ReconcileResult { requeue: true, .. }`
    /// schedules the key again; otherwise the key is forgotten until
    /// the next event.
    async fn reconcile(
        &self,
        ctx: CancellationToken,
        request: Request,
    ) -> anyhow::Result<ReconcileResult>;
}

/// A function implementing [`Reconciler`].
pub struct ReconcileFn<F>(pub F);

#[async_trait]
impl<F, Fut> Reconciler for ReconcileFn<F>
where
    F: Fn(CancellationToken, Request) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ReconcileResult>> + Send,
{
    async fn reconcile(
        &self,
        ctx: CancellationToken,
        request: Request,
    ) -> anyhow::Result<ReconcileResult> {
        (self.0)(ctx, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_compare_on_both_fields() {
        assert_eq!(Request::new("App", "a"), Request::new("App", "a"));
        assert_ne!(Request::new("App", "a"), Request::new("App", "b"));
        assert_ne!(Request::new("App", "a"), Request::new("Job", "a"));
    }

    #[test]
    fn test_result_zero() {
        assert!(ReconcileResult::default().is_zero());
        assert!(!ReconcileResult::requeue().is_zero());
        assert!(!ReconcileResult::after(Duration::from_secs(1)).is_zero());
    }

    #[tokio::test]
    async fn test_reconcile_fn_adapter() {
        let reconciler = ReconcileFn(|_ctx, request: Request| async move {
            assert_eq!(request.key, "a");
            Ok(ReconcileResult::default())
        });
        let result = reconciler
            .reconcile(CancellationToken::new(), Request::new("App", "a"))
            .await
            .unwrap();
        assert!(result.is_zero());
    }
}
