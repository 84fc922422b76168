// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task handler contracts and describers.
//!
//! A handler either works on the raw [`RawExtension`] payload
//! ([`Task`]) or on a decoded input type ([`GenericTask`], adapted by
//! [`describe_generic`]). Task names default to the handler's
//! package-qualified type name, which is stable across runs of the
//! same binary.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use flywheel_apis::RawExtension;

use crate::hub::{TaskError, TaskHub};

/// Per-task delivery configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskConfig {
    /// Acknowledge after the handler instead of before it.
    pub ack_late: bool,
}

/// A task handler over the raw payload envelope.
#[async_trait]
pub trait Task: Send + Sync {
    /// Process one delivery.
    async fn run(&self, ctx: CancellationToken, input: RawExtension) -> anyhow::Result<()>;
}

/// A function implementing [`Task`].
pub struct TaskFn<F>(pub F);

#[async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: Fn(CancellationToken, RawExtension) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self, ctx: CancellationToken, input: RawExtension) -> anyhow::Result<()> {
        (self.0)(ctx, input).await
    }
}

/// A task handler over a decoded input type.
#[async_trait]
pub trait GenericTask<T>: Send + Sync
where
    T: DeserializeOwned + Send + 'static,
{
    /// Process one decoded delivery.
    async fn run(&self, ctx: CancellationToken, input: T) -> anyhow::Result<()>;
}

/// Everything the hub needs to deliver one kind of task.
#[derive(Clone)]
pub struct TaskDescriber {
    /// Unique task name, also the persisted topic.
    pub name: String,
    /// The handler invoked per delivery.
    pub task: Arc<dyn Task>,
    /// Delivery configuration.
    pub config: TaskConfig,
}

impl TaskDescriber {
    /// Describe a raw-payload handler under an explicit name.
    pub fn new(name: impl Into<String>, task: Arc<dyn Task>, config: TaskConfig) -> Self {
        Self {
            name: name.into(),
            task,
            config,
        }
    }
}

struct GenericAdapter<T, H> {
    name: String,
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T, H> Task for GenericAdapter<T, H>
where
    T: DeserializeOwned + Send + 'static,
    H: GenericTask<T>,
{
    async fn run(&self, ctx: CancellationToken, input: RawExtension) -> anyhow::Result<()> {
        let decoded: T = input.decode().map_err(|e| {
            anyhow::anyhow!("failed to decode input for task {}: {e}", self.name)
        })?;
        self.handler.run(ctx, decoded).await
    }
}

/// Describe a typed handler; the task name is derived from the
/// handler's package-qualified type name.
pub fn describe_generic<T, H>(handler: H, config: TaskConfig) -> TaskDescriber
where
    T: DeserializeOwned + Send + 'static,
    H: GenericTask<T> + 'static,
{
    let name = std::any::type_name::<H>().to_string();
    TaskDescriber {
        name: name.clone(),
        task: Arc::new(GenericAdapter {
            name,
            handler,
            _marker: PhantomData,
        }),
        config,
    }
}

/// The persisted envelope of one emission.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EmitTaskRequest {
    /// The task this message is addressed to.
    #[serde(default)]
    pub task_name: String,

    /// The caller's payload, decoded by the handler.
    #[serde(default)]
    pub input: RawExtension,
}

/// Registration plus typed emission for one task.
pub struct TaskEntry<T> {
    hub: Arc<TaskHub>,
    name: String,
    _marker: PhantomData<fn(T)>,
}

impl<T> TaskEntry<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Register `handler` on `hub` and keep the resulting task name.
    pub fn register<H: GenericTask<T> + 'static>(
        hub: &Arc<TaskHub>,
        handler: H,
        config: TaskConfig,
    ) -> Result<Self, TaskError> {
        let name = hub.register(describe_generic(handler, config))?;
        Ok(Self {
            hub: hub.clone(),
            name,
            _marker: PhantomData,
        })
    }

    /// The registered task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Emit one typed message for this task.
    pub async fn emit(&self, input: &T) -> Result<(), TaskError> {
        let input = RawExtension::from_object(input)?;
        self.hub.emit(&self.name, input).await
    }
}
