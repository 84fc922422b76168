// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The task hub: registration, emission, and the polling workers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::FutureExt;
use sqlx::{PgPool, Postgres, Row, Transaction};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use flywheel_apis::RawExtension;

use crate::describe::{EmitTaskRequest, TaskDescriber};

/// Result type using TaskError.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Task hub errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TaskError {
    /// Registration was attempted while the hub runs.
    #[error("the taskhub is already running, registering tasks is forbidden")]
    AlreadyRunning,

    /// A task name was registered twice.
    #[error("task {0:?} duplicate")]
    DuplicateTask(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Envelope serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Hub tuning knobs.
#[derive(Debug, Clone)]
pub struct TaskHubConfig {
    /// Consumer group recorded in the offsets table.
    pub consumer_group: String,

    /// How long workers sleep between empty polls.
    pub poll_interval: Duration,
}

impl Default for TaskHubConfig {
    fn default() -> Self {
        Self {
            consumer_group: "default".to_string(),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// A durable task queue backed by two SQL tables.
///
/// Register handlers, then call [`TaskHub::run_forever`]; registration
/// afterwards fails. Every registered task gets one polling worker
/// delivering its messages in offset order.
pub struct TaskHub {
    hub_name: String,
    pool: PgPool,
    config: TaskHubConfig,
    registry: Mutex<HashMap<String, TaskDescriber>>,
    running: RwLock<bool>,
}

impl TaskHub {
    /// Create a hub persisting under `<hub_name>_messages*` tables.
    pub fn new(hub_name: &str, pool: PgPool, config: TaskHubConfig) -> Arc<Self> {
        Arc::new(Self {
            hub_name: hub_name.to_string(),
            pool,
            config,
            registry: Mutex::new(HashMap::new()),
            running: RwLock::new(false),
        })
    }

    /// The hub name, prefix of its tables.
    pub fn name(&self) -> &str {
        &self.hub_name
    }

    /// The DDL this hub expects; execution is the host's concern.
    pub fn schema_statements(&self) -> [String; 2] {
        crate::schema::schema_statements(&self.hub_name)
    }

    fn messages_table(&self) -> String {
        format!("{}_messages", self.hub_name)
    }

    fn offsets_table(&self) -> String {
        format!("{}_messages_offsets", self.hub_name)
    }

    /// Register a task; fails on duplicate names or a running hub.
    pub fn register(&self, describer: TaskDescriber) -> Result<String> {
        {
            let running = self.running.read().expect("running lock poisoned");
            if *running {
                return Err(TaskError::AlreadyRunning);
            }
        }

        let mut registry = self.registry.lock().expect("registry lock poisoned");
        if registry.contains_key(&describer.name) {
            return Err(TaskError::DuplicateTask(describer.name.clone()));
        }
        let name = describer.name.clone();
        registry.insert(name.clone(), describer);
        Ok(name)
    }

    /// Register a task, panicking on failure.
    pub fn must_register(&self, describer: TaskDescriber) -> String {
        match self.register(describer) {
            Ok(name) => name,
            Err(error) => panic!("task registration failed: {error}"),
        }
    }

    /// Persist one emission for `name`.
    ///
    /// The payload is the JSON envelope `{task_name, input}`; the
    /// topic equals the task name.
    pub async fn emit(&self, name: &str, input: RawExtension) -> Result<()> {
        let request = EmitTaskRequest {
            task_name: name.to_string(),
            input,
        };
        let payload = serde_json::to_string(&request)?;
        let uuid = Uuid::new_v4().to_string();

        sqlx::query(&format!(
            "INSERT INTO {} (topic, uuid, payload, metadata) VALUES ($1, $2, $3, $4)",
            self.messages_table()
        ))
        .bind(name)
        .bind(uuid)
        .bind(payload)
        .bind("{}")
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Run one polling worker per registered task until `ctx` is
    /// cancelled and the workers drain.
    pub async fn run_forever(self: &Arc<Self>, ctx: CancellationToken) -> Result<()> {
        {
            let mut running = self.running.write().expect("running lock poisoned");
            *running = true;
        }

        let describers: Vec<TaskDescriber> = {
            let registry = self.registry.lock().expect("registry lock poisoned");
            registry.values().cloned().collect()
        };

        let mut workers = JoinSet::new();
        for describer in describers {
            let hub = self.clone();
            let ctx = ctx.clone();
            workers.spawn(async move {
                hub.subscriber_loop(ctx, describer).await;
            });
        }

        while workers.join_next().await.is_some() {}

        {
            let mut running = self.running.write().expect("running lock poisoned");
            *running = false;
        }
        Ok(())
    }

    async fn subscriber_loop(&self, ctx: CancellationToken, describer: TaskDescriber) {
        info!(hub = %self.hub_name, task = %describer.name, "task worker started");
        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(hub = %self.hub_name, task = %describer.name,
                        "stop processing task, context cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    // Drain the backlog before sleeping again.
                    loop {
                        match self.poll_once(&ctx, &describer).await {
                            Ok(true) => continue,
                            Ok(false) => break,
                            Err(error) => {
                                error!(hub = %self.hub_name, task = %describer.name,
                                    error = %error, "task poll failed");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Deliver at most one message; true when one was consumed.
    async fn poll_once(&self, ctx: &CancellationToken, describer: &TaskDescriber) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Read the durable offset under a row lock so racing consumers
        // of the same group serialize here.
        let acked: i64 = sqlx::query_scalar(&format!(
            "SELECT COALESCE((SELECT offset_acked FROM {} \
             WHERE consumer_group = $1 AND topic = $2 FOR UPDATE), 0)",
            self.offsets_table()
        ))
        .bind(&self.config.consumer_group)
        .bind(&describer.name)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT offset_msg, uuid, payload, metadata FROM {} \
             WHERE offset_msg > $1 AND topic = $2 ORDER BY offset_msg ASC LIMIT 1",
            self.messages_table()
        ))
        .bind(acked)
        .bind(&describer.name)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(false);
        };
        let offset: i64 = row.get("offset_msg");
        let payload: String = row.get("payload");

        // offset_consumed records receipt for race debugging only; the
        // next-offset query never reads it.
        sqlx::query(&format!(
            "INSERT INTO {} (consumer_group, topic, offset_consumed) VALUES ($1, $2, $3) \
             ON CONFLICT (consumer_group, topic) \
             DO UPDATE SET offset_consumed = EXCLUDED.offset_consumed",
            self.offsets_table()
        ))
        .bind(&self.config.consumer_group)
        .bind(&describer.name)
        .bind(offset)
        .execute(&mut *tx)
        .await?;

        let request: EmitTaskRequest = match serde_json::from_str(&payload) {
            Ok(request) => request,
            Err(error) => {
                // A payload that never decodes would redeliver forever;
                // ack it and move on.
                error!(hub = %self.hub_name, task = %describer.name, error = %error,
                    "scan message payload failed, acknowledging poison message");
                self.ack(&mut tx, &describer.name, offset).await?;
                tx.commit().await?;
                return Ok(true);
            }
        };

        if !describer.config.ack_late {
            self.ack(&mut tx, &describer.name, offset).await?;
            tx.commit().await?;
            let _ = self.invoke(ctx, describer, request.input).await;
            return Ok(true);
        }

        // Ack-late: the handler runs first. A panic rolls the
        // transaction back, leaving the message for redelivery.
        match self.invoke(ctx, describer, request.input).await {
            Ok(()) => {
                self.ack(&mut tx, &describer.name, offset).await?;
                tx.commit().await?;
            }
            Err(Panicked) => {
                drop(tx);
            }
        }
        Ok(true)
    }

    async fn ack(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        topic: &str,
        offset: i64,
    ) -> Result<()> {
        sqlx::query(&format!(
            "UPDATE {} SET offset_acked = $1 WHERE consumer_group = $2 AND topic = $3",
            self.offsets_table()
        ))
        .bind(offset)
        .bind(&self.config.consumer_group)
        .bind(topic)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Invoke the handler with panic protection. Handler errors are
    /// logged and count as completion; only a panic is surfaced.
    async fn invoke(
        &self,
        ctx: &CancellationToken,
        describer: &TaskDescriber,
        input: RawExtension,
    ) -> std::result::Result<(), Panicked> {
        let outcome = std::panic::AssertUnwindSafe(describer.task.run(ctx.clone(), input))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                error!(hub = %self.hub_name, task = %describer.name, error = %error,
                    "execute task func failed");
                Ok(())
            }
            Err(_) => {
                error!(hub = %self.hub_name, task = %describer.name,
                    "panic occurred in task handler");
                Err(Panicked)
            }
        }
    }
}

struct Panicked;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::{TaskConfig, TaskFn};

    fn lazy_hub() -> Arc<TaskHub> {
        // Construction only; no queries are issued in these tests.
        let pool = PgPool::connect_lazy("postgres://localhost/flywheel_unit").expect("lazy pool");
        TaskHub::new("jobs", pool, TaskHubConfig::default())
    }

    fn noop_describer(name: &str) -> TaskDescriber {
        TaskDescriber::new(
            name,
            Arc::new(TaskFn(|_ctx, _input| async { Ok(()) })),
            TaskConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let hub = lazy_hub();
        hub.register(noop_describer("sync")).unwrap();
        let err = hub.register(noop_describer("sync")).unwrap_err();
        assert!(matches!(err, TaskError::DuplicateTask(name) if name == "sync"));
    }

    #[tokio::test]
    async fn test_register_while_running_fails() {
        let hub = lazy_hub();
        hub.register(noop_describer("sync")).unwrap();

        let ctx = CancellationToken::new();
        let runner = {
            let hub = hub.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { hub.run_forever(ctx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = hub.register(noop_describer("other")).unwrap_err();
        assert!(matches!(err, TaskError::AlreadyRunning));

        ctx.cancel();
        runner.await.unwrap().unwrap();

        // After shutdown registration opens up again.
        hub.register(noop_describer("other")).unwrap();
    }

    #[tokio::test]
    async fn test_table_names() {
        let hub = lazy_hub();
        assert_eq!(hub.messages_table(), "jobs_messages");
        assert_eq!(hub.offsets_table(), "jobs_messages_offsets");
    }
}
