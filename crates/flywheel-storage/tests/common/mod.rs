// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for storage integration tests.
//!
//! Tests connect to the database named by `TEST_FLYWHEEL_DATABASE_URL`
//! and skip silently when it is not set.

#![allow(dead_code)]

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};

use flywheel_storage::{ColumnDef, ColumnKind, FieldValue, Record, Store, StoreConfig, WatchBus};

// Tests share one table; run them one at a time.
static TEST_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Storage model used across the integration tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AppRow {
    pub name: String,
    pub revision: String,
    pub env: String,
    pub replicas: i32,
}

static APP_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", ColumnKind::Text),
    ColumnDef::new("revision", ColumnKind::Text),
    ColumnDef::new("env", ColumnKind::Text),
    ColumnDef::new("replicas", ColumnKind::Int),
];

impl Record for AppRow {
    const TABLE: &'static str = "flywheel_test_apps";
    const TYPE_NAME: &'static str = "App";

    fn columns() -> &'static [ColumnDef] {
        APP_COLUMNS
    }

    fn column_value(&self, column: &str) -> Option<FieldValue> {
        match column {
            "name" => Some(FieldValue::Text(self.name.clone())),
            "revision" => Some(FieldValue::Text(self.revision.clone())),
            "env" => Some(FieldValue::Text(self.env.clone())),
            "replicas" => Some(FieldValue::Int(i64::from(self.replicas))),
            _ => None,
        }
    }

    fn set_text(&mut self, column: &str, value: &str) -> bool {
        match column {
            "name" => self.name = value.to_string(),
            "revision" => self.revision = value.to_string(),
            "env" => self.env = value.to_string(),
            _ => return false,
        }
        true
    }
}

pub fn app(name: &str, env: &str, replicas: i32) -> AppRow {
    AppRow {
        name: name.to_string(),
        revision: String::new(),
        env: env.to_string(),
        replicas,
    }
}

/// Test context owning the pool, bus, and a ready store.
pub struct TestContext {
    pub pool: PgPool,
    pub bus: WatchBus,
    pub store: Store<AppRow>,
    _guard: MutexGuard<'static, ()>,
}

impl TestContext {
    /// Connect and reset the test table; `None` when the database URL
    /// environment variable is not set.
    pub async fn new() -> Option<Self> {
        let database_url = match std::env::var("TEST_FLYWHEEL_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_FLYWHEEL_DATABASE_URL not set, skipping");
                return None;
            }
        };

        let guard = TEST_LOCK.get_or_init(|| Mutex::new(())).lock().await;

        let pool = PgPool::connect(&database_url)
            .await
            .expect("failed to connect to test database");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flywheel_test_apps (
                name TEXT PRIMARY KEY,
                revision TEXT NOT NULL DEFAULT '',
                env TEXT NOT NULL DEFAULT '',
                replicas INT NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await
        .expect("failed to create test table");

        sqlx::query("TRUNCATE flywheel_test_apps")
            .execute(&pool)
            .await
            .expect("failed to truncate test table");

        let bus = WatchBus::default();
        let store = Store::new(
            pool.clone(),
            bus.clone(),
            StoreConfig {
                key_column: "name",
                revision_column: Some("revision"),
                parse_to_time: None,
            },
        )
        .expect("failed to build store");

        Some(Self {
            pool,
            bus,
            store,
            _guard: guard,
        })
    }
}
