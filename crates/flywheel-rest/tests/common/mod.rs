// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for REST integration tests.
//!
//! Tests connect to the database named by `TEST_FLYWHEEL_DATABASE_URL`
//! and skip silently when it is not set.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};

use flywheel_apis::{impl_object, ObjectMeta, Scheme, StatusError};
use flywheel_rest::{Converter, RestApi};
use flywheel_storage::{
    ColumnDef, ColumnKind, FieldValue, Record, Store, StoreConfig, WatchBus,
};

// Tests share one table; run them one at a time.
static TEST_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Storage row backing the test resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
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
    const TABLE: &'static str = "flywheel_rest_apps";
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

/// API object served by the test resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct App {
    #[serde(flatten)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub env: String,
    #[serde(default)]
    pub replicas: i32,
}

impl_object!(App);

/// Straightforward field-by-field converter.
pub struct AppConverter;

impl Converter<App, AppRow> for AppConverter {
    fn from_storage(&self, from: &AppRow, to: &mut App) -> Result<(), StatusError> {
        to.metadata.key = from.name.clone();
        to.metadata.resource_version = from.revision.clone();
        to.env = from.env.clone();
        to.replicas = from.replicas;
        Ok(())
    }

    fn to_storage(&self, from: &App, to: &mut AppRow) -> Result<(), StatusError> {
        to.name = from.metadata.key.clone();
        to.revision = from.metadata.resource_version.clone();
        to.env = from.env.clone();
        to.replicas = from.replicas;
        Ok(())
    }
}

pub fn app(key: &str, env: &str, replicas: i32) -> App {
    App {
        metadata: ObjectMeta::with_key(key),
        env: env.to_string(),
        replicas,
    }
}

/// Test context owning the pool and a ready resource.
pub struct TestContext {
    pub pool: PgPool,
    pub bus: WatchBus,
    pub api: Arc<RestApi<App, AppRow>>,
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
            CREATE TABLE IF NOT EXISTS flywheel_rest_apps (
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

        sqlx::query("TRUNCATE flywheel_rest_apps")
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

        let scheme = Scheme::new();
        scheme.add_known_type::<App>().expect("register App");

        let api = Arc::new(
            RestApi::new("apps", store, &scheme, Arc::new(AppConverter), Vec::new())
                .expect("failed to build resource"),
        );

        Some(Self {
            pool,
            bus,
            api,
            _guard: guard,
        })
    }
}
