// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Generic CRUD store with optimistic concurrency and change events.
//!
//! Every mutation runs in one transaction. The event payload is
//! serialized before the commit (a failure aborts the transaction) and
//! fanned out only after the commit succeeds, so a subscriber never
//! observes an uncommitted row. For a given key, events follow commit
//! order.

use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::warn;

use crate::catalog::{ColumnKind, FieldCatalog, FieldValue, Record};
use crate::error::StorageError;
use crate::query::{append_where, push_bind_value, ParseToTime, QueryCompiler};
use crate::selector::Requirement;
use crate::watch::{Channel, EventType, WatchBus};

/// Postgres error code for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Store construction parameters.
///
/// `key_column` must name a unique text column. `revision_column`, when
/// set, names a text column with numeric content used for the
/// optimistic lock; without it concurrent updates and deletes are
/// unguarded. `parse_to_time` supplies the selector time format.
#[derive(Clone, Default)]
pub struct StoreConfig {
    /// The unique key column.
    pub key_column: &'static str,
    /// The optimistic-lock revision column.
    pub revision_column: Option<&'static str>,
    /// Parser for selector time literals.
    pub parse_to_time: Option<ParseToTime>,
}

/// Paging and filtering for [`Store::get_list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Rows to skip.
    pub offset: i64,
    /// Page size; zero means no cap.
    pub limit: i64,
    /// Compiled-from-selector requirements, ANDed together.
    pub requirements: Vec<Requirement>,
}

/// Hook run on objects about to be inserted.
pub type OnCreate<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// Hook run on updates with the freshly fetched old row and the new object.
pub type OnUpdate<T> = Box<dyn Fn(&T, &mut T) + Send + Sync>;

/// CRUD store over one [`Record`] model.
pub struct Store<T: Record> {
    pool: PgPool,
    bus: WatchBus,
    catalog: FieldCatalog,
    compiler: QueryCompiler,
    key_column: &'static str,
    revision_column: Option<&'static str>,
    on_create: Vec<OnCreate<T>>,
    on_update: Vec<OnUpdate<T>>,
}

impl<T: Record> Store<T> {
    /// Build a store, validating the configured columns against the model.
    pub fn new(pool: PgPool, bus: WatchBus, config: StoreConfig) -> Result<Self, StorageError> {
        let catalog = FieldCatalog::of::<T>();

        let key = catalog.get(config.key_column).map_err(|_| {
            StorageError::Config(format!(
                "{} has no column named {:?}",
                T::TYPE_NAME,
                config.key_column
            ))
        })?;
        if key.kind != ColumnKind::Text {
            return Err(StorageError::Config(format!(
                "key column {:?} of {} must be text",
                config.key_column,
                T::TYPE_NAME
            )));
        }

        if let Some(revision) = config.revision_column {
            let column = catalog.get(revision).map_err(|_| {
                StorageError::Config(format!(
                    "{} has no column named {:?}",
                    T::TYPE_NAME,
                    revision
                ))
            })?;
            if column.kind != ColumnKind::Text {
                return Err(StorageError::Config(format!(
                    "revision column {:?} of {} must be text",
                    revision,
                    T::TYPE_NAME
                )));
            }
        }

        let compiler = QueryCompiler::new(catalog.clone(), config.parse_to_time.clone());
        Ok(Self {
            pool,
            bus,
            catalog,
            compiler,
            key_column: config.key_column,
            revision_column: config.revision_column,
            on_create: Vec::new(),
            on_update: Vec::new(),
        })
    }

    /// Register a hook run before every insert; may mutate the object.
    pub fn on_create(&mut self, hook: impl Fn(&mut T) + Send + Sync + 'static) {
        self.on_create.push(Box::new(hook));
    }

    /// Register a hook run before every update with the stored old row.
    pub fn on_update(&mut self, hook: impl Fn(&T, &mut T) + Send + Sync + 'static) {
        self.on_update.push(Box::new(hook));
    }

    /// Subscribe to this model's change events.
    pub fn watch(&self) -> Channel<T> {
        self.bus.watch(T::TYPE_NAME)
    }

    /// The bus this store publishes to.
    pub fn bus(&self) -> &WatchBus {
        &self.bus
    }

    fn key_of(&self, obj: &T) -> String {
        match obj.column_value(self.key_column) {
            Some(FieldValue::Text(key)) => key,
            _ => String::new(),
        }
    }

    fn revision_of(&self, obj: &T) -> String {
        match self.revision_column.and_then(|c| obj.column_value(c)) {
            Some(FieldValue::Text(revision)) => revision,
            _ => String::new(),
        }
    }

    fn not_found(&self, key: &str) -> StorageError {
        StorageError::NotFound {
            type_name: T::TYPE_NAME.to_string(),
            key: key.to_string(),
        }
    }

    /// Fetch one object by key.
    pub async fn get(&self, key: &str) -> Result<T, StorageError> {
        let mut query = QueryBuilder::new(format!(
            "SELECT * FROM {} WHERE {} = ",
            T::TABLE,
            self.key_column
        ));
        query.push_bind(key.to_string());
        let row = query.build().fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(T::from_row(&row)?),
            None => Err(self.not_found(key)),
        }
    }

    /// Fetch a page of objects plus the total count of matching rows.
    ///
    /// The count ignores paging so the caller can decide whether more
    /// rows remain (`offset + limit < count`).
    pub async fn get_list(&self, opts: ListOptions) -> Result<(Vec<T>, i64), StorageError> {
        let conditions = self.compiler.compile(&opts.requirements)?;

        let mut count_query = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", T::TABLE));
        append_where(&mut count_query, &conditions);
        let count: i64 = count_query.build().fetch_one(&self.pool).await?.get(0);

        let mut query = QueryBuilder::new(format!("SELECT * FROM {}", T::TABLE));
        append_where(&mut query, &conditions);
        query.push(format!(" ORDER BY {} ASC", self.key_column));
        if opts.limit > 0 {
            query.push(" LIMIT ");
            query.push_bind(opts.limit);
        }
        if opts.offset > 0 {
            query.push(" OFFSET ");
            query.push_bind(opts.offset);
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(T::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((items, count))
    }

    /// Insert a new object and publish `Created`.
    ///
    /// Create hooks run first and may mutate the object; the revision
    /// column, when configured, is forced to `"1"`.
    pub async fn create(&self, mut obj: T) -> Result<T, StorageError> {
        for hook in &self.on_create {
            hook(&mut obj);
        }
        if let Some(revision) = self.revision_column {
            obj.set_text(revision, "1");
        }

        let mut tx = self.pool.begin().await?;

        let columns = self.catalog.update_columns();
        let mut insert = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            T::TABLE,
            columns.join(", ")
        ));
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                insert.push(", ");
            }
            let value = obj.column_value(column).unwrap_or(FieldValue::Null);
            push_bind_value(&mut insert, &value);
        }
        insert.push(")");

        if let Err(error) = insert.build().execute(&mut *tx).await {
            if is_unique_violation(&error) {
                return Err(StorageError::AlreadyExists {
                    type_name: T::TYPE_NAME.to_string(),
                    key: self.key_of(&obj),
                });
            }
            return Err(error.into());
        }

        let payload = serde_json::to_string(&obj)?;
        tx.commit().await?;
        self.bus
            .send_serialized(T::TYPE_NAME, EventType::Created, payload);
        Ok(obj)
    }

    /// Update the object stored under `key` and publish `Updated`.
    ///
    /// When the object carries a revision, the write is conditioned on
    /// it and the stored revision advances by one; with an empty
    /// revision the update is blind and the stored revision is kept.
    pub async fn update(&self, key: &str, obj: &mut T) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let old = self
            .fetch_in_tx(&mut tx, key)
            .await?
            .ok_or_else(|| self.not_found(key))?;
        for hook in &self.on_update {
            hook(&old, obj);
        }

        let revision_requested = self.revision_of(obj);
        let mut write_revision = false;
        if let Some(revision_column) = self.revision_column {
            if !revision_requested.is_empty() {
                let current: i64 = revision_requested.parse().map_err(|_| {
                    StorageError::InvalidRevision {
                        value: revision_requested.clone(),
                    }
                })?;
                obj.set_text(revision_column, &(current + 1).to_string());
                write_revision = true;
            }
        }

        let mut update = QueryBuilder::new(format!("UPDATE {} SET ", T::TABLE));
        let mut first = true;
        for column in self.catalog.update_columns() {
            if !write_revision && Some(*column) == self.revision_column {
                continue;
            }
            if !first {
                update.push(", ");
            }
            first = false;
            update.push(format!("{column} = "));
            let value = obj.column_value(column).unwrap_or(FieldValue::Null);
            push_bind_value(&mut update, &value);
        }
        update.push(format!(" WHERE {} = ", self.key_column));
        update.push_bind(key.to_string());
        if !revision_requested.is_empty() {
            if let Some(revision_column) = self.revision_column {
                update.push(format!(" AND {revision_column} = "));
                update.push_bind(revision_requested.clone());
            }
        }

        let affected = update.build().execute(&mut *tx).await?.rows_affected();
        if affected != 1 {
            match self
                .classify_zero_rows(&mut tx, key, &revision_requested)
                .await?
            {
                ZeroRows::Missing => return Err(self.not_found(key)),
                ZeroRows::StaleRevision => return Err(StorageError::ConcurrentConflict),
                ZeroRows::Matched(_) => {
                    warn!(
                        type_name = T::TYPE_NAME,
                        key,
                        "update matched the stored revision but changed no rows, \
                         treating as idempotent no-op"
                    );
                    tx.commit().await?;
                    return Ok(());
                }
            }
        }

        let payload = serde_json::to_string(obj)?;
        tx.commit().await?;
        self.bus
            .send_serialized(T::TYPE_NAME, EventType::Updated, payload);
        Ok(())
    }

    /// Delete the object stored under `key` and publish `Deleted`.
    ///
    /// When `obj` carries a revision the delete is conditioned on it.
    /// The returned object is the terminal row read back from the
    /// delete, and is also the event payload.
    pub async fn delete(&self, key: &str, obj: Option<T>) -> Result<T, StorageError> {
        let mut obj = obj.unwrap_or_default();
        obj.set_text(self.key_column, key);
        let revision_requested = self.revision_of(&obj);

        let mut tx = self.pool.begin().await?;

        let mut delete = QueryBuilder::new(format!(
            "DELETE FROM {} WHERE {} = ",
            T::TABLE,
            self.key_column
        ));
        delete.push_bind(key.to_string());
        if !revision_requested.is_empty() {
            if let Some(revision_column) = self.revision_column {
                delete.push(format!(" AND {revision_column} = "));
                delete.push_bind(revision_requested.clone());
            }
        }
        delete.push(" RETURNING *");

        let row = delete.build().fetch_optional(&mut *tx).await?;
        match row {
            Some(row) => {
                let deleted = T::from_row(&row)?;
                let payload = serde_json::to_string(&deleted)?;
                tx.commit().await?;
                self.bus
                    .send_serialized(T::TYPE_NAME, EventType::Deleted, payload);
                Ok(deleted)
            }
            None => {
                match self
                    .classify_zero_rows(&mut tx, key, &revision_requested)
                    .await?
                {
                    ZeroRows::Missing => Err(self.not_found(key)),
                    ZeroRows::StaleRevision => Err(StorageError::ConcurrentConflict),
                    ZeroRows::Matched(current) => {
                        warn!(
                            type_name = T::TYPE_NAME,
                            key,
                            "delete matched the stored revision but removed no rows, \
                             treating as idempotent no-op"
                        );
                        tx.commit().await?;
                        Ok(current)
                    }
                }
            }
        }
    }

    async fn fetch_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let mut query = QueryBuilder::new(format!(
            "SELECT * FROM {} WHERE {} = ",
            T::TABLE,
            self.key_column
        ));
        query.push_bind(key.to_string());
        let row = query.build().fetch_optional(&mut **tx).await?;
        Ok(match row {
            Some(row) => Some(T::from_row(&row)?),
            None => None,
        })
    }

    /// Decide why a conditional write touched no rows: the row is gone,
    /// the caller's revision is stale, or the row matches and nothing
    /// needed doing.
    async fn classify_zero_rows(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
        revision_requested: &str,
    ) -> Result<ZeroRows<T>, StorageError> {
        let current = match self.fetch_in_tx(tx, key).await? {
            Some(current) => current,
            None => return Ok(ZeroRows::Missing),
        };
        if !revision_requested.is_empty() && self.revision_of(&current) != revision_requested {
            return Ok(ZeroRows::StaleRevision);
        }
        Ok(ZeroRows::Matched(current))
    }
}

enum ZeroRows<T> {
    Missing,
    StaleRevision,
    Matched(T),
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION)
    )
}
