// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-model column metadata and the model contract.
//!
//! A storage model declares its table, its columns, and typed accessors
//! once; the catalog built from that declaration drives the query
//! compiler and the store's column lists.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgRow;

use crate::error::StorageError;

/// The backend-facing kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ColumnKind {
    /// Character data.
    Text,
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    BigInt,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Boolean.
    Bool,
    /// Timestamp with time zone.
    Timestamp,
}

impl ColumnKind {
    /// Human-readable kind name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::SmallInt => "smallint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one persisted column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    /// The column name in the backing table.
    pub name: &'static str,
    /// The column's kind, driving selector coercion.
    pub kind: ColumnKind,
    /// Autoincrement columns are excluded from inserts and updates.
    pub auto_increment: bool,
}

impl ColumnDef {
    /// Declare a plain column.
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            auto_increment: false,
        }
    }

    /// Mark the column as autoincrement.
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

/// A typed scalar carried from coercion into backend binds.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FieldValue {
    /// Character data.
    Text(String),
    /// Any integer width, widened to 64 bits for transport.
    Int(i64),
    /// Any float width, widened to 64 bits for transport.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Timestamp with time zone.
    Timestamp(DateTime<Utc>),
    /// SQL NULL.
    Null,
}

/// The contract a storage model fulfills.
///
/// This is the explicit-registration replacement for tag reflection:
/// each model names its table and columns and exposes column accessors
/// the store uses to read values for binds and to write the key and
/// revision strings back.
pub trait Record:
    Clone
    + Default
    + Send
    + Sync
    + Unpin
    + Serialize
    + DeserializeOwned
    + for<'r> sqlx::FromRow<'r, PgRow>
    + 'static
{
    /// The backing table name.
    const TABLE: &'static str;

    /// The logical type name, used for watch topics and error messages.
    const TYPE_NAME: &'static str;

    /// All persisted columns of the model.
    fn columns() -> &'static [ColumnDef];

    /// Read the value of one column for binding; `None` for unknown names.
    fn column_value(&self, column: &str) -> Option<FieldValue>;

    /// Write a text column; returns false for unknown or non-text names.
    fn set_text(&mut self, column: &str, value: &str) -> bool;
}

/// Name -> typed column descriptor for one model.
///
/// Built once at store construction. Lookups are case-preserving;
/// unknown names yield [`StorageError::FieldNotFound`].
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    by_name: HashMap<&'static str, ColumnDef>,
    update_columns: Vec<&'static str>,
}

impl FieldCatalog {
    /// Build the catalog for model `T`.
    pub fn of<T: Record>() -> Self {
        Self::from_columns(T::columns())
    }

    /// Build the catalog from an explicit column list.
    pub fn from_columns(columns: &'static [ColumnDef]) -> Self {
        let mut by_name = HashMap::with_capacity(columns.len());
        let mut update_columns = Vec::with_capacity(columns.len());
        for column in columns {
            by_name.insert(column.name, *column);
            if !column.auto_increment {
                update_columns.push(column.name);
            }
        }
        Self {
            by_name,
            update_columns,
        }
    }

    /// Look up a column by name.
    pub fn get(&self, name: &str) -> Result<ColumnDef, StorageError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::FieldNotFound {
                field: name.to_string(),
            })
    }

    /// Whether the catalog contains `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// The columns written on insert and update, autoincrement excluded.
    pub fn update_columns(&self) -> &[&'static str] {
        &self.update_columns
    }
}
