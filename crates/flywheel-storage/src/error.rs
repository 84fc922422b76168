// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the storage layer.

use thiserror::Error;

/// Result type using StorageError.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by stores, the selector pipeline, and the watch bus.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// No row exists for the requested key.
    #[error("{type_name} {key:?} not found")]
    NotFound {
        /// Logical type name of the model.
        type_name: String,
        /// The key that was not found.
        key: String,
    },

    /// A row with the same key already exists.
    #[error("{type_name} {key:?} already exists")]
    AlreadyExists {
        /// Logical type name of the model.
        type_name: String,
        /// The duplicate key.
        key: String,
    },

    /// The revision in the request does not match the stored revision.
    #[error(
        "the resource version in the request does not equal the stored version, \
         likely a concurrent conflict"
    )]
    ConcurrentConflict,

    /// A selector referenced a column the model does not have.
    #[error("no such field {field:?}")]
    FieldNotFound {
        /// The unknown column name.
        field: String,
    },

    /// The operator cannot be applied to the column's kind.
    #[error("operator {operator:?} is not supported for column {column:?} of kind {kind}")]
    UnsupportedOperator {
        /// The rejected operator.
        operator: String,
        /// The column the requirement addressed.
        column: String,
        /// The column kind that rejected the operator.
        kind: String,
    },

    /// A selector literal failed typed coercion.
    #[error("invalid value {value:?} for column {column:?}: {reason}")]
    InvalidValue {
        /// The column whose kind drove the coercion.
        column: String,
        /// The literal that failed to coerce.
        value: String,
        /// Why the coercion failed.
        reason: String,
    },

    /// An operator was given the wrong number of values.
    #[error("operator {operator:?} requires {expected}")]
    BadValueCount {
        /// The operator with the arity violation.
        operator: String,
        /// Description of the expected arity.
        expected: &'static str,
    },

    /// The revision column held non-numeric content.
    #[error("the revision must be a number, got {value:?}")]
    InvalidRevision {
        /// The offending revision token.
        value: String,
    },

    /// The store configuration does not match the model.
    #[error("invalid store config: {0}")]
    Config(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Event payload serialization or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// True when the error is a missing-row error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when the error is a duplicate-key error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// True when the error is a stale-revision conflict.
    pub fn is_concurrent_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentConflict)
    }
}
