// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The Object contract and the wire types built on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation status string for failed requests.
pub const STATUS_FAILURE: &str = "Failure";

/// Operation status string for successful requests.
pub const STATUS_SUCCESS: &str = "Success";

/// The contract every API entity fulfills.
///
/// An object is identified by its kind (logical type name) and its key
/// (unique within the kind). The resource version is an opaque numeric
/// token advanced by the storage layer on every update and used for
/// optimistic concurrency.
pub trait Object: Send + Sync {
    /// Unique identifier of the object within its kind.
    fn key(&self) -> &str;

    /// Replace the object key.
    fn set_key(&mut self, key: &str);

    /// Logical type name, filled in by the REST layer from the scheme.
    fn kind(&self) -> &str;

    /// Replace the kind name.
    fn set_kind(&mut self, kind: &str);

    /// Opaque revision token, empty when the object never hit storage.
    fn resource_version(&self) -> &str;
}

/// Common metadata composed into every concrete API type.
///
/// Serialized flattened into the owning object, so the wire shape is
/// `{kind, key, resourceVersion, createTime, updateTime, ...fields}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Logical type name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// Unique identifier within the kind.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,

    /// Opaque monotonic revision token with numeric content.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,

    /// When the object was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,

    /// When the object was last updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata carrying only a key, used for admission on deletes.
    pub fn with_key(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::default()
        }
    }
}

impl Object for ObjectMeta {
    fn key(&self) -> &str {
        &self.key
    }

    fn set_key(&mut self, key: &str) {
        self.key = key.to_string();
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn set_kind(&mut self, kind: &str) {
        self.kind = kind.to_string();
    }

    fn resource_version(&self) -> &str {
        &self.resource_version
    }
}

/// Implement [`Object`] for a type composing an [`ObjectMeta`] in a
/// field named `metadata`.
#[macro_export]
macro_rules! impl_object {
    ($ty:ty) => {
        impl $crate::Object for $ty {
            fn key(&self) -> &str {
                &self.metadata.key
            }

            fn set_key(&mut self, key: &str) {
                self.metadata.key = key.to_string();
            }

            fn kind(&self) -> &str {
                &self.metadata.kind
            }

            fn set_kind(&mut self, kind: &str) {
                self.metadata.kind = kind.to_string();
            }

            fn resource_version(&self) -> &str {
                &self.metadata.resource_version
            }
        }
    };
}

/// Paging and filtering options for list requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOptions {
    /// Maximum number of items to return; zero means no cap.
    #[serde(default)]
    pub limit: i64,

    /// Number of matching rows to skip.
    #[serde(default)]
    pub offset: i64,

    /// Label-selector expression filtering the result set.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selector: String,
}

/// A page of objects together with the total match count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectList<T> {
    /// Total number of matching rows, independent of paging.
    pub count: i64,

    /// True when rows beyond this page remain (`offset + limit < count`).
    pub r#continue: bool,

    /// The rows of this page.
    pub items: Vec<T>,
}

/// Result envelope for operations that return no object, and the wire
/// form of every error response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status {
    /// Carries `kind: "Status"`.
    #[serde(flatten)]
    pub metadata: ObjectMeta,

    /// HTTP status code of the response.
    pub code: u16,

    /// Either `"Success"` or `"Failure"`.
    pub status: String,

    /// Machine-readable description of why the operation is in this status.
    pub reason: String,

    /// Human-readable description.
    pub message: String,
}

impl Status {
    /// A `Success` status with HTTP code 200.
    pub fn success() -> Self {
        Self {
            metadata: ObjectMeta {
                kind: "Status".to_string(),
                ..ObjectMeta::default()
            },
            code: 200,
            status: STATUS_SUCCESS.to_string(),
            reason: String::new(),
            message: String::new(),
        }
    }
}
