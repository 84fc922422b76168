// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Conversion between API objects and storage rows.

use flywheel_apis::{Object, StatusError};
use flywheel_storage::Record;

/// Knows how to convert between an API type and its storage row.
///
/// `from_storage` fills an API object from a stored row; `to_storage`
/// does the reverse before a write. Implementations must keep the key
/// and resource version fields aligned, since the store's optimistic
/// lock reads them from the storage side.
pub trait Converter<A: Object, S: Record>: Send + Sync {
    /// Fill `to` from a stored row.
    fn from_storage(&self, from: &S, to: &mut A) -> Result<(), StatusError>;

    /// Fill `to` from an API object.
    fn to_storage(&self, from: &A, to: &mut S) -> Result<(), StatusError>;
}
