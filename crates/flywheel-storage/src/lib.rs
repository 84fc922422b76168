// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flywheel Storage - Typed CRUD over Postgres with Change Publication
//!
//! This crate implements the storage half of the framework: a generic
//! [`Store`] over any [`Record`] model, with per-row optimistic
//! concurrency, a label-selector query pipeline, and an in-process
//! [`WatchBus`] that fans out a typed event for every committed
//! mutation.
//!
//! # Pipeline
//!
//! ```text
//! selector string ──parse──▶ [Requirement] ──compile──▶ [Condition] ──▶ WHERE ...
//!                              (selector)     (query)      (sqlx binds)
//! ```
//!
//! Every mutating operation runs in a single transaction. The change
//! event payload is serialized inside the transaction (a serialization
//! failure aborts it) and handed to the bus only after the commit
//! succeeds, so subscribers never observe an uncommitted mutation. For
//! one key, events arrive in commit order; across keys no order is
//! implied.
//!
//! # Modules
//!
//! - [`catalog`]: per-model column descriptors and the `Record` contract
//! - [`error`]: storage error kinds
//! - [`query`]: requirement-to-condition compiler with typed coercion
//! - [`selector`]: label-selector grammar and requirements
//! - [`store`]: the CRUD store
//! - [`watch`]: per-kind publish/subscribe

#![deny(missing_docs)]

/// Column descriptors, field catalog, and the model contract.
pub mod catalog;

/// Storage error kinds.
pub mod error;

/// Compiles requirements into backend conditions.
pub mod query;

/// Label-selector parsing into requirements.
pub mod selector;

/// Generic CRUD store with revision checks and event publication.
pub mod store;

/// In-process per-kind pub/sub for change events.
pub mod watch;

pub use catalog::{ColumnDef, ColumnKind, FieldCatalog, FieldValue, Record};
pub use error::StorageError;
pub use query::{CompareOp, Condition, ParseToTime, QueryCompiler};
pub use selector::{parse, Operator, ParseError, Requirement};
pub use store::{ListOptions, Store, StoreConfig};
pub use watch::{Channel, Event, EventType, WatchBus};
