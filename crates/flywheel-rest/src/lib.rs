// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flywheel REST - Resource Surface over Typed Stores
//!
//! This crate turns a [`flywheel_storage::Store`] into an API resource:
//! it converts between the API object and the storage row, dispatches
//! the admission chain before every write, maps storage errors to the
//! `Status` wire envelope, pages lists, and exposes the whole thing as
//! an axum router.
//!
//! # Request flow
//!
//! ```text
//! HTTP ──▶ handler ──▶ RestApi ──▶ admission (validate, then mutate)
//!                         │
//!                         ├──▶ Converter (api <-> storage)
//!                         └──▶ Store (revision-checked write + event)
//! ```
//!
//! # Modules
//!
//! - [`admission`]: pluggable validate/mutate chain
//! - [`convert`]: api <-> storage object conversion
//! - [`core`](crate::core): the `RestApi` operations
//! - [`handler`]: axum resource router
//! - [`watch`]: converter-aware watch channel

#![deny(missing_docs)]

/// Validate/mutate admission chain invoked before writes.
pub mod admission;

/// Conversion between API objects and storage rows.
pub mod convert;

/// Resource operations: get, list, create, update, delete, watch.
pub mod core;

/// Per-resource axum router with the Status error envelope.
pub mod handler;

/// Api-level watch channel with type-erased objects.
pub mod watch;

pub use admission::{AdmissionChain, AdmissionHandler, Attributes, Operation};
pub use convert::Converter;
pub use crate::core::RestApi;
pub use handler::router;
pub use watch::{WatchChannel, WatchEvent};
