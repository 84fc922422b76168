// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flywheel APIs - Object Model and Wire Types
//!
//! This crate defines the API-side object model shared by every other
//! flywheel crate: the [`Object`] contract with its embeddable
//! [`ObjectMeta`], the process-wide [`Scheme`] that maps kind names to
//! runtime types, the [`RawExtension`] JSON-transparent wrapper, and the
//! [`Status`] envelope used for every error response.
//!
//! # Object contract
//!
//! Concrete API types compose an [`ObjectMeta`] and implement [`Object`]
//! explicitly; the [`impl_object!`] macro generates the delegating
//! implementation:
//!
//! ```
//! use flywheel_apis::{impl_object, ObjectMeta};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(flatten)]
//!     pub metadata: ObjectMeta,
//!     pub email: String,
//! }
//!
//! impl_object!(User);
//! ```
//!
//! # Modules
//!
//! - [`error`]: `Status`-carrying error type with per-kind constructors
//! - [`extension`]: deferred-decoding JSON wrapper
//! - [`object`]: `Object` trait, `ObjectMeta`, list and status types
//! - [`scheme`]: kind name registry

#![deny(missing_docs)]

/// Status-carrying API errors with HTTP code mapping.
pub mod error;

/// JSON-transparent extension wrapper for deferred decoding.
pub mod extension;

/// The Object contract, ObjectMeta, and list/status wire types.
pub mod object;

/// Kind name <-> runtime type registry.
pub mod scheme;

pub use error::StatusError;
pub use extension::RawExtension;
pub use object::{ListOptions, Object, ObjectList, ObjectMeta, Status};
pub use scheme::Scheme;
