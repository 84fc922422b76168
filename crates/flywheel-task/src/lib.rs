// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flywheel Task - Durable SQL-Backed Task Queue
//!
//! A [`TaskHub`] is a polling, at-least-once message bus persisted in
//! two Postgres tables. Handlers register under unique task names
//! before the hub runs; emissions serialize a JSON envelope into the
//! messages table; one polling worker per task delivers messages to
//! its handler and advances the durable offset on acknowledge.
//!
//! # Delivery semantics
//!
//! At-least-once. With `ack_late = false` a message is acknowledged
//! before the handler runs, so a handler crash never redelivers. With
//! `ack_late = true` the handler runs first and a panic leaves the
//! offset untouched, so the message is delivered again after restart.
//! Duplicates are possible whenever a crash lands between handler
//! completion and acknowledge; handlers must tolerate them.
//!
//! # Persistence layout
//!
//! For a hub named `jobs`:
//!
//! ```text
//! jobs_messages          (offset_msg BIGSERIAL PK, topic, uuid, payload, metadata)
//! jobs_messages_offsets  (consumer_group, topic, offset_acked, offset_consumed)
//! ```
//!
//! Schema creation stays with the host; [`schema::schema_statements`]
//! supplies the DDL.
//!
//! # Modules
//!
//! - [`describe`]: task traits, describers, the typed task entry
//! - [`hub`]: the hub itself
//! - [`schema`]: persisted table DDL

#![deny(missing_docs)]

/// Task traits, describers, and the typed entry point.
pub mod describe;

/// The task hub: register, emit, run.
pub mod hub;

/// DDL for the hub's two tables.
pub mod schema;

pub use describe::{
    describe_generic, EmitTaskRequest, GenericTask, Task, TaskConfig, TaskDescriber, TaskEntry,
    TaskFn,
};
pub use hub::{TaskError, TaskHub, TaskHubConfig};
pub use schema::schema_statements;
