// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the controller runtime.

use thiserror::Error;

/// Controller lifecycle errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ControllerError {
    /// `start` was called on an already-started controller.
    #[error("the controller {0:?} has already started")]
    AlreadyStarted(String),

    /// A one-shot source was started a second time.
    #[error("the source has already been started")]
    SourceAlreadyStarted,
}
