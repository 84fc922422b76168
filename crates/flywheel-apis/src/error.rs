// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API errors carrying the `Status` wire envelope.
//!
//! Every error kind maps to one HTTP code: BadRequest 400,
//! Forbidden 403, NotFound 404, Conflict 409, Internal 500. Conflict
//! responses carry the sub-kind (`AlreadyExists` or
//! `ConcurrentConflict`) as the machine-readable reason.

use std::fmt;

use crate::object::{ObjectMeta, Status, STATUS_FAILURE};

/// Reason for 400 responses.
pub const REASON_BAD_REQUEST: &str = "BadRequest";

/// Reason for 403 responses.
pub const REASON_FORBIDDEN: &str = "Forbidden";

/// Reason for 404 responses.
pub const REASON_NOT_FOUND: &str = "NotFound";

/// Conflict sub-kind: the key is already taken.
pub const REASON_ALREADY_EXISTS: &str = "AlreadyExists";

/// Conflict sub-kind: the revision in the request is stale.
pub const REASON_CONCURRENT_CONFLICT: &str = "ConcurrentConflict";

/// Reason for 500 responses.
pub const REASON_INTERNAL: &str = "Internal";

/// An error whose wire form is the [`Status`] envelope.
#[derive(Debug, Clone)]
pub struct StatusError {
    /// The status returned to the client.
    pub status: Status,
}

impl StatusError {
    fn new(code: u16, reason: &str, message: String) -> Self {
        Self {
            status: Status {
                metadata: ObjectMeta {
                    kind: "Status".to_string(),
                    ..ObjectMeta::default()
                },
                code,
                status: STATUS_FAILURE.to_string(),
                reason: reason.to_string(),
                message,
            },
        }
    }

    /// A 400 response for a malformed request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, REASON_BAD_REQUEST, message.into())
    }

    /// A 403 response for a denied operation.
    pub fn forbidden(operation: &str, kind: &str, key: &str, message: &str) -> Self {
        Self::new(
            403,
            REASON_FORBIDDEN,
            format!("{operation} {kind} {key:?} is forbidden: {message}"),
        )
    }

    /// A 404 response for a missing object.
    pub fn not_found(kind: &str, key: &str) -> Self {
        Self::new(404, REASON_NOT_FOUND, format!("{kind} {key:?} not found"))
    }

    /// A 409 response; `reason` names the conflict sub-kind.
    pub fn conflict(reason: &str, message: impl Into<String>) -> Self {
        Self::new(409, reason, message.into())
    }

    /// A 500 response for an unexpected failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, REASON_INTERNAL, message.into())
    }

    /// The HTTP status code of this error.
    pub fn code(&self) -> u16 {
        self.status.code
    }

    /// The machine-readable reason of this error.
    pub fn reason(&self) -> &str {
        &self.status.reason
    }

    /// True for 400 responses.
    pub fn is_bad_request(&self) -> bool {
        self.status.code == 400
    }

    /// True for 403 responses.
    pub fn is_forbidden(&self) -> bool {
        self.status.code == 403
    }

    /// True for 404 responses.
    pub fn is_not_found(&self) -> bool {
        self.status.code == 404
    }

    /// True for 409 responses.
    pub fn is_conflict(&self) -> bool {
        self.status.code == 409
    }

    /// True for 500 responses.
    pub fn is_internal(&self) -> bool {
        self.status.code == 500
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status.message)
    }
}

impl std::error::Error for StatusError {}
