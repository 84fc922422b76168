// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed events routed from sources to event handlers.

use flywheel_apis::Object;

/// A type-erased API object carried by an event.
pub type ObjectRef = Box<dyn Object>;

/// An object was created.
pub struct CreateEvent {
    /// The created object.
    pub object: ObjectRef,
}

/// An object was updated.
pub struct UpdateEvent {
    /// The new state of the object.
    pub object_new: ObjectRef,
}

/// An object was deleted.
pub struct DeleteEvent {
    /// The terminal state of the object.
    pub object: ObjectRef,

    /// True when the delete itself was missed and only inferred.
    pub delete_state_unknown: bool,
}

/// An event with no storage origin: timer ticks, external pokes.
#[derive(Default)]
pub struct GenericEvent {
    /// The subject object, when one exists.
    pub object: Option<ObjectRef>,
}
