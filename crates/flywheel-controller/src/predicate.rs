// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event filters applied before enqueuing.
//!
//! A source applies its predicates as a conjunction: an event is
//! dropped unless every predicate accepts it. All methods default to
//! accepting, so a predicate implements only the event kinds it cares
//! about.

use crate::event::{CreateEvent, DeleteEvent, GenericEvent, UpdateEvent};

/// Filters events before they reach the event handler.
pub trait Predicate: Send + Sync {
    /// Whether a create event should be processed.
    fn create(&self, _event: &CreateEvent) -> bool {
        true
    }

    /// Whether a delete event should be processed.
    fn delete(&self, _event: &DeleteEvent) -> bool {
        true
    }

    /// Whether an update event should be processed.
    fn update(&self, _event: &UpdateEvent) -> bool {
        true
    }

    /// Whether a generic event should be processed.
    fn generic(&self, _event: &GenericEvent) -> bool {
        true
    }
}

/// Closure type filtering create events.
pub type CreateFn = Box<dyn Fn(&CreateEvent) -> bool + Send + Sync>;
/// Closure type filtering delete events.
pub type DeleteFn = Box<dyn Fn(&DeleteEvent) -> bool + Send + Sync>;
/// Closure type filtering update events.
pub type UpdateFn = Box<dyn Fn(&UpdateEvent) -> bool + Send + Sync>;
/// Closure type filtering generic events.
pub type GenericFn = Box<dyn Fn(&GenericEvent) -> bool + Send + Sync>;

/// A predicate assembled from optional closures; absent closures accept.
#[derive(Default)]
pub struct PredicateFns {
    /// Filter for create events.
    pub create_fn: Option<CreateFn>,
    /// Filter for delete events.
    pub delete_fn: Option<DeleteFn>,
    /// Filter for update events.
    pub update_fn: Option<UpdateFn>,
    /// Filter for generic events.
    pub generic_fn: Option<GenericFn>,
}

impl Predicate for PredicateFns {
    fn create(&self, event: &CreateEvent) -> bool {
        self.create_fn.as_ref().map_or(true, |f| f(event))
    }

    fn delete(&self, event: &DeleteEvent) -> bool {
        self.delete_fn.as_ref().map_or(true, |f| f(event))
    }

    fn update(&self, event: &UpdateEvent) -> bool {
        self.update_fn.as_ref().map_or(true, |f| f(event))
    }

    fn generic(&self, event: &GenericEvent) -> bool {
        self.generic_fn.as_ref().map_or(true, |f| f(event))
    }
}
