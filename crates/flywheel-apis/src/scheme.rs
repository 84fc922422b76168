// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-wide registry mapping kind names to runtime types.
//!
//! The scheme is written to during bootstrap and read afterwards; a
//! kind name may be registered at most once.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::object::Object;

/// Scheme registration and lookup errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SchemeError {
    /// A kind name was registered twice.
    #[error("kind {kind:?} already added")]
    AlreadyAdded {
        /// The duplicate kind name.
        kind: String,
    },

    /// A type was looked up before being registered.
    #[error("type {type_name:?} not registered")]
    NotRegistered {
        /// The short name of the unregistered type.
        type_name: String,
    },
}

#[derive(Default)]
struct SchemeInner {
    type_to_kind: HashMap<TypeId, String>,
    kind_to_type: HashMap<String, TypeId>,
}

/// Registry mapping kind name <-> runtime type.
///
/// The kind name is derived from the short type name, so `api::User`
/// registers as kind `"User"`.
#[derive(Default)]
pub struct Scheme {
    inner: RwLock<SchemeInner>,
}

impl Scheme {
    /// Create an empty scheme.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its short type name.
    pub fn add_known_type<T: Object + 'static>(&self) -> Result<(), SchemeError> {
        let kind = short_type_name::<T>();
        let mut inner = self.inner.write().expect("scheme lock poisoned");
        if inner.kind_to_type.contains_key(kind) {
            return Err(SchemeError::AlreadyAdded {
                kind: kind.to_string(),
            });
        }
        inner.kind_to_type.insert(kind.to_string(), TypeId::of::<T>());
        inner.type_to_kind.insert(TypeId::of::<T>(), kind.to_string());
        Ok(())
    }

    /// Look up the kind name registered for `T`.
    pub fn object_kind<T: Object + 'static>(&self) -> Result<String, SchemeError> {
        let inner = self.inner.read().expect("scheme lock poisoned");
        inner
            .type_to_kind
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| SchemeError::NotRegistered {
                type_name: short_type_name::<T>().to_string(),
            })
    }

    /// All registered kind names.
    pub fn all_known_kinds(&self) -> Vec<String> {
        let inner = self.inner.read().expect("scheme lock poisoned");
        inner.kind_to_type.keys().cloned().collect()
    }

    /// Whether `kind` has been registered.
    pub fn has_kind(&self, kind: &str) -> bool {
        let inner = self.inner.read().expect("scheme lock poisoned");
        inner.kind_to_type.contains_key(kind)
    }
}

fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
