// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The resource operations behind the HTTP surface.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use flywheel_apis::error::{REASON_ALREADY_EXISTS, REASON_CONCURRENT_CONFLICT};
use flywheel_apis::{ListOptions, Object, ObjectList, ObjectMeta, Scheme, StatusError};
use flywheel_storage::{selector, Record, StorageError, Store};

use crate::admission::{AdmissionChain, AdmissionHandler, Attributes, Operation};
use crate::convert::Converter;
use crate::watch::WatchChannel;

/// API version served by every resource.
const VERSION: &str = "v1";

/// One REST resource over a typed store.
///
/// `A` is the API object, `S` its storage row. The resource converts
/// between the two, runs admission ahead of writes, tags outgoing
/// objects with their kind, and maps storage errors onto the API error
/// taxonomy.
pub struct RestApi<A, S>
where
    A: Object + Default + Serialize + DeserializeOwned + 'static,
    S: Record,
{
    resource_name: String,
    kind: String,
    store: Store<S>,
    converter: Arc<dyn Converter<A, S>>,
    admission: AdmissionChain,
}

impl<A, S> RestApi<A, S>
where
    A: Object + Default + Serialize + DeserializeOwned + 'static,
    S: Record,
{
    /// Build a resource; `A` must already be registered in the scheme.
    pub fn new(
        resource_name: &str,
        store: Store<S>,
        scheme: &Scheme,
        converter: Arc<dyn Converter<A, S>>,
        admission_handlers: Vec<Arc<dyn AdmissionHandler>>,
    ) -> Result<Self, StatusError> {
        let kind = scheme
            .object_kind::<A>()
            .map_err(|e| StatusError::internal(e.to_string()))?;
        Ok(Self {
            resource_name: resource_name.to_string(),
            kind,
            store,
            converter,
            admission: AdmissionChain::new(admission_handlers),
        })
    }

    /// The resource name, also the URL segment.
    pub fn name(&self) -> &str {
        &self.resource_name
    }

    /// The API version of this resource.
    pub fn version(&self) -> &str {
        VERSION
    }

    /// The kind name outgoing objects are tagged with.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    fn convert_storage_error(&self, error: StorageError, key: &str) -> StatusError {
        match error {
            StorageError::NotFound { .. } => StatusError::not_found(&self.kind, key),
            StorageError::AlreadyExists { .. } => {
                StatusError::conflict(REASON_ALREADY_EXISTS, error.to_string())
            }
            StorageError::ConcurrentConflict => {
                StatusError::conflict(REASON_CONCURRENT_CONFLICT, error.to_string())
            }
            StorageError::FieldNotFound { .. }
            | StorageError::UnsupportedOperator { .. }
            | StorageError::InvalidValue { .. }
            | StorageError::BadValueCount { .. }
            | StorageError::InvalidRevision { .. } => StatusError::bad_request(error.to_string()),
            other => StatusError::internal(other.to_string()),
        }
    }

    async fn admit(&self, object: &mut dyn Object, operation: Operation) -> Result<(), StatusError> {
        let mut attributes = Attributes::new(object, operation, &self.resource_name);
        self.admission.run(&mut attributes).await
    }

    /// Fetch one object by key.
    pub async fn get(&self, key: &str) -> Result<A, StatusError> {
        let row = self
            .store
            .get(key)
            .await
            .map_err(|e| self.convert_storage_error(e, key))?;
        let mut obj = A::default();
        self.converter.from_storage(&row, &mut obj)?;
        obj.set_kind(&self.kind);
        Ok(obj)
    }

    /// List objects with paging and an optional selector.
    ///
    /// Negative offsets and limits normalize to zero; a zero limit
    /// means no paging cap. `continue` reports whether rows beyond
    /// this page remain.
    pub async fn list(&self, mut opts: ListOptions) -> Result<ObjectList<A>, StatusError> {
        if opts.offset < 0 {
            opts.offset = 0;
        }
        if opts.limit < 0 {
            opts.limit = 0;
        }

        let requirements = selector::parse(&opts.selector)
            .map_err(|e| StatusError::bad_request(e.to_string()))?;

        let (rows, count) = self
            .store
            .get_list(flywheel_storage::ListOptions {
                offset: opts.offset,
                limit: opts.limit,
                requirements,
            })
            .await
            .map_err(|e| self.convert_storage_error(e, ""))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut obj = A::default();
            self.converter.from_storage(row, &mut obj)?;
            obj.set_kind(&self.kind);
            items.push(obj);
        }

        Ok(ObjectList {
            count,
            r#continue: opts.offset + opts.limit < count,
            items,
        })
    }

    /// Create an object; the key must be non-empty.
    pub async fn create(&self, mut obj: A) -> Result<A, StatusError> {
        if obj.key().is_empty() {
            return Err(StatusError::bad_request("the key can't be empty"));
        }
        self.admit(&mut obj, Operation::Create).await?;

        let mut row = S::default();
        self.converter.to_storage(&obj, &mut row)?;
        let created = self
            .store
            .create(row)
            .await
            .map_err(|e| {
                let key = obj.key().to_string();
                self.convert_storage_error(e, &key)
            })?;
        self.converter.from_storage(&created, &mut obj)?;
        obj.set_kind(&self.kind);
        Ok(obj)
    }

    /// Replace the object stored under `key`.
    ///
    /// The path key is bound into the object before admission, so a
    /// mismatched body key cannot redirect the write.
    pub async fn update(&self, key: &str, mut obj: A) -> Result<A, StatusError> {
        obj.set_key(key);
        self.admit(&mut obj, Operation::Update).await?;

        let mut row = S::default();
        self.converter.to_storage(&obj, &mut row)?;
        self.store
            .update(key, &mut row)
            .await
            .map_err(|e| self.convert_storage_error(e, key))?;
        self.converter.from_storage(&row, &mut obj)?;
        obj.set_kind(&self.kind);
        Ok(obj)
    }

    /// Delete the object stored under `key`, unconditionally.
    pub async fn delete(&self, key: &str) -> Result<(), StatusError> {
        let mut meta = ObjectMeta::with_key(key);
        self.admit(&mut meta, Operation::Delete).await?;

        self.store
            .delete(key, None)
            .await
            .map_err(|e| self.convert_storage_error(e, key))?;
        Ok(())
    }

    /// Subscribe to this resource's change events as API objects.
    pub fn watch(&self) -> WatchChannel {
        WatchChannel::new(
            self.store.watch(),
            self.kind.clone(),
            self.converter.clone(),
        )
    }
}
