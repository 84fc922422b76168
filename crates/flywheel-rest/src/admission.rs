// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pluggable admission control invoked before write operations.
//!
//! A handler declares which operations it handles and may implement
//! either capability: `validate` (read-only) or `admit` (mutating).
//! The chain runs every validator first, then every mutator, skipping
//! handlers that do not handle the operation; the first error aborts
//! the chain.

use std::sync::Arc;

use async_trait::async_trait;
use flywheel_apis::{Object, StatusError};

/// The kind of resource operation being checked for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// A new object is being created.
    Create,
    /// An existing object is being replaced.
    Update,
    /// An object is being deleted.
    Delete,
    /// A non-CRUD connection to the resource.
    Connect,
}

/// What a handler can see about the request under admission.
pub struct Attributes<'a> {
    object: &'a mut dyn Object,
    operation: Operation,
    resource: &'a str,
}

impl<'a> Attributes<'a> {
    /// Build attributes for one request.
    pub fn new(object: &'a mut dyn Object, operation: Operation, resource: &'a str) -> Self {
        Self {
            object,
            operation,
            resource,
        }
    }

    /// The operation being performed.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The resource name the request addresses.
    pub fn resource(&self) -> &str {
        self.resource
    }

    /// The object from the incoming request.
    pub fn object(&self) -> &dyn Object {
        &*self.object
    }

    /// Mutable access to the request object, for mutators.
    pub fn object_mut(&mut self) -> &mut dyn Object {
        self.object
    }
}

/// An admission control decision point.
///
/// Both methods default to accepting no-ops, so a handler implements
/// only the capability it needs; a single handler may implement both.
#[async_trait]
pub trait AdmissionHandler: Send + Sync {
    /// Whether this handler wants to see `operation` at all.
    fn handles(&self, operation: Operation) -> bool;

    /// Read-only check of the request; must not mutate.
    async fn validate(&self, _attributes: &Attributes<'_>) -> Result<(), StatusError> {
        Ok(())
    }

    /// Mutating check of the request.
    async fn admit(&self, _attributes: &mut Attributes<'_>) -> Result<(), StatusError> {
        Ok(())
    }
}

/// A chain of admission handlers sharing one handler list.
#[derive(Clone, Default)]
pub struct AdmissionChain {
    handlers: Vec<Arc<dyn AdmissionHandler>>,
}

impl AdmissionChain {
    /// Build a chain from an ordered handler list.
    pub fn new(handlers: Vec<Arc<dyn AdmissionHandler>>) -> Self {
        Self { handlers }
    }

    /// True when any handler handles `operation`.
    pub fn handles(&self, operation: Operation) -> bool {
        self.handlers.iter().any(|h| h.handles(operation))
    }

    /// Run every handling validator in order; first error aborts.
    pub async fn validate(&self, attributes: &Attributes<'_>) -> Result<(), StatusError> {
        for handler in &self.handlers {
            if !handler.handles(attributes.operation()) {
                continue;
            }
            handler.validate(attributes).await?;
        }
        Ok(())
    }

    /// Run every handling mutator in order; first error aborts.
    pub async fn admit(&self, attributes: &mut Attributes<'_>) -> Result<(), StatusError> {
        for handler in &self.handlers {
            if !handler.handles(attributes.operation()) {
                continue;
            }
            handler.admit(attributes).await?;
        }
        Ok(())
    }

    /// Run the full chain: validate everything, then mutate everything.
    pub async fn run(&self, attributes: &mut Attributes<'_>) -> Result<(), StatusError> {
        if !self.handles(attributes.operation()) {
            return Ok(());
        }
        self.validate(attributes).await?;
        self.admit(attributes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flywheel_apis::ObjectMeta;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        operations: Vec<Operation>,
        log: Arc<Mutex<Vec<String>>>,
        fail_validate: bool,
    }

    #[async_trait]
    impl AdmissionHandler for Recorder {
        fn handles(&self, operation: Operation) -> bool {
            self.operations.contains(&operation)
        }

        async fn validate(&self, _attributes: &Attributes<'_>) -> Result<(), StatusError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("validate:{}", self.name));
            if self.fail_validate {
                return Err(StatusError::forbidden("CREATE", "Test", "k", "denied"));
            }
            Ok(())
        }

        async fn admit(&self, attributes: &mut Attributes<'_>) -> Result<(), StatusError> {
            self.log.lock().unwrap().push(format!("admit:{}", self.name));
            attributes.object_mut().set_kind(self.name);
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        operations: Vec<Operation>,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn AdmissionHandler> {
        Arc::new(Recorder {
            name,
            operations,
            log: log.clone(),
            fail_validate: false,
        })
    }

    #[tokio::test]
    async fn test_validators_run_before_mutators() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = AdmissionChain::new(vec![
            recorder("a", vec![Operation::Create], &log),
            recorder("b", vec![Operation::Create], &log),
        ]);

        let mut meta = ObjectMeta::with_key("k");
        let mut attributes = Attributes::new(&mut meta, Operation::Create, "tests");
        chain.run(&mut attributes).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["validate:a", "validate:b", "admit:a", "admit:b"]
        );
    }

    #[tokio::test]
    async fn test_non_handling_handler_is_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = AdmissionChain::new(vec![
            recorder("creates", vec![Operation::Create], &log),
            recorder("deletes", vec![Operation::Delete], &log),
        ]);

        let mut meta = ObjectMeta::with_key("k");
        let mut attributes = Attributes::new(&mut meta, Operation::Create, "tests");
        chain.run(&mut attributes).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["validate:creates", "admit:creates"]);
    }

    #[tokio::test]
    async fn test_first_validate_error_aborts_before_any_mutation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = AdmissionChain::new(vec![
            Arc::new(Recorder {
                name: "denier",
                operations: vec![Operation::Create],
                log: log.clone(),
                fail_validate: true,
            }) as Arc<dyn AdmissionHandler>,
            recorder("after", vec![Operation::Create], &log),
        ]);

        let mut meta = ObjectMeta::with_key("k");
        let mut attributes = Attributes::new(&mut meta, Operation::Create, "tests");
        let err = chain.run(&mut attributes).await.unwrap_err();
        assert!(err.is_forbidden());
        assert_eq!(*log.lock().unwrap(), vec!["validate:denier"]);
        assert_eq!(meta.kind, "");
    }

    #[tokio::test]
    async fn test_mutator_changes_are_visible() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = AdmissionChain::new(vec![recorder("Tagged", vec![Operation::Update], &log)]);

        let mut meta = ObjectMeta::with_key("k");
        let mut attributes = Attributes::new(&mut meta, Operation::Update, "tests");
        chain.run(&mut attributes).await.unwrap();
        assert_eq!(meta.kind, "Tagged");
    }
}
