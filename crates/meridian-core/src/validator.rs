//! Namespace dispatch for record validators.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RoutingError;
use crate::traits::Validator;
use crate::types::RecordKey;

/// Routes validation to a per-namespace [`Validator`].
///
/// Keys without a namespace, or with a namespace nobody registered, are
/// rejected.
#[derive(Default, Clone)]
pub struct NamespacedValidator {
    validators: HashMap<String, Arc<dyn Validator>>,
}

impl NamespacedValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `validator` for keys under `/<namespace>/`.
    pub fn with(mut self, namespace: impl Into<String>, validator: Arc<dyn Validator>) -> Self {
        self.insert(namespace, validator);
        self
    }

    pub fn insert(&mut self, namespace: impl Into<String>, validator: Arc<dyn Validator>) {
        let namespace = namespace.into();
        tracing::debug!(%namespace, "registering record validator");
        self.validators.insert(namespace, validator);
    }

    /// Registered namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.validators.keys().cloned().collect();
        names.sort();
        names
    }

    fn validator_for(&self, key: &RecordKey) -> Result<&Arc<dyn Validator>, RoutingError> {
        let ns = key
            .namespace()
            .ok_or_else(|| RoutingError::InvalidRecord(format!("key '{}' has no namespace", key)))?;
        self.validators.get(ns).ok_or_else(|| {
            RoutingError::InvalidRecord(format!("no validator for namespace '{}'", ns))
        })
    }
}

impl Validator for NamespacedValidator {
    fn validate(&self, key: &RecordKey, value: &[u8]) -> Result<(), RoutingError> {
        self.validator_for(key)?.validate(key, value)
    }

    fn select(&self, key: &RecordKey, values: &[Vec<u8>]) -> Result<usize, RoutingError> {
        if values.is_empty() {
            return Err(RoutingError::InvalidRecord("no values to select from".into()));
        }
        self.validator_for(key)?.select(key, values)
    }
}

impl std::fmt::Debug for NamespacedValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespacedValidator")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}
