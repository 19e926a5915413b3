//! # Handler Registry
//!
//! Maps (family, version) to the handler that executes it. Populated before
//! the processor starts and read-only afterwards.

use crate::handler::DynHandler;
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a handler for {family} {version} is already registered")]
    DuplicateRegistration { family: String, version: String },

    #[error("no handler registered for {family} {version}")]
    UnknownTransactionType { family: String, version: String },

    #[error("handler for family {family} advertises no versions")]
    NoFamilyVersions { family: String },
}

/// One (family, version) pair as advertised to the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    pub family: String,
    pub version: String,
    pub namespaces: Vec<String>,
}

struct RegisteredHandler {
    family: String,
    versions: Vec<String>,
    namespaces: Vec<String>,
    handler: DynHandler,
}

#[derive(Default)]
pub struct HandlerRegistry {
    /// Handlers in registration order.
    handlers: Vec<RegisteredHandler>,
    /// family -> version -> index into `handlers`.
    index: HashMap<String, HashMap<String, usize>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler under every version it advertises.
    ///
    /// Either all versions are added or none are.
    pub fn register(&mut self, handler: DynHandler) -> Result<(), RegistryError> {
        let family = handler.family_name();
        let versions = handler.family_versions();
        if versions.is_empty() {
            return Err(RegistryError::NoFamilyVersions { family });
        }

        let existing = self.index.get(&family);
        for (i, version) in versions.iter().enumerate() {
            let taken = existing.is_some_and(|v| v.contains_key(version));
            if taken || versions[..i].contains(version) {
                return Err(RegistryError::DuplicateRegistration {
                    family,
                    version: version.clone(),
                });
            }
        }

        let slot = self.handlers.len();
        let by_version = self.index.entry(family.clone()).or_default();
        for version in &versions {
            by_version.insert(version.clone(), slot);
        }

        info!(
            family = %family,
            versions = ?versions,
            "Registered transaction handler"
        );
        self.handlers.push(RegisteredHandler {
            family,
            versions,
            namespaces: handler.namespaces(),
            handler,
        });
        Ok(())
    }

    /// Exact match on family and version.
    pub fn lookup(&self, family: &str, version: &str) -> Result<&DynHandler, RegistryError> {
        self.index
            .get(family)
            .and_then(|versions| versions.get(version))
            .map(|&slot| &self.handlers[slot].handler)
            .ok_or_else(|| RegistryError::UnknownTransactionType {
                family: family.to_string(),
                version: version.to_string(),
            })
    }

    /// One descriptor per registered (family, version), in registration order.
    pub fn descriptors(&self) -> Vec<HandlerDescriptor> {
        self.handlers
            .iter()
            .flat_map(|entry| {
                entry.versions.iter().map(|version| HandlerDescriptor {
                    family: entry.family.clone(),
                    version: version.clone(),
                    namespaces: entry.namespaces.clone(),
                })
            })
            .collect()
    }

    /// Number of handlers, not (family, version) pairs.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
