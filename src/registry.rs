//! Backend registry
//!
//! Maps backend scheme names to factories so applications can plug in
//! vendor-specific transports next to the bundled ones. Two factories are
//! registered out of the box: `memory` (empty in-memory repository) and
//! `file` (local SDMX-ML data file, the argument is the path).

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::backend::{Backend, FileBackend, MemoryBackend};
use crate::error::{Error, Result};

/// Builds a backend from a factory-specific argument string
pub type BackendFactory = Box<dyn Fn(&str) -> Result<Box<dyn Backend>> + Send + Sync>;

/// Named backend factories
pub struct BackendRegistry {
    factories: RwLock<HashMap<String, BackendFactory>>,
}

impl BackendRegistry {
    /// Registry with the bundled `memory` and `file` factories
    pub fn new() -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::new()),
        };
        registry.register("memory", |argument| {
            Ok(Box::new(MemoryBackend::new(format!("mem://{argument}"))))
        });
        registry.register("file", |argument| {
            Ok(Box::new(FileBackend::open(argument)?))
        });
        registry
    }

    /// Registry with no factories at all
    pub fn empty() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory under a scheme name, replacing any previous one
    pub fn register(
        &self,
        name: impl Into<String>,
        factory: impl Fn(&str) -> Result<Box<dyn Backend>> + Send + Sync + 'static,
    ) {
        let name = name.into();
        debug!(name, "registering backend factory");
        self.factories.write().insert(name, Box::new(factory));
    }

    /// Instantiate a backend by scheme name
    pub fn create(&self, name: &str, argument: &str) -> Result<Box<dyn Backend>> {
        let factories = self.factories.read();
        let factory = factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("no backend factory named {name:?}")))?;
        factory(argument)
    }

    /// Registered scheme names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = BackendRegistry::new();
        assert_eq!(registry.names(), vec!["file", "memory"]);
    }

    #[test]
    fn memory_factory_builds_a_backend() {
        let registry = BackendRegistry::new();
        let backend = registry.create("memory", "test/en").unwrap();
        assert_eq!(backend.base(), "mem://test/en");
    }

    #[test]
    fn unknown_scheme_is_not_found() {
        let registry = BackendRegistry::new();
        assert!(matches!(
            registry.create("carrier-pigeon", ""),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn registration_replaces_existing_factory() {
        let registry = BackendRegistry::empty();
        registry.register("memory", |_| {
            Ok(Box::new(MemoryBackend::new("mem://first")))
        });
        registry.register("memory", |_| {
            Ok(Box::new(MemoryBackend::new("mem://second")))
        });
        let backend = registry.create("memory", "").unwrap();
        assert_eq!(backend.base(), "mem://second");
        assert_eq!(registry.names(), vec!["memory"]);
    }
}
