//! Tool registry
//!
//! The registry maps tool names to a descriptor and a handler. Names are
//! unique: registering a name twice fails with
//! [`RegistryError::DuplicateTool`] and leaves the first registration intact.
//!
//! Registration normally happens once at startup, but the table sits behind a
//! read-write lock so late registration is serialized against concurrent
//! `list` and `resolve` calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use crate::error::{RegistryError, Result};
use crate::tool::{ToolDescriptor, ToolHandler};

struct Entry {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

#[derive(Default)]
struct Table {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

/// Authoritative set of tools, in registration order
///
/// # Example
///
/// ```
/// use orch_dispatch::{handler_fn, InputSchema, ToolDescriptor, ToolRegistry};
/// use serde_json::Value;
///
/// let registry = ToolRegistry::new();
/// let echo = handler_fn(|args| async move { Ok(Value::Object(args)) });
/// registry
///     .register(ToolDescriptor::new("echo", "Echo", InputSchema::new()), echo)
///     .unwrap();
/// assert!(registry.contains("echo"));
/// assert!(registry.resolve("missing").is_err());
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    table: RwLock<Table>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a tool
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] if the name is taken.
    pub fn register(
        &self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<()> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if table.index.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool(descriptor.name));
        }

        tracing::debug!(tool = %descriptor.name, "Registered tool");
        let position = table.entries.len();
        table.index.insert(descriptor.name.clone(), position);
        table.entries.push(Entry {
            descriptor,
            handler,
        });
        Ok(())
    }

    /// All descriptors in registration order
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.read()
            .entries
            .iter()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// The handler registered under `name`
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] if the name is not registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ToolHandler>> {
        self.lookup(name).map(|(_, handler)| handler)
    }

    /// Descriptor and handler for `name`, read under a single lock
    pub fn lookup(&self, name: &str) -> Result<(ToolDescriptor, Arc<dyn ToolHandler>)> {
        let table = self.read();
        table
            .index
            .get(name)
            .map(|&i| {
                let entry = &table.entries[i];
                (entry.descriptor.clone(), Arc::clone(&entry.handler))
            })
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Descriptor for `name`, if registered
    pub fn descriptor(&self, name: &str) -> Option<ToolDescriptor> {
        self.lookup(name).ok().map(|(descriptor, _)| descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().index.contains_key(name)
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<String> {
        self.read()
            .entries
            .iter()
            .map(|e| e.descriptor.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{InputSchema, ParamKind};
    use crate::tool::handler_fn;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn echo_descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "echo",
            "Echo text back",
            InputSchema::new().required("text", ParamKind::String, "Text to echo"),
        )
    }

    fn noop() -> Arc<dyn ToolHandler> {
        handler_fn(|_| async { Ok(Value::Null) })
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn resolve_returns_registered_handler() {
        let registry = ToolRegistry::new();
        let handler = noop();
        registry
            .register(echo_descriptor(), Arc::clone(&handler))
            .unwrap();

        let resolved = registry.resolve("echo").unwrap();
        assert!(Arc::ptr_eq(&resolved, &handler));
    }

    #[test]
    fn resolve_unknown_fails() {
        let registry = ToolRegistry::new();
        let err = registry.resolve("nonexistent").err().unwrap();
        assert_eq!(err, RegistryError::UnknownTool("nonexistent".to_string()));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = ToolRegistry::new();
        let first = noop();
        registry.register(echo_descriptor(), Arc::clone(&first)).unwrap();

        let second = ToolDescriptor::new("echo", "Replacement", InputSchema::new());
        let err = registry.register(second, noop()).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("echo".to_string()));

        // First registration is untouched
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.descriptor("echo").unwrap().description,
            "Echo text back"
        );
        assert!(Arc::ptr_eq(&registry.resolve("echo").unwrap(), &first));
    }

    #[test]
    fn list_preserves_registration_order() {
        let registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(ToolDescriptor::new(name, name, InputSchema::new()), noop())
                .unwrap();
        }
        assert_eq!(registry.names(), vec!["zeta", "alpha", "mid"]);

        let first = registry.list();
        let second = registry.list();
        assert_eq!(first, second);
    }

    #[test]
    fn lookup_returns_descriptor_with_schema() {
        let registry = ToolRegistry::new();
        registry.register(echo_descriptor(), noop()).unwrap();

        let (descriptor, _) = registry.lookup("echo").unwrap();
        assert_eq!(descriptor, echo_descriptor());
        assert!(registry.contains("echo"));
        assert!(!registry.contains("slow"));
    }

    #[test]
    fn concurrent_readers_and_writer() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(echo_descriptor(), noop()).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(registry.resolve("echo").is_ok());
                        assert!(!registry.list().is_empty());
                    }
                })
            })
            .collect();

        for i in 0..50 {
            let name = format!("tool_{i}");
            registry
                .register(ToolDescriptor::new(name, "late", InputSchema::new()), noop())
                .unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(registry.len(), 51);
    }

    #[test]
    fn debug_lists_names() {
        let registry = ToolRegistry::new();
        registry.register(echo_descriptor(), noop()).unwrap();
        assert_eq!(format!("{registry:?}"), r#"ToolRegistry { tools: ["echo"] }"#);
    }
}
