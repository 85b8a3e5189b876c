//! Component lookup capability.
//!
//! # Responsibilities
//! - Let a host hand optional collaborators to the exchange client
//! - Support lookup by name and by type
//!
//! # Design Decisions
//! - The registry is constructor-injected and optional; the client treats
//!   a missing registry or a missing component as non-fatal
//! - No process-wide singleton: each client receives the registry it
//!   should use, so independently configured clients can coexist

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Lookup capability exposed by a host's component registry.
pub trait ComponentLookup: Send + Sync {
    /// Look up a component by name.
    fn lookup_by_name(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>>;

    /// Look up a component by type id.
    fn lookup_by_type(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>>;
}

impl dyn ComponentLookup + '_ {
    /// Typed lookup by component type.
    pub fn lookup<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.lookup_by_type(TypeId::of::<T>())
            .and_then(|component| component.downcast::<T>().ok())
    }

    /// Typed lookup by name.
    pub fn lookup_named<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.lookup_by_name(name)
            .and_then(|component| component.downcast::<T>().ok())
    }
}

/// Simple in-memory component registry.
#[derive(Default)]
pub struct ComponentRegistry {
    by_name: HashMap<String, Arc<dyn Any + Send + Sync>>,
    by_type: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component, retrievable by its type.
    pub fn register<T: Any + Send + Sync>(&mut self, component: T) {
        self.by_type.insert(TypeId::of::<T>(), Arc::new(component));
    }

    /// Register a named component, retrievable by name and by type.
    pub fn register_named<T: Any + Send + Sync>(&mut self, name: impl Into<String>, component: T) {
        let component: Arc<dyn Any + Send + Sync> = Arc::new(component);
        self.by_name.insert(name.into(), Arc::clone(&component));
        self.by_type.insert(TypeId::of::<T>(), component);
    }
}

impl ComponentLookup for ComponentRegistry {
    fn lookup_by_name(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.by_name.get(name).cloned()
    }

    fn lookup_by_type(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.by_type.get(&type_id).cloned()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("named", &self.by_name.len())
            .field("typed", &self.by_type.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Marker(u32);

    #[test]
    fn test_typed_lookup() {
        let mut registry = ComponentRegistry::new();
        registry.register(Marker(7));

        let lookup: &dyn ComponentLookup = &registry;
        assert_eq!(lookup.lookup::<Marker>().as_deref(), Some(&Marker(7)));
        assert!(lookup.lookup::<String>().is_none());
    }

    #[test]
    fn test_named_lookup() {
        let mut registry = ComponentRegistry::new();
        registry.register_named("marker", Marker(3));

        let lookup: &dyn ComponentLookup = &registry;
        assert_eq!(lookup.lookup_named::<Marker>("marker").as_deref(), Some(&Marker(3)));
        assert!(lookup.lookup_named::<Marker>("missing").is_none());
    }
}
