//! # Serialization Providers
//!
//! A provider turns one struct or object (plus its owned sub-graph) into a
//! byte payload and back. Providers are stateless per call and fully
//! substitutable: any registered provider can round-trip any value.
//!
//! ## Built-in Providers
//!
//! | Name         | Walker | Layout                          |
//! |--------------|--------|---------------------------------|
//! | `Binary`     | binary | fixed-width little-endian       |
//! | `NetBinary`  | binary | postcard varints                |
//! | `Json`       | json   | compact JSON                    |
//! | `PrettyJson` | json   | indented JSON                   |
//!
//! The provider name is never embedded in a payload. Whoever stores a flake
//! must remember which provider produced it.

pub mod binary;
pub mod json;

use crate::ownership::OwnershipPolicy;
use crate::types::{FlakesError, ObjectId};
use crate::value::StructValue;
use crate::world::ObjectStore;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use binary::{BinaryProvider, NetBinaryProvider};
pub use json::{JsonProvider, PrettyJsonProvider};

// =============================================================================
// PROVIDER TRAIT
// =============================================================================

/// A wire format for object graphs.
///
/// "Read" means reading *from* the live value into bytes; "write" means
/// writing bytes *into* a live value.
pub trait SerializationProvider: Send + Sync {
    /// Name the provider registers under by default.
    fn name(&self) -> &str;

    /// Serialize an object and its owned sub-graph.
    ///
    /// The ownership stack is seeded with `object` itself.
    fn read_object(
        &self,
        store: &dyn ObjectStore,
        object: ObjectId,
        policy: OwnershipPolicy,
    ) -> Result<Vec<u8>, FlakesError>;

    /// Serialize a struct value. Object references inside it are owned when
    /// their outer is `owner`.
    fn read_struct(
        &self,
        store: &dyn ObjectStore,
        value: &StructValue,
        owner: Option<ObjectId>,
        policy: OwnershipPolicy,
    ) -> Result<Vec<u8>, FlakesError>;

    /// Populate an existing object from a payload produced by `read_object`
    /// on an object of the same class. Owned sub-objects are created under it.
    fn write_object(
        &self,
        store: &mut dyn ObjectStore,
        object: ObjectId,
        data: &[u8],
    ) -> Result<(), FlakesError>;

    /// Populate a struct value from a payload produced by `read_struct` on a
    /// value of the same type. Owned sub-objects are created under `owner`.
    fn write_struct(
        &self,
        store: &mut dyn ObjectStore,
        value: &mut StructValue,
        data: &[u8],
        owner: Option<ObjectId>,
    ) -> Result<(), FlakesError>;
}

// =============================================================================
// PROVIDER REGISTRY
// =============================================================================

/// Name → provider map.
///
/// Built once at startup and read concurrently afterwards; mutation needs
/// `&mut self`, so sharing it across threads requires the caller's own lock.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn SerializationProvider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the four built-in providers.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.add(Arc::new(BinaryProvider));
        registry.add(Arc::new(NetBinaryProvider));
        registry.add(Arc::new(JsonProvider));
        registry.add(Arc::new(PrettyJsonProvider));
        registry
    }

    /// Register a provider under `name`. A later registration under the same
    /// name replaces the earlier one, which is returned.
    pub fn register(
        &mut self,
        name: &str,
        provider: Arc<dyn SerializationProvider>,
    ) -> Option<Arc<dyn SerializationProvider>> {
        let previous = self.providers.insert(name.to_string(), provider);
        if previous.is_some() {
            tracing::debug!(provider = name, "replaced serialization provider");
        }
        previous
    }

    /// Register a provider under its own name.
    pub fn add(&mut self, provider: Arc<dyn SerializationProvider>) -> Option<Arc<dyn SerializationProvider>> {
        let name = provider.name().to_string();
        self.register(&name, provider)
    }

    /// Remove a provider. Returns `false` if nothing was registered under `name`.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.providers.remove(name).is_some()
    }

    /// Look up a provider.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn SerializationProvider>> {
        self.providers.get(name).cloned()
    }

    /// Look up a provider or fail with `UnknownProvider`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SerializationProvider>, FlakesError> {
        self.get(name).ok_or_else(|| {
            tracing::error!(provider = name, "serialization provider not registered");
            FlakesError::UnknownProvider(name.to_string())
        })
    }

    /// Run `f` with the named provider. Returns `false` without calling `f`
    /// if the provider is unknown.
    pub fn with_provider<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(&dyn SerializationProvider),
    {
        match self.providers.get(name) {
            Some(provider) => {
                f(provider.as_ref());
                true
            }
            None => false,
        }
    }

    /// All registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_lists_all_providers() {
        let registry = ProviderRegistry::with_builtin();
        assert_eq!(
            registry.names(),
            vec!["Binary", "Json", "NetBinary", "PrettyJson"]
        );
    }

    #[test]
    fn unknown_provider_is_not_invoked() {
        let registry = ProviderRegistry::with_builtin();
        let mut called = false;
        assert!(!registry.with_provider("Yaml", |_| called = true));
        assert!(!called);
        assert!(matches!(
            registry.resolve("Yaml"),
            Err(FlakesError::UnknownProvider(_))
        ));
    }

    #[test]
    fn known_provider_is_invoked() {
        let registry = ProviderRegistry::with_builtin();
        let mut seen = String::new();
        assert!(registry.with_provider("NetBinary", |p| seen = p.name().to_string()));
        assert_eq!(seen, "NetBinary");
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.register("Codec", Arc::new(BinaryProvider)).is_none());
        assert!(registry.register("Codec", Arc::new(JsonProvider)).is_some());

        let mut seen = String::new();
        registry.with_provider("Codec", |p| seen = p.name().to_string());
        assert_eq!(seen, "Json");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_reports_presence() {
        let mut registry = ProviderRegistry::with_builtin();
        assert!(registry.unregister("Json"));
        assert!(!registry.unregister("Json"));
        assert!(!registry.contains("Json"));
        assert_eq!(registry.len(), 3);
    }
}
