//! Method registry: explicit per-service method registration.
//!
//! Services implement [`ThriftService`] and register one [`MethodDescriptor`]
//! per IDL method into a [`MethodRegistryBuilder`]. The built [`MethodRegistry`]
//! is immutable and shared read-only across concurrent calls.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::warn;

use super::descriptor::MethodDescriptor;

// ---------------------------------------------------------------------------
// ThriftService trait
// ---------------------------------------------------------------------------

/// A service implementation exposed through one or more IDL interfaces.
///
/// Implementations declare which interfaces they satisfy and register one
/// [`MethodDescriptor`] per declared method.
pub trait ThriftService: Send + Sync + 'static {
    /// Names of the IDL interfaces this implementation satisfies
    /// (e.g., `"HelloService.Iface"`).
    fn interfaces(&self) -> Vec<&'static str>;

    /// Register this service's methods.
    fn register(self: Arc<Self>, methods: &mut MethodRegistryBuilder);
}

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

/// Configuration-time faults raised while building a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("service implements no IDL interface")]
    NoInterfaces,
    #[error("no methods registered for interfaces {interfaces:?}")]
    EmptyService { interfaces: Vec<&'static str> },
}

// ---------------------------------------------------------------------------
// MethodRegistryBuilder
// ---------------------------------------------------------------------------

/// Explicit registration step that replaces runtime reflection.
#[derive(Debug, Default)]
pub struct MethodRegistryBuilder {
    by_name: HashMap<String, Arc<MethodDescriptor>>,
    interfaces: BTreeSet<&'static str>,
}

impl MethodRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an implemented IDL interface.
    pub fn interface(&mut self, name: &'static str) -> &mut Self {
        self.interfaces.insert(name);
        self
    }

    /// Register a method. A name that is already registered keeps its first
    /// descriptor.
    pub fn method(&mut self, descriptor: MethodDescriptor) -> &mut Self {
        let name = descriptor.name().to_string();
        if self.by_name.contains_key(&name) {
            warn!(method = %name, "duplicate method name, keeping first registration");
            return self;
        }
        self.by_name.insert(name, Arc::new(descriptor));
        self
    }

    /// Register every method of `service` and record its interfaces.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NoInterfaces` if the service declares none.
    pub fn service<S: ThriftService>(&mut self, service: Arc<S>) -> Result<&mut Self, RegistryError> {
        let interfaces = service.interfaces();
        if interfaces.is_empty() {
            return Err(RegistryError::NoInterfaces);
        }
        for name in interfaces {
            self.interface(name);
        }
        service.register(self);
        Ok(self)
    }

    /// Freeze the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if no interface was declared or no method registered.
    pub fn build(self) -> Result<MethodRegistry, RegistryError> {
        if self.interfaces.is_empty() {
            return Err(RegistryError::NoInterfaces);
        }
        if self.by_name.is_empty() {
            return Err(RegistryError::EmptyService {
                interfaces: self.interfaces.into_iter().collect(),
            });
        }
        Ok(MethodRegistry {
            by_name: self.by_name,
            interfaces: self.interfaces,
        })
    }
}

// ---------------------------------------------------------------------------
// MethodRegistry
// ---------------------------------------------------------------------------

/// Name-to-descriptor map plus the union of implemented IDL interfaces.
///
/// Built once and read-only afterwards, so concurrent lookups need no locking.
#[derive(Debug)]
pub struct MethodRegistry {
    by_name: HashMap<String, Arc<MethodDescriptor>>,
    interfaces: BTreeSet<&'static str>,
}

impl MethodRegistry {
    #[must_use]
    pub fn builder() -> MethodRegistryBuilder {
        MethodRegistryBuilder::new()
    }

    /// Build a registry from a single service implementation.
    ///
    /// # Errors
    ///
    /// Returns an error if the service declares no interface or registers no method.
    pub fn from_service<S: ThriftService>(service: Arc<S>) -> Result<Self, RegistryError> {
        let mut builder = Self::builder();
        builder.service(service)?;
        builder.build()
    }

    /// Look up a method by name. `None` means the method is unknown.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.by_name.get(name)
    }

    /// The implemented IDL interfaces, sorted by name.
    pub fn interfaces(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.interfaces.iter().copied()
    }

    /// Registered method names, sorted.
    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
