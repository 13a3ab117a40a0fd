//! Backend Registry
//!
//! Resource manager backends are selected by the `manager_backend` id of a session
//! configuration. Each backend crate contributes a [`BackendFactory`]; the registry
//! maps ids to factories and builds broker clients on demand.
//!
//! # Example
//!
//! ```rust,ignore
//! use rust_hil::registry::BackendRegistry;
//!
//! let registry = BackendRegistry::new();
//! hil_driver_mock::register_all(&registry);
//! assert!(registry.has_factory("mock"));
//!
//! let client = registry.resolve("mock", config.endpoint()).await?;
//! ```

use dashmap::DashMap;
use hil_core::error::{HilError, HilResult};
use hil_core::manager::{BackendFactory, FactoryRegistry, ResourceManagerClient};
use hil_core::resource::ManagerEndpoint;
use std::sync::Arc;

/// Thread-safe map of backend id to factory.
pub struct BackendRegistry {
    factories: DashMap<String, Box<dyn BackendFactory>>,
}

/// Information about a registered backend factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryInfo {
    pub backend_id: String,
    pub name: String,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Registry with every backend compiled into this build
    pub fn with_builtin_backends() -> Self {
        let registry = Self::new();
        register_builtin_backends(&registry);
        registry
    }

    /// Register a factory under its backend id.
    ///
    /// # Returns
    /// The factory previously registered under the same id, if any.
    pub fn register_factory(
        &self,
        factory: Box<dyn BackendFactory>,
    ) -> Option<Box<dyn BackendFactory>> {
        let backend_id = factory.backend_id().to_string();
        tracing::info!(
            backend_id = %backend_id,
            name = %factory.name(),
            "Registering resource manager backend"
        );
        self.factories.insert(backend_id, factory)
    }

    /// Unregister a factory by backend id, returning it.
    pub fn unregister_factory(&self, backend_id: &str) -> Option<Box<dyn BackendFactory>> {
        self.factories
            .remove(backend_id)
            .map(|(_, factory)| factory)
    }

    pub fn has_factory(&self, backend_id: &str) -> bool {
        self.factories.contains_key(backend_id)
    }

    /// List registered backend ids, sorted.
    pub fn list_factories(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .factories
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn factory_info(&self, backend_id: &str) -> Option<FactoryInfo> {
        self.factories.get(backend_id).map(|entry| {
            let factory = entry.value();
            FactoryInfo {
                backend_id: factory.backend_id().to_string(),
                name: factory.name().to_string(),
            }
        })
    }

    /// Build a broker client for `backend_id`.
    ///
    /// # Errors
    /// [`HilError::BackendUnavailable`] when no factory is registered under the id or
    /// the factory fails to construct a client.
    pub async fn resolve(
        &self,
        backend_id: &str,
        endpoint: ManagerEndpoint,
    ) -> HilResult<Arc<dyn ResourceManagerClient>> {
        // The map guard must not live across the await below.
        let pending = match self.factories.get(backend_id) {
            Some(entry) => entry.value().build(endpoint),
            None => {
                return Err(HilError::BackendUnavailable {
                    backend: backend_id.to_string(),
                    reason: format!(
                        "no factory registered (available: {:?})",
                        self.list_factories()
                    ),
                });
            }
        };

        pending.await.map_err(|e| match e {
            HilError::BackendUnavailable { .. } => e,
            other => HilError::BackendUnavailable {
                backend: backend_id.to_string(),
                reason: other.to_string(),
            },
        })
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryRegistry for BackendRegistry {
    fn register_factory(&self, factory: Box<dyn BackendFactory>) {
        if let Some(previous) = BackendRegistry::register_factory(self, factory) {
            tracing::warn!(
                backend_id = %previous.backend_id(),
                "Replaced previously registered backend"
            );
        }
    }
}

/// Register every backend enabled through cargo features.
pub fn register_builtin_backends(registry: &BackendRegistry) {
    #[cfg(feature = "mock")]
    hil_driver_mock::register_all(registry);

    #[cfg(not(feature = "mock"))]
    let _ = registry;
}
