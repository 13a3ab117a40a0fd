//! Resource Manager Client and Backend Factory
//!
//! Backends are resolved by id through factories registered at startup, instead of
//! being loaded by name at runtime. A backend crate implements [`BackendFactory`] and
//! registers it with whatever registry the application composes:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Composition Root (main.rs)                   │
//! │  registry.register_factory(Box::new(MockBackendFactory::new())) │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        BackendRegistry                          │
//! │  factories: DashMap<backend_id, Box<dyn BackendFactory>>        │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  BackendFactory::build(endpoint)                │
//! │         Connects to the broker, returns a client                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use crate::device::DeviceHandle;
use crate::error::HilResult;
use crate::resource::{AllocationCriteria, ManagerEndpoint, ResourceDescriptor};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Client of a shared-pool resource broker.
#[async_trait]
pub trait ResourceManagerClient: Send + Sync {
    /// Every resource the broker knows about, allocated or not.
    async fn list_resources(&self) -> HilResult<Vec<ResourceDescriptor>>;

    /// Atomically and exclusively allocate one resource matching `criteria`.
    ///
    /// Returns `Ok(None)` when nothing matches. A pinned `target_id` already held
    /// elsewhere is reported as [`crate::error::HilError::AllocationConflict`].
    async fn allocate(
        &self,
        criteria: &AllocationCriteria,
    ) -> HilResult<Option<Arc<dyn DeviceHandle>>>;
}

/// Constructs [`ResourceManagerClient`]s for one backend id.
pub trait BackendFactory: Send + Sync {
    /// Id selected by `manager_backend` in the session configuration.
    fn backend_id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Connect to the broker at `endpoint`.
    fn build(
        &self,
        endpoint: ManagerEndpoint,
    ) -> BoxFuture<'static, HilResult<Arc<dyn ResourceManagerClient>>>;
}

/// Registries that accept backend factories.
///
/// Lets backend crates register themselves without depending on the registry's crate.
pub trait FactoryRegistry {
    fn register_factory(&self, factory: Box<dyn BackendFactory>);
}
