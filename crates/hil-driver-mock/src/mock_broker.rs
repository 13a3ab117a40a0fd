//! Mock resource manager: a shared pool of [`MockDevice`]s behind a broker client.

use async_trait::async_trait;
use futures::future::BoxFuture;
use hil_core::device::DeviceHandle;
use hil_core::error::{HilError, HilResult};
use hil_core::manager::{BackendFactory, ResourceManagerClient};
use hil_core::resource::{AllocationCriteria, ManagerEndpoint, ResourceDescriptor};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{ErrorConfig, MockMode, TimingConfig, simulate_latency};
use crate::mock_device::MockDevice;

/// Backend id under which [`MockBackendFactory`] registers.
pub const MOCK_BACKEND_ID: &str = "mock";

// =============================================================================
// MockPool
// =============================================================================

/// Lab inventory shared by every broker client built from one factory.
///
/// Allocation claims a device atomically, so two sessions can never hold the same
/// board.
pub struct MockPool {
    devices: Vec<Arc<MockDevice>>,
    errors: ErrorConfig,
    mode: MockMode,
    timing: TimingConfig,
}

impl MockPool {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices: devices.into_iter().map(Arc::new).collect(),
            errors: ErrorConfig::none(),
            mode: MockMode::Instant,
            timing: TimingConfig::default(),
        }
    }

    /// Pool of default-behaving boards given as `(resource_id, platform_name)`.
    pub fn with_boards(boards: &[(&str, &str)]) -> Self {
        Self::new(
            boards
                .iter()
                .map(|(id, platform)| MockDevice::new(*id, *platform))
                .collect(),
        )
    }

    /// Inject failures into broker calls (`list_resources`, `allocate`).
    pub fn with_errors(mut self, errors: ErrorConfig) -> Self {
        self.errors = errors;
        self
    }

    /// Simulate broker round-trip latency.
    pub fn realistic(mut self, timing: TimingConfig) -> Self {
        self.mode = MockMode::Realistic;
        self.timing = timing;
        self
    }

    pub fn device(&self, resource_id: &str) -> Option<Arc<MockDevice>> {
        self.devices
            .iter()
            .find(|d| d.resource_id() == resource_id)
            .cloned()
    }

    pub fn devices(&self) -> &[Arc<MockDevice>] {
        &self.devices
    }

    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        self.devices.iter().map(|d| d.descriptor()).collect()
    }

    pub fn allocated_count(&self) -> usize {
        self.devices.iter().filter(|d| d.is_allocated()).count()
    }

    fn claim(
        &self,
        criteria: &AllocationCriteria,
        timeout: Duration,
    ) -> HilResult<Option<Arc<MockDevice>>> {
        if let Some(target) = &criteria.target_id {
            let Some(device) = self.device(target) else {
                return Ok(None);
            };
            if !criteria.matches(&device.descriptor()) {
                return Ok(None);
            }
            if !device.try_claim(timeout) {
                return Err(HilError::AllocationConflict {
                    target_id: target.clone(),
                });
            }
            return Ok(Some(device));
        }

        Ok(self
            .devices
            .iter()
            .filter(|d| criteria.matches(&d.descriptor()))
            .find(|d| d.try_claim(timeout))
            .cloned())
    }
}

impl Default for MockPool {
    /// Three boards across two platforms.
    fn default() -> Self {
        Self::with_boards(&[
            ("0240000032044e4500257009997b00386781000097969900", "K64F"),
            ("0240000033514e450033500585d40029e981000097969900", "K64F"),
            ("07640000382c4e45004f6015e54f002f5131000097969900", "NUCLEO_F429ZI"),
        ])
    }
}

// =============================================================================
// MockBroker
// =============================================================================

/// [`ResourceManagerClient`] over a [`MockPool`].
pub struct MockBroker {
    pool: Arc<MockPool>,
    endpoint: ManagerEndpoint,
}

impl MockBroker {
    pub fn new(pool: Arc<MockPool>, endpoint: ManagerEndpoint) -> Self {
        Self { pool, endpoint }
    }

    async fn round_trip(&self, operation: &'static str) -> HilResult<()> {
        let broker_id = self.endpoint.to_string();
        self.pool
            .errors
            .check_operation(&broker_id, operation)
            .map_err(|e| HilError::Broker(e.to_string()))?;
        simulate_latency(
            self.pool.mode,
            self.pool.timing.broker_ms,
            self.endpoint.timeout,
            &broker_id,
            operation,
        )
        .await
        .map_err(|e| HilError::Broker(e.to_string()))
    }
}

#[async_trait]
impl ResourceManagerClient for MockBroker {
    async fn list_resources(&self) -> HilResult<Vec<ResourceDescriptor>> {
        self.round_trip("list_resources").await?;
        Ok(self.pool.descriptors())
    }

    async fn allocate(
        &self,
        criteria: &AllocationCriteria,
    ) -> HilResult<Option<Arc<dyn DeviceHandle>>> {
        self.round_trip("allocate").await?;
        let claimed = self.pool.claim(criteria, self.endpoint.timeout)?;
        if let Some(device) = &claimed {
            tracing::debug!(
                resource_id = %device.resource_id(),
                criteria = %criteria,
                "Mock broker allocated resource"
            );
        }
        Ok(claimed.map(|d| d as Arc<dyn DeviceHandle>))
    }
}

// =============================================================================
// MockBackendFactory
// =============================================================================

/// Factory for [`MockBroker`] clients sharing one pool.
pub struct MockBackendFactory {
    pool: Arc<MockPool>,
}

impl MockBackendFactory {
    pub fn new() -> Self {
        Self::with_pool(Arc::new(MockPool::default()))
    }

    pub fn with_pool(pool: Arc<MockPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> Arc<MockPool> {
        self.pool.clone()
    }
}

impl Default for MockBackendFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendFactory for MockBackendFactory {
    fn backend_id(&self) -> &'static str {
        MOCK_BACKEND_ID
    }

    fn name(&self) -> &'static str {
        "In-process Mock Resource Manager"
    }

    fn build(
        &self,
        endpoint: ManagerEndpoint,
    ) -> BoxFuture<'static, HilResult<Arc<dyn ResourceManagerClient>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            tracing::debug!(endpoint = %endpoint, "Mock broker client created");
            Ok(Arc::new(MockBroker::new(pool, endpoint)) as Arc<dyn ResourceManagerClient>)
        })
    }
}
