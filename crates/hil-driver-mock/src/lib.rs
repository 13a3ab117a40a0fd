//! Mock Resource Manager Backend for rust-hil
//!
//! This crate provides an in-process stand-in for a lab resource broker so session
//! lifecycles can be exercised without shared hardware.
//!
//! # Components
//!
//! - [`MockPool`] - Inventory of boards shared by every client of one factory
//! - [`MockBroker`] - `ResourceManagerClient` with exclusive, atomic allocation
//! - [`MockDevice`] - `DeviceHandle` with a loopback byte pipe and call counters
//! - [`MockBackendFactory`] - `BackendFactory` registered as backend `"mock"`
//!
//! # Failure Injection
//!
//! Devices and pools accept an [`ErrorConfig`]; flash and reset outcomes can also be
//! toggled directly on a device. Realistic mode adds lab-like latencies, which are
//! bounded by the endpoint timeout the session passes to the factory.
//!
//! ```rust,ignore
//! use hil_driver_mock::{MockBackendFactory, MockPool};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(MockPool::with_boards(&[("board-1", "K64F")]));
//! registry.register_factory(Box::new(MockBackendFactory::with_pool(pool.clone())));
//! // ... run a session ...
//! assert_eq!(pool.device("board-1").unwrap().stats().releases, 1);
//! ```

pub mod common;
mod mock_broker;
mod mock_device;

pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig};

pub use mock_broker::{MOCK_BACKEND_ID, MockBackendFactory, MockBroker, MockPool};
pub use mock_device::{DeviceStats, MockDevice, MockDeviceBuilder};

use hil_core::manager::FactoryRegistry;

/// Register the mock backend with a default pool.
pub fn register_all(registry: &impl FactoryRegistry) {
    registry.register_factory(Box::new(MockBackendFactory::new()));
}
