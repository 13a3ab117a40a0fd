//! # rust-hil Core
//!
//! Shared vocabulary for remote hardware-in-the-loop sessions:
//!
//! - **`error`**: `HilError` taxonomy, `DeviceError`, and the pollable `ErrorRecord`.
//! - **`resource`**: descriptors, allocation criteria, serial parameters, broker endpoint.
//! - **`device`**: the `DeviceHandle` capability trait a backend hands out per allocation.
//! - **`manager`**: `ResourceManagerClient` and the `BackendFactory` plugin seam.
//! - **`primitive`**: `ConnectorPrimitive`, the surface a test runner drives.

pub mod device;
pub mod error;
pub mod manager;
pub mod primitive;
pub mod resource;

pub use device::DeviceHandle;
pub use error::{DeviceError, DeviceErrorKind, ErrorKind, ErrorRecord, HilError, HilResult};
pub use manager::{BackendFactory, FactoryRegistry, ResourceManagerClient};
pub use primitive::ConnectorPrimitive;
pub use resource::{AllocationCriteria, ManagerEndpoint, ResourceDescriptor, SerialParameters};
