//! # rust-hil
//!
//! Connector for remote hardware-in-the-loop testing. A session borrows one embedded
//! board from a shared lab pool, flashes firmware onto it, opens a raw byte channel,
//! and hands a test runner simple read/write primitives. Teardown always returns the
//! board to the pool.
//!
//! ## Crate Structure
//!
//! - **`config`**: `SessionConfig` and `HarnessConfig`, loaded from TOML and
//!   `RUST_HIL_*` environment variables.
//! - **`error`**: `ConfigError` for configuration loading. Session errors live in
//!   `hil_core::error`.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`registry`**: `BackendRegistry`, mapping `manager_backend` ids to factories.
//! - **`session`**: `DeviceSession`, the allocation/connection state machine.
//!
//! Shared traits and data types (`DeviceHandle`, `ResourceManagerClient`,
//! `ConnectorPrimitive`, ...) come from the `hil-core` crate and are re-exported here.

pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod session;

pub use config::{HarnessConfig, SessionConfig};
pub use error::ConfigError;
pub use registry::{register_builtin_backends, BackendRegistry, FactoryInfo};
pub use session::{DeviceSession, SessionState};

pub use hil_core::{
    AllocationCriteria, BackendFactory, ConnectorPrimitive, DeviceError, DeviceErrorKind,
    DeviceHandle, ErrorKind, ErrorRecord, FactoryRegistry, HilError, HilResult,
    ManagerEndpoint, ResourceDescriptor, ResourceManagerClient, SerialParameters,
};
