//! Error types shared by sessions, brokers and device handles.
//!
//! Two layers exist:
//!
//! - **`DeviceError`**: raised by a [`crate::device::DeviceHandle`] implementation. It
//!   carries the resource id and a [`DeviceErrorKind`] so the session can classify
//!   transport failures without parsing messages.
//! - **`HilError`**: the taxonomy a session works in. Lifecycle establishment failures
//!   (`BackendUnavailable`, `NoResourceAvailable`, `AllocationConflict`,
//!   `ConnectionFailed`) leave a session degraded but queryable; `ProvisioningFailed`
//!   is only ever recorded.
//!
//! Sessions never unwind through their caller on these errors. Instead they keep the
//! latest failure in an [`ErrorRecord`] that a test runner polls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Device Errors
// =============================================================================

/// Classification of a [`DeviceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceErrorKind {
    /// Transport could not be opened or closed.
    Connection,
    /// Link failed mid-transfer.
    Communication,
    /// I/O attempted on a closed transport.
    NotConnected,
    /// Resource not held, or still held when it must not be.
    Allocation,
    /// The device itself reported a fault.
    Hardware,
    /// The call exceeded the backend's time bound.
    Timeout,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceErrorKind::Connection => "connection",
            DeviceErrorKind::Communication => "communication",
            DeviceErrorKind::NotConnected => "not_connected",
            DeviceErrorKind::Allocation => "allocation",
            DeviceErrorKind::Hardware => "hardware",
            DeviceErrorKind::Timeout => "timeout",
            DeviceErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Failure raised by a device handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Device '{resource_id}' {kind} error: {message}")]
pub struct DeviceError {
    /// Resource the failure happened on.
    pub resource_id: String,
    /// Failure classification.
    pub kind: DeviceErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl DeviceError {
    /// Build an error for `resource_id`.
    pub fn new(
        resource_id: impl Into<String>,
        kind: DeviceErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for the error every handle returns on I/O while disconnected.
    pub fn not_connected(resource_id: impl Into<String>) -> Self {
        Self::new(resource_id, DeviceErrorKind::NotConnected, "connection is not open")
    }
}

// =============================================================================
// Session Errors
// =============================================================================

/// Convenience alias for results using the harness error type.
pub type HilResult<T> = std::result::Result<T, HilError>;

/// Primary error type for remote device sessions.
///
/// # Error Categories
///
/// 1. **Backend resolution** - `BackendUnavailable`
///    - Permanent for the lifetime of a session; the session stays disconnected.
///
/// 2. **Pool contention** - `NoResourceAvailable`, `AllocationConflict`
///    - The caller may retry allocation later. Sessions never retry internally.
///
/// 3. **Transport** - `ConnectionFailed`, `Device`
///    - Fatal to the session's I/O; teardown still runs.
///
/// 4. **Provisioning** - `ProvisioningFailed`
///    - Recorded only. A device may already carry the right firmware.
#[derive(Error, Debug, Clone)]
pub enum HilError {
    /// No factory is registered under the requested backend id, or the factory
    /// could not construct a client.
    #[error("Resource manager backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// The broker found no free resource matching the allocation criteria.
    #[error("No resource available matching {criteria}")]
    NoResourceAvailable { criteria: String },

    /// The pinned target is held by another allocation.
    #[error("Resource '{target_id}' is already allocated elsewhere")]
    AllocationConflict { target_id: String },

    /// Opening the transport on the allocated resource failed.
    #[error("Connection to '{resource_id}' failed: {reason}")]
    ConnectionFailed { resource_id: String, reason: String },

    /// Flash or reset reported failure.
    #[error("Provisioning step '{step}' failed on '{resource_id}'")]
    ProvisioningFailed {
        resource_id: String,
        step: ProvisioningStep,
    },

    /// A lifecycle operation was invoked from a state that does not permit it.
    #[error("Operation '{operation}' not permitted in state '{state}'")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// A device handle operation failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The broker client failed for a reason outside the allocation taxonomy.
    #[error("Resource manager error: {0}")]
    Broker(String),

    /// Configuration values parsed but are semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

/// Which provisioning step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStep {
    /// Writing the firmware image.
    Flash,
    /// Rebooting into the flashed image.
    Reset,
}

impl std::fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisioningStep::Flash => write!(f, "flash"),
            ProvisioningStep::Reset => write!(f, "reset"),
        }
    }
}

/// Flat classification of [`HilError`], stored in an [`ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`HilError::BackendUnavailable`].
    BackendUnavailable,
    /// See [`HilError::NoResourceAvailable`].
    NoResourceAvailable,
    /// See [`HilError::AllocationConflict`].
    AllocationConflict,
    /// See [`HilError::ConnectionFailed`].
    ConnectionFailed,
    /// See [`HilError::ProvisioningFailed`].
    ProvisioningFailed,
    /// See [`HilError::InvalidState`].
    InvalidState,
    /// See [`HilError::Device`].
    Device,
    /// See [`HilError::Broker`].
    Broker,
    /// See [`HilError::Configuration`].
    Configuration,
}

impl ErrorKind {
    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NoResourceAvailable | ErrorKind::AllocationConflict
        )
    }

    /// Whether the error leaves the session without a usable connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::BackendUnavailable | ErrorKind::ConnectionFailed
        )
    }
}

impl HilError {
    /// Flat classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HilError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            HilError::NoResourceAvailable { .. } => ErrorKind::NoResourceAvailable,
            HilError::AllocationConflict { .. } => ErrorKind::AllocationConflict,
            HilError::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            HilError::ProvisioningFailed { .. } => ErrorKind::ProvisioningFailed,
            HilError::InvalidState { .. } => ErrorKind::InvalidState,
            HilError::Device(_) => ErrorKind::Device,
            HilError::Broker(_) => ErrorKind::Broker,
            HilError::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

// =============================================================================
// Error Record
// =============================================================================

/// Last error observed by a session, kept for polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Classification of the recorded error.
    pub kind: ErrorKind,
    /// Session operation during which the error occurred (`"allocate"`, `"finish"`, ...).
    pub operation: String,
    /// Rendered error message.
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorRecord {
    /// Record `error` as observed now during `operation`.
    pub fn new(operation: impl Into<String>, error: &HilError) -> Self {
        Self {
            kind: error.kind(),
            operation: operation.into(),
            message: error.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.operation, self.message)
    }
}
