//! Device Handle Capability Contract
//!
//! A [`DeviceHandle`] is one allocated hardware resource as exposed by a resource
//! manager backend. Sessions depend only on this trait, never on a concrete broker.
//!
//! # Contract
//!
//! - `read`/`write_line` on a disconnected handle must fail fast with
//!   [`DeviceErrorKind::NotConnected`](crate::error::DeviceErrorKind::NotConnected),
//!   never block.
//! - `release` must not be called while the handle is connected; the session
//!   enforces this ordering during teardown.
//! - `flash` and `reset` report success as a boolean instead of an error, so a
//!   provisioning failure never aborts a session.
//! - Implementations are responsible for bounding the latency of every call.
//!
//! # Example
//!
//! ```rust,ignore
//! use hil_core::device::DeviceHandle;
//! use hil_core::resource::SerialParameters;
//!
//! async fn ping(handle: &dyn DeviceHandle) -> anyhow::Result<bytes::Bytes> {
//!     handle.open_connection(SerialParameters::raw(9600)).await?;
//!     handle.write_line(b"ping").await?;
//!     Ok(handle.read(4).await?)
//! }
//! ```

use crate::error::DeviceError;
use crate::resource::SerialParameters;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

/// One allocated hardware resource.
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    /// Broker-assigned identity of the resource.
    fn resource_id(&self) -> &str;

    /// Open the transport with the given parameters.
    async fn open_connection(&self, params: SerialParameters) -> Result<(), DeviceError>;

    /// Close the transport. Closing an already closed handle is not an error.
    async fn close_connection(&self) -> Result<(), DeviceError>;

    /// Flash `image` onto the device, overwriting any existing image when `force` is set.
    async fn flash(&self, image: &Path, force: bool) -> bool;

    /// Hardware reset.
    async fn reset(&self) -> bool;

    /// Read up to `count` bytes. May return fewer, including none.
    async fn read(&self, count: usize) -> Result<Bytes, DeviceError>;

    /// Hand `payload` to the transport as one discrete write.
    ///
    /// The name follows the broker vocabulary; line framing, if any, belongs to the
    /// transport's own mode and is never added by callers.
    async fn write_line(&self, payload: &[u8]) -> Result<(), DeviceError>;

    fn is_connected(&self) -> bool;

    fn is_allocated(&self) -> bool;

    /// Return the resource to the shared pool.
    async fn release(&self) -> Result<(), DeviceError>;
}
