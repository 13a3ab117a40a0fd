//! Remote Device Session
//!
//! A [`DeviceSession`] walks one shared lab device through its lifecycle:
//!
//! ```text
//! Uninitialized ──initialize──▶ ClientReady ──allocate──▶ ResourceAllocated
//!                                                                │
//!        Ready ◀──reset── Provisioned ◀──flash── Connected ◀──connect
//!
//! any state ──finish──▶ Finished
//! ```
//!
//! # Failure Semantics
//!
//! Lifecycle operations return `HilResult<()>` and also record the failure in the
//! session's [`ErrorRecord`] slot, which a test runner polls through
//! [`ConnectorPrimitive::error`]. A failed step leaves the session degraded but
//! queryable: `connected()` reports false and I/O is a no-op.
//!
//! Provisioning is lenient. A failed flash or reset is recorded as
//! `ProvisioningFailed` but the session still reaches `Ready`, since the device may
//! already carry the right firmware.
//!
//! # Teardown
//!
//! [`DeviceSession::finish`] closes the connection if open, then releases the
//! resource if still allocated. It is idempotent and never fails. Async teardown
//! cannot run from `Drop`, so prefer [`DeviceSession::run_scoped`], which always
//! finishes the session, even when the body panics.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = Arc::new(BackendRegistry::with_builtin_backends());
//! let config = SessionConfig::for_backend("mock").with_platform("K64F");
//!
//! let echoed = DeviceSession::new(config, registry)
//!     .run_scoped(|session| {
//!         Box::pin(async move {
//!             session.establish().await;
//!             session.write(Bytes::from_static(b"ping"), true).await;
//!             session.read(4).await
//!         })
//!     })
//!     .await;
//! ```

use crate::config::SessionConfig;
use crate::logging::{SESSION_TARGET, TXD_TARGET};
use crate::registry::BackendRegistry;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use hil_core::device::DeviceHandle;
use hil_core::error::{ErrorRecord, HilError, HilResult, ProvisioningStep};
use hil_core::manager::ResourceManagerClient;
use hil_core::primitive::ConnectorPrimitive;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle position of a [`DeviceSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing contacted yet.
    Uninitialized,
    /// Broker client constructed.
    ClientReady,
    /// A device handle is exclusively held.
    ResourceAllocated,
    /// Raw transport open.
    Connected,
    /// Flash step done (or skipped).
    Provisioned,
    /// Reset step done; I/O may begin.
    Ready,
    /// Terminal.
    Finished,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::ClientReady => "client_ready",
            SessionState::ResourceAllocated => "resource_allocated",
            SessionState::Connected => "connected",
            SessionState::Provisioned => "provisioned",
            SessionState::Ready => "ready",
            SessionState::Finished => "finished",
        };
        write!(f, "{}", label)
    }
}

/// One remote device, from broker lookup to release.
pub struct DeviceSession {
    name: String,
    config: Arc<SessionConfig>,
    registry: Arc<BackendRegistry>,
    client: Option<Arc<dyn ResourceManagerClient>>,
    handle: Option<Arc<dyn DeviceHandle>>,
    state: SessionState,
    last_error: Mutex<Option<ErrorRecord>>,
    resources_seen: usize,
}

impl DeviceSession {
    /// Create an inert session. Nothing is contacted until [`Self::initialize`].
    pub fn new(config: impl Into<Arc<SessionConfig>>, registry: Arc<BackendRegistry>) -> Self {
        let config = config.into();
        Self {
            name: format!("hil-{}", config.manager_backend),
            config,
            registry,
            client: None,
            handle: None,
            state: SessionState::Uninitialized,
            last_error: Mutex::new(None),
            resources_seen: 0,
        }
    }

    /// Override the name used in log fields.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Name carried in every log event of this session.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle position.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of resources the broker listed most recently. Diagnostic only.
    pub fn resources_seen(&self) -> usize {
        self.resources_seen
    }

    /// Id of the held resource, if any.
    pub fn resource_id(&self) -> Option<&str> {
        self.handle.as_deref().map(|h| h.resource_id())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Validate the configuration, then resolve the configured backend and build its
    /// broker client.
    ///
    /// An invalid configuration is recorded as `Configuration` and leaves the session
    /// inert, like an unresolvable backend.
    pub async fn initialize(&mut self) -> HilResult<()> {
        self.expect_state("initialize", SessionState::Uninitialized)?;
        if let Err(e) = self.config.validate() {
            return Err(self.fail("initialize", e));
        }

        let backend = self.config.manager_backend.clone();
        let client = match self.registry.resolve(&backend, self.config.endpoint()).await {
            Ok(client) => client,
            Err(e) => return Err(self.fail("initialize", e)),
        };

        match client.list_resources().await {
            Ok(resources) => {
                self.resources_seen = resources.len();
                info!(
                    target: SESSION_TARGET,
                    session = %self.name,
                    backend = %backend,
                    resources = resources.len(),
                    "Resource manager client ready"
                );
            }
            Err(e) => warn!(
                target: SESSION_TARGET,
                session = %self.name,
                backend = %backend,
                error = %e,
                "Could not list resources"
            ),
        }

        self.client = Some(client);
        self.transition(SessionState::ClientReady);
        Ok(())
    }

    /// Exclusively allocate one resource matching the configured platform and target.
    ///
    /// Never retries; `NoResourceAvailable` and `AllocationConflict` are retryable by
    /// the caller on a fresh session.
    pub async fn allocate(&mut self) -> HilResult<()> {
        self.expect_state("allocate", SessionState::ClientReady)?;
        let Some(client) = self.client.clone() else {
            return Err(self.invalid_state("allocate"));
        };

        match client.list_resources().await {
            Ok(resources) => self.resources_seen = resources.len(),
            Err(e) => debug!(
                target: SESSION_TARGET,
                session = %self.name,
                error = %e,
                "Resource listing before allocation failed"
            ),
        }

        let criteria = self.config.criteria();
        let handle = match client.allocate(&criteria).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                return Err(self.fail(
                    "allocate",
                    HilError::NoResourceAvailable {
                        criteria: criteria.to_string(),
                    },
                ));
            }
            Err(e) => return Err(self.fail("allocate", e)),
        };

        info!(
            target: SESSION_TARGET,
            session = %self.name,
            resource_id = %handle.resource_id(),
            criteria = %criteria,
            "Resource allocated"
        );
        self.handle = Some(handle);
        self.transition(SessionState::ResourceAllocated);
        Ok(())
    }

    /// Open the raw transport at the configured baud rate.
    pub async fn connect(&mut self) -> HilResult<()> {
        self.expect_state("connect", SessionState::ResourceAllocated)?;
        let Some(handle) = self.handle.clone() else {
            return Err(self.invalid_state("connect"));
        };

        let params = self.config.serial_parameters();
        if let Err(e) = handle.open_connection(params).await {
            return Err(self.fail(
                "connect",
                HilError::ConnectionFailed {
                    resource_id: handle.resource_id().to_string(),
                    reason: e.to_string(),
                },
            ));
        }

        info!(
            target: SESSION_TARGET,
            session = %self.name,
            resource_id = %handle.resource_id(),
            baud_rate = params.baud_rate,
            "Connection open"
        );
        self.transition(SessionState::Connected);
        Ok(())
    }

    /// Flash the configured image (force overwrite), then reset.
    ///
    /// Both steps are best-effort: failures are recorded, and the session reaches
    /// `Ready` regardless. Without an `image_path` the flash is skipped.
    pub async fn provision(&mut self) -> HilResult<()> {
        self.expect_state("provision", SessionState::Connected)?;
        let Some(handle) = self.handle.clone() else {
            return Err(self.invalid_state("provision"));
        };
        let resource_id = handle.resource_id().to_string();

        match self.config.image_path.clone() {
            Some(image) => {
                if handle.flash(&image, true).await {
                    info!(
                        target: SESSION_TARGET,
                        session = %self.name,
                        resource_id = %resource_id,
                        image = %image.display(),
                        "Image flashed"
                    );
                } else {
                    self.record_provisioning_failure(&resource_id, ProvisioningStep::Flash);
                }
            }
            None => debug!(
                target: SESSION_TARGET,
                session = %self.name,
                resource_id = %resource_id,
                "No image configured, skipping flash"
            ),
        }
        self.transition(SessionState::Provisioned);

        if handle.reset().await {
            info!(
                target: SESSION_TARGET,
                session = %self.name,
                resource_id = %resource_id,
                "Device reset"
            );
        } else {
            self.record_provisioning_failure(&resource_id, ProvisioningStep::Reset);
        }
        self.transition(SessionState::Ready);
        Ok(())
    }

    /// Run `initialize`, `allocate`, `connect` and `provision`, stopping at the first
    /// failure. Returns whether the session is `Ready`.
    pub async fn establish(&mut self) -> bool {
        match self.bring_up().await {
            Ok(()) => self.state == SessionState::Ready,
            Err(e) => {
                debug!(
                    target: SESSION_TARGET,
                    session = %self.name,
                    state = %self.state,
                    error = %e,
                    "Session bring-up stopped"
                );
                false
            }
        }
    }

    async fn bring_up(&mut self) -> HilResult<()> {
        self.initialize().await?;
        self.allocate().await?;
        self.connect().await?;
        self.provision().await
    }

    /// Release everything held.
    ///
    /// Closes only an open connection and releases only a resource that is still
    /// allocated and no longer connected. Safe to call any number of times, in any
    /// state.
    ///
    /// Failures are recorded under the `finish` operation, never returned. If closing
    /// fails the resource is not released and the handle is still dropped, so the
    /// board stays allocated at the broker until the broker reclaims it. A later
    /// `finish` does not retry.
    pub async fn finish(&mut self) {
        if let Some(handle) = self.handle.take() {
            let resource_id = handle.resource_id().to_string();

            if handle.is_connected() {
                match handle.close_connection().await {
                    Ok(()) => debug!(
                        target: SESSION_TARGET,
                        session = %self.name,
                        resource_id = %resource_id,
                        "Connection closed"
                    ),
                    Err(e) => {
                        self.record("finish", &HilError::Device(e));
                    }
                }
            }

            if handle.is_allocated() {
                if handle.is_connected() {
                    warn!(
                        target: SESSION_TARGET,
                        session = %self.name,
                        resource_id = %resource_id,
                        "Connection still open, resource not released"
                    );
                } else if let Err(e) = handle.release().await {
                    self.record("finish", &HilError::Device(e));
                } else {
                    info!(
                        target: SESSION_TARGET,
                        session = %self.name,
                        resource_id = %resource_id,
                        "Resource released"
                    );
                }
            }
        }

        self.client = None;
        if self.state != SessionState::Finished {
            self.transition(SessionState::Finished);
        }
    }

    /// Run `body` against this session and always finish it afterwards.
    ///
    /// A panic inside `body` is resumed once teardown has completed.
    pub async fn run_scoped<T, F>(mut self, body: F) -> T
    where
        F: for<'s> FnOnce(&'s mut DeviceSession) -> BoxFuture<'s, T>,
    {
        let outcome = AssertUnwindSafe(body(&mut self)).catch_unwind().await;
        self.finish().await;
        match outcome {
            Ok(value) => value,
            Err(payload) => {
                error!(
                    target: SESSION_TARGET,
                    session = %self.name,
                    "Session body panicked, resources released"
                );
                std::panic::resume_unwind(payload)
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn transition(&mut self, next: SessionState) {
        debug!(
            target: SESSION_TARGET,
            session = %self.name,
            from = %self.state,
            to = %next,
            "State transition"
        );
        self.state = next;
    }

    fn expect_state(&self, operation: &'static str, expected: SessionState) -> HilResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> HilError {
        self.fail(
            operation,
            HilError::InvalidState {
                operation,
                state: self.state.to_string(),
            },
        )
    }

    /// Record `err` and hand it back for propagation.
    fn fail(&self, operation: &'static str, err: HilError) -> HilError {
        self.record(operation, &err);
        err
    }

    fn record(&self, operation: &'static str, err: &HilError) {
        error!(
            target: SESSION_TARGET,
            session = %self.name,
            operation = operation,
            kind = ?err.kind(),
            error = %err,
            "Session operation failed"
        );
        *self.last_error.lock() = Some(ErrorRecord::new(operation, err));
    }

    fn record_provisioning_failure(&self, resource_id: &str, step: ProvisioningStep) {
        self.record(
            "provision",
            &HilError::ProvisioningFailed {
                resource_id: resource_id.to_string(),
                step,
            },
        );
    }

    fn live_handle(&self) -> Option<&Arc<dyn DeviceHandle>> {
        if self.connected() {
            self.handle.as_ref()
        } else {
            None
        }
    }
}

#[async_trait]
impl ConnectorPrimitive for DeviceSession {
    async fn read(&self, count: usize) -> Bytes {
        let Some(handle) = self.live_handle() else {
            return Bytes::new();
        };
        match handle.read(count).await {
            Ok(data) => data,
            Err(e) => {
                self.record("read", &HilError::Device(e));
                Bytes::new()
            }
        }
    }

    async fn write(&self, payload: Bytes, echo: bool) -> Bytes {
        if let Some(handle) = self.live_handle() {
            if echo {
                info!(
                    target: TXD_TARGET,
                    session = %self.name,
                    "{}",
                    String::from_utf8_lossy(&payload)
                );
            }
            if let Err(e) = handle.write_line(&payload).await {
                self.record("write", &HilError::Device(e));
            }
        }
        payload
    }

    async fn flush(&self) {}

    fn connected(&self) -> bool {
        self.client.is_some()
            && self
                .handle
                .as_ref()
                .map_or(false, |handle| handle.is_connected())
    }

    fn error(&self) -> Option<ErrorRecord> {
        self.last_error.lock().clone()
    }

    async fn finish(&mut self) {
        DeviceSession::finish(self).await;
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            warn!(
                target: SESSION_TARGET,
                session = %self.name,
                resource_id = %handle.resource_id(),
                "Session dropped without finish(); resource may stay allocated"
            );
        }
    }
}
