//! Mock remote device implementation.
//!
//! A `MockDevice` behaves like a dev board behind a lab broker: it can be claimed,
//! opened, flashed, reset and used as a byte pipe. By default the pipe is a loopback,
//! so bytes written come back on subsequent reads. Every call is counted so tests can
//! assert exactly how a session drove the hardware.

use async_trait::async_trait;
use bytes::Bytes;
use hil_core::device::DeviceHandle;
use hil_core::error::{DeviceError, DeviceErrorKind};
use hil_core::resource::{ResourceDescriptor, SerialParameters};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::common::{ErrorConfig, MockMode, TimingConfig, simulate_latency};

/// Call counters for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub opens: usize,
    pub closes: usize,
    pub flashes: usize,
    pub resets: usize,
    pub reads: usize,
    pub writes: usize,
    pub releases: usize,
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    flashes: AtomicUsize,
    resets: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
    releases: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> DeviceStats {
        DeviceStats {
            opens: self.opens.load(Ordering::SeqCst),
            closes: self.closes.load(Ordering::SeqCst),
            flashes: self.flashes.load(Ordering::SeqCst),
            resets: self.resets.load(Ordering::SeqCst),
            reads: self.reads.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
            releases: self.releases.load(Ordering::SeqCst),
        }
    }
}

#[derive(Default)]
struct Link {
    params: Option<SerialParameters>,
    /// Bytes waiting to be read by the host
    rx: VecDeque<u8>,
    /// Every payload handed to `write_line`, in order
    tx_log: Vec<Bytes>,
    flashed_image: Option<PathBuf>,
}

/// Simulated remote dev board.
pub struct MockDevice {
    resource_id: String,
    platform_name: String,
    allocated: AtomicBool,
    connected: AtomicBool,
    loopback: bool,
    flash_succeeds: AtomicBool,
    reset_succeeds: AtomicBool,
    link: Mutex<Link>,
    counters: Counters,
    errors: ErrorConfig,
    mode: MockMode,
    timing: TimingConfig,
    timeout: Mutex<Duration>,
}

impl MockDevice {
    pub fn new(resource_id: impl Into<String>, platform_name: impl Into<String>) -> Self {
        Self::builder(resource_id, platform_name).build()
    }

    pub fn builder(
        resource_id: impl Into<String>,
        platform_name: impl Into<String>,
    ) -> MockDeviceBuilder {
        MockDeviceBuilder {
            resource_id: resource_id.into(),
            platform_name: platform_name.into(),
            loopback: true,
            flash_succeeds: true,
            reset_succeeds: true,
            errors: ErrorConfig::none(),
            mode: MockMode::Instant,
            timing: TimingConfig::default(),
        }
    }

    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            resource_id: self.resource_id.clone(),
            platform_name: self.platform_name.clone(),
            allocated: self.is_allocated(),
        }
    }

    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    /// Atomically mark the device allocated. Returns false if it already was.
    pub(crate) fn try_claim(&self, timeout: Duration) -> bool {
        let claimed = self
            .allocated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if claimed {
            *self.timeout.lock() = timeout;
        }
        claimed
    }

    pub fn stats(&self) -> DeviceStats {
        self.counters.snapshot()
    }

    /// Parameters of the most recent successful `open_connection`.
    pub fn last_params(&self) -> Option<SerialParameters> {
        self.link.lock().params
    }

    pub fn flashed_image(&self) -> Option<PathBuf> {
        self.link.lock().flashed_image.clone()
    }

    /// Payloads received from the host, in write order.
    pub fn written(&self) -> Vec<Bytes> {
        self.link.lock().tx_log.clone()
    }

    /// Queue bytes as if the device had printed them.
    pub fn inject_output(&self, data: &[u8]) {
        self.link.lock().rx.extend(data.iter().copied());
    }

    pub fn set_flash_succeeds(&self, ok: bool) {
        self.flash_succeeds.store(ok, Ordering::SeqCst);
    }

    pub fn set_reset_succeeds(&self, ok: bool) {
        self.reset_succeeds.store(ok, Ordering::SeqCst);
    }

    fn current_timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    async fn latency(&self, delay_ms: u64, operation: &'static str) -> Result<(), DeviceError> {
        simulate_latency(
            self.mode,
            delay_ms,
            self.current_timeout(),
            &self.resource_id,
            operation,
        )
        .await
    }

    fn require_connected(&self) -> Result<(), DeviceError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DeviceError::not_connected(&self.resource_id))
        }
    }
}

#[async_trait]
impl DeviceHandle for MockDevice {
    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    async fn open_connection(&self, params: SerialParameters) -> Result<(), DeviceError> {
        Counters::bump(&self.counters.opens);
        if !self.is_allocated() {
            return Err(DeviceError::new(
                &self.resource_id,
                DeviceErrorKind::Allocation,
                "cannot open a resource that is not allocated",
            ));
        }
        self.errors.check_operation(&self.resource_id, "open")?;
        self.latency(self.timing.connection_ms, "open").await?;

        self.link.lock().params = Some(params);
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(
            resource_id = %self.resource_id,
            baud_rate = params.baud_rate,
            line_mode = params.line_mode,
            "Mock connection opened"
        );
        Ok(())
    }

    async fn close_connection(&self) -> Result<(), DeviceError> {
        Counters::bump(&self.counters.closes);
        self.errors.check_operation(&self.resource_id, "close")?;
        self.latency(self.timing.connection_ms, "close").await?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn flash(&self, image: &Path, force: bool) -> bool {
        Counters::bump(&self.counters.flashes);
        if let Err(e) = self.errors.check_operation(&self.resource_id, "flash") {
            tracing::warn!(error = %e, "Mock flash failed");
            return false;
        }
        if !self.flash_succeeds.load(Ordering::SeqCst) {
            return false;
        }
        if !image.exists() {
            tracing::warn!(image = %image.display(), "Mock flash: image not found");
            return false;
        }
        if !force && self.link.lock().flashed_image.is_some() {
            tracing::warn!("Mock flash refused: device already holds an image");
            return false;
        }
        if self.latency(self.timing.flash_ms, "flash").await.is_err() {
            return false;
        }
        self.link.lock().flashed_image = Some(image.to_path_buf());
        true
    }

    async fn reset(&self) -> bool {
        Counters::bump(&self.counters.resets);
        if let Err(e) = self.errors.check_operation(&self.resource_id, "reset") {
            tracing::warn!(error = %e, "Mock reset failed");
            return false;
        }
        if !self.reset_succeeds.load(Ordering::SeqCst) {
            return false;
        }
        self.latency(self.timing.reset_ms, "reset").await.is_ok()
    }

    async fn read(&self, count: usize) -> Result<Bytes, DeviceError> {
        Counters::bump(&self.counters.reads);
        self.require_connected()?;
        self.errors.check_operation(&self.resource_id, "read")?;
        self.latency(self.timing.io_ms, "read").await?;

        let mut link = self.link.lock();
        let take = count.min(link.rx.len());
        let data: Vec<u8> = link.rx.drain(..take).collect();
        Ok(Bytes::from(data))
    }

    async fn write_line(&self, payload: &[u8]) -> Result<(), DeviceError> {
        Counters::bump(&self.counters.writes);
        self.require_connected()?;
        self.errors.check_operation(&self.resource_id, "write")?;
        self.latency(self.timing.io_ms, "write").await?;

        let mut link = self.link.lock();
        link.tx_log.push(Bytes::copy_from_slice(payload));
        if self.loopback {
            link.rx.extend(payload.iter().copied());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_allocated(&self) -> bool {
        self.allocated.load(Ordering::SeqCst)
    }

    async fn release(&self) -> Result<(), DeviceError> {
        Counters::bump(&self.counters.releases);
        if self.is_connected() {
            return Err(DeviceError::new(
                &self.resource_id,
                DeviceErrorKind::Allocation,
                "cannot release while connected",
            ));
        }
        self.errors.check_operation(&self.resource_id, "release")?;
        self.link.lock().rx.clear();
        self.allocated.store(false, Ordering::SeqCst);
        tracing::debug!(resource_id = %self.resource_id, "Mock resource returned to pool");
        Ok(())
    }
}

/// Builder for [`MockDevice`].
pub struct MockDeviceBuilder {
    resource_id: String,
    platform_name: String,
    loopback: bool,
    flash_succeeds: bool,
    reset_succeeds: bool,
    errors: ErrorConfig,
    mode: MockMode,
    timing: TimingConfig,
}

impl MockDeviceBuilder {
    /// Echo writes back to the read side (default: on)
    pub fn loopback(mut self, enabled: bool) -> Self {
        self.loopback = enabled;
        self
    }

    pub fn flash_succeeds(mut self, ok: bool) -> Self {
        self.flash_succeeds = ok;
        self
    }

    pub fn reset_succeeds(mut self, ok: bool) -> Self {
        self.reset_succeeds = ok;
        self
    }

    pub fn errors(mut self, errors: ErrorConfig) -> Self {
        self.errors = errors;
        self
    }

    pub fn realistic(mut self, timing: TimingConfig) -> Self {
        self.mode = MockMode::Realistic;
        self.timing = timing;
        self
    }

    pub fn build(self) -> MockDevice {
        MockDevice {
            resource_id: self.resource_id,
            platform_name: self.platform_name,
            allocated: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            loopback: self.loopback,
            flash_succeeds: AtomicBool::new(self.flash_succeeds),
            reset_succeeds: AtomicBool::new(self.reset_succeeds),
            link: Mutex::new(Link::default()),
            counters: Counters::default(),
            errors: self.errors,
            mode: self.mode,
            timing: self.timing,
            timeout: Mutex::new(Duration::from_secs(30)),
        }
    }
}
