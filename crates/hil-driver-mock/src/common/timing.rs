//! Simulated latency for realistic mode.
//!
//! Instant mode (the default) never sleeps. Realistic mode sleeps for the figures in
//! [`TimingConfig`], and every sleep is cut off at the endpoint timeout the session
//! handed to the factory, so a slow mock behaves like a broker that stops answering.

use hil_core::error::{DeviceError, DeviceErrorKind};
use std::time::Duration;

/// Whether mock operations take wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    #[default]
    Instant,
    /// Sleep per [`TimingConfig`], bounded by the endpoint timeout
    Realistic,
}

/// Simulated latency per operation, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Broker round trip (list, allocate)
    pub broker_ms: u64,
    /// Opening or closing the transport
    pub connection_ms: u64,
    /// Writing a firmware image
    pub flash_ms: u64,
    /// Hardware reset until the target is running again
    pub reset_ms: u64,
    /// Per read/write transfer
    pub io_ms: u64,
}

impl TimingConfig {
    /// Rough figures for a USB-attached dev board behind a lab broker
    pub fn lab_board() -> Self {
        Self {
            broker_ms: 20,
            connection_ms: 50,
            flash_ms: 1500,
            reset_ms: 300,
            io_ms: 1,
        }
    }
}

/// Sleep for `delay_ms` in realistic mode, failing with a timeout past `limit`.
pub(crate) async fn simulate_latency(
    mode: MockMode,
    delay_ms: u64,
    limit: Duration,
    resource_id: &str,
    operation: &'static str,
) -> Result<(), DeviceError> {
    if mode == MockMode::Instant || delay_ms == 0 {
        return Ok(());
    }
    tokio::time::timeout(limit, tokio::time::sleep(Duration::from_millis(delay_ms)))
        .await
        .map_err(|_| {
            DeviceError::new(
                resource_id,
                DeviceErrorKind::Timeout,
                format!("'{}' exceeded {:?}", operation, limit),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(MockMode::default(), MockMode::Instant);
        assert_eq!(TimingConfig::default().flash_ms, 0);
        assert!(TimingConfig::lab_board().flash_ms > TimingConfig::lab_board().reset_ms);
    }

    #[tokio::test]
    async fn test_instant_mode_ignores_delay() {
        let result =
            simulate_latency(MockMode::Instant, 60_000, Duration::ZERO, "board-1", "flash").await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_realistic_delay_past_limit_times_out() {
        let ok = simulate_latency(
            MockMode::Realistic,
            10,
            Duration::from_secs(1),
            "board-1",
            "reset",
        )
        .await;
        assert!(ok.is_ok());

        let err = simulate_latency(
            MockMode::Realistic,
            5_000,
            Duration::from_secs(1),
            "board-1",
            "flash",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, DeviceErrorKind::Timeout);
        assert!(err.message.contains("flash"));
    }
}
