//! Error injection framework for mock devices and brokers.
//!
//! Enables configurable failures for resilience testing of session lifecycles.
//! Failures surface as [`DeviceError`]s tagged with the resource they hit.

use super::rng::MockRng;
use hil_core::error::{DeviceError, DeviceErrorKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Error injection configuration.
///
/// Operation names used by this crate: `open`, `close`, `read`, `write`, `flash`,
/// `reset`, `release`, `list_resources`, `allocate`.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0)
    failure_rates: Arc<HashMap<&'static str, f64>>,
    scenarios: Arc<Vec<ErrorScenario>>,
    rng: Arc<MockRng>,
    state: Arc<Mutex<ErrorState>>,
}

#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// Fail every call to `operation`
    AlwaysFail { operation: &'static str },
    /// Fail after N successful operations
    FailAfterN {
        operation: &'static str,
        count: u32,
    },
    /// Timeout on specific operation
    Timeout { operation: &'static str },
    /// Link drops on first use and stays down
    CommunicationLoss,
}

#[derive(Default, Debug)]
struct ErrorState {
    operation_counts: HashMap<&'static str, u32>,
    communication_lost: bool,
}

impl ErrorConfig {
    /// No injected errors (default)
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Uniform random failures on every operation
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::build(rates, Vec::new(), seed)
    }

    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Custom failure rates per operation
    pub fn with_rates(rates: HashMap<&'static str, f64>) -> Self {
        Self::build(rates, Vec::new(), None)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Decide whether `operation` on `resource_id` fails.
    ///
    /// Scenarios are consulted in order before the random failure rates. A lost link
    /// fails every later call until [`Self::reset`].
    pub fn check_operation(
        &self,
        resource_id: &str,
        operation: &'static str,
    ) -> Result<(), DeviceError> {
        let fail = |kind: DeviceErrorKind, message: String| {
            Err(DeviceError::new(resource_id, kind, message))
        };
        let mut state = self.state.lock();

        if state.communication_lost {
            return fail(DeviceErrorKind::Communication, "link is down".into());
        }

        for scenario in self.scenarios.iter() {
            match *scenario {
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return fail(
                        DeviceErrorKind::Communication,
                        format!("link dropped during '{}'", operation),
                    );
                }
                ErrorScenario::AlwaysFail { operation: op } if op == operation => {
                    return fail(
                        DeviceErrorKind::Hardware,
                        format!("injected failure on '{}'", operation),
                    );
                }
                ErrorScenario::Timeout { operation: op } if op == operation => {
                    return fail(
                        DeviceErrorKind::Timeout,
                        format!("'{}' did not complete", operation),
                    );
                }
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if op == operation => {
                    let seen = state.operation_counts.entry(operation).or_default();
                    *seen += 1;
                    if *seen > count {
                        return fail(
                            DeviceErrorKind::Hardware,
                            format!("'{}' failed after {} successful calls", operation, count),
                        );
                    }
                }
                _ => {}
            }
        }
        drop(state);

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);
        if self.rng.should_fail(rate) {
            return fail(
                DeviceErrorKind::Hardware,
                format!("random failure on '{}'", operation),
            );
        }
        Ok(())
    }

    /// Clear counters and lost-link state
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}
