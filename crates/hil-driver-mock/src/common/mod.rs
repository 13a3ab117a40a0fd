//! Common infrastructure for the mock backend.
//!
//! - **timing**: Instant vs. realistic mode and lab-like latencies
//! - **errors**: Error injection framework
//! - **rng**: Seeded random number generator

pub mod errors;
pub mod rng;
pub mod timing;

pub use errors::{ErrorConfig, ErrorScenario};
pub use rng::MockRng;
pub use timing::{MockMode, TimingConfig};

pub(crate) use timing::simulate_latency;
