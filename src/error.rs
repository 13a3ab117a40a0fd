//! Application-level error types.
//!
//! Session and device errors live in `hil_core::error`. This module adds the failures
//! that only occur in the application layer: loading and validating configuration.
//!
//! - **`Load`**: Wraps `figment::Error` for unreadable files, bad TOML, or values of
//!   the wrong type (including from `RUST_HIL_*` environment overrides).
//! - **`Invalid`**: Values that parse but fail `SessionConfig::validate`.

use hil_core::error::HilError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration sources could not be read or deserialized.
    #[error("Configuration error: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Configuration values are semantically invalid.
    #[error(transparent)]
    Invalid(#[from] HilError),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}
