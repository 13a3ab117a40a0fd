//! Session configuration using Figment
//!
//! A session is configured once and never mutated. Configuration is loaded from:
//! 1. A TOML file (either a bare session table, or a harness file with `[session]`)
//! 2. Environment variables prefixed with `RUST_HIL_`
//!
//! Keys used by older harness configurations (`grm_host`, `grm_port`, `grm_module`,
//! `baudrate`) are accepted as aliases.
//!
//! # Example
//! ```no_run
//! use rust_hil::config::SessionConfig;
//!
//! let config = SessionConfig::load_from("hil.toml")?;
//! println!("backend: {}", config.manager_backend);
//! # Ok::<(), rust_hil::error::ConfigError>(())
//! ```

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use hil_core::error::{HilError, HilResult};
use hil_core::resource::{AllocationCriteria, ManagerEndpoint, SerialParameters, DEFAULT_BAUD_RATE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "RUST_HIL_";

/// Configuration of one remote device session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Pins allocation to one specific resource
    #[serde(default)]
    pub target_id: Option<String>,
    /// Network host of the resource broker
    #[serde(default, alias = "grm_host")]
    pub manager_host: Option<String>,
    /// Network port of the resource broker
    #[serde(default = "default_manager_port", alias = "grm_port")]
    pub manager_port: u16,
    /// Registered backend id of the broker implementation
    #[serde(default = "default_manager_backend", alias = "grm_module")]
    pub manager_backend: String,
    /// Hardware platform filter used during allocation
    #[serde(default)]
    pub platform_name: Option<String>,
    /// Serial line speed
    #[serde(default = "default_baud_rate", alias = "baudrate")]
    pub baud_rate: u32,
    /// Firmware image flashed during provisioning
    #[serde(default)]
    pub image_path: Option<PathBuf>,
    /// Bound backends apply to their blocking broker and hardware calls
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
}

/// Harness file: logging settings plus a `[session]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub session: SessionConfig,
}

// Default value functions
fn default_manager_port() -> u16 {
    8000
}

fn default_manager_backend() -> String {
    "unknown".to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_backend_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_id: None,
            manager_host: None,
            manager_port: default_manager_port(),
            manager_backend: default_manager_backend(),
            platform_name: None,
            baud_rate: default_baud_rate(),
            image_path: None,
            backend_timeout_ms: default_backend_timeout_ms(),
        }
    }
}

impl SessionConfig {
    /// Default configuration selecting `backend`
    pub fn for_backend(backend: impl Into<String>) -> Self {
        Self {
            manager_backend: backend.into(),
            ..Self::default()
        }
    }

    pub fn with_platform(mut self, platform_name: impl Into<String>) -> Self {
        self.platform_name = Some(platform_name.into());
        self
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_image(mut self, image_path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(image_path.into());
        self
    }

    pub fn with_manager(mut self, host: impl Into<String>, port: u16) -> Self {
        self.manager_host = Some(host.into());
        self.manager_port = port;
        self
    }

    /// Load a bare session table from `path`, then apply `RUST_HIL_*` overrides
    ///
    /// Example override: `RUST_HIL_MANAGER_BACKEND=mock`
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a session table from TOML text, without environment overrides
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Toml::string(toml)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints after loading
    pub fn validate(&self) -> HilResult<()> {
        if self.manager_backend.trim().is_empty() {
            return Err(HilError::Configuration(
                "manager_backend must not be empty".into(),
            ));
        }
        if self.manager_port == 0 {
            return Err(HilError::Configuration(
                "manager_port must be in 1-65535".into(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(HilError::Configuration(
                "baud_rate must be positive".into(),
            ));
        }
        if self.backend_timeout_ms == 0 {
            return Err(HilError::Configuration(
                "backend_timeout_ms must be positive".into(),
            ));
        }
        if matches!(self.target_id.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(HilError::Configuration(
                "target_id must not be empty when set".into(),
            ));
        }
        if matches!(self.platform_name.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(HilError::Configuration(
                "platform_name must not be empty when set".into(),
            ));
        }
        Ok(())
    }

    /// Broker location handed to the backend factory
    pub fn endpoint(&self) -> ManagerEndpoint {
        ManagerEndpoint {
            host: self.manager_host.clone(),
            port: self.manager_port,
            timeout: Duration::from_millis(self.backend_timeout_ms),
        }
    }

    pub fn criteria(&self) -> AllocationCriteria {
        AllocationCriteria::new(self.platform_name.clone(), self.target_id.clone())
    }

    /// Raw, non-line-buffered transport at the configured baud rate
    pub fn serial_parameters(&self) -> SerialParameters {
        SerialParameters::raw(self.baud_rate)
    }
}

impl HarnessConfig {
    /// Load a harness file, then apply `RUST_HIL_*` overrides
    ///
    /// Nested keys are separated by a double underscore:
    /// `RUST_HIL_SESSION__PLATFORM_NAME=K64F`
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.session.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.manager_port, 8000);
        assert_eq!(config.manager_backend, "unknown");
        assert_eq!(config.baud_rate, 115_200);
        assert!(config.target_id.is_none());
        assert!(config.image_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_with_legacy_aliases() {
        let config = SessionConfig::from_toml_str(
            r#"
            grm_host = "10.0.0.5"
            grm_port = 8010
            grm_module = "mock"
            baudrate = 9600
            platform_name = "K64F"
            "#,
        )
        .unwrap();

        assert_eq!(config.manager_host.as_deref(), Some("10.0.0.5"));
        assert_eq!(config.manager_port, 8010);
        assert_eq!(config.manager_backend, "mock");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.endpoint().to_string(), "10.0.0.5:8010");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            SessionConfig::for_backend(""),
            SessionConfig::for_backend("mock").with_baud_rate(0),
            SessionConfig::for_backend("mock").with_target(" "),
            SessionConfig::for_backend("mock").with_platform(""),
            SessionConfig::for_backend("mock").with_manager("host", 0),
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(HilError::Configuration(_))),
                "{:?} should be rejected",
                config
            );
        }
    }

    #[test]
    fn test_invalid_toml_value_is_load_error() {
        let result = SessionConfig::from_toml_str("baud_rate = \"fast\"");
        assert!(matches!(result, Err(ConfigError::Load(_))));

        let result = SessionConfig::from_toml_str("baud_rate = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_derived_transport_values() {
        let config = SessionConfig::for_backend("mock")
            .with_platform("K64F")
            .with_target("abc")
            .with_baud_rate(9600);

        let params = config.serial_parameters();
        assert!(!params.line_mode);
        assert_eq!(params.baud_rate, 9600);

        let criteria = config.criteria();
        assert_eq!(criteria.platform_name.as_deref(), Some("K64F"));
        assert_eq!(criteria.target_id.as_deref(), Some("abc"));
        assert_eq!(config.endpoint().timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_harness_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            log_level = "debug"

            [session]
            manager_backend = "mock"
            platform_name = "NUCLEO_F429ZI"
            image_path = "build/fw.bin"
            "#
        )
        .unwrap();

        let config = HarnessConfig::load_from(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.session.manager_backend, "mock");
        assert_eq!(
            config.session.image_path.as_deref(),
            Some(Path::new("build/fw.bin"))
        );
    }
}
