//! Plain data exchanged with a resource manager.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default serial line speed for remote devices.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// A resource as listed by a broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub resource_id: String,
    pub platform_name: String,
    #[serde(default)]
    pub allocated: bool,
}

/// Filter handed to [`crate::manager::ResourceManagerClient::allocate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationCriteria {
    pub platform_name: Option<String>,
    /// Pins allocation to one specific resource.
    pub target_id: Option<String>,
}

impl AllocationCriteria {
    pub fn new(platform_name: Option<String>, target_id: Option<String>) -> Self {
        Self {
            platform_name,
            target_id,
        }
    }

    /// Whether `descriptor` satisfies every constraint, ignoring allocation status.
    pub fn matches(&self, descriptor: &ResourceDescriptor) -> bool {
        let platform_ok = self
            .platform_name
            .as_deref()
            .map_or(true, |p| p == descriptor.platform_name);
        let target_ok = self
            .target_id
            .as_deref()
            .map_or(true, |t| t == descriptor.resource_id);
        platform_ok && target_ok
    }

    /// Criteria in the key/value form brokers accept on the wire.
    ///
    /// `platform_name` is always present, even when unconstrained.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(
            "platform_name".to_string(),
            self.platform_name.clone().unwrap_or_default(),
        );
        if let Some(target) = &self.target_id {
            map.insert("target_id".to_string(), target.clone());
        }
        map
    }
}

impl std::fmt::Display for AllocationCriteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .to_map()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Transport parameters for opening a device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialParameters {
    /// Line-delimited framing. Sessions always open raw (`false`).
    pub line_mode: bool,
    pub baud_rate: u32,
}

impl SerialParameters {
    /// Raw byte stream at `baud_rate`.
    pub fn raw(baud_rate: u32) -> Self {
        Self {
            line_mode: false,
            baud_rate,
        }
    }
}

impl Default for SerialParameters {
    fn default() -> Self {
        Self::raw(DEFAULT_BAUD_RATE)
    }
}

/// Where a broker lives and how long its blocking calls may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerEndpoint {
    pub host: Option<String>,
    pub port: u16,
    /// Upper bound backends must apply to allocate/flash/reset/open calls.
    pub timeout: Duration,
}

impl std::fmt::Display for ManagerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}",
            self.host.as_deref().unwrap_or("<unset>"),
            self.port
        )
    }
}
