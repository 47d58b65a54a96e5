//! Orchestrator configuration.
//!
//! Hardware capacities come from the backend at construction time. The
//! values here only narrow them (an operator cap on group slots, say) or
//! choose policy.

use l3_hal::PacketAction;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const DEFAULT_EVENT_QUEUE_BATCH: usize = 128;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for [`L3Orch`](crate::L3Orch).
///
/// Every field is optional in the JSON form:
///
/// ```json
/// { "max_groups": 256, "normalize_weights": false, "default_route_action": "drop" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct L3OrchConfig {
    /// Cap on next-hop group slots. The effective limit is the smaller of
    /// this and the backend's `max_groups`.
    pub max_groups: Option<u32>,
    /// Cap on members per group, combined with the backend the same way.
    pub max_group_members: Option<u32>,
    /// Reduce weighted-ECMP weights by their greatest common divisor.
    pub normalize_weights: bool,
    /// Packet action for routes that do not name one.
    pub default_route_action: PacketAction,
    /// Most events applied by one `process_events` call.
    pub event_queue_batch: usize,
}

impl Default for L3OrchConfig {
    fn default() -> Self {
        Self {
            max_groups: None,
            max_group_members: None,
            normalize_weights: true,
            default_route_action: PacketAction::Forward,
            event_queue_batch: DEFAULT_EVENT_QUEUE_BATCH,
        }
    }
}

impl L3OrchConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: L3OrchConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_groups == Some(0) {
            return Err(ConfigError::Invalid("max_groups must be positive".into()));
        }
        if self.max_group_members == Some(0) {
            return Err(ConfigError::Invalid(
                "max_group_members must be positive".into(),
            ));
        }
        if self.event_queue_batch == 0 {
            return Err(ConfigError::Invalid(
                "event_queue_batch must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn with_max_groups(mut self, max: u32) -> Self {
        self.max_groups = Some(max);
        self
    }

    pub fn with_max_group_members(mut self, max: u32) -> Self {
        self.max_group_members = Some(max);
        self
    }
}
