//! Config schema for a sender/receiver pair sharing one channel.

use serde::{Deserialize, Serialize};

/// Channel used when the config does not name one.
pub const DEFAULT_CHANNEL: &str = "missive";

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediatorConfig {
    /// Name the receiver listens on and the sender dispatches to.
    pub channel: String,
    /// Default namespace for message types that do not declare one.
    pub namespace: Option<String>,
    pub sender: SideConfig,
    pub receiver: SideConfig,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.into(),
            namespace: None,
            sender: SideConfig::default(),
            receiver: SideConfig::default(),
        }
    }
}

/// Standard interceptors applied to every message on one side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SideConfig {
    pub retry: Option<RetryConfig>,
    pub timeout_ms: Option<u64>,
    pub delay_ms: Option<u64>,
}

impl SideConfig {
    /// No interceptor configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.retry.is_none() && self.timeout_ms.is_none() && self.delay_ms.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub attempts: u32,
}
