use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lighting::constants::{DEFAULT_CUE_LIST, DEFAULT_RECONNECT_DELAY_MS};

/// Lighting console OSC-over-TCP endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LightingConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Cue list that outbound fires target and inbound notifications are
    /// filtered on.
    pub cue_list: u32,
    /// When false, inbound cue notifications from every list are dispatched.
    pub filter_cue_list: bool,
    pub reconnect_delay_ms: u64,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 3032,
            cue_list: DEFAULT_CUE_LIST,
            filter_cue_list: true,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

impl LightingConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
