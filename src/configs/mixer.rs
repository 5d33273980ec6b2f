use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::constants::{DEFAULT_RECONNECT_DELAY_MS, DEFAULT_RESPONSE_TIMEOUT_MS};

/// Video mixer websocket endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MixerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Empty when the mixer does not require authentication.
    pub password: String,
    pub reconnect_delay_ms: u64,
    pub response_timeout_ms: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 4455,
            password: String::new(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
        }
    }
}

impl MixerConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}
