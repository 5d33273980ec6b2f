use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{engine::DEFAULT_TICK_INTERVAL_MS, tracker::DEFAULT_POLL_INTERVAL_MS};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TrackerConfig {
    pub poll_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    /// Optional JSON file with the show's cue stacks.
    pub cue_file: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            cue_file: None,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
