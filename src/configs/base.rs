use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    common::errors::{ControlError, ControlResult},
    configs::*,
};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub mixer: MixerConfig,
    #[serde(default)]
    pub lighting: LightingConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    pub fn load() -> ControlResult<Self> {
        let config_path = if Path::new("config.toml").exists() {
            "config.toml"
        } else if Path::new("config.default.toml").exists() {
            "config.default.toml"
        } else {
            return Err(ControlError::Config(
                "config.toml or config.default.toml not found".into(),
            ));
        };

        crate::log_println!("Loading configuration from: {}", config_path);
        Self::from_file(config_path)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ControlResult<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| ControlError::Config(format!("{}: {}", path.display(), e)))?;
        if config_str.trim().is_empty() {
            return Err(ControlError::Config(format!("{} is empty", path.display())));
        }
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> ControlResult<Self> {
        let config: Config =
            toml::from_str(config_str).map_err(|e| ControlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ControlResult<()> {
        if self.mixer.enabled {
            if self.mixer.host.trim().is_empty() {
                return Err(ControlError::Config("mixer.host must not be empty".into()));
            }
            if self.mixer.reconnect_delay_ms == 0 || self.mixer.response_timeout_ms == 0 {
                return Err(ControlError::Config(
                    "mixer reconnect delay and response timeout must be positive".into(),
                ));
            }
        }

        if self.lighting.enabled {
            if self.lighting.host.trim().is_empty() {
                return Err(ControlError::Config("lighting.host must not be empty".into()));
            }
            if self.lighting.reconnect_delay_ms == 0 {
                return Err(ControlError::Config(
                    "lighting.reconnect_delay_ms must be positive".into(),
                ));
            }
        }

        if self.tracker.poll_interval_ms == 0 {
            return Err(ControlError::Config(
                "tracker.poll_interval_ms must be positive".into(),
            ));
        }
        if self.engine.tick_interval_ms == 0 {
            return Err(ControlError::Config(
                "engine.tick_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.mixer.port, 4455);
        assert_eq!(config.mixer.response_timeout_ms, 500);
        assert_eq!(config.lighting.cue_list, 1);
        assert!(config.lighting.filter_cue_list);
        assert_eq!(config.tracker.poll_interval_ms, 100);
        assert_eq!(config.engine.tick_interval_ms, 50);
        assert!(config.logging.is_none());
    }

    #[test]
    fn partial_sections_fill_in() {
        let config = Config::parse(
            r#"
            [mixer]
            host = "10.0.0.5"
            password = "hunter2"

            [lighting]
            cue_list = 3
            filter_cue_list = false

            [logging]
            level = "debug"
            [logging.file]
            path = "logs/show.log"
            "#,
        )
        .unwrap();

        assert_eq!(config.mixer.url(), "ws://10.0.0.5:4455");
        assert_eq!(config.mixer.password, "hunter2");
        assert_eq!(config.lighting.cue_list, 3);
        assert!(!config.lighting.filter_cue_list);
        let file = config.logging.unwrap().file.unwrap();
        assert_eq!(file.path, "logs/show.log");
        assert_eq!(file.max_lines, 10_000);
    }

    #[test]
    fn rejects_zero_intervals() {
        let err = Config::parse("[engine]\ntick_interval_ms = 0").unwrap_err();
        assert!(matches!(err, ControlError::Config(_)));

        let err = Config::parse("[tracker]\npoll_interval_ms = 0").unwrap_err();
        assert!(matches!(err, ControlError::Config(_)));
    }

    #[test]
    fn rejects_empty_host_only_when_enabled() {
        assert!(Config::parse("[mixer]\nhost = \"\"").is_err());
        assert!(Config::parse("[mixer]\nenabled = false\nhost = \"\"").is_ok());
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = Config::parse("[mixer\nport = 1").unwrap_err();
        assert!(matches!(err, ControlError::Config(_)));
    }
}
