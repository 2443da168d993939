use std::fs;
use std::path::Path;
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use serde::{Deserialize, Serialize};
use stream_core::DEFAULT_HISTORY_CAPACITY;
use stream_engine::{SessionSettings, TransportSettings};

pub const DEFAULT_CONFIG_FILENAME: &str = "stream_console.ron";

/// Console settings read from a RON file. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Overrides the per-stream stall timeout presets when set.
    pub stall_timeout_secs: Option<u64>,
    pub history_capacity: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            stall_timeout_secs: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl ConsoleConfig {
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn session_settings(&self, preset: SessionSettings) -> SessionSettings {
        match self.stall_timeout_secs {
            Some(secs) => SessionSettings {
                stall_timeout: Duration::from_secs(secs),
                ..preset
            },
            None => preset,
        }
    }
}

/// Loads the config at `path`. A missing file yields the defaults; an
/// unreadable one is an error.
pub fn load(path: &Path) -> anyhow::Result<ConsoleConfig> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            engine_warn!("No config at {:?}, using defaults", path);
            return Ok(ConsoleConfig::default());
        }
        Err(err) => return Err(anyhow::anyhow!("failed to read {}: {err}", path.display())),
    };

    let config: ConsoleConfig = ron::from_str(&content)
        .map_err(|err| anyhow::anyhow!("failed to parse {}: {err}", path.display()))?;
    engine_info!("Loaded config from {:?}", path);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: ConsoleConfig =
            ron::from_str(r#"(base_url: "https://admin.example", stall_timeout_secs: Some(5))"#)
                .unwrap();
        assert_eq!(config.base_url, "https://admin.example");
        assert_eq!(config.token, None);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(
            config
                .session_settings(SessionSettings::for_audit())
                .stall_timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn preset_is_kept_without_override() {
        let config = ConsoleConfig::default();
        assert_eq!(
            config
                .session_settings(SessionSettings::for_chat())
                .stall_timeout,
            SessionSettings::for_chat().stall_timeout
        );
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir.path().join(DEFAULT_CONFIG_FILENAME)).unwrap();
        assert_eq!(config, ConsoleConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILENAME);
        fs::write(&path, "(base_url: 42").unwrap();
        assert!(load(&path).is_err());
    }
}
