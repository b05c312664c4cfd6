//! Engine configuration.

use std::path::Path;

use refledger_core::RewardSchedule;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to `RocksDB` data directory (default: "/data/refledger").
    pub data_dir: String,

    /// Seconds between release sweeps (default: 300).
    pub release_interval_seconds: u64,

    /// Provider API URL (optional; no sync without it).
    pub provider_api_url: Option<String>,

    /// Provider API key (optional).
    pub provider_api_key: Option<String>,

    /// The reward schedule.
    pub schedule: RewardSchedule,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// `SCHEDULE_PATH` may point at a JSON reward schedule; a missing or
    /// unreadable file falls back to the built-in default schedule.
    #[must_use]
    pub fn from_env() -> Self {
        let schedule = std::env::var("SCHEDULE_PATH")
            .ok()
            .and_then(|path| match load_schedule(&path) {
                Ok(schedule) => {
                    tracing::info!(path = %path, "Loaded reward schedule from file");
                    Some(schedule)
                }
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "Failed to load reward schedule, using default");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/refledger".into()),
            release_interval_seconds: std::env::var("RELEASE_INTERVAL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            provider_api_url: std::env::var("PROVIDER_API_URL").ok(),
            provider_api_key: std::env::var("PROVIDER_API_KEY").ok(),
            schedule,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: "/data/refledger".into(),
            release_interval_seconds: 300,
            provider_api_url: None,
            provider_api_key: None,
            schedule: RewardSchedule::default(),
        }
    }
}

/// Load a reward schedule from a JSON file.
fn load_schedule(path: &str) -> Result<RewardSchedule, std::io::Error> {
    let path = Path::new(path);
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_carries_default_schedule() {
        let config = EngineConfig::default();
        assert_eq!(config.schedule.max_levels, 3);
        assert_eq!(config.release_interval_seconds, 300);
    }

    #[test]
    fn schedule_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&RewardSchedule::default()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = load_schedule(file.path().to_str().unwrap()).unwrap();
        assert_eq!(loaded.max_levels, 3);
        assert_eq!(loaded.terms.len(), 6);
    }

    #[test]
    fn malformed_schedule_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();
        assert!(load_schedule(file.path().to_str().unwrap()).is_err());
    }
}
