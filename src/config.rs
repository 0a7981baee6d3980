use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the engine daemon, read from `HOTEL_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory holding `hotel.wal`.
    pub data_dir: PathBuf,
    /// Appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
            metrics_port: None,
        }
    }
}

impl EngineConfig {
    /// Load a `.env` file if there is one, then read the process environment.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("loaded {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        Self {
            data_dir: lookup("HOTEL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: parsed("HOTEL_COMPACT_THRESHOLD")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.compact_threshold),
            compact_interval: parsed("HOTEL_COMPACT_INTERVAL_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
            metrics_port: lookup("HOTEL_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("hotel.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = EngineConfig::from_lookup(|_| None);
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.wal_path(), PathBuf::from("./data/hotel.wal"));
    }

    #[test]
    fn reads_every_variable() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("HOTEL_DATA_DIR", "/var/lib/hotel"),
            ("HOTEL_COMPACT_THRESHOLD", "250"),
            ("HOTEL_COMPACT_INTERVAL_SECS", "15"),
            ("HOTEL_METRICS_PORT", "9100"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/hotel"));
        assert_eq!(config.compact_threshold, 250);
        assert_eq!(config.compact_interval, Duration::from_secs(15));
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn bad_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("HOTEL_COMPACT_THRESHOLD", "lots"),
            ("HOTEL_COMPACT_INTERVAL_SECS", "0"),
            ("HOTEL_METRICS_PORT", "99999"),
        ]));
        assert_eq!(config.compact_threshold, 1000);
        assert_eq!(config.compact_interval, Duration::from_secs(60));
        assert_eq!(config.metrics_port, None);
    }
}
