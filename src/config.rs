use crate::watcher::{InvalidWatchConfig, WatchConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from pixsweep.toml.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
#[derive(Default)]
pub struct SweepConfig {
    pub watch: WatchSettings,
    pub shutdown: ShutdownConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchSettings {
    pub directory: Option<PathBuf>,
    pub retention_days: u32,
    pub scan_interval_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for the watch task after requesting a stop.
    pub join_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events kept for display before the oldest are dropped.
    pub capacity: usize,
    pub display_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    /// Write a per-run log file into `directory`.
    pub file: bool,
    /// Per-run log files to keep; 0 keeps all of them.
    pub keep_sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
#[derive(Default)]
pub struct StatusConfig {
    pub file: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            directory: None,
            retention_days: 0,
            scan_interval_secs: 1.0,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            join_timeout_secs: 5,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: crate::events::DEFAULT_CAPACITY,
            display_interval_ms: 500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("app_run_logs"),
            file: true,
            keep_sessions: 0,
        }
    }
}

/// Errors from loading or resolving configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// No folder given in the config file or on the command line.
    MissingDirectory,
    InvalidInterval {
        secs: f64,
    },
    Watch(InvalidWatchConfig),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::MissingDirectory => {
                write!(
                    f,
                    "no folder to monitor: pass one on the command line or set watch.directory"
                )
            }
            ConfigError::InvalidInterval { secs } => {
                write!(f, "scan interval must be a positive number of seconds, got {secs}")
            }
            ConfigError::Watch(e) => write!(f, "invalid input folder: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Watch(e) => Some(e),
            ConfigError::MissingDirectory | ConfigError::InvalidInterval { .. } => None,
        }
    }
}

impl SweepConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file yields defaults when `required` is false; a file that
    /// exists but does not parse is always an error.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::parse(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown.join_timeout_secs)
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_millis(self.events.display_interval_ms.max(1))
    }

    /// Resolve the `[watch]` table into a validated session config.
    pub fn watch_config(&self) -> Result<WatchConfig, ConfigError> {
        let directory = self
            .watch
            .directory
            .clone()
            .ok_or(ConfigError::MissingDirectory)?;
        let secs = self.watch.scan_interval_secs;
        let interval = Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or(ConfigError::InvalidInterval { secs })?;

        let config =
            WatchConfig::new(directory, self.watch.retention_days).with_scan_interval(interval);
        config.validate().map_err(ConfigError::Watch)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = SweepConfig::default();
        assert_eq!(config.watch.directory, None);
        assert_eq!(config.watch.retention_days, 0);
        assert_eq!(config.watch.scan_interval_secs, 1.0);
        assert_eq!(config.join_timeout(), Duration::from_secs(5));
        assert_eq!(config.events.capacity, 200);
        assert_eq!(config.display_interval(), Duration::from_millis(500));
        assert_eq!(config.logging.directory, PathBuf::from("app_run_logs"));
        assert!(config.logging.file);
        assert_eq!(config.status.file, None);
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = SweepConfig::parse(
            r#"
[watch]
directory = "/srv/captures"
retention_days = 14

[logging]
keep_sessions = 10
"#,
        )
        .unwrap();
        assert_eq!(config.watch.directory, Some(PathBuf::from("/srv/captures")));
        assert_eq!(config.watch.retention_days, 14);
        assert_eq!(config.watch.scan_interval_secs, 1.0);
        assert_eq!(config.logging.keep_sessions, 10);
        assert!(config.logging.file);
        assert_eq!(config.shutdown.join_timeout_secs, 5);
    }

    #[test]
    fn test_negative_retention_rejected() {
        assert!(SweepConfig::parse("[watch]\nretention_days = -1\n").is_err());
    }

    #[test]
    fn test_load_missing_optional_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = SweepConfig::load(&dir.path().join("pixsweep.toml"), false).unwrap();
        assert_eq!(config, SweepConfig::default());
    }

    #[test]
    fn test_load_missing_required_file_errors() {
        let dir = tempdir().unwrap();
        let err = SweepConfig::load(&dir.path().join("custom.toml"), true).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_bad_toml_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pixsweep.toml");
        std::fs::write(&path, "[watch\nretention_days = 3").unwrap();
        let err = SweepConfig::load(&path, false).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let mut config = SweepConfig::default();
        config.watch.directory = Some(PathBuf::from("/tmp/shots"));
        config.status.file = Some(PathBuf::from(".pixsweep.status"));
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(SweepConfig::parse(&text).unwrap(), config);
    }

    #[test]
    fn test_watch_config_requires_directory() {
        let err = SweepConfig::default().watch_config().unwrap_err();
        assert!(matches!(err, ConfigError::MissingDirectory));
    }

    #[test]
    fn test_watch_config_resolves_interval() {
        let dir = tempdir().unwrap();
        let mut config = SweepConfig::default();
        config.watch.directory = Some(dir.path().to_path_buf());
        config.watch.retention_days = 3;
        config.watch.scan_interval_secs = 0.25;

        let watch = config.watch_config().unwrap();
        assert_eq!(watch.directory, dir.path());
        assert_eq!(watch.retention_days, 3);
        assert_eq!(watch.scan_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_watch_config_rejects_bad_interval() {
        let dir = tempdir().unwrap();
        for secs in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = SweepConfig::default();
            config.watch.directory = Some(dir.path().to_path_buf());
            config.watch.scan_interval_secs = secs;
            assert!(
                matches!(
                    config.watch_config(),
                    Err(ConfigError::InvalidInterval { .. })
                ),
                "{secs} should be rejected"
            );
        }
    }

    #[test]
    fn test_watch_config_rejects_missing_folder() {
        let dir = tempdir().unwrap();
        let mut config = SweepConfig::default();
        config.watch.directory = Some(dir.path().join("missing"));
        let err = config.watch_config().unwrap_err();
        assert!(matches!(err, ConfigError::Watch(_)));
    }
}
