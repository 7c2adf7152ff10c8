//! Configuration loading helpers.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::backoff::BackoffPolicy;
use crate::crash_point::{CrashInjector, CrashMode};
use crate::log::LogConfig;

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading config files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid value for a key.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value string.
        value: String,
    },
    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PmwalConfig {
    /// Log configuration.
    pub log: Option<LogSection>,
    /// Spin-loop backoff configuration.
    pub backoff: Option<BackoffSection>,
}

impl PmwalConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration from the `PMWAL_CONFIG` env var (if set),
    /// then apply `PMWAL__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let config_path = env::var("PMWAL_CONFIG").ok();
        let mut config = match config_path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            if !key.starts_with("PMWAL__") {
                continue;
            }
            let path = key["PMWAL__".len()..].to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim().to_string();

            match parts.as_slice() {
                ["log", "capacity"] => {
                    self.log_mut().capacity = Some(parse_value(&key, &value)?);
                }
                ["log", "path"] => {
                    self.log_mut().path = Some(PathBuf::from(value));
                }
                ["log", "apply_retries"] => {
                    self.log_mut().apply_retries = Some(parse_value(&key, &value)?);
                }
                ["log", "crash_rate"] => {
                    self.log_mut().crash_rate = Some(parse_value(&key, &value)?);
                }
                ["log", "crash_mode"] => {
                    let mode = CrashMode::parse(&value)
                        .ok_or_else(|| invalid_value(&key, &value))?;
                    self.log_mut().crash_mode = Some(mode);
                }
                ["backoff", "reservation"] => {
                    let policy = BackoffPolicy::parse(&value)
                        .ok_or_else(|| invalid_value(&key, &value))?;
                    self.backoff_mut().reservation = Some(policy);
                }
                ["backoff", "idle"] => {
                    let policy = BackoffPolicy::parse(&value)
                        .ok_or_else(|| invalid_value(&key, &value))?;
                    self.backoff_mut().idle = Some(policy);
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        Ok(())
    }

    /// Build a `LogConfig` using defaults plus overrides.
    ///
    /// The result is not validated here; `DurableLog::open` does that.
    pub fn to_log_config(&self) -> LogConfig {
        let mut config = LogConfig::default();
        if let Some(log) = &self.log {
            log.apply_to(&mut config);
        }
        if let Some(backoff) = &self.backoff {
            backoff.apply_to(&mut config);
        }
        config
    }

    fn log_mut(&mut self) -> &mut LogSection {
        self.log.get_or_insert_with(LogSection::default)
    }

    fn backoff_mut(&mut self) -> &mut BackoffSection {
        self.backoff.get_or_insert_with(BackoffSection::default)
    }
}

/// `[log]` section overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// Number of slots.
    pub capacity: Option<usize>,
    /// Backing file of the persistent region.
    pub path: Option<PathBuf>,
    /// Extra attempts made when applying an entry fails.
    pub apply_retries: Option<u32>,
    /// Crash injection rate (0 = disabled).
    pub crash_rate: Option<u32>,
    /// What an injected crash does.
    pub crash_mode: Option<CrashMode>,
}

impl LogSection {
    fn apply_to(&self, config: &mut LogConfig) {
        if let Some(value) = self.capacity {
            config.capacity = value;
        }
        if let Some(value) = &self.path {
            config.path = Some(value.clone());
        }
        if let Some(value) = self.apply_retries {
            config.apply_retries = value;
        }
        if self.crash_rate.is_some() || self.crash_mode.is_some() {
            let rate = self.crash_rate.unwrap_or(config.crash.rate());
            let mode = self.crash_mode.unwrap_or(config.crash.mode());
            config.crash = CrashInjector::new(rate, mode);
        }
    }
}

/// `[backoff]` section overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffSection {
    /// Policy used by producers while the log is full.
    pub reservation: Option<BackoffPolicy>,
    /// Policy used by the cleanup thread while the log is empty.
    pub idle: Option<BackoffPolicy>,
}

impl BackoffSection {
    fn apply_to(&self, config: &mut LogConfig) {
        if let Some(value) = self.reservation {
            config.reservation_backoff = value;
        }
        if let Some(value) = self.idle {
            config.idle_backoff = value;
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid_value(key, value))
}

fn invalid_value(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_CAPACITY;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_env_overrides_log_and_backoff() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::set_var("PMWAL__log__capacity", "128");
        env::set_var("PMWAL__log__crash_mode", "halt");
        env::set_var("PMWAL__backoff__idle", "yield");

        let mut config = PmwalConfig::default();
        let result = config.apply_env_overrides();

        env::remove_var("PMWAL__log__capacity");
        env::remove_var("PMWAL__log__crash_mode");
        env::remove_var("PMWAL__backoff__idle");
        result.unwrap();

        let log = config.log.as_ref().unwrap();
        assert_eq!(log.capacity, Some(128));
        assert_eq!(log.crash_mode, Some(CrashMode::Halt));

        let resolved = config.to_log_config();
        assert_eq!(resolved.capacity, 128);
        assert_eq!(resolved.crash.mode(), CrashMode::Halt);
        assert_eq!(resolved.idle_backoff, BackoffPolicy::Yield);
    }

    #[test]
    fn test_env_override_rejects_unknown_key() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::set_var("PMWAL__log__segment_size", "1");
        let mut config = PmwalConfig::default();
        let result = config.apply_env_overrides();
        env::remove_var("PMWAL__log__segment_size");

        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn test_defaults_without_sections() {
        let config = PmwalConfig::default().to_log_config();
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert!(config.path.is_none());
        assert!(!config.crash.is_enabled());
    }

    #[test]
    fn test_parse_toml_sections() {
        let config: PmwalConfig = toml::from_str(
            r#"
            [log]
            capacity = 8
            path = "/tmp/pmwal.dat"
            crash_rate = 50

            [backoff]
            reservation = "exponential"
            "#,
        )
        .unwrap();

        let resolved = config.to_log_config();
        assert_eq!(resolved.capacity, 8);
        assert_eq!(resolved.path.as_deref(), Some(Path::new("/tmp/pmwal.dat")));
        assert_eq!(resolved.crash.rate(), 50);
        assert_eq!(resolved.crash.mode(), CrashMode::Exit);
        assert_eq!(resolved.reservation_backoff, BackoffPolicy::Exponential);
    }
}
