use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::turntable::{
    Margins, RegimeCatalog, RegimeError, TurntableSettings, DEFAULT_ALLOWABLE_OFFSET_DEG,
    DEFAULT_REGIME_CENTERS_DEG,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("invalid regime catalog: {0}")]
    Regimes(#[from] RegimeError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub serial: SerialConfig,
    pub motion: MotionConfig,
    pub session: SessionConfig,
    pub regimes: RegimesConfig,
    pub telemetry_log: TelemetryLogConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    /// Absent means probe every port.
    pub port: Option<String>,
    pub baud_rate: u32,
    #[serde(deserialize_with = "duration")]
    pub read_timeout: Duration,
    pub discovery_attempts: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            read_timeout: Duration::from_millis(50),
            discovery_attempts: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotionConfig {
    pub azimuth_margin_deg: f64,
    pub elevation_margin_deg: f64,
    #[serde(deserialize_with = "duration")]
    pub poll_interval: Duration,
    pub poll_backoff: f64,
    #[serde(deserialize_with = "duration")]
    pub max_poll_interval: Duration,
    #[serde(deserialize_with = "optional_duration")]
    pub timeout: Option<Duration>,
    #[serde(deserialize_with = "duration")]
    pub command_repeat_delay: Duration,
    #[serde(deserialize_with = "duration")]
    pub stop_repeat_delay: Duration,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            azimuth_margin_deg: 0.1,
            elevation_margin_deg: 0.1,
            poll_interval: Duration::from_millis(50),
            poll_backoff: 1.0,
            max_poll_interval: Duration::from_secs(1),
            timeout: None,
            command_repeat_delay: Duration::from_millis(100),
            stop_repeat_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(deserialize_with = "duration")]
    pub dead_time: Duration,
    pub neutral_elevation_deg: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dead_time: Duration::from_secs(1000),
            neutral_elevation_deg: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegimesConfig {
    pub centers_deg: Vec<f64>,
    pub allowable_offset_deg: f64,
}

impl Default for RegimesConfig {
    fn default() -> Self {
        Self {
            centers_deg: DEFAULT_REGIME_CENTERS_DEG.to_vec(),
            allowable_offset_deg: DEFAULT_ALLOWABLE_OFFSET_DEG,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryLogConfig {
    pub path: Option<PathBuf>,
    pub allow_clobber: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<log::LevelFilter, ConfigError> {
        self.level
            .trim()
            .parse()
            .map_err(|_| invalid("logging.level", format!("unknown level {:?}", self.level)))
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        // an empty document deserializes to unit, not to an empty mapping
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.baud_rate == 0 {
            return Err(invalid("serial.baud_rate", "must be positive"));
        }
        if self.serial.discovery_attempts == 0 {
            return Err(invalid("serial.discovery_attempts", "must be positive"));
        }
        for (field, margin) in [
            ("motion.azimuth_margin_deg", self.motion.azimuth_margin_deg),
            ("motion.elevation_margin_deg", self.motion.elevation_margin_deg),
        ] {
            if !(margin.is_finite() && margin > 0.0) {
                return Err(invalid(field, format!("must be positive, got {}", margin)));
            }
        }
        if !(self.motion.poll_backoff.is_finite() && self.motion.poll_backoff >= 1.0) {
            return Err(invalid("motion.poll_backoff", "must be at least 1.0"));
        }
        if !self.session.neutral_elevation_deg.is_finite() {
            return Err(invalid("session.neutral_elevation_deg", "must be finite"));
        }
        self.logging.level_filter()?;
        self.catalog()?;
        Ok(())
    }

    pub fn catalog(&self) -> Result<RegimeCatalog, ConfigError> {
        Ok(RegimeCatalog::new(
            &self.regimes.centers_deg,
            self.regimes.allowable_offset_deg,
        )?)
    }

    pub fn turntable_settings(&self) -> Result<TurntableSettings, ConfigError> {
        Ok(TurntableSettings {
            baud_rate: self.serial.baud_rate,
            read_timeout: self.serial.read_timeout,
            discovery_attempts: self.serial.discovery_attempts,
            margins: self.margins(),
            poll_interval: self.motion.poll_interval,
            poll_backoff: self.motion.poll_backoff,
            max_poll_interval: self.motion.max_poll_interval,
            timeout: self.motion.timeout,
            command_repeat_delay: self.motion.command_repeat_delay,
            stop_repeat_delay: self.motion.stop_repeat_delay,
            dead_time: self.session.dead_time,
            neutral_elevation_deg: self.session.neutral_elevation_deg,
            catalog: self.catalog()?,
        })
    }

    pub fn margins(&self) -> Margins {
        Margins::new(self.motion.azimuth_margin_deg, self.motion.elevation_margin_deg)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom)
}

fn optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = Option::<String>::deserialize(deserializer)?;
    text.map(|t| humantime::parse_duration(t.trim()).map_err(serde::de::Error::custom))
        .transpose()
}
