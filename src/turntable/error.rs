use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::ElevationRegime;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum RegimeError {
    #[error("elevation {elevation:.2}° is not inside any regime")]
    OutOfRange { elevation: f64 },
    #[error("regime catalog is empty")]
    EmptyCatalog,
    #[error("allowable offset must be positive, got {0}°")]
    InvalidOffset(f64),
    #[error("regime centers must be strictly ascending ({previous}° then {next}°)")]
    NotAscending { previous: f64, next: f64 },
    #[error("regimes {lower} and {upper} do not overlap")]
    NoOverlap {
        lower: ElevationRegime,
        upper: ElevationRegime,
    },
    #[error("elevation {elevation:.1}° is not covered by the catalog")]
    CoverageGap { elevation: f64 },
}

#[derive(Debug, Error)]
pub enum TelemetryLogError {
    #[error("telemetry log {0} already exists")]
    AlreadyExists(PathBuf),
    #[error("telemetry log io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry log csv error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum TurntableError {
    #[error("azimuth {azimuth:.3}° is outside [-180°, 180°]")]
    AzimuthOutOfBounds { azimuth: f64 },
    #[error("elevation {elevation:.3}° is outside [-90°, 45°]")]
    ElevationOutOfBounds { elevation: f64 },
    #[error("elevation {elevation:.3}° is outside regime {regime}")]
    OutsideRegime {
        elevation: f64,
        regime: ElevationRegime,
    },
    #[error("turntable has not been zeroed in this session")]
    NotZeroed,
    #[error("link is stale ({}), session invalidated", describe_silence(.silent_for))]
    StaleLink { silent_for: Option<Duration> },
    #[error("SET only accepts (0, 0), got ({azimuth}, {elevation})")]
    InvalidSetCommand { azimuth: f64, elevation: f64 },
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("no responsive turntable found")]
    NotFound,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("aborted: {0}")]
    Aborted(String),
    #[error("regime error: {0}")]
    Regime(#[from] RegimeError),
    #[error("{0}")]
    TelemetryLog(#[from] TelemetryLogError),
}

fn describe_silence(silent_for: &Option<Duration>) -> String {
    match silent_for {
        Some(duration) => format!("silent for {}", humantime::format_duration(*duration)),
        None => "never heard from".to_string(),
    }
}
