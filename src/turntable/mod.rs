mod controller;
mod coordinate;
mod error;
mod parsing;
mod poll;
mod regime;
mod session;
mod telemetry_log;
mod types;

pub use controller::{
    Turntable, TurntableSettings, ALLOWABLE_DISCREPANCY_DEG, AZIMUTH_BOUNDS_DEG,
    ELEVATION_BOUNDS_DEG,
};
pub use coordinate::{antenna_to_turntable, turntable_to_antenna, Coordinate, CoordinateKind};
pub use error::{RegimeError, TelemetryLogError, TurntableError};
pub use parsing::{parse_telemetry, TelemetryBuffer};
pub use poll::Poller;
pub use regime::{
    ElevationRegime, RegimeCatalog, DEFAULT_ALLOWABLE_OFFSET_DEG, DEFAULT_REGIME_CENTERS_DEG,
    MECHANICAL_ELEVATION_DEG, WINDOW_TOLERANCE_DEG,
};
pub use session::{RegimeTransition, SessionState};
pub use telemetry_log::TelemetryLog;
pub use types::{AzEl, Command, Margins};
