//! The three reference frames used when pointing the antenna-under-test.
//!
//! - Antenna: conventional azimuth/elevation of the signal path as seen from
//!   the AUT, `(0, 0)` pointing at the source.
//! - Turntable: the pan/tilt mechanical axes, tilt relative to the neutral
//!   elevation.
//! - Absolute turntable: pan/tilt with tilt measured from gravity level.
//!
//! The turntable tilts first and pans inside the tilted plane, so the antenna
//! and turntable frames only agree on the two axis planes. Near
//! |antenna azimuth| = 90° or |elevation| = 90° the mapping is not one-to-one
//! and no canonical inverse exists.

use serde::Serialize;
use std::fmt;
use strum_macros::Display;

/// Turntable pan/tilt to antenna azimuth/elevation, all in degrees.
///
/// The pointing vector is `(1, 0, 0)` panned by `pan_deg` about the vertical
/// axis and then tilted by `tilt_deg`.
pub fn turntable_to_antenna(tilt_deg: f64, pan_deg: f64) -> (f64, f64) {
    let e = tilt_deg.to_radians();
    let a = pan_deg.to_radians();

    let x = e.cos() * a.cos();
    let y = a.sin();
    let z = e.sin() * a.cos();

    // |v| = 1, but rounding can push z a hair past ±1
    let azimuth = y.atan2(x);
    let elevation = z.clamp(-1.0, 1.0).asin();
    (azimuth.to_degrees(), elevation.to_degrees())
}

/// Antenna azimuth/elevation to turntable `(tilt, pan)`, all in degrees.
pub fn antenna_to_turntable(azimuth_deg: f64, elevation_deg: f64) -> (f64, f64) {
    let theta = azimuth_deg.to_radians();
    let phi = elevation_deg.to_radians();

    let e = (phi.tan() / theta.cos()).atan();
    let a = theta.sin().atan2(theta.cos() / e.cos());
    (e.to_degrees(), a.to_degrees())
}

/// Which frame a [`Coordinate`] was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateKind {
    #[strum(to_string = "Antenna")]
    Antenna,
    #[strum(to_string = "Turntable")]
    Turntable,
    #[strum(to_string = "Absolute turntable")]
    AbsoluteTurntable,
}

/// One physical pointing direction expressed in all three frames.
///
/// Built only through the `from_*` constructors; the frame named by `kind` is
/// authoritative and the other two are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    antenna_azimuth: f64,
    antenna_elevation: f64,
    turntable_azimuth: f64,
    turntable_elevation: f64,
    absolute_turntable_azimuth: f64,
    absolute_turntable_elevation: f64,
    neutral_elevation: f64,
    kind: CoordinateKind,
}

impl Coordinate {
    pub fn from_turntable(azimuth: f64, elevation: f64, neutral_elevation: f64) -> Self {
        let (antenna_azimuth, antenna_elevation) = turntable_to_antenna(elevation, azimuth);
        Self {
            antenna_azimuth,
            antenna_elevation,
            turntable_azimuth: azimuth,
            turntable_elevation: elevation,
            absolute_turntable_azimuth: azimuth,
            absolute_turntable_elevation: elevation + neutral_elevation,
            neutral_elevation,
            kind: CoordinateKind::Turntable,
        }
    }

    pub fn from_absolute_turntable(azimuth: f64, elevation: f64, neutral_elevation: f64) -> Self {
        let turntable_elevation = elevation - neutral_elevation;
        let (antenna_azimuth, antenna_elevation) =
            turntable_to_antenna(turntable_elevation, azimuth);
        Self {
            antenna_azimuth,
            antenna_elevation,
            turntable_azimuth: azimuth,
            turntable_elevation,
            absolute_turntable_azimuth: azimuth,
            absolute_turntable_elevation: elevation,
            neutral_elevation,
            kind: CoordinateKind::AbsoluteTurntable,
        }
    }

    pub fn from_antenna(azimuth: f64, elevation: f64, neutral_elevation: f64) -> Self {
        let (turntable_elevation, turntable_azimuth) = antenna_to_turntable(azimuth, elevation);
        Self {
            antenna_azimuth: azimuth,
            antenna_elevation: elevation,
            turntable_azimuth,
            turntable_elevation,
            absolute_turntable_azimuth: turntable_azimuth,
            absolute_turntable_elevation: turntable_elevation + neutral_elevation,
            neutral_elevation,
            kind: CoordinateKind::Antenna,
        }
    }

    /// Rebuild this direction with `kind` as the authoritative frame.
    pub fn as_kind(&self, kind: CoordinateKind) -> Self {
        match kind {
            CoordinateKind::Antenna => Self::from_antenna(
                self.antenna_azimuth,
                self.antenna_elevation,
                self.neutral_elevation,
            ),
            CoordinateKind::Turntable => Self::from_turntable(
                self.turntable_azimuth,
                self.turntable_elevation,
                self.neutral_elevation,
            ),
            CoordinateKind::AbsoluteTurntable => Self::from_absolute_turntable(
                self.absolute_turntable_azimuth,
                self.absolute_turntable_elevation,
                self.neutral_elevation,
            ),
        }
    }

    pub fn kind(&self) -> CoordinateKind {
        self.kind
    }

    /// Azimuth in the authoritative frame.
    pub fn azimuth(&self) -> f64 {
        match self.kind {
            CoordinateKind::Antenna => self.antenna_azimuth,
            CoordinateKind::Turntable => self.turntable_azimuth,
            CoordinateKind::AbsoluteTurntable => self.absolute_turntable_azimuth,
        }
    }

    /// Elevation in the authoritative frame.
    pub fn elevation(&self) -> f64 {
        match self.kind {
            CoordinateKind::Antenna => self.antenna_elevation,
            CoordinateKind::Turntable => self.turntable_elevation,
            CoordinateKind::AbsoluteTurntable => self.absolute_turntable_elevation,
        }
    }

    pub fn pan(&self) -> f64 {
        self.turntable_azimuth
    }

    pub fn tilt(&self) -> f64 {
        self.turntable_elevation
    }

    pub fn antenna_azimuth(&self) -> f64 {
        self.antenna_azimuth
    }

    pub fn antenna_elevation(&self) -> f64 {
        self.antenna_elevation
    }

    pub fn turntable_azimuth(&self) -> f64 {
        self.turntable_azimuth
    }

    pub fn turntable_elevation(&self) -> f64 {
        self.turntable_elevation
    }

    pub fn absolute_turntable_azimuth(&self) -> f64 {
        self.absolute_turntable_azimuth
    }

    pub fn absolute_turntable_elevation(&self) -> f64 {
        self.absolute_turntable_elevation
    }

    pub fn neutral_elevation(&self) -> f64 {
        self.neutral_elevation
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<az={:+.1}, el={:+.1} ({})>",
            self.azimuth(),
            self.elevation(),
            self.kind
        )
    }
}
