use serde::{Deserialize, Serialize};
use std::fmt;

/// Azimuth and elevation in degrees, as the firmware reports and accepts them.
///
/// No reference frame is attached; see [`Coordinate`](super::Coordinate) for that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AzEl {
    pub azimuth: f64,
    pub elevation: f64,
}

impl AzEl {
    pub const ZERO: AzEl = AzEl {
        azimuth: 0.0,
        elevation: 0.0,
    };

    pub fn new(azimuth: f64, elevation: f64) -> Self {
        Self { azimuth, elevation }
    }
}

impl fmt::Display for AzEl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(az={:+.2}, el={:+.2})", self.azimuth, self.elevation)
    }
}

/// Per-axis arrival tolerance for a move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub azimuth: f64,
    pub elevation: f64,
}

impl Margins {
    pub fn new(azimuth: f64, elevation: f64) -> Self {
        Self { azimuth, elevation }
    }

    pub fn reached(&self, position: &AzEl, target: &AzEl) -> bool {
        (position.azimuth - target.azimuth).abs() <= self.azimuth
            && (position.elevation - target.elevation).abs() <= self.elevation
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            azimuth: 0.1,
            elevation: 0.1,
        }
    }
}

/// Host to device frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Absolute move in the firmware's raw frame.
    Move { azimuth: f64, elevation: f64 },
    /// Re-home; the firmware zeros both axes whatever values are sent.
    Set { azimuth: f64, elevation: f64 },
    Stop,
}

impl Command {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Move { azimuth, elevation } => {
                format!("CMD:MOV:{:.3},{:.3};", azimuth, elevation).into_bytes()
            }
            Command::Set { azimuth, elevation } => {
                format!("CMD:SET:{:.3},{:.3};", azimuth, elevation).into_bytes()
            }
            Command::Stop => b"p".to_vec(),
        }
    }
}
