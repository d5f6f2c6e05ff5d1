use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::RegimeError;

pub const DEFAULT_REGIME_CENTERS_DEG: [f64; 7] = [-75.0, -50.0, -25.0, 0.0, 25.0, 50.0, 75.0];
pub const DEFAULT_ALLOWABLE_OFFSET_DEG: f64 = 29.0;
/// Slack granted when checking a reading against a window, on top of the
/// allowable offset.
pub const WINDOW_TOLERANCE_DEG: f64 = 0.5;

/// Mechanical elevation range every catalog must cover.
pub const MECHANICAL_ELEVATION_DEG: (f64, f64) = (-90.0, 45.0);

/// A window of elevation the hardware can address without re-homing.
///
/// Equality and ordering only look at the center.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ElevationRegime {
    pub center_deg: f64,
    pub allowable_offset_deg: f64,
}

impl ElevationRegime {
    pub fn new(center_deg: f64, allowable_offset_deg: f64) -> Self {
        Self {
            center_deg,
            allowable_offset_deg,
        }
    }

    pub fn contains(&self, elevation: f64) -> bool {
        (elevation - self.center_deg).abs() <= self.allowable_offset_deg
    }

    pub fn contains_with_tolerance(&self, elevation: f64, tolerance: f64) -> bool {
        (elevation - self.center_deg).abs() <= self.allowable_offset_deg + tolerance
    }

    pub fn range(&self) -> (f64, f64) {
        (
            self.center_deg - self.allowable_offset_deg,
            self.center_deg + self.allowable_offset_deg,
        )
    }
}

impl PartialEq for ElevationRegime {
    fn eq(&self, other: &Self) -> bool {
        self.center_deg == other.center_deg
    }
}

impl PartialOrd for ElevationRegime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.center_deg.partial_cmp(&other.center_deg)
    }
}

impl fmt::Display for ElevationRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:+.0}°±{:.0}°",
            self.center_deg, self.allowable_offset_deg
        )
    }
}

/// Ascending set of overlapping regimes covering the mechanical elevation
/// range. Each center lies inside its neighbours' windows, so a hop to an
/// adjacent center never leaves the window being hopped from.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeCatalog {
    regimes: Vec<ElevationRegime>,
}

impl RegimeCatalog {
    pub fn new(centers_deg: &[f64], allowable_offset_deg: f64) -> Result<Self, RegimeError> {
        if !(allowable_offset_deg.is_finite() && allowable_offset_deg > 0.0) {
            return Err(RegimeError::InvalidOffset(allowable_offset_deg));
        }
        let (Some(&first), Some(&last)) = (centers_deg.first(), centers_deg.last()) else {
            return Err(RegimeError::EmptyCatalog);
        };

        for pair in centers_deg.windows(2) {
            let (previous, next) = (pair[0], pair[1]);
            if !(next > previous) {
                return Err(RegimeError::NotAscending { previous, next });
            }
            if next - previous > allowable_offset_deg {
                return Err(RegimeError::NoOverlap {
                    lower: ElevationRegime::new(previous, allowable_offset_deg),
                    upper: ElevationRegime::new(next, allowable_offset_deg),
                });
            }
        }

        let (low, high) = MECHANICAL_ELEVATION_DEG;
        if first - allowable_offset_deg > low {
            return Err(RegimeError::CoverageGap { elevation: low });
        }
        if last + allowable_offset_deg < high {
            return Err(RegimeError::CoverageGap { elevation: high });
        }

        Ok(Self {
            regimes: centers_deg
                .iter()
                .map(|&center| ElevationRegime::new(center, allowable_offset_deg))
                .collect(),
        })
    }

    pub fn regimes(&self) -> &[ElevationRegime] {
        &self.regimes
    }

    /// The regime whose center is closest to `elevation`. Ties go to the
    /// lower regime.
    pub fn find_best_regime(&self, elevation: f64) -> Result<ElevationRegime, RegimeError> {
        let best = self
            .regimes
            .iter()
            .min_by(|a, b| {
                (elevation - a.center_deg)
                    .abs()
                    .total_cmp(&(elevation - b.center_deg).abs())
            })
            .ok_or(RegimeError::EmptyCatalog)?;
        if best.contains(elevation) {
            Ok(*best)
        } else {
            Err(RegimeError::OutOfRange { elevation })
        }
    }

    /// One step along the catalog toward `destination`.
    ///
    /// Returns `current` when it already contains the destination, and also at
    /// either end of the catalog where there is nowhere left to go.
    pub fn find_next_regime(
        &self,
        destination: f64,
        current: ElevationRegime,
    ) -> Result<ElevationRegime, RegimeError> {
        if current.contains(destination) {
            return Ok(current);
        }
        let index = self
            .regimes
            .iter()
            .position(|regime| *regime == current)
            .ok_or(RegimeError::OutOfRange {
                elevation: current.center_deg,
            })?;
        let next = if destination > current.center_deg {
            self.regimes.get(index + 1)
        } else {
            index.checked_sub(1).and_then(|i| self.regimes.get(i))
        };
        Ok(next.copied().unwrap_or(current))
    }

    /// Every hop needed to get from `start` to a regime containing
    /// `destination`, excluding `start` itself.
    pub fn path(
        &self,
        start: ElevationRegime,
        destination: f64,
    ) -> Result<Vec<ElevationRegime>, RegimeError> {
        let mut hops = Vec::new();
        let mut current = start;
        while !current.contains(destination) {
            let next = self.find_next_regime(destination, current)?;
            if next == current || hops.len() >= self.regimes.len() {
                return Err(RegimeError::OutOfRange {
                    elevation: destination,
                });
            }
            hops.push(next);
            current = next;
        }
        Ok(hops)
    }
}

impl Default for RegimeCatalog {
    fn default() -> Self {
        Self {
            regimes: DEFAULT_REGIME_CENTERS_DEG
                .iter()
                .map(|&center| ElevationRegime::new(center, DEFAULT_ALLOWABLE_OFFSET_DEG))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mechanical_range(step: f64) -> impl Iterator<Item = f64> {
        let (low, high) = MECHANICAL_ELEVATION_DEG;
        let count = ((high - low) / step).round() as usize;
        (0..=count).map(move |i| low + i as f64 * step)
    }

    #[test]
    fn test_default_catalog_passes_validation() {
        let rebuilt =
            RegimeCatalog::new(&DEFAULT_REGIME_CENTERS_DEG, DEFAULT_ALLOWABLE_OFFSET_DEG).unwrap();
        assert_eq!(rebuilt, RegimeCatalog::default());
        assert_eq!(rebuilt.regimes().len(), 7);
    }

    #[test]
    fn test_every_mechanical_elevation_has_a_regime() {
        let catalog = RegimeCatalog::default();
        for elevation in mechanical_range(0.1) {
            let regime = catalog.find_best_regime(elevation).unwrap();
            assert!(regime.contains(elevation), "{elevation} not in {regime}");
        }
    }

    #[test]
    fn test_best_regime_is_closest_center() {
        let catalog = RegimeCatalog::default();
        assert_eq!(catalog.find_best_regime(0.0).unwrap().center_deg, 0.0);
        assert_eq!(catalog.find_best_regime(13.0).unwrap().center_deg, 25.0);
        assert_eq!(catalog.find_best_regime(-90.0).unwrap().center_deg, -75.0);
        // exact midpoint goes low
        assert_eq!(catalog.find_best_regime(12.5).unwrap().center_deg, 0.0);
    }

    #[test]
    fn test_best_regime_outside_catalog() {
        let catalog = RegimeCatalog::default();
        assert!(matches!(
            catalog.find_best_regime(104.5),
            Err(RegimeError::OutOfRange { .. })
        ));
        assert!(catalog.find_best_regime(-104.0).is_ok());
    }

    #[test]
    fn test_next_regime_steps_one_at_a_time() {
        let catalog = RegimeCatalog::default();
        let zero = catalog.find_best_regime(0.0).unwrap();
        assert_eq!(catalog.find_next_regime(20.0, zero).unwrap(), zero);
        assert_eq!(catalog.find_next_regime(40.0, zero).unwrap().center_deg, 25.0);
        assert_eq!(catalog.find_next_regime(-80.0, zero).unwrap().center_deg, -25.0);
    }

    #[test]
    fn test_next_regime_at_catalog_edge_stays() {
        let catalog = RegimeCatalog::default();
        let top = *catalog.regimes().last().unwrap();
        assert_eq!(catalog.find_next_regime(150.0, top).unwrap(), top);
        assert!(matches!(
            catalog.path(top, 150.0),
            Err(RegimeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_traversal_terminates_from_every_start() {
        let catalog = RegimeCatalog::default();
        for &start in catalog.regimes() {
            for destination in mechanical_range(0.5) {
                let hops = catalog.path(start, destination).unwrap();
                assert!(hops.len() <= catalog.regimes().len());
                let end = hops.last().copied().unwrap_or(start);
                assert!(end.contains(destination));

                let mut previous = start;
                for hop in &hops {
                    // adjacent center is reachable from inside the current window
                    assert!(previous.contains(hop.center_deg));
                    assert_ne!(*hop, previous);
                    previous = *hop;
                }
            }
        }
    }

    #[test]
    fn test_ten_to_forty_takes_one_hop() {
        let catalog = RegimeCatalog::default();
        let start = catalog.find_best_regime(10.0).unwrap();
        let hops = catalog.path(start, 40.0).unwrap();
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].center_deg, 25.0);
    }

    #[test]
    fn test_rejects_bad_catalogs() {
        assert!(matches!(
            RegimeCatalog::new(&[], 29.0),
            Err(RegimeError::EmptyCatalog)
        ));
        assert!(matches!(
            RegimeCatalog::new(&[0.0], -1.0),
            Err(RegimeError::InvalidOffset(_))
        ));
        assert!(matches!(
            RegimeCatalog::new(&[-75.0, -50.0, -60.0, 0.0, 25.0], 29.0),
            Err(RegimeError::NotAscending { .. })
        ));
        assert!(matches!(
            RegimeCatalog::new(&[-75.0, -25.0, 25.0], 29.0),
            Err(RegimeError::NoOverlap { .. })
        ));
        assert!(matches!(
            RegimeCatalog::new(&[-50.0, -25.0, 0.0, 25.0], 29.0),
            Err(RegimeError::CoverageGap { .. })
        ));
    }

    #[test]
    fn test_wider_spacing_catalog_is_valid() {
        let catalog =
            RegimeCatalog::new(&[-81.0, -54.0, -27.0, 0.0, 27.0, 54.0, 81.0], 29.0).unwrap();
        assert_eq!(catalog.find_best_regime(-90.0).unwrap().center_deg, -81.0);
    }

    #[test]
    fn test_equality_ignores_offset() {
        assert_eq!(ElevationRegime::new(25.0, 29.0), ElevationRegime::new(25.0, 10.0));
        assert!(ElevationRegime::new(0.0, 29.0) < ElevationRegime::new(25.0, 1.0));
    }

    #[test]
    fn test_window_and_display() {
        let regime = ElevationRegime::new(-25.0, 29.0);
        assert_eq!(regime.range(), (-54.0, 4.0));
        assert!(regime.contains(4.0));
        assert!(!regime.contains(4.2));
        assert!(regime.contains_with_tolerance(4.2, WINDOW_TOLERANCE_DEG));
        assert_eq!(regime.to_string(), "-25°±29°");
        assert_eq!(ElevationRegime::new(0.0, 29.0).to_string(), "+0°±29°");
    }
}
