//! Per-connection regime bookkeeping.
//!
//! The hardware can only address about ±30° of raw elevation around its last
//! SET pose. Reaching further means parking at the next regime's center,
//! re-homing there, and carrying the accumulated difference between raw and
//! true elevation as `regime_elevation_offset`.

use serde::Serialize;

use super::{AzEl, ElevationRegime, RegimeCatalog, RegimeError, TurntableError, WINDOW_TOLERANCE_DEG};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SessionState {
    pub current_regime: Option<ElevationRegime>,
    /// Added to the raw reported elevation to get true elevation.
    pub regime_elevation_offset: Option<f64>,
    pub has_been_zeroed: bool,
}

/// One executed re-home while crossing between regimes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegimeTransition {
    pub from: ElevationRegime,
    pub to: ElevationRegime,
    /// Raw reading confirmed at the waypoint, before the SET.
    pub waypoint: AzEl,
}

impl SessionState {
    /// Nothing known: a fresh connection, or one that went stale.
    pub fn cold() -> Self {
        Self::default()
    }

    /// State after a SET confirmed at raw elevation `confirmed_elevation`,
    /// taking that pose as true zero.
    pub fn zeroed(confirmed_elevation: f64, catalog: &RegimeCatalog) -> Result<Self, RegimeError> {
        Ok(Self {
            current_regime: Some(catalog.find_best_regime(confirmed_elevation)?),
            regime_elevation_offset: Some(0.0),
            has_been_zeroed: true,
        })
    }

    pub fn is_cold(&self) -> bool {
        !self.has_been_zeroed && self.current_regime.is_none()
    }

    pub fn to_regime_elevation(&self, true_elevation: f64) -> Result<f64, TurntableError> {
        let offset = self.regime_elevation_offset.ok_or(TurntableError::NotZeroed)?;
        Ok(true_elevation - offset)
    }

    pub fn from_regime_elevation(&self, raw_elevation: f64) -> Result<f64, TurntableError> {
        let offset = self.regime_elevation_offset.ok_or(TurntableError::NotZeroed)?;
        Ok(raw_elevation + offset)
    }

    /// The state after re-homing at `transition.waypoint`.
    ///
    /// The corrected waypoint elevation has to sit inside both the regime being
    /// left and the one being entered. If it does not, the offset bookkeeping
    /// or the catalog is broken and nothing about the hardware frame can be
    /// trusted any more.
    pub fn apply_regime_transition(
        &self,
        transition: &RegimeTransition,
    ) -> Result<SessionState, TurntableError> {
        if !self.has_been_zeroed {
            return Err(TurntableError::NotZeroed);
        }
        if self.current_regime != Some(transition.from) {
            return Err(TurntableError::InvariantViolation(format!(
                "transition starts in {} but session is in {}",
                transition.from,
                describe(self.current_regime)
            )));
        }

        let old_offset = self.regime_elevation_offset.unwrap_or(0.0);
        let corrected = transition.waypoint.elevation + old_offset;
        for regime in [transition.from, transition.to] {
            if !regime.contains_with_tolerance(corrected, WINDOW_TOLERANCE_DEG) {
                log::error!(
                    "waypoint elevation {:.3}° is outside {} while hopping {} -> {}",
                    corrected,
                    regime,
                    transition.from,
                    transition.to
                );
                return Err(TurntableError::InvariantViolation(format!(
                    "waypoint elevation {:.3}° is outside regime {}",
                    corrected, regime
                )));
            }
        }

        Ok(SessionState {
            current_regime: Some(transition.to),
            regime_elevation_offset: Some(old_offset + transition.waypoint.elevation),
            has_been_zeroed: true,
        })
    }
}

fn describe(regime: Option<ElevationRegime>) -> String {
    regime
        .map(|r| r.to_string())
        .unwrap_or_else(|| "no regime".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn regime(center: f64) -> ElevationRegime {
        ElevationRegime::new(center, 29.0)
    }

    #[test]
    fn test_cold_state_refuses_conversions() {
        let state = SessionState::cold();
        assert!(state.is_cold());
        assert!(matches!(
            state.to_regime_elevation(10.0),
            Err(TurntableError::NotZeroed)
        ));
        assert!(matches!(
            state.from_regime_elevation(10.0),
            Err(TurntableError::NotZeroed)
        ));
    }

    #[test]
    fn test_zeroed_at_origin_picks_center_regime() {
        let state = SessionState::zeroed(0.0, &RegimeCatalog::default()).unwrap();
        assert!(state.has_been_zeroed);
        assert_eq!(state.current_regime, Some(regime(0.0)));
        assert_eq!(state.regime_elevation_offset, Some(0.0));
        assert_eq!(state.to_regime_elevation(12.0).unwrap(), 12.0);
    }

    #[test]
    fn test_offset_conversions_are_inverse() {
        let state = SessionState {
            current_regime: Some(regime(50.0)),
            regime_elevation_offset: Some(49.97),
            has_been_zeroed: true,
        };
        let raw = state.to_regime_elevation(40.0).unwrap();
        assert_relative_eq!(raw, -9.97, epsilon = 1e-9);
        assert_relative_eq!(state.from_regime_elevation(raw).unwrap(), 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_transition_accumulates_offset() {
        let start = SessionState::zeroed(0.0, &RegimeCatalog::default()).unwrap();
        let first = RegimeTransition {
            from: regime(0.0),
            to: regime(25.0),
            waypoint: AzEl::new(0.0, 24.98),
        };
        let mid = start.apply_regime_transition(&first).unwrap();
        assert_eq!(mid.current_regime, Some(regime(25.0)));
        assert_relative_eq!(mid.regime_elevation_offset.unwrap(), 24.98, epsilon = 1e-9);

        let second = RegimeTransition {
            from: regime(25.0),
            to: regime(50.0),
            waypoint: AzEl::new(0.0, 25.01),
        };
        let end = mid.apply_regime_transition(&second).unwrap();
        assert_eq!(end.current_regime, Some(regime(50.0)));
        assert_relative_eq!(end.regime_elevation_offset.unwrap(), 49.99, epsilon = 1e-9);
        assert!(end.has_been_zeroed);
        // the original value is untouched
        assert_eq!(start.current_regime, Some(regime(0.0)));
    }

    #[test]
    fn test_waypoint_outside_windows_is_fatal() {
        let start = SessionState::zeroed(0.0, &RegimeCatalog::default()).unwrap();
        let bogus = RegimeTransition {
            from: regime(0.0),
            to: regime(25.0),
            waypoint: AzEl::new(0.0, -10.0),
        };
        assert!(matches!(
            start.apply_regime_transition(&bogus),
            Err(TurntableError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_transition_from_wrong_regime_is_fatal() {
        let start = SessionState::zeroed(0.0, &RegimeCatalog::default()).unwrap();
        let wrong = RegimeTransition {
            from: regime(-25.0),
            to: regime(-50.0),
            waypoint: AzEl::new(0.0, -25.0),
        };
        assert!(matches!(
            start.apply_regime_transition(&wrong),
            Err(TurntableError::InvariantViolation(_))
        ));
        assert!(matches!(
            SessionState::cold().apply_regime_transition(&wrong),
            Err(TurntableError::NotZeroed)
        ));
    }
}
