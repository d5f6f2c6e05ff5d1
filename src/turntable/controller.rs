use std::thread;
use std::time::{Duration, Instant};

use super::parsing::TelemetryBuffer;
use super::{
    AzEl, Command, Coordinate, CoordinateKind, ElevationRegime, Margins, Poller, RegimeCatalog,
    RegimeTransition, SessionState, TelemetryLog, TurntableError,
    MECHANICAL_ELEVATION_DEG, WINDOW_TOLERANCE_DEG,
};
use crate::abort::AbortSignal;
use crate::transport::{self, SerialTransport, Transport, TransportError};

pub const AZIMUTH_BOUNDS_DEG: (f64, f64) = (-180.0, 180.0);
pub const ELEVATION_BOUNDS_DEG: (f64, f64) = MECHANICAL_ELEVATION_DEG;
/// A SET is confirmed once telemetry reads within this of zero. Just above
/// the firmware's two-decimal rounding.
pub const ALLOWABLE_DISCREPANCY_DEG: f64 = 0.11;

const SET_REPEATS: usize = 3;
const MOVE_REPEATS: usize = 3;
const EMERGENCY_MOVE_REPEATS: usize = 3;
const STOP_REPEATS: usize = 5;
const READ_CHUNK_BYTES: usize = 1000;

type Result<T> = std::result::Result<T, TurntableError>;

#[derive(Debug, Clone)]
pub struct TurntableSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    /// Telemetry polls per port before `find` moves on.
    pub discovery_attempts: usize,
    pub margins: Margins,
    pub poll_interval: Duration,
    /// Interval growth per empty poll, capped at `max_poll_interval`.
    pub poll_backoff: f64,
    pub max_poll_interval: Duration,
    /// Bound on every blocking wait. `None` waits forever.
    pub timeout: Option<Duration>,
    pub command_repeat_delay: Duration,
    pub stop_repeat_delay: Duration,
    /// Silence longer than this invalidates the session.
    pub dead_time: Duration,
    pub neutral_elevation_deg: f64,
    pub catalog: RegimeCatalog,
}

impl Default for TurntableSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            read_timeout: Duration::from_millis(50),
            discovery_attempts: 20,
            margins: Margins::default(),
            poll_interval: Duration::from_millis(50),
            poll_backoff: 1.0,
            max_poll_interval: Duration::from_secs(1),
            timeout: None,
            command_repeat_delay: Duration::from_millis(100),
            stop_repeat_delay: Duration::from_millis(200),
            dead_time: Duration::from_secs(1000),
            neutral_elevation_deg: 0.0,
            catalog: RegimeCatalog::default(),
        }
    }
}

/// Two-axis chamber turntable behind a byte transport.
///
/// Single owner: every operation blocks the calling thread, and the session
/// state is only touched from here.
pub struct Turntable {
    name: String,
    transport: Box<dyn Transport>,
    settings: TurntableSettings,
    session: SessionState,
    last_contact: Option<Instant>,
    buffer: TelemetryBuffer,
    log: Option<TelemetryLog>,
    transitions: Vec<RegimeTransition>,
    abort: Option<AbortSignal>,
}

impl Turntable {
    pub fn with_transport(
        name: impl Into<String>,
        transport: Box<dyn Transport>,
        settings: TurntableSettings,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            settings,
            session: SessionState::cold(),
            last_contact: None,
            buffer: TelemetryBuffer::new(),
            log: None,
            transitions: Vec::new(),
            abort: None,
        }
    }

    pub fn open(path: &str, settings: TurntableSettings) -> Result<Self> {
        let transport = SerialTransport::open(path, settings.baud_rate, settings.read_timeout)?;
        Ok(Self::with_transport(path, Box::new(transport), settings))
    }

    /// Probe every serial port the OS knows about and return the first one
    /// that streams valid telemetry.
    pub fn find(settings: TurntableSettings) -> Result<Self> {
        let ports = transport::available_ports()?;
        log::info!("probing {} serial port(s) for a turntable", ports.len());
        let (baud_rate, read_timeout) = (settings.baud_rate, settings.read_timeout);
        Self::find_with(ports, settings, |path| {
            let port = SerialTransport::open(path, baud_rate, read_timeout)?;
            Ok(Box::new(port) as Box<dyn Transport>)
        })
    }

    /// `find` over an explicit candidate list and opener.
    pub fn find_with<I, F>(candidates: I, settings: TurntableSettings, mut open: F) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
        F: FnMut(&str) -> std::result::Result<Box<dyn Transport>, TransportError>,
    {
        for name in candidates {
            let transport = match open(&name) {
                Ok(transport) => transport,
                Err(err) => {
                    log::warn!("skipping {}: {}", name, err);
                    continue;
                }
            };
            let mut table = Self::with_transport(name, transport, settings.clone());
            for attempt in 1..=settings.discovery_attempts {
                if let Some(position) = table.get_position() {
                    log::info!(
                        "found turntable on {} after {} poll(s) at {}",
                        table.name,
                        attempt,
                        position
                    );
                    return Ok(table);
                }
                thread::sleep(settings.poll_interval);
            }
            log::warn!(
                "no telemetry on {} after {} polls",
                table.name,
                settings.discovery_attempts
            );
        }
        Err(TurntableError::NotFound)
    }

    pub fn set_telemetry_log(&mut self, log: TelemetryLog) {
        self.log = Some(log);
    }

    /// Every blocking wait gives up with `Aborted` once `abort` is raised.
    pub fn set_abort_signal(&mut self, abort: AbortSignal) {
        self.abort = Some(abort);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &TurntableSettings {
        &self.settings
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    /// Regime hops executed so far, oldest first.
    pub fn transitions(&self) -> &[RegimeTransition] {
        &self.transitions
    }

    pub fn last_contact(&self) -> Option<Instant> {
        self.last_contact
    }

    /// Non-blocking read of the latest position in the absolute turntable
    /// frame. Elevation is offset-corrected once the table has been zeroed.
    pub fn get_position(&mut self) -> Option<Coordinate> {
        let raw = self.sample()?;
        Some(self.coordinate_from_raw(raw))
    }

    /// Poll until a position arrives.
    ///
    /// Only the configured timeout or abort signal can end the wait early.
    pub fn wait_for_position(&mut self) -> Result<Coordinate> {
        let poller = self.poller(self.settings.poll_interval);
        poller.until(|| Ok(self.get_position()))
    }

    pub fn send_set_command(&mut self, azimuth: f64, elevation: f64) -> Result<AzEl> {
        self.set(azimuth, elevation, true)
    }

    /// Move to an absolute turntable azimuth/elevation, hopping regimes as
    /// needed, and block until both axes are within `margins`.
    pub fn move_to(
        &mut self,
        azimuth: f64,
        elevation: f64,
        margins: Margins,
        poll_delay: Duration,
    ) -> Result<Coordinate> {
        validate_bounds(azimuth, elevation)?;
        if !self.session.has_been_zeroed {
            log::error!("refusing to move to ({}, {}): not zeroed", azimuth, elevation);
            return Err(TurntableError::NotZeroed);
        }
        self.check_link()?;

        let start = self.session.current_regime.ok_or(TurntableError::NotZeroed)?;
        let hops = self.settings.catalog.path(start, elevation)?;
        let poller = self.poller(poll_delay);
        for next in hops {
            let current = self.session.current_regime.ok_or(TurntableError::NotZeroed)?;
            self.hop(current, next, margins, &poller)?;
        }

        let regime = self.session.current_regime.ok_or(TurntableError::NotZeroed)?;
        if !regime.contains_with_tolerance(elevation, WINDOW_TOLERANCE_DEG) {
            log::error!("elevation {} is outside regime {}", elevation, regime);
            return Err(TurntableError::OutsideRegime { elevation, regime });
        }

        let target = AzEl::new(azimuth, self.session.to_regime_elevation(elevation)?);
        log::info!(
            "moving to az={:.3} el={:.3} (raw {}, regime {})",
            azimuth,
            elevation,
            target,
            regime
        );
        self.send_move(target)?;
        let reached = self.wait_for_raw(target, margins, &poller)?;
        let position = self.coordinate_from_raw(reached);
        log::info!("arrived at {}", position);
        Ok(position)
    }

    /// `move_to` for a coordinate in any frame.
    pub fn move_to_coordinate(
        &mut self,
        coordinate: &Coordinate,
        margins: Margins,
        poll_delay: Duration,
    ) -> Result<Coordinate> {
        let absolute = coordinate.as_kind(CoordinateKind::AbsoluteTurntable);
        self.move_to(absolute.azimuth(), absolute.elevation(), margins, poll_delay)
    }

    /// Raw MOV with no validation and no session checks, for fault recovery.
    /// The target is in the firmware's own frame.
    pub fn send_emergency_move_command(&mut self, azimuth: f64, elevation: f64) -> Result<()> {
        log::warn!(
            "emergency move to raw az={:.3} el={:.3}, bypassing validation",
            azimuth,
            elevation
        );
        let frame = Command::Move { azimuth, elevation }.encode();
        self.repeat_frame(&frame, EMERGENCY_MOVE_REPEATS, self.settings.command_repeat_delay)
    }

    pub fn send_stop_command(&mut self) -> Result<()> {
        log::warn!("sending stop");
        let frame = Command::Stop.encode();
        self.repeat_frame(&frame, STOP_REPEATS, self.settings.stop_repeat_delay)
    }

    /// Forget the zero and regime. The next move needs a fresh SET.
    pub fn invalidate_session(&mut self) {
        if !self.session.is_cold() {
            log::warn!("invalidating turntable session on {}", self.name);
        }
        self.session = SessionState::cold();
        self.buffer.clear();
    }

    fn set(&mut self, azimuth: f64, elevation: f64, set_regime: bool) -> Result<AzEl> {
        if azimuth != 0.0 || elevation != 0.0 {
            log::error!(
                "SET ({}, {}) rejected, the firmware can only zero both axes",
                azimuth,
                elevation
            );
            return Err(TurntableError::InvalidSetCommand { azimuth, elevation });
        }

        let frame = Command::Set {
            azimuth: 0.0,
            elevation: 0.0,
        }
        .encode();
        log::info!("sending {}", String::from_utf8_lossy(&frame));
        self.repeat_frame(&frame, SET_REPEATS, self.settings.command_repeat_delay)?;

        let poller = self.poller(self.settings.poll_interval);
        let tolerance = Margins::new(ALLOWABLE_DISCREPANCY_DEG, ALLOWABLE_DISCREPANCY_DEG);
        let confirmed = self.wait_for_raw(AzEl::ZERO, tolerance, &poller)?;

        if set_regime {
            self.session = SessionState::zeroed(confirmed.elevation, &self.settings.catalog)?;
            log::info!(
                "zeroed at raw {}, regime {}",
                confirmed,
                describe_regime(self.session.current_regime)
            );
        } else {
            log::info!("re-homed at raw {}", confirmed);
        }
        Ok(confirmed)
    }

    /// Park at `to`'s center, re-home there, and carry the offset over.
    ///
    /// Azimuth is parked at raw 0 because SET zeros it too. Whatever azimuth
    /// error remains at the waypoint, at most `margins.azimuth`, becomes part
    /// of the new zero and is not tracked.
    fn hop(
        &mut self,
        from: ElevationRegime,
        to: ElevationRegime,
        margins: Margins,
        poller: &Poller,
    ) -> Result<()> {
        if !from.contains_with_tolerance(to.center_deg, WINDOW_TOLERANCE_DEG) {
            return Err(TurntableError::InvariantViolation(format!(
                "regime {} center is not reachable from {}",
                to, from
            )));
        }

        let waypoint = AzEl::new(0.0, self.session.to_regime_elevation(to.center_deg)?);
        log::info!("regime hop {} -> {} via raw waypoint {}", from, to, waypoint);
        self.send_move(waypoint)?;
        let reading = self.wait_for_raw(waypoint, margins, poller)?;

        let transition = RegimeTransition {
            from,
            to,
            waypoint: reading,
        };
        let next = match self.session.apply_regime_transition(&transition) {
            Ok(next) => next,
            Err(err) => {
                self.invalidate_session();
                return Err(err);
            }
        };

        // readings taken while re-homing belong to neither frame
        let telemetry_log = self.log.take();
        let rehomed = self.set(0.0, 0.0, false);
        self.log = telemetry_log;
        if let Err(err) = rehomed {
            // hardware zero and offset can no longer be assumed to agree
            self.invalidate_session();
            return Err(err);
        }

        self.session = next;
        self.transitions.push(transition);
        log::info!(
            "now in regime {} with elevation offset {:.3}",
            to,
            next.regime_elevation_offset.unwrap_or_default()
        );
        Ok(())
    }

    fn check_link(&mut self) -> Result<()> {
        let silent_for = self.last_contact.map(|at| at.elapsed());
        match silent_for {
            Some(silence) if silence <= self.settings.dead_time => Ok(()),
            _ => {
                log::error!(
                    "turntable on {} silent for {:?}, allowed {:?}",
                    self.name,
                    silent_for,
                    self.settings.dead_time
                );
                self.invalidate_session();
                Err(TurntableError::StaleLink { silent_for })
            }
        }
    }

    fn wait_for_raw(&mut self, target: AzEl, margins: Margins, poller: &Poller) -> Result<AzEl> {
        poller.until(|| {
            Ok(self.sample().filter(|position| {
                let reached = margins.reached(position, &target);
                if !reached {
                    log::debug!("at raw {}, heading to raw {}", position, target);
                }
                reached
            }))
        })
    }

    /// Latest raw reading, if a frame arrived. Logs it when a log is attached.
    fn sample(&mut self) -> Option<AzEl> {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        let n = match self.transport.read(&mut chunk) {
            Ok(n) => n,
            Err(err) => {
                log::warn!("read from {} failed: {}", self.name, err);
                return None;
            }
        };
        if n == 0 {
            return None;
        }

        let raw = self.buffer.push(&chunk[..n])?;
        self.last_contact = Some(Instant::now());

        if let Some(telemetry_log) = self.log.as_mut() {
            let corrected = AzEl::new(raw.azimuth, corrected_elevation(&self.session, raw));
            if let Err(err) = telemetry_log.append(corrected) {
                log::warn!("telemetry log {}: {}", telemetry_log.path().display(), err);
            }
        }
        Some(raw)
    }

    fn coordinate_from_raw(&self, raw: AzEl) -> Coordinate {
        Coordinate::from_absolute_turntable(
            raw.azimuth,
            corrected_elevation(&self.session, raw),
            self.settings.neutral_elevation_deg,
        )
    }

    fn send_move(&mut self, target: AzEl) -> Result<()> {
        let frame = Command::Move {
            azimuth: target.azimuth,
            elevation: target.elevation,
        }
        .encode();
        log::info!("sending {}", String::from_utf8_lossy(&frame));
        self.repeat_frame(&frame, MOVE_REPEATS, self.settings.command_repeat_delay)
    }

    /// Send `frame` `count` times. Fails only if every attempt failed.
    fn repeat_frame(&mut self, frame: &[u8], count: usize, delay: Duration) -> Result<()> {
        let mut last_error = None;
        let mut delivered = 0;
        for i in 0..count {
            if i > 0 {
                thread::sleep(delay);
            }
            match self.transport.send_frame(frame) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    log::error!("write to {} failed: {}", self.name, err);
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) if delivered == 0 => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn poller(&self, interval: Duration) -> Poller {
        let poller = Poller::new(interval)
            .with_backoff(self.settings.poll_backoff, self.settings.max_poll_interval)
            .with_timeout(self.settings.timeout);
        match &self.abort {
            Some(abort) => poller.with_abort(abort.clone()),
            None => poller,
        }
    }
}

fn corrected_elevation(session: &SessionState, raw: AzEl) -> f64 {
    session
        .from_regime_elevation(raw.elevation)
        .unwrap_or(raw.elevation)
}

fn validate_bounds(azimuth: f64, elevation: f64) -> Result<()> {
    let (az_min, az_max) = AZIMUTH_BOUNDS_DEG;
    if !(az_min..=az_max).contains(&azimuth) {
        log::error!("azimuth {} out of bounds, nothing sent", azimuth);
        return Err(TurntableError::AzimuthOutOfBounds { azimuth });
    }
    let (el_min, el_max) = ELEVATION_BOUNDS_DEG;
    if !(el_min..=el_max).contains(&elevation) {
        log::error!("elevation {} out of bounds, nothing sent", elevation);
        return Err(TurntableError::ElevationOutOfBounds { elevation });
    }
    Ok(())
}

fn describe_regime(regime: Option<ElevationRegime>) -> String {
    regime
        .map(|r| r.to_string())
        .unwrap_or_else(|| "none".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SimulatedTurntable;

    fn fast_settings() -> TurntableSettings {
        TurntableSettings {
            poll_interval: Duration::from_millis(1),
            command_repeat_delay: Duration::ZERO,
            stop_repeat_delay: Duration::ZERO,
            timeout: Some(Duration::from_secs(5)),
            discovery_attempts: 5,
            ..TurntableSettings::default()
        }
    }

    fn table(sim: &SimulatedTurntable) -> Turntable {
        Turntable::with_transport("sim", Box::new(sim.clone()), fast_settings())
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert!(validate_bounds(180.0, 45.0).is_ok());
        assert!(validate_bounds(-180.0, -90.0).is_ok());
        assert!(matches!(
            validate_bounds(180.01, 0.0),
            Err(TurntableError::AzimuthOutOfBounds { .. })
        ));
        assert!(matches!(
            validate_bounds(0.0, 45.01),
            Err(TurntableError::ElevationOutOfBounds { .. })
        ));
        assert!(matches!(
            validate_bounds(f64::NAN, 0.0),
            Err(TurntableError::AzimuthOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_position_updates_last_contact() {
        let sim = SimulatedTurntable::new();
        let mut table = table(&sim);
        assert!(table.last_contact().is_none());
        let position = table.get_position().unwrap();
        assert_eq!(position.kind(), CoordinateKind::AbsoluteTurntable);
        assert!(table.last_contact().is_some());
    }

    #[test]
    fn test_silent_link_yields_none() {
        let sim = SimulatedTurntable::new();
        sim.set_silent(true);
        let mut table = table(&sim);
        assert!(table.get_position().is_none());
        assert!(table.last_contact().is_none());
    }

    #[test]
    fn test_nonzero_set_is_rejected_before_sending() {
        let sim = SimulatedTurntable::new();
        let mut table = table(&sim);
        assert!(matches!(
            table.send_set_command(10.0, 0.0),
            Err(TurntableError::InvalidSetCommand { .. })
        ));
        assert!(sim.written().is_empty());
    }

    #[test]
    fn test_set_is_repeated() {
        let sim = SimulatedTurntable::new();
        let mut table = table(&sim);
        table.send_set_command(0.0, 0.0).unwrap();
        assert_eq!(sim.set_count(), SET_REPEATS);
    }

    #[test]
    fn test_move_is_repeated() {
        let sim = SimulatedTurntable::new();
        let mut table = table(&sim);
        table.send_set_command(0.0, 0.0).unwrap();
        table
            .move_to(5.0, -5.0, Margins::default(), Duration::from_millis(1))
            .unwrap();
        assert_eq!(sim.move_count(), MOVE_REPEATS);
    }

    #[test]
    fn test_invalidate_drops_partial_line() {
        let sim = SimulatedTurntable::new();
        sim.set_silent(true);
        let mut table = table(&sim);
        sim.inject(b"Pos= El: 1");
        assert!(table.get_position().is_none());
        table.invalidate_session();
        sim.inject(b"2.00 , Az: 3.00\r\n");
        assert!(table.get_position().is_none());
    }

    #[test]
    fn test_invalidate_returns_to_cold() {
        let sim = SimulatedTurntable::new();
        let mut table = table(&sim);
        table.send_set_command(0.0, 0.0).unwrap();
        assert!(table.session().has_been_zeroed);
        table.invalidate_session();
        assert!(table.session().is_cold());
    }

    #[test]
    fn test_neutral_elevation_applies_to_reports() {
        let sim = SimulatedTurntable::new();
        let settings = TurntableSettings {
            neutral_elevation_deg: 3.75,
            ..fast_settings()
        };
        let mut table = Turntable::with_transport("sim", Box::new(sim.clone()), settings);
        let position = table.get_position().unwrap();
        assert_eq!(position.absolute_turntable_elevation(), 0.0);
        assert_eq!(position.turntable_elevation(), -3.75);
    }
}
