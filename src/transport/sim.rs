//! In-process model of the chamber turntable firmware.
//!
//! Reports raw positions relative to the last SET pose, ignores moves it cannot
//! track, and slews a fixed step per telemetry frame so tests run without real
//! time passing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Result, Transport};
use crate::turntable::AzEl;

/// Largest |raw elevation| the firmware will accept in a MOV.
pub const FIRMWARE_TRACKING_LIMIT_DEG: f64 = 30.0;

const DEFAULT_SLEW_STEP_DEG: f64 = 2.5;
const NOISE_LINE: &[u8] = &[0xFF, 0xFE, b'P', b'o', 0x00, 0x91, b'\r', b'\n'];
const NOISE_PREFIX: &[u8] = &[0xFA, 0x13, 0x00];

#[derive(Clone)]
pub struct SimulatedTurntable {
    inner: Arc<Mutex<SimState>>,
}

struct SimState {
    physical: AzEl,
    home: AzEl,
    target: Option<AzEl>,
    slew_step_deg: f64,
    line_noise: bool,
    silent: bool,
    silent_after_sets: Option<usize>,
    commands: Vec<u8>,
    written: Vec<u8>,
    output: VecDeque<u8>,
    set_count: usize,
    move_count: usize,
    stop_count: usize,
}

impl SimulatedTurntable {
    pub fn new() -> Self {
        SimulatedTurntable {
            inner: Arc::new(Mutex::new(SimState {
                physical: AzEl::ZERO,
                home: AzEl::ZERO,
                target: None,
                slew_step_deg: DEFAULT_SLEW_STEP_DEG,
                line_noise: false,
                silent: false,
                silent_after_sets: None,
                commands: Vec::new(),
                written: Vec::new(),
                output: VecDeque::new(),
                set_count: 0,
                move_count: 0,
                stop_count: 0,
            })),
        }
    }

    /// Start at a physical pose. The firmware counters read that pose as zero
    /// until the first SET, as after a power cycle.
    pub fn starting_at(physical: AzEl) -> Self {
        let sim = Self::new();
        {
            let mut state = sim.lock();
            state.physical = physical;
            state.home = physical;
        }
        sim
    }

    pub fn with_slew_step(self, degrees_per_frame: f64) -> Self {
        self.lock().slew_step_deg = degrees_per_frame;
        self
    }

    pub fn with_line_noise(self, enabled: bool) -> Self {
        self.lock().line_noise = enabled;
        self
    }

    /// A silent table emits no telemetry, like an unplugged cable.
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Stop emitting telemetry once `count` SET frames have been received.
    pub fn silent_after_sets(self, count: usize) -> Self {
        self.lock().silent_after_sets = Some(count);
        self
    }

    /// Queue raw bytes for the host to read, ahead of generated telemetry.
    pub fn inject(&self, data: &[u8]) {
        self.lock().output.extend(data);
    }

    pub fn physical_position(&self) -> AzEl {
        self.lock().physical
    }

    pub fn raw_position(&self) -> AzEl {
        self.lock().raw()
    }

    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    pub fn clear_written(&self) {
        self.lock().written.clear();
    }

    pub fn set_count(&self) -> usize {
        self.lock().set_count
    }

    pub fn move_count(&self) -> usize {
        self.lock().move_count
    }

    pub fn stop_count(&self) -> usize {
        self.lock().stop_count
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A poisoned lock only means a test thread panicked mid-call; the
        // state is still usable for reporting.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SimulatedTurntable {
    fn default() -> Self {
        Self::new()
    }
}

impl SimState {
    fn raw(&self) -> AzEl {
        AzEl::new(
            self.physical.azimuth - self.home.azimuth,
            self.physical.elevation - self.home.elevation,
        )
    }

    fn slew(&mut self) {
        let Some(raw_target) = self.target else {
            return;
        };
        let goal = AzEl::new(
            self.home.azimuth + raw_target.azimuth,
            self.home.elevation + raw_target.elevation,
        );
        self.physical.azimuth = step_towards(self.physical.azimuth, goal.azimuth, self.slew_step_deg);
        self.physical.elevation =
            step_towards(self.physical.elevation, goal.elevation, self.slew_step_deg);
        if self.physical == goal {
            self.target = None;
        }
    }

    fn emit_frame(&mut self) {
        if self.line_noise {
            self.output.extend(NOISE_LINE);
            self.output.extend(NOISE_PREFIX);
        }
        let raw = self.raw();
        let frame = format!("Pos= El: {:.2} , Az: {:.2}\r\n", raw.elevation, raw.azimuth);
        self.output.extend(frame.as_bytes());
    }

    fn execute_pending(&mut self) {
        loop {
            let Some(&first) = self.commands.first() else {
                return;
            };
            if first == b'p' {
                self.commands.remove(0);
                self.stop_count += 1;
                self.target = None;
                continue;
            }
            if !self.commands.starts_with(b"CMD:") {
                if b"CMD:".starts_with(&self.commands) {
                    // prefix of a command still arriving
                    return;
                }
                self.commands.remove(0);
                continue;
            }
            let Some(end) = self.commands.iter().position(|&b| b == b';') else {
                return;
            };
            let frame: Vec<u8> = self.commands.drain(..=end).collect();
            self.execute(&frame[4..frame.len() - 1]);
        }
    }

    fn execute(&mut self, body: &[u8]) {
        let Ok(body) = std::str::from_utf8(body) else {
            return;
        };
        let Some((verb, args)) = body.split_once(':') else {
            return;
        };
        let Some(target) = parse_args(args) else {
            log::debug!("simulated turntable ignoring malformed arguments {:?}", args);
            return;
        };
        match verb {
            "MOV" => {
                self.move_count += 1;
                if target.elevation.abs() > FIRMWARE_TRACKING_LIMIT_DEG
                    || target.azimuth.abs() > 180.0
                {
                    log::debug!("simulated turntable cannot track {}", target);
                    return;
                }
                self.target = Some(target);
            }
            "SET" => {
                self.set_count += 1;
                self.home = self.physical;
                self.target = None;
                if self.silent_after_sets.is_some_and(|count| self.set_count >= count) {
                    self.silent = true;
                }
            }
            _ => {}
        }
    }
}

impl Transport for SimulatedTurntable {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut state = self.lock();
        if !state.silent {
            state.slew();
            state.emit_frame();
        }
        let available = state.output.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(state.output.drain(..available)) {
            *slot = byte;
        }
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.lock();
        state.written.extend_from_slice(data);
        state.commands.extend_from_slice(data);
        state.execute_pending();
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn step_towards(current: f64, goal: f64, step: f64) -> f64 {
    let remaining = goal - current;
    if remaining.abs() <= step {
        goal
    } else {
        current + step * remaining.signum()
    }
}

fn parse_args(args: &str) -> Option<AzEl> {
    let (azimuth, elevation) = args.split_once(',')?;
    Some(AzEl::new(
        azimuth.trim().parse().ok()?,
        elevation.trim().parse().ok()?,
    ))
}
