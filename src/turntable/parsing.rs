use regex::Regex;
use std::sync::OnceLock;

use super::AzEl;

/// Longest partial line kept between reads. Anything longer is line noise.
const MAX_CARRY_BYTES: usize = 256;

/// Matches `Pos= El: -0.03 , Az: -0.03`. The firmware prints `%.2f`, so exactly
/// two decimals are required; anything else is a corrupted frame.
fn telemetry_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"^Pos\s*=\s*El:\s*(?P<elevation>[+-]?\d{1,3}\.\d{2})\s*,\s*Az:\s*(?P<azimuth>[+-]?\d{1,3}\.\d{2})\s*$",
        )
        .expect("telemetry pattern compiles")
    })
}

/// Extract the most recent position frame from a raw serial read.
///
/// Lines are scanned newest first. Bytes ahead of `Pos` are dropped, lines
/// that are not ASCII or do not match the strict frame pattern are skipped.
/// `None` means no complete frame is present, which is the normal state
/// between telemetry ticks.
pub fn parse_telemetry(data: &[u8]) -> Option<AzEl> {
    data.split(|&b| b == b'\n')
        .rev()
        .find_map(parse_line)
}

/// Frames start at the last `Pos` on the line. A valid frame contains only
/// one, so this is the same as dropping everything before the marker while
/// also skipping a stray `Pos` in leading binary noise.
fn parse_line(line: &[u8]) -> Option<AzEl> {
    let start = find_last(line, b"Pos")?;
    let line = &line[start..];
    if !line.is_ascii() {
        return None;
    }
    let text = std::str::from_utf8(line).ok()?;
    let captures = telemetry_regex().captures(text)?;
    let elevation: f64 = captures["elevation"].parse().ok()?;
    let azimuth: f64 = captures["azimuth"].parse().ok()?;
    if !(azimuth.is_finite() && elevation.is_finite()) {
        return None;
    }
    Some(AzEl { azimuth, elevation })
}

fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Reassembles frames that straddle two serial reads.
#[derive(Debug, Default)]
pub struct TelemetryBuffer {
    carry: Vec<u8>,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `chunk` together with whatever partial line the previous read
    /// left behind, then keep this read's trailing partial line.
    pub fn push(&mut self, chunk: &[u8]) -> Option<AzEl> {
        let mut joined = std::mem::take(&mut self.carry);
        joined.extend_from_slice(chunk);

        let parsed = parse_telemetry(&joined);

        let tail_start = joined
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let tail = &joined[tail_start..];
        if tail.len() <= MAX_CARRY_BYTES {
            self.carry = tail.to_vec();
        }
        parsed
    }

    pub fn clear(&mut self) {
        self.carry.clear();
    }
}
