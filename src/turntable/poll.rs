use std::thread;
use std::time::{Duration, Instant};

use super::TurntableError;
use crate::abort::AbortSignal;

/// Sleep-and-retry loop shared by every blocking controller operation.
///
/// With no timeout and no abort signal it polls forever, which is what a
/// dead link looks like from the caller's side.
#[derive(Debug, Clone)]
pub struct Poller {
    pub interval: Duration,
    /// Multiplier applied to the interval after every miss. 1.0 keeps it fixed.
    pub backoff: f64,
    pub max_interval: Duration,
    pub timeout: Option<Duration>,
    pub abort: Option<AbortSignal>,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            backoff: 1.0,
            max_interval: interval,
            timeout: None,
            abort: None,
        }
    }

    pub fn with_backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.backoff = factor.max(1.0);
        self.max_interval = max_interval.max(self.interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = Some(abort);
        self
    }

    /// Call `attempt` until it yields a value, an error, a timeout or an abort.
    pub fn until<T, F>(&self, mut attempt: F) -> Result<T, TurntableError>
    where
        F: FnMut() -> Result<Option<T>, TurntableError>,
    {
        let start = Instant::now();
        let mut delay = self.interval;
        loop {
            if let Some(abort) = &self.abort {
                if abort.is_raised() {
                    let reason = abort.reason().unwrap_or_else(|| "abort requested".to_string());
                    return Err(TurntableError::Aborted(reason));
                }
            }

            if let Some(value) = attempt()? {
                return Ok(value);
            }

            if let Some(timeout) = self.timeout {
                if start.elapsed() >= timeout {
                    return Err(TurntableError::Timeout(timeout));
                }
            }

            thread::sleep(delay);
            delay = Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff)
                .unwrap_or(self.max_interval)
                .min(self.max_interval);
        }
    }
}
