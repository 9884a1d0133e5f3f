//! Run configuration: invocation budget, worker population, ramp schedule,
//! rate limit and think time.

use rand::Rng;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_WORKERS: usize = 100;

/// Interval applied when a ramp expression carries no explicit duration.
pub const DEFAULT_RAMP_INTERVAL: Duration = Duration::from_secs(60);

/// Interval ticks to sit at full concurrency before a drain may begin.
pub const DEFAULT_RAMP_GRACE_TICKS: u32 = 3;

/// Configuration for one benchmark run. Built once, never mutated after
/// scheduling starts.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub name: String,
    /// Total invocation count. 0 means unbounded.
    pub n: u64,
    /// Size of the worker population at full ramp.
    pub workers: usize,
    /// Wall-clock bound for the run. `None` means unbounded.
    pub duration: Option<Duration>,
    pub ramp: RampSpec,
    /// Aggregate rate limit across all workers. <= 0 means unthrottled.
    pub qps: f64,
    pub think: Option<ThinkTime>,
    pub verbose: u8,
    /// See [`DEFAULT_RAMP_GRACE_TICKS`].
    pub ramp_grace_ticks: u32,
}

impl RunConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            n: 0,
            workers: DEFAULT_WORKERS,
            duration: None,
            ramp: RampSpec::default(),
            qps: 0.0,
            think: None,
            verbose: 0,
            ramp_grace_ticks: DEFAULT_RAMP_GRACE_TICKS,
        }
    }

    pub fn count(mut self, n: u64) -> Self {
        self.n = n;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn ramp(mut self, ramp: RampSpec) -> Self {
        self.ramp = ramp;
        self
    }

    pub fn qps(mut self, qps: f64) -> Self {
        self.qps = qps;
        self
    }

    pub fn think(mut self, think: ThinkTime) -> Self {
        self.think = Some(think);
        self
    }

    pub fn verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn ramp_grace_ticks(mut self, ticks: u32) -> Self {
        self.ramp_grace_ticks = ticks;
        self
    }

    /// Starting more workers than there are invocations is pointless; clamp.
    pub(crate) fn normalize(&mut self) {
        if self.workers == 0 {
            self.workers = DEFAULT_WORKERS;
        }
        if self.n > 0 && self.n < self.workers as u64 {
            self.workers = self.n as usize;
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid spec `{0}`")]
pub struct SpecParseError(String);

/// Ramp schedule for the worker population: start `up` workers per
/// `interval` tick until the configured maximum, and once draining begins
/// cancel `down` workers per tick.
///
/// `up == 0` means all workers start immediately; `down == 0` means the
/// population is never drained early.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RampSpec {
    pub up: usize,
    pub interval: Duration,
    pub down: usize,
}

impl RampSpec {
    pub fn is_empty(&self) -> bool {
        self.up == 0 && self.down == 0
    }
}

/// Parses ramp expressions:
///
/// - `""` / `"0"` => no ramp
/// - `"1"`        => up by 1 per default interval
/// - `"1:10s"`    => up by 1 every 10s
/// - `"1:10s:1"`  => up by 1 every 10s, then down by 1 every 10s
impl FromStr for RampSpec {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }

        let mut parts = s.split(':').map(str::trim).filter(|p| !p.is_empty());
        let mut spec = Self::default();
        if let Some(up) = parts.next() {
            spec.up = up.parse().map_err(|_| SpecParseError(s.to_string()))?;
        }
        if let Some(interval) = parts.next() {
            spec.interval =
                humantime::parse_duration(interval).map_err(|_| SpecParseError(s.to_string()))?;
        }
        if let Some(down) = parts.next() {
            spec.down = down.parse().map_err(|_| SpecParseError(s.to_string()))?;
        }
        Ok(spec)
    }
}

/// Pause injected between a worker's iterations, either fixed (`"10ms"`) or
/// sampled uniformly from a range (`"10ms-20ms"`, `"10-20ms"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl ThinkTime {
    pub fn think(&self) -> Duration {
        if self.max > self.min {
            rand::thread_rng().gen_range(self.min..=self.max)
        } else {
            self.min
        }
    }
}

impl FromStr for ThinkTime {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((lo, hi)) = s.split_once('-') {
            let (lo, hi) = (lo.trim(), hi.trim());
            let max = humantime::parse_duration(hi).map_err(|_| SpecParseError(s.to_string()))?;
            // A bare lower bound ("10-20ms") borrows the upper bound's unit.
            let min = match humantime::parse_duration(lo) {
                Ok(d) => d,
                Err(_) => {
                    let unit = hi.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.');
                    humantime::parse_duration(&format!("{lo}{unit}"))
                        .map_err(|_| SpecParseError(s.to_string()))?
                }
            };
            if min > max {
                return Err(SpecParseError(s.to_string()));
            }
            Ok(Self { min, max })
        } else {
            let d = humantime::parse_duration(s).map_err(|_| SpecParseError(s.to_string()))?;
            Ok(Self { min: d, max: d })
        }
    }
}
