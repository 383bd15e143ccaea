//! ## netautotest-core::time
//! **Probe send schedule**
//!
//! Sends are planned against absolute offsets from the session start
//! (`k × interval`), never by chaining fixed sleeps, so a long session does
//! not accumulate scheduling drift.
//!
//! Boundary convention: probe `k` is sent iff `k × interval < duration`,
//! i.e. inclusive of `t = 0` and exclusive of `t = duration`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendSchedule {
    interval: Duration,
    count: u64,
}

impl SendSchedule {
    pub fn new(duration: Duration, interval: Duration) -> Result<Self, CoreError> {
        if interval.is_zero() {
            return Err(CoreError::InvalidSessionConfig(
                "probe interval must be greater than zero".into(),
            ));
        }

        let count = duration.as_nanos().div_ceil(interval.as_nanos());
        if count == 0 {
            return Err(CoreError::InvalidSessionConfig(format!(
                "duration {duration:?} is too short for a single probe at interval {interval:?}"
            )));
        }

        let count = u64::try_from(count).map_err(|_| {
            CoreError::InvalidSessionConfig("probe count does not fit in 64 bits".into())
        })?;

        Ok(Self { interval, count })
    }

    /// Number of probes the session will send.
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Offset of probe `k` from the session start.
    pub fn offset(&self, k: u64) -> Option<Duration> {
        if k >= self.count {
            return None;
        }
        let nanos = self.interval.as_nanos().checked_mul(u128::from(k))?;
        Some(Duration::from_nanos(u64::try_from(nanos).ok()?))
    }

    pub fn offsets(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.count).filter_map(move |k| self.offset(k))
    }
}

/// Wall-clock nanoseconds since the UNIX epoch, 0 if the clock is before it.
pub fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
