//! Per-minute rate calculation for monotonic counters.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::RateError;

/// Samples further apart than this produce no rate.
pub const MAX_INTERVAL_SECS: i64 = 600;

/// Derive the per-minute rate between two readings of a counter.
///
/// Times are compared at whole-second resolution. A counter that went
/// down is assumed to have been reset by its source and yields
/// [`RateError::CounterReset`] rather than a negative rate.
pub fn rate(
    value: f64,
    now: SystemTime,
    last_value: f64,
    last_time: SystemTime,
) -> Result<f64, RateError> {
    let elapsed_secs = unix_secs(now) - unix_secs(last_time);
    if elapsed_secs > MAX_INTERVAL_SECS {
        return Err(RateError::TooLongGap { elapsed_secs });
    }
    if elapsed_secs <= 0 {
        return Err(RateError::InvalidInterval { elapsed_secs });
    }

    let diff = (value - last_value) * 60.0 / elapsed_secs as f64;
    if diff < 0.0 {
        return Err(RateError::CounterReset { diff });
    }
    Ok(diff)
}

/// Whole Unix seconds for a wall-clock time; negative before the epoch.
pub(crate) fn unix_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}
