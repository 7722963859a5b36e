use std::time::{Instant, SystemTime};

use crate::datetime_to_millis;

/// The current time in ms since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    datetime_to_millis(&SystemTime::now())
}

/// Milliseconds elapsed since `start`, with sub-millisecond precision.
pub(crate) fn elapsed_millis(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
