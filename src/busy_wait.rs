use std::hint;
use std::time::Duration;

use crate::clock::Clock;

/// Block the calling thread for `duration_ms` by spinning on `clock`.
///
/// This never yields: timers, frames and observer deliveries queued on the
/// host all wait until it returns. Non-positive (or NaN) durations return
/// immediately. Returns the time actually spent.
pub fn busy_wait(clock: &dyn Clock, duration_ms: f64) -> Duration {
    if !(duration_ms > 0.0) {
        return Duration::ZERO;
    }
    let target = Duration::try_from_secs_f64(duration_ms / 1000.0).unwrap_or(Duration::MAX);

    let begin = clock.now();
    loop {
        let elapsed = clock.now().saturating_sub(begin);
        if elapsed >= target {
            return elapsed;
        }
        hint::spin_loop();
    }
}
