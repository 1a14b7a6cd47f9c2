use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source for the host.
///
/// Time is measured from the clock's own origin, like a page's
/// `performance.now()`.
pub trait Clock {
    /// Current time since the clock's origin.
    fn now(&self) -> Duration;

    /// Yield the thread until `deadline` (or return right away if it has passed).
    fn idle_until(&self, deadline: Duration);

    fn now_ms(&self) -> f64 {
        self.now().as_secs_f64() * 1000.0
    }
}

/// Wall clock backed by `Instant`.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn idle_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    }
}

/// Deterministic clock for simulated runs.
///
/// Every read costs `read_cost` of virtual time, which is what lets a spin
/// loop make progress without a real CPU burning behind it. Idling jumps
/// straight to the deadline.
pub struct VirtualClock {
    now: Cell<Duration>,
    read_cost: Duration,
}

impl VirtualClock {
    pub const DEFAULT_READ_COST: Duration = Duration::from_micros(10);

    pub fn new() -> Self {
        Self::with_read_cost(Self::DEFAULT_READ_COST)
    }

    pub fn with_read_cost(read_cost: Duration) -> Self {
        Self {
            now: Cell::new(Duration::ZERO),
            read_cost,
        }
    }

    /// Move time forward without counting as a read.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Current time without charging a read.
    pub fn peek(&self) -> Duration {
        self.now.get()
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        let t = self.now.get() + self.read_cost;
        self.now.set(t);
        t
    }

    fn idle_until(&self, deadline: Duration) {
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
    }
}
