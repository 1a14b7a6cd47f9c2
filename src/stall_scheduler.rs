use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::busy_wait::busy_wait;
use crate::config::{MsRange, StallConfig};
use crate::host::Host;
use crate::repeating::{Cycle, RepeatingTask};

/// One scheduled stall: wait `delay_ms` without blocking, then spin for
/// `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallTask {
    pub delay_ms: u64,
    pub duration_ms: u64,
}

type Listener = Rc<RefCell<Option<Box<dyn FnMut(StallTask)>>>>;

struct StallCycle {
    delay: MsRange,
    duration: MsRange,
    rng: Rc<RefCell<StdRng>>,
    next: Option<StallTask>,
    listener: Listener,
}

impl Cycle for StallCycle {
    fn next_delay(&mut self) -> Duration {
        let mut rng = self.rng.borrow_mut();
        let task = StallTask {
            delay_ms: self.delay.sample(&mut *rng),
            duration_ms: self.duration.sample(&mut *rng),
        };
        self.next = Some(task);
        Duration::from_millis(task.delay_ms)
    }

    fn fire(&mut self, host: &Host) {
        let Some(task) = self.next.take() else {
            return;
        };
        busy_wait(host.clock(), task.duration_ms as f64);
        debug!(delay_ms = task.delay_ms, duration_ms = task.duration_ms, "stall done");
        if let Some(listener) = self.listener.borrow_mut().as_mut() {
            listener(task);
        }
    }
}

/// Generates synthetic jank: idle for a random delay, then block the host
/// for a random duration, forever or until stopped.
pub struct StallScheduler {
    host: Host,
    config: StallConfig,
    rng: Rc<RefCell<StdRng>>,
    listener: Listener,
    running: Option<RepeatingTask>,
}

impl StallScheduler {
    pub fn new(host: &Host, config: StallConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            host: host.clone(),
            config,
            rng: Rc::new(RefCell::new(rng)),
            listener: Rc::new(RefCell::new(None)),
            running: None,
        }
    }

    /// Called after every completed stall.
    pub fn set_listener(&self, listener: impl FnMut(StallTask) + 'static) {
        *self.listener.borrow_mut() = Some(Box::new(listener));
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Begin the stall cycle. Does nothing if already running.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }
        info!(
            delay = %self.config.delay,
            duration = %self.config.duration,
            "starting jank"
        );
        let cycle = StallCycle {
            delay: self.config.delay,
            duration: self.config.duration,
            rng: self.rng.clone(),
            next: None,
            listener: self.listener.clone(),
        };
        self.running = Some(RepeatingTask::spawn(&self.host, cycle));
    }

    /// Cancel the pending stall. Does nothing if not running.
    pub fn stop(&mut self) {
        if let Some(task) = self.running.take() {
            task.cancel();
            info!("jank stopped");
        }
    }
}
