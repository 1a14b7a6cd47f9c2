use std::rc::Rc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::animation_pulse::AnimationPulse;
use crate::busy_wait::busy_wait;
use crate::config::Page;
use crate::error::HarnessError;
use crate::host::Host;
use crate::long_task_observer::LongTaskObserver;
use crate::repeating::{Cycle, RepeatingTask};
use crate::stall_scheduler::StallScheduler;

/// Page controls a user can click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    InjectJank,
    StopAnimating,
}

struct Clicker {
    period: Duration,
    action: Rc<dyn Fn()>,
}

impl Cycle for Clicker {
    fn next_delay(&mut self) -> Duration {
        self.period
    }

    fn fire(&mut self, _host: &Host) {
        (self.action)();
    }
}

/// Wires page triggers to the jank generator, the animation pulse and the
/// long-task observer.
pub struct Controller {
    host: Host,
    page: Page,
    jank_ms: u64,
    scheduler: StallScheduler,
    pulse: Rc<AnimationPulse>,
    observer: LongTaskObserver,
    observer_error: Option<HarnessError>,
    initialized: bool,
}

impl Controller {
    pub fn new(
        host: &Host,
        page: Page,
        jank_ms: u64,
        scheduler: StallScheduler,
        pulse: AnimationPulse,
        observer: LongTaskObserver,
    ) -> Self {
        Self {
            host: host.clone(),
            page,
            jank_ms,
            scheduler,
            pulse: Rc::new(pulse),
            observer,
            observer_error: None,
            initialized: false,
        }
    }

    /// Page load: report missing controls and start observing.
    ///
    /// An observer that cannot start is logged once and left off; jank and
    /// animation are unaffected. Runs once; later calls do nothing.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        if !self.page.jank_button {
            warn!("no jank trigger on page, skipping");
        }
        if !self.page.stop_button {
            warn!("no stop trigger on page, skipping");
        }

        info!("make observer");
        match self.observer.start() {
            Ok(()) => info!("observe longtask"),
            Err(e) => {
                error!(error = %e, "long task observation unavailable");
                self.observer_error = Some(e);
            }
        }
    }

    pub fn observer_error(&self) -> Option<&HarnessError> {
        self.observer_error.as_ref()
    }

    pub fn is_wired(&self, trigger: Trigger) -> bool {
        match trigger {
            Trigger::InjectJank => self.page.jank_button,
            Trigger::StopAnimating => self.page.stop_button,
        }
    }

    /// Click a trigger. The action runs as its own host task. Returns false
    /// if the trigger isn't on the page.
    pub fn click(&self, trigger: Trigger) -> bool {
        let Some(action) = self.action(trigger) else {
            return false;
        };
        self.host.post_task(move || action());
        true
    }

    /// Click `trigger` once, `delay` from now.
    pub fn click_after(&self, trigger: Trigger, delay: Duration) -> bool {
        let Some(action) = self.action(trigger) else {
            return false;
        };
        self.host.set_timeout(delay, move || action());
        true
    }

    /// Click `trigger` every `period` until the returned task is dropped.
    pub fn click_every(&self, trigger: Trigger, period: Duration) -> Option<RepeatingTask> {
        let action = self.action(trigger)?;
        info!(?trigger, ?period, "scheduling repeated clicks");
        Some(RepeatingTask::spawn(&self.host, Clicker { period, action }))
    }

    fn action(&self, trigger: Trigger) -> Option<Rc<dyn Fn()>> {
        if !self.is_wired(trigger) {
            return None;
        }
        let action: Rc<dyn Fn()> = match trigger {
            Trigger::InjectJank => {
                let host = self.host.clone();
                let ms = self.jank_ms;
                Rc::new(move || {
                    info!(ms, "injecting jank");
                    busy_wait(host.clock(), ms as f64);
                })
            }
            Trigger::StopAnimating => {
                let pulse = self.pulse.clone();
                Rc::new(move || pulse.stop())
            }
        };
        Some(action)
    }

    pub fn start_jank(&mut self) {
        self.scheduler.start();
    }

    pub fn stop_jank(&mut self) {
        self.scheduler.stop();
    }

    pub fn start_animation(&self) {
        self.pulse.start();
    }

    pub fn stop_animation(&self) {
        self.pulse.stop();
    }

    pub fn stop_observing(&mut self) {
        self.observer.stop();
    }

    pub fn scheduler(&self) -> &StallScheduler {
        &self.scheduler
    }

    pub fn pulse(&self) -> &AnimationPulse {
        &self.pulse
    }

    pub fn observer(&self) -> &LongTaskObserver {
        &self.observer
    }
}
