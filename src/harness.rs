use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tracing::info;

use crate::animation_pulse::{AnimationPulse, Body, MutationRef};
use crate::clock::Clock;
use crate::config::HarnessConfig;
use crate::controller::Controller;
use crate::host::Host;
use crate::long_task_observer::LongTaskObserver;
use crate::reporter::{EventLog, Reporter, SurfaceRef};
use crate::stall_scheduler::StallScheduler;

/// A page with everything wired up: host, jank generator, animation,
/// long-task observer and event log.
pub struct Harness {
    host: Host,
    controller: Controller,
    log: Option<Rc<RefCell<EventLog>>>,
    body: Rc<RefCell<Body>>,
    config: HarnessConfig,
    shut_down: bool,
}

impl Harness {
    pub fn new(config: HarnessConfig, clock: Rc<dyn Clock>) -> Self {
        let host = Host::new(clock, config.host.clone());

        let log = config
            .page
            .event_log
            .then(|| Rc::new(RefCell::new(EventLog::new())));
        let surface = log.clone().map(|log| log as SurfaceRef);
        let reporter = Reporter::new(surface, config.duration_unit);

        let body = Rc::new(RefCell::new(Body::new()));
        let target: MutationRef = body.clone();

        let controller = Controller::new(
            &host,
            config.page,
            config.jank_ms,
            StallScheduler::new(&host, config.stall.clone()),
            AnimationPulse::new(&host, target),
            LongTaskObserver::new(&host, reporter),
        );

        Self {
            host,
            controller,
            log,
            body,
            config,
            shut_down: false,
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run page init, then start whatever the config says starts with it.
    pub fn start(&mut self) {
        self.controller.init();
        if self.config.jank_on_start {
            self.controller.start_jank();
        }
        if self.config.animate_on_start {
            self.controller.start_animation();
        }
    }

    pub fn run_for(&self, span: Duration) {
        self.host.run_for(span);
    }

    pub fn run_until(&self, span: Option<Duration>, stop: &AtomicBool) {
        self.host.run_until(span, stop);
    }

    /// Event log lines, newest first. Empty when the page has no log.
    pub fn log_lines(&self) -> Vec<String> {
        self.log
            .as_ref()
            .map(|log| log.borrow().lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn log_markup(&self) -> Option<String> {
        self.log.as_ref().map(|log| log.borrow().markup())
    }

    pub fn body(&self) -> std::cell::Ref<'_, Body> {
        self.body.borrow()
    }

    /// Stop everything and drop all pending host work. Also runs on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.controller.stop_jank();
        self.controller.stop_animation();
        self.controller.stop_observing();
        self.host.shutdown();
        info!(
            frames = self.host.frames_rendered(),
            long_tasks = self.host.long_tasks_detected(),
            "harness shut down"
        );
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown();
    }
}
