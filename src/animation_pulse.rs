use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, info};

use crate::host::{FrameHandle, Host};

/// Visible per-frame change made by the pulse.
pub trait FrameMutation {
    fn mutate(&mut self, timestamp: f64);
}

pub type MutationRef = Rc<RefCell<dyn FrameMutation>>;

/// Page body that grows by one `<div />` per pulse.
///
/// Gaps between the recorded timestamps are what starvation looks like.
#[derive(Debug, Default)]
pub struct Body {
    divs: Vec<f64>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn div_count(&self) -> usize {
        self.divs.len()
    }

    /// Frame timestamp at which each div was appended.
    pub fn timestamps(&self) -> &[f64] {
        &self.divs
    }

    /// Largest gap between consecutive pulses, in milliseconds.
    pub fn longest_gap(&self) -> Option<f64> {
        self.divs.windows(2).map(|w| w[1] - w[0]).reduce(f64::max)
    }
}

impl FrameMutation for Body {
    fn mutate(&mut self, timestamp: f64) {
        self.divs.push(timestamp);
    }
}

struct PulseInner {
    host: Host,
    target: MutationRef,
    handle: Cell<Option<FrameHandle>>,
    active: Cell<bool>,
}

/// Per-frame callback that re-registers itself until stopped. Dropping the
/// pulse stops it at the next frame.
pub struct AnimationPulse {
    inner: Rc<PulseInner>,
}

impl AnimationPulse {
    pub fn new(host: &Host, target: MutationRef) -> Self {
        Self {
            inner: Rc::new(PulseInner {
                host: host.clone(),
                target,
                handle: Cell::new(None),
                active: Cell::new(false),
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// The currently pending frame registration, if any.
    pub fn handle(&self) -> Option<FrameHandle> {
        self.inner.handle.get()
    }

    /// Start pulsing. A pulse already running is replaced, never doubled.
    pub fn start(&self) {
        self.cancel_pending();
        self.inner.active.set(true);
        schedule(&self.inner);
        info!("animation started");
    }

    /// Stop pulsing. Safe to call when nothing is running.
    pub fn stop(&self) {
        let was_active = self.inner.active.replace(false);
        self.cancel_pending();
        if was_active {
            info!("animation stopped");
        }
    }

    fn cancel_pending(&self) {
        if let Some(handle) = self.inner.handle.take() {
            self.inner.host.cancel_animation_frame(handle);
        }
    }
}

fn schedule(inner: &Rc<PulseInner>) {
    let weak = Rc::downgrade(inner);
    let handle = inner.host.request_animation_frame(move |timestamp| {
        let Some(next) = weak.upgrade() else {
            return;
        };
        next.handle.set(None);
        next.target.borrow_mut().mutate(timestamp);
        if next.active.get() {
            schedule(&next);
        } else {
            debug!("pulse stopped mid-frame");
        }
    });
    inner.handle.set(Some(handle));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::busy_wait::busy_wait;
    use crate::clock::VirtualClock;
    use crate::host::HostConfig;
    use std::time::Duration;

    fn pulse() -> (Host, AnimationPulse, Rc<RefCell<Body>>) {
        let host = Host::new(Rc::new(VirtualClock::new()), HostConfig::default());
        let body = Rc::new(RefCell::new(Body::new()));
        let target: MutationRef = body.clone();
        (host.clone(), AnimationPulse::new(&host, target), body)
    }

    #[test]
    fn pulses_once_per_frame() {
        let (host, pulse, body) = pulse();
        pulse.start();
        host.run_for(Duration::from_millis(1000));
        let n = body.borrow().div_count();
        assert!((58..=60).contains(&n), "{n} pulses in a second");
        assert!(pulse.handle().is_some());
    }

    #[test]
    fn stop_is_idempotent() {
        let (host, pulse, body) = pulse();
        pulse.stop();
        pulse.start();
        host.run_for(Duration::from_millis(100));
        pulse.stop();
        pulse.stop();
        assert!(pulse.handle().is_none());
        assert_eq!(host.pending_frame_callbacks(), 0);

        let n = body.borrow().div_count();
        host.run_for(Duration::from_millis(100));
        assert_eq!(body.borrow().div_count(), n);
    }

    #[test]
    fn dropped_pulse_is_freed_and_goes_quiet() {
        let (host, pulse, body) = pulse();
        pulse.start();
        host.run_for(Duration::from_millis(100));
        let inner = Rc::downgrade(&pulse.inner);
        drop(pulse);
        assert!(inner.upgrade().is_none());

        let n = body.borrow().div_count();
        host.run_for(Duration::from_millis(100));
        assert_eq!(body.borrow().div_count(), n);
        assert_eq!(host.pending_frame_callbacks(), 0);
    }

    #[test]
    fn restart_keeps_a_single_registration() {
        let (host, pulse, _body) = pulse();
        pulse.start();
        pulse.start();
        assert_eq!(host.pending_frame_callbacks(), 1);
        pulse.stop();
    }

    #[test]
    fn stall_delays_the_next_pulse_by_its_length() {
        let (host, pulse, body) = pulse();
        pulse.start();
        let h = host.clone();
        host.set_timeout(Duration::from_millis(100), move || {
            busy_wait(h.clock(), 300.0);
        });
        host.run_for(Duration::from_millis(600));
        pulse.stop();

        let gap = body.borrow().longest_gap().unwrap();
        assert!(gap >= 300.0 && gap < 300.0 + 17.0, "longest gap {gap}");
    }
}
