//! Cancellable repeating timer work.
//!
//! A [`Cycle`] says how long to wait and what to do when the wait is over;
//! [`RepeatingTask`] keeps re-arming it on the host until cancelled. At most
//! one timer is pending per task.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::host::{Host, TimerHandle};

pub trait Cycle {
    /// Delay before the next `fire`. Called once per iteration, before arming.
    fn next_delay(&mut self) -> Duration;

    fn fire(&mut self, host: &Host);
}

/// Single-threaded cancellation flag.
#[derive(Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

struct Shared {
    host: Host,
    cycle: RefCell<Box<dyn Cycle>>,
    pending: Cell<Option<TimerHandle>>,
    token: CancelToken,
}

/// Handle to a running cycle. Dropping it cancels the cycle.
pub struct RepeatingTask {
    shared: Rc<Shared>,
}

impl RepeatingTask {
    pub fn spawn(host: &Host, cycle: impl Cycle + 'static) -> Self {
        let shared = Rc::new(Shared {
            host: host.clone(),
            cycle: RefCell::new(Box::new(cycle)),
            pending: Cell::new(None),
            token: CancelToken::default(),
        });
        arm(&shared);
        Self { shared }
    }

    pub fn token(&self) -> CancelToken {
        self.shared.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// Cancel and clear the pending timer. Repeat calls do nothing.
    pub fn cancel(&self) {
        self.shared.token.cancel();
        if let Some(handle) = self.shared.pending.take() {
            self.shared.host.clear_timeout(handle);
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn arm(shared: &Rc<Shared>) {
    if shared.token.is_cancelled() {
        return;
    }
    let delay = shared.cycle.borrow_mut().next_delay();
    // The timer must not own the cycle: only the handle keeps it alive.
    let weak = Rc::downgrade(shared);
    let handle = shared.host.set_timeout(delay, move || {
        let Some(next) = weak.upgrade() else {
            return;
        };
        next.pending.set(None);
        if next.token.is_cancelled() {
            return;
        }
        next.cycle.borrow_mut().fire(&next.host);
        arm(&next);
    });
    shared.pending.set(Some(handle));
}
