//! Single-threaded cooperative host runtime.
//!
//! The host owns one timeline. Work reaches it three ways: posted tasks,
//! timers and animation frames. Each piece of work runs as one execution
//! slice, timed on the host clock; a slice longer than the long-task
//! threshold is turned into a [`LongTaskRecord`] and handed to observers in a
//! later slice, never while the stall is still in progress.
//!
//! Nothing here is `Send`. Callbacks capture `Host` clones and run on the
//! thread that drives [`Host::run_until`].

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::error::{HarnessError, Result};

/// Entry type of records produced for stalled slices.
pub const LONG_TASK: &str = "longtask";

/// Longest single sleep while idle, so a stop request is noticed promptly.
const IDLE_QUANTUM: Duration = Duration::from_millis(20);

/// One entry handed out by the host's observation channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTaskRecord {
    /// Slice start, milliseconds since the host clock's origin.
    pub start_time: f64,
    /// Slice length in milliseconds.
    pub duration: f64,
    pub entry_type: String,
    /// Attribution label.
    pub name: String,
}

impl LongTaskRecord {
    pub fn is_long_task(&self) -> bool {
        self.entry_type == LONG_TASK
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Slices strictly longer than this become long tasks.
    pub long_task_threshold: Duration,
    pub frame_interval: Duration,
    pub attribution: String,
    /// When false, observing `longtask` entries fails.
    pub supports_long_tasks: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            long_task_threshold: Duration::from_millis(50),
            frame_interval: Duration::from_nanos(16_666_667),
            attribution: "self".to_string(),
            supports_long_tasks: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    deadline: Duration,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(u64);

type Task = Box<dyn FnOnce()>;
type FrameCallback = Box<dyn FnOnce(f64)>;
type BatchCallback = Box<dyn FnMut(Vec<LongTaskRecord>)>;

struct ObserverSlot {
    id: u64,
    entry_types: Vec<String>,
    /// Entries produced while this slot was registered, not yet delivered.
    pending: Vec<LongTaskRecord>,
    // Taken out while the callback runs.
    callback: Option<BatchCallback>,
}

#[derive(Default)]
struct HostState {
    next_id: u64,
    tasks: VecDeque<Task>,
    timers: BTreeMap<(Duration, u64), Task>,
    frame_callbacks: BTreeMap<u64, (Duration, FrameCallback)>,
    last_frame_at: Option<Duration>,
    delivery_queued: bool,
    observers: Vec<ObserverSlot>,
    frames: u64,
    long_tasks: u64,
}

impl HostState {
    fn issue_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct HostInner {
    clock: Rc<dyn Clock>,
    config: HostConfig,
    state: RefCell<HostState>,
}

enum Work {
    Task(Task),
    Frame,
}

/// Cheap, clonable handle to the host.
#[derive(Clone)]
pub struct Host {
    inner: Rc<HostInner>,
}

/// Non-owning host handle, see [`Host::downgrade`].
#[derive(Clone)]
pub struct WeakHost(Weak<HostInner>);

impl WeakHost {
    pub fn upgrade(&self) -> Option<Host> {
        self.0.upgrade().map(|inner| Host { inner })
    }
}

impl Host {
    pub fn new(clock: Rc<dyn Clock>, config: HostConfig) -> Self {
        Self {
            inner: Rc::new(HostInner {
                clock,
                config,
                state: RefCell::new(HostState::default()),
            }),
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// `performance.now()` equivalent.
    pub fn now_ms(&self) -> f64 {
        self.inner.clock.now_ms()
    }

    pub fn post_task(&self, task: impl FnOnce() + 'static) {
        self.inner.state.borrow_mut().tasks.push_back(Box::new(task));
    }

    pub fn set_timeout(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerHandle {
        let deadline = self.inner.clock.now() + delay;
        let mut st = self.inner.state.borrow_mut();
        let seq = st.issue_id();
        st.timers.insert((deadline, seq), Box::new(callback));
        TimerHandle { deadline, seq }
    }

    /// Returns false if the timer already fired or was cleared.
    pub fn clear_timeout(&self, handle: TimerHandle) -> bool {
        self.inner
            .state
            .borrow_mut()
            .timers
            .remove(&(handle.deadline, handle.seq))
            .is_some()
    }

    pub fn request_animation_frame(&self, callback: impl FnOnce(f64) + 'static) -> FrameHandle {
        let requested_at = self.inner.clock.now();
        let mut st = self.inner.state.borrow_mut();
        let id = st.issue_id();
        st.frame_callbacks.insert(id, (requested_at, Box::new(callback)));
        FrameHandle(id)
    }

    /// Returns false if the callback already ran or was cancelled.
    pub fn cancel_animation_frame(&self, handle: FrameHandle) -> bool {
        self.inner
            .state
            .borrow_mut()
            .frame_callbacks
            .remove(&handle.0)
            .is_some()
    }

    /// Subscribe to entries of the given types.
    ///
    /// Batches arrive asynchronously, one per delivery slice, in the order
    /// the entries were produced. Empty batches are never delivered.
    pub fn observe(
        &self,
        entry_types: &[&str],
        callback: impl FnMut(Vec<LongTaskRecord>) + 'static,
    ) -> Result<ObserverHandle> {
        if entry_types.is_empty() {
            return Err(HarnessError::NoEntryTypes);
        }
        for ty in entry_types {
            if !self.supports(ty) {
                return Err(HarnessError::UnsupportedEntryType(ty.to_string()));
            }
        }

        let mut st = self.inner.state.borrow_mut();
        let id = st.issue_id();
        st.observers.push(ObserverSlot {
            id,
            entry_types: entry_types.iter().map(|t| t.to_string()).collect(),
            pending: Vec::new(),
            callback: Some(Box::new(callback)),
        });
        debug!(observer = id, ?entry_types, "observer registered");
        Ok(ObserverHandle {
            id,
            host: self.clone(),
        })
    }

    fn supports(&self, entry_type: &str) -> bool {
        entry_type == LONG_TASK && self.inner.config.supports_long_tasks
    }

    fn disconnect(&self, id: u64) -> bool {
        let mut st = self.inner.state.borrow_mut();
        let before = st.observers.len();
        st.observers.retain(|o| o.id != id);
        before != st.observers.len()
    }

    /// Queue an entry for delivery, as the host does for stalled slices.
    ///
    /// Only observers registered right now receive it.
    pub fn queue_entry(&self, record: LongTaskRecord) {
        let mut st = self.inner.state.borrow_mut();
        let mut queued = false;
        for slot in st.observers.iter_mut() {
            if slot.entry_types.iter().any(|t| *t == record.entry_type) {
                slot.pending.push(record.clone());
                queued = true;
            }
        }
        if queued && !st.delivery_queued {
            st.delivery_queued = true;
            let host = self.clone();
            st.tasks.push_back(Box::new(move || host.deliver()));
        }
    }

    fn deliver(&self) {
        let ids: Vec<u64> = {
            let mut st = self.inner.state.borrow_mut();
            st.delivery_queued = false;
            st.observers.iter().map(|o| o.id).collect()
        };

        for id in ids {
            let taken = {
                let mut st = self.inner.state.borrow_mut();
                let Some(slot) = st.observers.iter_mut().find(|o| o.id == id) else {
                    continue;
                };
                if slot.pending.is_empty() {
                    continue;
                }
                let batch = mem::take(&mut slot.pending);
                slot.callback.take().map(|cb| (batch, cb))
            };

            if let Some((batch, mut callback)) = taken {
                trace!(observer = id, entries = batch.len(), "delivering batch");
                callback(batch);
                let mut st = self.inner.state.borrow_mut();
                if let Some(slot) = st.observers.iter_mut().find(|o| o.id == id) {
                    slot.callback = Some(callback);
                }
            }
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.inner.state.borrow().frames
    }

    pub fn long_tasks_detected(&self) -> u64 {
        self.inner.state.borrow().long_tasks
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.state.borrow().timers.len()
    }

    pub fn pending_frame_callbacks(&self) -> usize {
        self.inner.state.borrow().frame_callbacks.len()
    }

    pub fn run_for(&self, span: Duration) {
        self.run_until(Some(span), &AtomicBool::new(false));
    }

    /// Drive the loop until `span` elapses (if given) or `stop` is set.
    pub fn run_until(&self, span: Option<Duration>, stop: &AtomicBool) {
        let end = span.map(|s| self.inner.clock.now() + s);
        loop {
            if stop.load(Ordering::SeqCst) {
                debug!("host loop stopped");
                break;
            }
            let now = self.inner.clock.now();
            if end.is_some_and(|end| now >= end) {
                break;
            }

            match self.next_due() {
                Some(due) if due <= now => self.run_next(now),
                next => {
                    let mut wake = next.unwrap_or(Duration::MAX).min(now + IDLE_QUANTUM);
                    if let Some(end) = end {
                        wake = wake.min(end);
                    }
                    self.inner.clock.idle_until(wake);
                }
            }
        }
    }

    /// Drop every pending task, timer, frame callback and observer.
    ///
    /// Callbacks are dropped after the state borrow is released, so their
    /// captures may touch the host while being torn down.
    pub fn shutdown(&self) {
        let drained = {
            let mut st = self.inner.state.borrow_mut();
            st.delivery_queued = false;
            (
                mem::take(&mut st.tasks),
                mem::take(&mut st.timers),
                mem::take(&mut st.frame_callbacks),
                mem::take(&mut st.observers),
            )
        };
        drop(drained);
    }

    /// A handle that does not keep the host alive.
    pub fn downgrade(&self) -> WeakHost {
        WeakHost(Rc::downgrade(&self.inner))
    }

    fn frame_due(&self, st: &HostState) -> Option<Duration> {
        let (requested_at, _) = st.frame_callbacks.values().next()?;
        let after = match st.last_frame_at {
            Some(last) => last.max(*requested_at),
            None => *requested_at,
        };
        Some(next_boundary_after(after, self.inner.config.frame_interval))
    }

    fn next_due(&self) -> Option<Duration> {
        let st = self.inner.state.borrow();
        if !st.tasks.is_empty() {
            return Some(Duration::ZERO);
        }
        let timer = st.timers.keys().next().map(|(deadline, _)| *deadline);
        let frame = self.frame_due(&st);
        match (timer, frame) {
            (Some(t), Some(f)) => Some(t.min(f)),
            (t, f) => t.or(f),
        }
    }

    fn take_work(&self, now: Duration) -> Option<Work> {
        let mut st = self.inner.state.borrow_mut();
        if let Some(task) = st.tasks.pop_front() {
            return Some(Work::Task(task));
        }
        let timer = st
            .timers
            .keys()
            .next()
            .copied()
            .filter(|(deadline, _)| *deadline <= now);
        let frame = self.frame_due(&st).filter(|due| *due <= now);
        match (timer, frame) {
            (Some(key), Some(f)) if key.0 > f => Some(Work::Frame),
            (Some(key), _) => st.timers.remove(&key).map(Work::Task),
            (None, Some(_)) => Some(Work::Frame),
            (None, None) => None,
        }
    }

    fn run_next(&self, now: Duration) {
        let Some(work) = self.take_work(now) else {
            return;
        };

        let start = self.inner.clock.now();
        match work {
            Work::Task(task) => task(),
            Work::Frame => self.run_frame(start),
        }
        let end = self.inner.clock.now();
        self.account_slice(start, end);
    }

    fn run_frame(&self, start: Duration) {
        let timestamp = start.as_secs_f64() * 1000.0;
        // Callbacks registered while this frame runs wait for the next one.
        let cutoff = {
            let mut st = self.inner.state.borrow_mut();
            st.frames += 1;
            st.last_frame_at = Some(start);
            st.next_id + 1
        };
        trace!(timestamp, "frame");

        loop {
            let next = {
                let mut st = self.inner.state.borrow_mut();
                let id = st.frame_callbacks.range(..cutoff).next().map(|(id, _)| *id);
                id.and_then(|id| st.frame_callbacks.remove(&id))
            };
            match next {
                Some((_, callback)) => callback(timestamp),
                None => break,
            }
        }
    }

    fn account_slice(&self, start: Duration, end: Duration) {
        let duration = end.saturating_sub(start);
        if duration <= self.inner.config.long_task_threshold || !self.inner.config.supports_long_tasks {
            return;
        }

        let record = LongTaskRecord {
            start_time: start.as_secs_f64() * 1000.0,
            duration: duration.as_secs_f64() * 1000.0,
            entry_type: LONG_TASK.to_string(),
            name: self.inner.config.attribution.clone(),
        };
        debug!(start = record.start_time, duration = record.duration, "long task detected");
        self.inner.state.borrow_mut().long_tasks += 1;
        self.queue_entry(record);
    }
}

/// Cancellable subscription returned by [`Host::observe`].
pub struct ObserverHandle {
    id: u64,
    host: Host,
}

impl ObserverHandle {
    /// Stop delivery, including entries already buffered. Safe to repeat.
    pub fn disconnect(&self) -> bool {
        self.host.disconnect(self.id)
    }
}

fn next_boundary_after(t: Duration, interval: Duration) -> Duration {
    let interval = interval.as_nanos().max(1);
    let n = t.as_nanos() / interval + 1;
    Duration::from_nanos((n * interval) as u64)
}
