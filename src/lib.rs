//! Synthetic jank generator and long-task observation harness.
//!
//! A single-threaded [`host::Host`] stands in for a page's main thread. The
//! [`stall_scheduler::StallScheduler`] blocks it at random, the
//! [`animation_pulse::AnimationPulse`] makes the starvation visible, and the
//! [`long_task_observer::LongTaskObserver`] turns every stall the host
//! detects into a line in the event log.

pub mod animation_pulse;
pub mod busy_wait;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod harness;
pub mod host;
pub mod long_task_observer;
pub mod repeating;
pub mod reporter;
pub mod stall_scheduler;

pub use config::{DelayPreset, DurationPreset, HarnessConfig, MsRange, Page, StallConfig};
pub use error::{HarnessError, Result};
pub use harness::Harness;
pub use host::{Host, HostConfig, LongTaskRecord, LONG_TASK};
