use tracing::{debug, info, trace};

use crate::error::Result;
use crate::host::{Host, LongTaskRecord, ObserverHandle, LONG_TASK};
use crate::reporter::Reporter;

/// Forward long-task entries from the host to a [`Reporter`].
pub struct LongTaskObserver {
    host: Host,
    reporter: Reporter,
    subscription: Option<ObserverHandle>,
}

impl LongTaskObserver {
    pub fn new(host: &Host, reporter: Reporter) -> Self {
        Self {
            host: host.clone(),
            reporter,
            subscription: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe to `longtask` entries. A second call while subscribed does
    /// nothing. Fails if the host cannot produce long-task entries.
    pub fn start(&mut self) -> Result<()> {
        if self.subscription.is_some() {
            return Ok(());
        }
        info!("observing long tasks");
        let reporter = self.reporter.clone();
        let handle = self
            .host
            .observe(&[LONG_TASK], move |batch| forward(&reporter, &batch))?;
        self.subscription = Some(handle);
        Ok(())
    }

    /// Unsubscribe. Entries not yet delivered are dropped.
    pub fn stop(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.disconnect();
            info!("long task observation stopped");
        }
    }

    /// Forward one batch as if the host had delivered it.
    pub fn handle_batch(&self, batch: &[LongTaskRecord]) {
        forward(&self.reporter, batch);
    }
}

/// Report every `longtask` entry of `batch`, in batch order.
fn forward(reporter: &Reporter, batch: &[LongTaskRecord]) {
    trace!(entries = batch.len(), "long task batch");
    for record in batch {
        if record.is_long_task() {
            reporter.report(record);
        } else {
            debug!(entry_type = %record.entry_type, "skipping entry");
        }
    }
}
