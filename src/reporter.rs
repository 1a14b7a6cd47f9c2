use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::host::LongTaskRecord;

const LINE_BREAK: &str = "<br>";

/// Where report lines end up.
pub trait DisplaySurface {
    /// Put `line` ahead of everything already shown.
    fn prepend_line(&mut self, line: &str);
}

pub type SurfaceRef = Rc<RefCell<dyn DisplaySurface>>;

/// In-memory event log, newest line first. Never pruned.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    lines: VecDeque<String>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines in display order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Rendered content: each line followed by a `<br>`.
    pub fn markup(&self) -> String {
        self.lines.iter().fold(String::new(), |mut out, line| {
            out.push_str(line);
            out.push_str(LINE_BREAK);
            out
        })
    }
}

impl DisplaySurface for EventLog {
    fn prepend_line(&mut self, line: &str) {
        self.lines.push_front(line.to_string());
    }
}

/// How a record's duration is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DurationUnit {
    #[default]
    Milliseconds,
    /// Divide by 1000 but keep the `ms` label, as the old page output did.
    LegacySeconds,
}

impl DurationUnit {
    fn convert(self, duration_ms: f64) -> f64 {
        match self {
            DurationUnit::Milliseconds => duration_ms,
            DurationUnit::LegacySeconds => duration_ms / 1000.0,
        }
    }
}

pub fn format_line(record: &LongTaskRecord, unit: DurationUnit) -> String {
    format!(
        "long task! start: {}, duration: {}ms, name: {}",
        record.start_time,
        unit.convert(record.duration),
        record.name
    )
}

#[derive(Clone)]
pub struct Reporter {
    surface: Option<SurfaceRef>,
    unit: DurationUnit,
}

impl Reporter {
    pub fn new(surface: Option<SurfaceRef>, unit: DurationUnit) -> Self {
        Self { surface, unit }
    }

    /// Format `record` and prepend it to the surface. Without a surface the
    /// line is only logged.
    pub fn report(&self, record: &LongTaskRecord) {
        let line = format_line(record, self.unit);
        info!("{line}");
        if let Some(surface) = &self.surface {
            surface.borrow_mut().prepend_line(&line);
        }
    }
}
