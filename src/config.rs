use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::host::HostConfig;
use crate::reporter::DurationUnit;

/// Half-open millisecond range `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct MsRange {
    lo: u64,
    hi: u64,
}

impl MsRange {
    pub fn new(lo: u64, hi: u64) -> Result<Self> {
        if lo >= hi {
            return Err(HarnessError::InvalidRange { lo, hi });
        }
        Ok(Self { lo, hi })
    }

    const fn preset(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    pub fn lo(&self) -> u64 {
        self.lo
    }

    pub fn hi(&self) -> u64 {
        self.hi
    }

    pub fn contains(&self, ms: u64) -> bool {
        ms >= self.lo && ms < self.hi
    }

    /// Uniform draw, lower bound inclusive, upper bound exclusive.
    pub fn sample(&self, rng: &mut impl Rng) -> u64 {
        rng.random_range(self.lo..self.hi)
    }
}

#[derive(Deserialize)]
struct RawRange {
    lo: u64,
    hi: u64,
}

impl TryFrom<RawRange> for MsRange {
    type Error = HarnessError;

    fn try_from(raw: RawRange) -> Result<Self> {
        Self::new(raw.lo, raw.hi)
    }
}

impl fmt::Display for MsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.lo, self.hi)
    }
}

impl FromStr for MsRange {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        let syntax = || HarnessError::RangeSyntax(s.to_string());
        let (lo, hi) = s.split_once("..").ok_or_else(syntax)?;
        let lo = lo.trim().parse().map_err(|_| syntax())?;
        let hi = hi.trim().parse().map_err(|_| syntax())?;
        Self::new(lo, hi)
    }
}

/// Inter-stall delay ranges seen across the page variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DelayPreset {
    /// 100..1000
    #[default]
    Wide,
    /// 300..1000
    Sparse,
    /// 100..800
    Moderate,
    /// 100..500
    Dense,
}

impl DelayPreset {
    pub fn range(self) -> MsRange {
        match self {
            DelayPreset::Wide => MsRange::preset(100, 1000),
            DelayPreset::Sparse => MsRange::preset(300, 1000),
            DelayPreset::Moderate => MsRange::preset(100, 800),
            DelayPreset::Dense => MsRange::preset(100, 500),
        }
    }
}

/// Stall length ranges seen across the page variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DurationPreset {
    /// 10..400
    #[default]
    Short,
    /// 10..410
    Standard,
    /// 51..451, every stall crosses the 50ms threshold
    OverThreshold,
}

impl DurationPreset {
    pub fn range(self) -> MsRange {
        match self {
            DurationPreset::Short => MsRange::preset(10, 400),
            DurationPreset::Standard => MsRange::preset(10, 410),
            DurationPreset::OverThreshold => MsRange::preset(51, 451),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StallConfig {
    pub delay: MsRange,
    pub duration: MsRange,
    /// Fixed seed for reproducible draws; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            delay: DelayPreset::default().range(),
            duration: DurationPreset::default().range(),
            seed: None,
        }
    }
}

/// Which page collaborators exist. Missing ones are skipped, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub event_log: bool,
    pub jank_button: bool,
    pub stop_button: bool,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            event_log: true,
            jank_button: true,
            stop_button: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub stall: StallConfig,
    /// Length of a manual "inject jank" click.
    pub jank_ms: u64,
    pub host: HostConfig,
    pub page: Page,
    pub duration_unit: DurationUnit,
    pub jank_on_start: bool,
    pub animate_on_start: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            stall: StallConfig::default(),
            jank_ms: 450,
            host: HostConfig::default(),
            page: Page::default(),
            duration_unit: DurationUnit::default(),
            jank_on_start: true,
            animate_on_start: true,
        }
    }
}

impl HarnessConfig {
    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.host.long_task_threshold = threshold;
        self
    }
}
