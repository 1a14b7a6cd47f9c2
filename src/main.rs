use std::error::Error;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::{signal, task};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jank_harness::clock::{Clock, MonotonicClock, VirtualClock};
use jank_harness::controller::Trigger;
use jank_harness::reporter::DurationUnit;
use jank_harness::{DelayPreset, DurationPreset, Harness, HarnessConfig, MsRange, Page};

/// Generate synthetic main-thread jank and log every long task it causes.
#[derive(Debug, Parser)]
#[command(name = "jank-harness", version)]
struct Args {
    /// Seconds to run; 0 runs until Ctrl-C
    #[arg(short, long, default_value_t = 10)]
    duration: u64,

    #[arg(long, value_enum, default_value_t = DelayPreset::Wide)]
    delay_preset: DelayPreset,

    #[arg(long, value_enum, default_value_t = DurationPreset::Short)]
    stall_preset: DurationPreset,

    /// Delay range LO..HI in ms, overrides --delay-preset
    #[arg(long)]
    delay: Option<MsRange>,

    /// Stall length range LO..HI in ms, overrides --stall-preset
    #[arg(long)]
    stall: Option<MsRange>,

    /// Length of one injected jank, ms
    #[arg(long, default_value_t = 450)]
    jank_ms: u64,

    /// Click "inject jank" every N ms
    #[arg(long)]
    inject_every: Option<u64>,

    /// Click "stop animating" after N ms
    #[arg(long)]
    stop_animation_after: Option<u64>,

    /// Don't start the random stall generator
    #[arg(long)]
    no_jank: bool,

    #[arg(long)]
    no_animation: bool,

    /// Leave the event log off the page (reports are still logged)
    #[arg(long)]
    no_event_log: bool,

    #[arg(long, default_value_t = 50)]
    threshold_ms: u64,

    #[arg(long, default_value_t = 60)]
    fps: u32,

    #[arg(long, default_value = "self")]
    attribution: String,

    /// Pretend the host cannot report long tasks
    #[arg(long)]
    no_longtask_support: bool,

    #[arg(long, value_enum, default_value_t = DurationUnit::Milliseconds)]
    unit: DurationUnit,

    #[arg(long)]
    seed: Option<u64>,

    /// Simulated time instead of the wall clock
    #[arg(long)]
    virtual_clock: bool,

    /// Used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the resolved config as JSON and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn to_config(&self) -> Result<HarnessConfig, Box<dyn Error>> {
        if self.fps == 0 {
            return Err("--fps must be at least 1".into());
        }
        let mut config = HarnessConfig::default()
            .with_threshold(Duration::from_millis(self.threshold_ms));
        config.stall.delay = self.delay.unwrap_or_else(|| self.delay_preset.range());
        config.stall.duration = self.stall.unwrap_or_else(|| self.stall_preset.range());
        config.stall.seed = self.seed;
        config.jank_ms = self.jank_ms;
        config.host.frame_interval = Duration::from_secs(1) / self.fps;
        config.host.attribution = self.attribution.clone();
        config.host.supports_long_tasks = !self.no_longtask_support;
        config.page = Page {
            event_log: !self.no_event_log,
            ..Page::default()
        };
        config.duration_unit = self.unit;
        config.jank_on_start = !self.no_jank;
        config.animate_on_start = !self.no_animation;
        Ok(config)
    }
}

struct RunPlan {
    span: Option<Duration>,
    virtual_clock: bool,
    inject_every: Option<Duration>,
    stop_animation_after: Option<Duration>,
}

fn run_harness(config: HarnessConfig, plan: RunPlan, stop: &AtomicBool) -> Vec<String> {
    let clock: Rc<dyn Clock> = if plan.virtual_clock {
        Rc::new(VirtualClock::new())
    } else {
        Rc::new(MonotonicClock::new())
    };

    let mut harness = Harness::new(config, clock);
    harness.start();

    let _clicks = plan.inject_every.and_then(|period| {
        let clicks = harness.controller().click_every(Trigger::InjectJank, period);
        if clicks.is_none() {
            warn!("--inject-every given but the page has no jank trigger");
        }
        clicks
    });
    if let Some(after) = plan.stop_animation_after {
        if !harness.controller().click_after(Trigger::StopAnimating, after) {
            warn!("--stop-animation-after given but the page has no stop trigger");
        }
    }

    harness.run_until(plan.span, stop);
    let lines = harness.log_lines();
    harness.shutdown();
    lines
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = args.to_config()?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let span = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    if args.virtual_clock && span.is_none() {
        return Err("--virtual-clock needs a non-zero --duration".into());
    }
    if span.is_none() {
        info!("running until Ctrl-C");
    }

    let plan = RunPlan {
        span,
        virtual_clock: args.virtual_clock,
        inject_every: args.inject_every.map(Duration::from_millis),
        stop_animation_after: args.stop_animation_after.map(Duration::from_millis),
    };

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let ctrl_c = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
            stop_flag.store(true, Ordering::SeqCst);
        }
    });

    // The host is single-threaded and not Send; it lives on a blocking thread.
    let lines = task::spawn_blocking(move || run_harness(config, plan, &stop)).await?;
    ctrl_c.abort();

    println!("{} long task(s) logged", lines.len());
    for line in lines {
        println!("{line}");
    }
    Ok(())
}
