use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use jank_harness::clock::VirtualClock;
use jank_harness::controller::Trigger;
use jank_harness::reporter::DurationUnit;
use jank_harness::stall_scheduler::StallTask;
use jank_harness::{Harness, HarnessConfig, HarnessError, MsRange, Page, StallConfig, LONG_TASK};

fn virtual_harness(config: HarnessConfig) -> Harness {
    Harness::new(config, Rc::new(VirtualClock::new()))
}

fn quiet_config() -> HarnessConfig {
    HarnessConfig {
        jank_on_start: false,
        animate_on_start: false,
        ..HarnessConfig::default()
    }
}

/// (start, duration) parsed back out of a log line.
fn parse_line(line: &str) -> (f64, f64) {
    let rest = line.strip_prefix("long task! start: ").expect("line prefix");
    let (start, rest) = rest.split_once(", duration: ").expect("duration field");
    let (duration, name) = rest.split_once("ms, name: ").expect("name field");
    assert_eq!(name, "self");
    (start.parse().unwrap(), duration.parse().unwrap())
}

#[test]
fn random_stalls_over_threshold_each_produce_one_line() {
    let config = HarnessConfig {
        stall: StallConfig {
            delay: MsRange::new(100, 500).unwrap(),
            duration: MsRange::new(10, 400).unwrap(),
            seed: Some(2024),
        },
        animate_on_start: false,
        ..HarnessConfig::default()
    };
    let mut harness = virtual_harness(config);

    let stalls: Rc<RefCell<Vec<StallTask>>> = Rc::new(RefCell::new(Vec::new()));
    let s = stalls.clone();
    harness
        .controller()
        .scheduler()
        .set_listener(move |task| s.borrow_mut().push(task));

    harness.start();
    harness.run_for(Duration::from_millis(5000));
    harness.controller_mut().stop_jank();
    // Let the last batch be delivered.
    harness.run_for(Duration::from_millis(50));

    let long: Vec<u64> = stalls
        .borrow()
        .iter()
        .map(|t| t.duration_ms)
        .filter(|d| *d >= 50)
        .collect();
    assert!(!long.is_empty());

    let lines = harness.log_lines();
    assert_eq!(lines.len(), long.len());

    // Oldest line is last; walk them back in stall order.
    let parsed: Vec<(f64, f64)> = lines.iter().rev().map(|l| parse_line(l)).collect();
    for ((_, duration), drawn) in parsed.iter().zip(&long) {
        let drawn = *drawn as f64;
        assert!(*duration >= drawn && *duration < drawn + 1.0, "{duration} vs {drawn}");
    }
    for pair in parsed.windows(2) {
        assert!(pair[0].0 < pair[1].0, "start times out of order");
    }
    assert_eq!(harness.host().long_tasks_detected() as usize, long.len());
    harness.shutdown();
}

#[test]
fn injected_jank_is_reported_once() {
    let mut harness = virtual_harness(HarnessConfig {
        animate_on_start: true,
        ..quiet_config()
    });
    harness.start();
    harness.run_for(Duration::from_millis(100));

    assert!(harness.controller().click(Trigger::InjectJank));
    harness.run_for(Duration::from_millis(1000));

    let lines = harness.log_lines();
    assert_eq!(lines.len(), 1, "{lines:?}");
    let (_, duration) = parse_line(&lines[0]);
    assert!((450.0..451.0).contains(&duration), "duration {duration}");
    assert_eq!(harness.host().long_tasks_detected(), 1);
    harness.shutdown();
}

#[test]
fn longer_jank_variant() {
    let mut harness = virtual_harness(HarnessConfig {
        jank_ms: 750,
        ..quiet_config()
    });
    harness.start();
    harness.controller().click(Trigger::InjectJank);
    harness.run_for(Duration::from_millis(1000));

    let lines = harness.log_lines();
    assert_eq!(lines.len(), 1);
    let (_, duration) = parse_line(&lines[0]);
    assert!((750.0..751.0).contains(&duration));
}

#[test]
fn later_batches_go_on_top() {
    let mut harness = virtual_harness(quiet_config());
    harness.start();
    harness.controller().click(Trigger::InjectJank);
    harness.run_for(Duration::from_millis(600));
    harness.controller().click(Trigger::InjectJank);
    harness.run_for(Duration::from_millis(600));

    let lines = harness.log_lines();
    assert_eq!(lines.len(), 2);
    let (newest, _) = parse_line(&lines[0]);
    let (oldest, _) = parse_line(&lines[1]);
    assert!(newest > oldest);

    let markup = harness.log_markup().unwrap();
    assert_eq!(markup, format!("{}<br>{}<br>", lines[0], lines[1]));
}

#[test]
fn stop_animating_trigger_halts_the_pulse() {
    let mut harness = virtual_harness(HarnessConfig {
        animate_on_start: true,
        ..quiet_config()
    });
    harness.start();
    harness.run_for(Duration::from_millis(200));
    assert!(harness.body().div_count() > 0);

    assert!(harness.controller().click(Trigger::StopAnimating));
    harness.run_for(Duration::from_millis(20));
    let frozen = harness.body().div_count();
    harness.run_for(Duration::from_millis(500));

    assert_eq!(harness.body().div_count(), frozen);
    assert!(!harness.controller().pulse().is_active());
    assert_eq!(harness.host().pending_frame_callbacks(), 0);
}

#[test]
fn animation_starves_during_injected_jank() {
    let mut harness = virtual_harness(HarnessConfig {
        animate_on_start: true,
        ..quiet_config()
    });
    harness.start();
    harness.run_for(Duration::from_millis(100));
    harness.controller().click(Trigger::InjectJank);
    harness.run_for(Duration::from_millis(600));

    let gap = harness.body().longest_gap().unwrap();
    assert!(gap >= 450.0, "longest frame gap {gap}");
}

#[test]
fn missing_capability_leaves_jank_and_animation_running() {
    let mut config = HarnessConfig {
        stall: StallConfig {
            seed: Some(9),
            ..StallConfig::default()
        },
        ..HarnessConfig::default()
    };
    config.host.supports_long_tasks = false;
    let mut harness = virtual_harness(config);

    let fired = Rc::new(RefCell::new(0u32));
    let f = fired.clone();
    harness
        .controller()
        .scheduler()
        .set_listener(move |_| *f.borrow_mut() += 1);

    harness.start();
    assert_eq!(
        harness.controller().observer_error(),
        Some(&HarnessError::UnsupportedEntryType(LONG_TASK.to_string()))
    );
    harness.run_for(Duration::from_secs(3));

    assert!(*fired.borrow() > 0);
    assert!(harness.body().div_count() > 0);
    assert!(harness.log_lines().is_empty());
    assert!(!harness.controller().observer().is_active());
}

#[test]
fn page_init_runs_once() {
    let mut config = quiet_config();
    config.host.supports_long_tasks = false;
    let mut harness = virtual_harness(config);
    harness.start();
    harness.controller_mut().init();
    assert_eq!(
        harness.controller().observer_error(),
        Some(&HarnessError::UnsupportedEntryType(LONG_TASK.to_string()))
    );
    assert!(!harness.controller().observer().is_active());

    let mut harness = virtual_harness(quiet_config());
    harness.start();
    assert!(harness.controller().observer().is_active());
    harness.controller_mut().stop_observing();
    harness.controller_mut().init();
    assert!(!harness.controller().observer().is_active());
    assert!(harness.controller().observer_error().is_none());
}

#[test]
fn dropping_a_running_harness_frees_the_host() {
    let mut harness = virtual_harness(HarnessConfig {
        stall: StallConfig {
            seed: Some(5),
            ..StallConfig::default()
        },
        ..HarnessConfig::default()
    });
    harness.start();
    harness.controller().click_after(Trigger::StopAnimating, Duration::from_secs(60));
    let clicks = harness
        .controller()
        .click_every(Trigger::InjectJank, Duration::from_secs(30));
    harness.run_for(Duration::from_secs(2));

    let host = harness.host().downgrade();
    drop(clicks);
    drop(harness);
    assert!(host.upgrade().is_none());
}

#[test]
fn explicit_shutdown_then_drop() {
    let mut harness = virtual_harness(quiet_config());
    harness.start();
    harness.controller().click(Trigger::InjectJank);
    harness.shutdown();
    assert_eq!(harness.host().pending_timers(), 0);
    let host = harness.host().downgrade();
    drop(harness);
    assert!(host.upgrade().is_none());
}

#[test]
fn missing_page_elements_are_skipped() {
    let mut harness = virtual_harness(HarnessConfig {
        page: Page {
            event_log: false,
            jank_button: false,
            stop_button: false,
        },
        ..quiet_config()
    });
    harness.start();

    assert!(!harness.controller().click(Trigger::InjectJank));
    assert!(!harness.controller().click(Trigger::StopAnimating));
    assert!(harness
        .controller()
        .click_every(Trigger::InjectJank, Duration::from_millis(100))
        .is_none());

    // Stalls from elsewhere are still observed; there's just nowhere to show them.
    let host = harness.host().clone();
    harness.host().post_task(move || {
        jank_harness::busy_wait::busy_wait(host.clock(), 120.0);
    });
    harness.run_for(Duration::from_millis(300));
    assert_eq!(harness.host().long_tasks_detected(), 1);
    assert!(harness.log_lines().is_empty());
    assert!(harness.log_markup().is_none());
}

#[test]
fn periodic_injection_reports_every_click() {
    let mut harness = virtual_harness(HarnessConfig {
        jank_ms: 100,
        ..quiet_config()
    });
    harness.start();
    let clicks = harness
        .controller()
        .click_every(Trigger::InjectJank, Duration::from_millis(400))
        .unwrap();
    // Clicks at ~400, ~900, ~1400; each jank adds 100ms to the cycle.
    harness.run_for(Duration::from_millis(1700));
    drop(clicks);
    harness.run_for(Duration::from_millis(1000));

    assert_eq!(harness.log_lines().len(), 3);
}

#[test]
fn stopped_observer_reports_nothing_more() {
    let mut harness = virtual_harness(quiet_config());
    harness.start();
    harness.controller().click(Trigger::InjectJank);
    harness.run_for(Duration::from_millis(600));
    assert_eq!(harness.log_lines().len(), 1);

    harness.controller_mut().stop_observing();
    harness.controller().click(Trigger::InjectJank);
    harness.run_for(Duration::from_millis(600));
    assert_eq!(harness.log_lines().len(), 1);
    assert_eq!(harness.host().long_tasks_detected(), 2);
}

#[test]
fn legacy_unit_scales_logged_duration() {
    let mut harness = virtual_harness(HarnessConfig {
        duration_unit: DurationUnit::LegacySeconds,
        ..quiet_config()
    });
    harness.start();
    harness.controller().click(Trigger::InjectJank);
    harness.run_for(Duration::from_millis(600));

    let (_, duration) = parse_line(&harness.log_lines()[0]);
    assert!((0.45..0.451).contains(&duration));
}
