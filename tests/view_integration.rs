//! Integration tests for the render loop and view policy
//!
//! - Bounds produced by each view mode
//! - Manual mode freezing while samples keep arriving
//! - Clear being rejected during a run
//! - A start that fails leaving the previous trend in place

mod common;

use common::mock_helpers::{constant_meter, unconfigurable_meter};
use common::{assert_float_eq, test_timeout};
use meterlog::acquisition::SampleQueue;
use meterlog::config::{AcquisitionConfig, AppConfig, OutputConfig, ViewConfig};
use meterlog::error::MeterLogError;
use meterlog::render::{RenderFrame, RenderLoop, Renderer};
use meterlog::session::Session;
use meterlog::types::{RunState, Sample};
use meterlog::view::{autoscale_bounds, scroll_bounds, ViewBounds, ViewMode};
use proptest::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

#[derive(Default)]
struct FrameLog {
    bounds: Vec<ViewBounds>,
    lengths: Vec<usize>,
}

impl Renderer for FrameLog {
    fn redraw(&mut self, frame: &RenderFrame<'_>) {
        self.bounds.push(frame.bounds);
        self.lengths.push(frame.samples.len());
    }
}

fn render_loop() -> (RenderLoop, SampleQueue) {
    let queue = SampleQueue::new();
    let render = RenderLoop::new(queue.clone(), &ViewConfig::default());
    (render, queue)
}

#[test]
fn test_scroll_window_follows_latest() {
    let samples: Vec<Sample> = (0..=5)
        .map(|i| Sample::new(i as f64 * 5.0, i as f64))
        .collect();
    let bounds = scroll_bounds(&samples, 10.0);
    assert_eq!(bounds.t_min, 15.0);
    assert_eq!(bounds.t_max, 25.0);
}

#[test]
fn test_manual_mode_freezes_mid_run() {
    let (mut render, queue) = render_loop();
    let mut frames = FrameLog::default();
    render.begin_run(&AcquisitionConfig::new(100, 0));

    let sender = queue.sender();
    for (t, v) in [(0.0, 1.0), (4.0, 5.0), (8.0, 3.0), (12.0, 9.0)] {
        sender.send(Sample::new(t, v)).unwrap();
    }
    render.tick(RunState::Running, &mut frames);

    render.set_mode(ViewMode::Manual).unwrap();
    let frozen = render.policy().bounds();
    assert_eq!(frozen.t_min, 0.0);
    assert_eq!(frozen.t_max, 12.0);
    assert_float_eq(frozen.v_min, 1.0 - 0.4, 1e-12);
    assert_float_eq(frozen.v_max, 9.0 + 0.4, 1e-12);

    for i in 13..20 {
        sender.send(Sample::new(i as f64, 100.0 + i as f64)).unwrap();
        render.tick(RunState::Running, &mut frames);
    }

    assert!(frames.bounds.iter().skip(1).all(|b| *b == frozen));
    assert_eq!(frames.lengths.last(), Some(&11));
}

#[test]
fn test_clear_rejected_while_running() {
    let (mut render, queue) = render_loop();
    let mut frames = FrameLog::default();
    queue.sender().send(Sample::new(0.0, 1.0)).unwrap();
    render.tick(RunState::Running, &mut frames);

    assert!(matches!(
        render.clear(RunState::Running),
        Err(MeterLogError::RunActive)
    ));
    assert_eq!(render.trend().len(), 1);

    render.clear(RunState::Idle).unwrap();
    assert!(render.trend().is_empty());
}

#[test]
fn test_overflow_drops_newest() {
    let (mut render, queue) = render_loop();
    let mut frames = FrameLog::default();
    render.begin_run(&AcquisitionConfig::new(100, 3));

    let sender = queue.sender();
    for i in 0..5 {
        sender.send(Sample::new(i as f64, i as f64)).unwrap();
    }
    assert_eq!(render.tick(RunState::Stopping, &mut frames), 5);

    let kept: Vec<f64> = render.trend().samples().iter().map(|s| s.elapsed).collect();
    assert_eq!(kept, vec![0.0, 1.0, 2.0]);
}

#[test]
fn test_new_run_resets_trend() {
    let (mut render, queue) = render_loop();
    let mut frames = FrameLog::default();
    queue.sender().send(Sample::new(0.0, 1.0)).unwrap();
    render.tick(RunState::Running, &mut frames);
    render.tick(RunState::Idle, &mut frames);
    assert!(render.manual_save_available());

    render.begin_run(&AcquisitionConfig::new(100, 0));
    assert!(render.trend().is_empty());
    assert!(!render.manual_save_available());
}

proptest! {
    #[test]
    fn prop_autoscale_contains_all_values(
        values in prop::collection::vec(-1.0e6f64..1.0e6, 1..200)
    ) {
        let samples: Vec<Sample> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(i as f64 * 0.1, *v))
            .collect();
        let bounds = autoscale_bounds(&samples);

        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(bounds.v_min <= min);
        prop_assert!(bounds.v_max >= max);
        prop_assert!(bounds.is_valid());
        for sample in &samples {
            prop_assert!(bounds.contains(sample));
        }
    }

    #[test]
    fn prop_scroll_window_width(
        count in 1usize..100,
        step in 0.05f64..2.0,
        window in 0.5f64..20.0,
    ) {
        let samples: Vec<Sample> = (0..count)
            .map(|i| Sample::new(i as f64 * step, (i % 7) as f64))
            .collect();
        let bounds = scroll_bounds(&samples, window);
        let last = samples[count - 1].elapsed;

        prop_assert!(bounds.t_max >= last);
        prop_assert!(bounds.t_min >= last - window - 1e-9);
        prop_assert!(bounds.is_valid());
    }
}

#[test]
#[serial]
fn test_failed_start_keeps_previous_trend() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig {
        acquisition: AcquisitionConfig::new(50, 3),
        output: OutputConfig::new(dir.path()),
        ..AppConfig::default()
    };
    let mut session = Session::new(config, Box::new(constant_meter(2.0))).unwrap();
    let mut frames = FrameLog::default();

    session.start().unwrap();
    let deadline = std::time::Instant::now() + test_timeout();
    while !(session.state().is_idle() && !session.is_finalizing()) {
        session.tick(&mut frames);
        assert!(std::time::Instant::now() < deadline, "run did not settle");
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    session.tick(&mut frames);
    assert_eq!(session.render().trend().len(), 3);
    assert!(session.render().manual_save_available());

    session
        .replace_device(Box::new(unconfigurable_meter()))
        .unwrap();
    assert!(matches!(
        session.start(),
        Err(MeterLogError::Measurement(_))
    ));

    assert_eq!(session.state(), RunState::Idle);
    assert_eq!(session.render().trend().len(), 3);
    assert!(session.render().manual_save_available());
}
