//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod mock_helpers;

use std::time::{Duration, Instant};

use meterlog::acquisition::{RunController, RunEvent};

/// Generous upper bound for a short run to settle
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Poll until `done` holds for the collected events, or panic after the timeout
pub fn poll_until<F>(controller: &mut RunController, mut done: F) -> Vec<RunEvent>
where
    F: FnMut(&RunController, &[RunEvent]) -> bool,
{
    let deadline = Instant::now() + test_timeout();
    let mut events = Vec::new();
    loop {
        events.extend(controller.poll());
        if done(controller, &events) {
            return events;
        }
        assert!(
            Instant::now() < deadline,
            "timed out, events so far: {:?}",
            events
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// The report path of the first `Finalized` event
pub fn finalized_report(events: &[RunEvent]) -> Option<std::path::PathBuf> {
    events.iter().find_map(|event| match event {
        RunEvent::Finalized { report, .. } => Some(report.clone()),
        _ => None,
    })
}
