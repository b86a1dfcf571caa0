//! Sampler thread
//!
//! The sampler owns the device for the duration of one run. Each loop
//! iteration takes one reading, writes it to the durable buffer, pushes it
//! onto the sample queue and then sleeps for what is left of the interval.
//!
//! # Pacing
//!
//! The sleep only compensates for the time spent in the current iteration.
//! Drift accumulated over earlier iterations is not corrected, so a long run
//! at 100 ms will end slightly later than `n * 100 ms`.
//!
//! # Failure Handling
//!
//! - A failed reading is recorded as NaN and the loop continues
//! - The first failed durable write is reported once through
//!   [`SamplerEvent::PersistenceDegraded`]; the run continues without persistence
//! - A closed sample queue is ignored, the durable buffer remains the record

use super::queue::SampleSender;
use crate::config::AcquisitionConfig;
use crate::device::Device;
use crate::storage::{AppendStatus, DurableBuffer};
use crate::types::Sample;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Longest single sleep, bounds how long a stop request goes unnoticed
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Messages from the sampler to the run controller
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerEvent {
    /// The durable buffer failed and persistence is off for this run
    PersistenceDegraded(String),
    /// `max_points` samples were captured
    LimitReached { samples: usize },
    /// The loop has exited and the device is about to be handed back
    Exited { samples: usize },
}

/// Everything a sampler needs for one run
pub struct RunContext {
    pub config: AcquisitionConfig,
    pub queue: SampleSender,
    /// `None` when the run is not persisted or the buffer could not be opened
    pub buffer: Option<Arc<DurableBuffer>>,
    /// Cleared to stop the run
    pub running: Arc<AtomicBool>,
    pub events: Sender<SamplerEvent>,
}

/// Handle to a running sampler thread
pub struct SamplerHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<Box<dyn Device>>,
}

impl SamplerHandle {
    /// Ask the sampler to exit at its next loop boundary
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the thread and take the device back
    ///
    /// Returns `None` if the sampler thread panicked.
    pub fn join(self) -> Option<Box<dyn Device>> {
        self.stop();
        match self.thread.join() {
            Ok(device) => Some(device),
            Err(_) => {
                tracing::error!("Sampler thread panicked, device lost");
                None
            }
        }
    }
}

/// The sampling loop
pub struct Sampler {
    ctx: RunContext,
    device: Box<dyn Device>,
    run_start: Instant,
    emitted: usize,
}

impl Sampler {
    pub fn new(ctx: RunContext, device: Box<dyn Device>) -> Self {
        Self {
            ctx,
            device,
            run_start: Instant::now(),
            emitted: 0,
        }
    }

    /// Start the loop on its own thread
    pub fn spawn(ctx: RunContext, device: Box<dyn Device>) -> std::io::Result<SamplerHandle> {
        let running = ctx.running.clone();
        running.store(true, Ordering::SeqCst);

        let thread = std::thread::Builder::new()
            .name("meterlog-sampler".to_string())
            .spawn(move || Sampler::new(ctx, device).run())?;

        Ok(SamplerHandle { running, thread })
    }

    /// Run until stopped or the point limit is reached, then return the device
    pub fn run(mut self) -> Box<dyn Device> {
        tracing::info!(
            "Sampler started: interval {} ms, limit {:?}, persist {}",
            self.ctx.config.interval_ms,
            self.ctx.config.limit(),
            self.ctx.buffer.is_some()
        );
        self.run_start = Instant::now();

        while self.ctx.running.load(Ordering::SeqCst) {
            let t_start = Instant::now();

            let sample = self.take_sample();
            self.persist(&sample);
            if self.ctx.queue.send(sample).is_err() {
                tracing::trace!("Sample queue closed, sample {} only on disk", self.emitted + 1);
            }
            self.emitted += 1;

            if let Some(limit) = self.ctx.config.limit() {
                if self.emitted >= limit {
                    self.ctx.running.store(false, Ordering::SeqCst);
                    tracing::info!("Point limit of {} reached", limit);
                    let _ = self.ctx.events.send(SamplerEvent::LimitReached {
                        samples: self.emitted,
                    });
                    break;
                }
            }

            self.pace(t_start);
        }

        tracing::info!("Sampler stopped after {} samples", self.emitted);
        let _ = self.ctx.events.send(SamplerEvent::Exited {
            samples: self.emitted,
        });
        self.device
    }

    fn take_sample(&mut self) -> Sample {
        let value = match self.device.measure() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Reading {} failed, recording NaN: {}", self.emitted + 1, e);
                f64::NAN
            }
        };
        Sample::new(self.run_start.elapsed().as_secs_f64(), value)
    }

    fn persist(&mut self, sample: &Sample) {
        let Some(buffer) = &self.ctx.buffer else {
            return;
        };

        match buffer.append(sample) {
            Ok(AppendStatus::Written(index)) => {
                tracing::trace!("Row {}: {:.4} s = {}", index, sample.elapsed, sample.value);
            }
            Ok(AppendStatus::Degraded) | Ok(AppendStatus::Closed) => {}
            Err(e) => {
                tracing::warn!("Durable buffer failed, continuing without persistence: {}", e);
                let _ = self
                    .ctx
                    .events
                    .send(SamplerEvent::PersistenceDegraded(e.to_string()));
            }
        }
    }

    /// Sleep for what is left of the interval, waking early on stop
    fn pace(&self, t_start: Instant) {
        let deadline = t_start + self.ctx.config.interval();
        loop {
            let now = Instant::now();
            if now >= deadline || !self.ctx.running.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;
    use crossbeam_channel::{unbounded, Receiver};

    fn context(
        config: AcquisitionConfig,
    ) -> (RunContext, Receiver<Sample>, Receiver<SamplerEvent>) {
        let (queue_tx, queue_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let ctx = RunContext {
            config,
            queue: queue_tx,
            buffer: None,
            running: Arc::new(AtomicBool::new(true)),
            events: event_tx,
        };
        (ctx, queue_rx, event_rx)
    }

    #[test]
    fn test_limit_stops_loop() {
        let (ctx, queue_rx, event_rx) = context(AcquisitionConfig::new(50, 3));
        let device = Sampler::new(ctx, Box::new(SimulatedDevice::with_seed(1))).run();
        assert!(device.is_simulated());

        let samples: Vec<Sample> = queue_rx.try_iter().collect();
        assert_eq!(samples.len(), 3);
        assert!(samples.windows(2).all(|w| w[0].elapsed <= w[1].elapsed));

        let events: Vec<SamplerEvent> = event_rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                SamplerEvent::LimitReached { samples: 3 },
                SamplerEvent::Exited { samples: 3 }
            ]
        );
    }

    #[test]
    fn test_failed_buffer_degrades_once_and_keeps_sampling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        std::fs::write(&path, "").unwrap();

        let (mut ctx, queue_rx, event_rx) = context(AcquisitionConfig::new(50, 4));
        let buffer = Arc::new(DurableBuffer::read_only(&path).unwrap());
        ctx.buffer = Some(buffer.clone());
        Sampler::new(ctx, Box::new(SimulatedDevice::with_seed(3))).run();

        assert_eq!(queue_rx.try_iter().count(), 4);
        assert!(buffer.is_degraded());

        let events: Vec<SamplerEvent> = event_rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], SamplerEvent::PersistenceDegraded(_)));
        assert_eq!(events[1], SamplerEvent::LimitReached { samples: 4 });
        assert_eq!(events[2], SamplerEvent::Exited { samples: 4 });
    }

    #[test]
    fn test_cleared_flag_exits_immediately() {
        let (ctx, queue_rx, event_rx) = context(AcquisitionConfig::new(50, 0));
        ctx.running.store(false, Ordering::SeqCst);
        Sampler::new(ctx, Box::new(SimulatedDevice::new())).run();

        assert_eq!(queue_rx.try_iter().count(), 0);
        assert_eq!(
            event_rx.try_iter().collect::<Vec<_>>(),
            vec![SamplerEvent::Exited { samples: 0 }]
        );
    }

    #[test]
    fn test_spawn_and_stop() {
        let (ctx, queue_rx, _event_rx) = context(AcquisitionConfig::new(50, 0));
        let handle = Sampler::spawn(ctx, Box::new(SimulatedDevice::new())).unwrap();
        std::thread::sleep(Duration::from_millis(120));
        handle.stop();
        let device = handle.join();
        assert!(device.is_some());
        assert!(queue_rx.try_iter().count() >= 1);
    }
}
