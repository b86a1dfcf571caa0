//! Mock construction helpers

use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use mockall::mock;

use meterlog::acquisition::{RunController, SampleQueue};
use meterlog::config::{OutputConfig, ReportOptions};
use meterlog::device::{Device, DeviceParams};
use meterlog::error::{DeviceError, MeterLogError, Result};
use meterlog::report::{JsonWorkbookWriter, ReportWriter, Workbook};

mock! {
    pub Meter {}

    impl Device for Meter {
        fn connect(&mut self) -> std::result::Result<(), DeviceError>;
        fn disconnect(&mut self);
        fn is_connected(&self) -> bool;
        fn configure(&mut self, params: &DeviceParams) -> std::result::Result<(), DeviceError>;
        fn measure(&mut self) -> std::result::Result<f64, DeviceError>;
        fn is_simulated(&self) -> bool;
        fn identity(&self) -> String;
    }
}

fn connected_meter() -> MockMeter {
    let mut meter = MockMeter::new();
    meter.expect_connect().returning(|| Ok(()));
    meter.expect_disconnect().return_const(());
    meter.expect_is_connected().return_const(true);
    meter.expect_is_simulated().return_const(false);
    meter
        .expect_identity()
        .return_const("HEWLETT-PACKARD,34401A,0,11-5-2".to_string());
    meter
}

/// A meter with every call stubbed except `measure`
pub fn base_meter() -> MockMeter {
    let mut meter = connected_meter();
    meter.expect_configure().returning(|_| Ok(()));
    meter
}

/// A meter that rejects every measurement setup and is never read
pub fn unconfigurable_meter() -> MockMeter {
    let mut meter = connected_meter();
    meter
        .expect_configure()
        .returning(|_| Err(DeviceError::Unsupported("range".to_string())));
    meter.expect_measure().never();
    meter
}

/// A meter returning `readings` in order, then zeros
pub fn scripted_meter(readings: Vec<std::result::Result<f64, DeviceError>>) -> MockMeter {
    let mut meter = base_meter();
    let mut readings = readings.into_iter();
    meter
        .expect_measure()
        .returning(move || readings.next().unwrap_or(Ok(0.0)));
    meter
}

/// A meter that always reads `value`
pub fn constant_meter(value: f64) -> MockMeter {
    let mut meter = base_meter();
    meter.expect_measure().returning(move || Ok(value));
    meter
}

/// Controller writing JSON reports into `directory`
pub fn controller_in(directory: &Path, device: Box<dyn Device>) -> (RunController, SampleQueue) {
    controller_with_writer(directory, device, Arc::new(JsonWorkbookWriter::new()))
}

pub fn controller_with_writer(
    directory: &Path,
    device: Box<dyn Device>,
    writer: Arc<dyn ReportWriter>,
) -> (RunController, SampleQueue) {
    let queue = SampleQueue::new();
    let controller = RunController::new(
        device,
        queue.sender(),
        &OutputConfig::new(directory),
        ReportOptions::default(),
        writer,
    );
    (controller, queue)
}

/// Writer that always fails
pub struct FailingWriter;

impl ReportWriter for FailingWriter {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn write(&self, _workbook: &Workbook, _path: &Path) -> Result<()> {
        Err(MeterLogError::Finalization("disk full".to_string()))
    }
}

/// JSON writer that waits for a go signal before writing
pub struct GatedWriter {
    inner: JsonWorkbookWriter,
    gate: Receiver<()>,
}

impl GatedWriter {
    /// The writer and the sender that releases one write per message
    pub fn new() -> (Self, Sender<()>) {
        let (tx, rx) = bounded(4);
        (
            Self {
                inner: JsonWorkbookWriter::new(),
                gate: rx,
            },
            tx,
        )
    }
}

impl ReportWriter for GatedWriter {
    fn extension(&self) -> &'static str {
        self.inner.extension()
    }

    fn write(&self, workbook: &Workbook, path: &Path) -> Result<()> {
        self.gate
            .recv()
            .map_err(|_| MeterLogError::Finalization("gate closed".to_string()))?;
        self.inner.write(workbook, path)
    }
}
