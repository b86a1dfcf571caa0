//! Device port for bench multimeters
//!
//! This module provides the interface the sampler uses to talk to an
//! instrument, plus the two implementations shipped with meterlog:
//!
//! - [`ScpiDevice`] - HP/Agilent 34401A (and 34410A) over a SCPI line transport
//! - [`SimulatedDevice`] - Plausible noisy readings when no instrument is attached
//!
//! # Simulation Fallback
//!
//! [`open_device`] tries the configured resource first and falls back to the
//! simulator when the resource is `SIMULATION`, empty, or fails to connect.
//! The rest of the application never needs to know which one it got, except
//! through [`Device::is_simulated`] for display purposes.
//!
//! # Errors
//!
//! Every device call reports a [`DeviceError`]. During a run the sampler
//! records a failed [`Device::measure`] as NaN and keeps going.

pub mod scpi;
pub mod simulated;

pub use scpi::{parse_range, ScpiDevice, ScpiTransport, TcpTransport};
pub use simulated::SimulatedDevice;

use crate::error::DeviceError;
use crossbeam_channel::{bounded, Receiver};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resource string that selects the simulator
pub const SIMULATION_RESOURCE: &str = "SIMULATION";

/// I/O timeout for instrument connections
pub const DEVICE_TIMEOUT: Duration = Duration::from_secs(5);

/// Unified interface for measurement instruments
///
/// Implementations must be `Send` so the device can move into the sampler
/// thread for the duration of a run.
pub trait Device: Send {
    /// Open the connection and reset the instrument
    fn connect(&mut self) -> Result<(), DeviceError>;

    /// Return the instrument to local control and close the connection
    fn disconnect(&mut self);

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Apply a measurement setup
    fn configure(&mut self, params: &DeviceParams) -> Result<(), DeviceError>;

    /// Take a single reading
    fn measure(&mut self) -> Result<f64, DeviceError>;

    /// Whether readings are simulated
    fn is_simulated(&self) -> bool {
        false
    }

    /// Human readable identification
    fn identity(&self) -> String;
}

/// Measurement functions of the 34401A
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MeasurementFunction {
    #[default]
    DcVoltage,
    AcVoltage,
    DcCurrent,
    AcCurrent,
    Resistance2W,
    Resistance4W,
    Frequency,
    Period,
    Continuity,
    Diode,
}

impl MeasurementFunction {
    /// All functions in menu order
    pub const ALL: [MeasurementFunction; 10] = [
        MeasurementFunction::DcVoltage,
        MeasurementFunction::AcVoltage,
        MeasurementFunction::DcCurrent,
        MeasurementFunction::AcCurrent,
        MeasurementFunction::Resistance2W,
        MeasurementFunction::Resistance4W,
        MeasurementFunction::Frequency,
        MeasurementFunction::Period,
        MeasurementFunction::Continuity,
        MeasurementFunction::Diode,
    ];

    /// SCPI function mnemonic
    pub fn scpi(&self) -> &'static str {
        match self {
            MeasurementFunction::DcVoltage => "VOLT:DC",
            MeasurementFunction::AcVoltage => "VOLT:AC",
            MeasurementFunction::DcCurrent => "CURR:DC",
            MeasurementFunction::AcCurrent => "CURR:AC",
            MeasurementFunction::Resistance2W => "RES",
            MeasurementFunction::Resistance4W => "FRES",
            MeasurementFunction::Frequency => "FREQ",
            MeasurementFunction::Period => "PER",
            MeasurementFunction::Continuity => "CONT",
            MeasurementFunction::Diode => "DIOD",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MeasurementFunction::DcVoltage
            | MeasurementFunction::AcVoltage
            | MeasurementFunction::Diode => "V",
            MeasurementFunction::DcCurrent | MeasurementFunction::AcCurrent => "A",
            MeasurementFunction::Resistance2W
            | MeasurementFunction::Resistance4W
            | MeasurementFunction::Continuity => "Ω",
            MeasurementFunction::Frequency => "Hz",
            MeasurementFunction::Period => "s",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MeasurementFunction::DcVoltage => "DC voltage",
            MeasurementFunction::AcVoltage => "AC voltage",
            MeasurementFunction::DcCurrent => "DC current",
            MeasurementFunction::AcCurrent => "AC current",
            MeasurementFunction::Resistance2W => "2W resistance",
            MeasurementFunction::Resistance4W => "4W resistance",
            MeasurementFunction::Frequency => "Frequency",
            MeasurementFunction::Period => "Period",
            MeasurementFunction::Continuity => "Continuity",
            MeasurementFunction::Diode => "Diode",
        }
    }

    /// Selectable ranges, the first entry is the default
    pub fn ranges(&self) -> &'static [&'static str] {
        match self {
            MeasurementFunction::DcVoltage => &["AUTO", "100 mV", "1 V", "10 V", "100 V", "1000 V"],
            MeasurementFunction::AcVoltage => &["AUTO", "100 mV", "1 V", "10 V", "100 V", "750 V"],
            MeasurementFunction::DcCurrent => &["AUTO", "10 mA", "100 mA", "1 A", "3 A"],
            MeasurementFunction::AcCurrent => &["AUTO", "1 A", "3 A"],
            MeasurementFunction::Resistance2W => &[
                "AUTO", "100 Ω", "1 kΩ", "10 kΩ", "100 kΩ", "1 MΩ", "10 MΩ", "100 MΩ",
            ],
            MeasurementFunction::Resistance4W => {
                &["AUTO", "100 Ω", "1 kΩ", "10 kΩ", "100 kΩ", "1 MΩ", "10 MΩ"]
            }
            MeasurementFunction::Frequency | MeasurementFunction::Period => &["AUTO"],
            MeasurementFunction::Continuity | MeasurementFunction::Diode => &["–"],
        }
    }

    /// Whether the integration time can be set for this function
    pub fn has_nplc(&self) -> bool {
        !matches!(
            self,
            MeasurementFunction::Continuity
                | MeasurementFunction::Diode
                | MeasurementFunction::Frequency
                | MeasurementFunction::Period
        )
    }

    /// Column label used in reports, e.g. `DC voltage (V)`
    pub fn value_label(&self) -> String {
        format!("{} ({})", self.label(), self.unit())
    }
}

impl std::fmt::Display for MeasurementFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Display resolution, mapped to the integration time in power line cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    Digits3_5,
    Digits4_5,
    #[default]
    Digits5_5,
    Digits6_5,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::Digits3_5,
        Resolution::Digits4_5,
        Resolution::Digits5_5,
        Resolution::Digits6_5,
    ];

    pub fn nplc(&self) -> f64 {
        match self {
            Resolution::Digits3_5 => 0.02,
            Resolution::Digits4_5 => 0.2,
            Resolution::Digits5_5 => 1.0,
            Resolution::Digits6_5 => 10.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Digits3_5 => "3½ digit",
            Resolution::Digits4_5 => "4½ digit",
            Resolution::Digits5_5 => "5½ digit",
            Resolution::Digits6_5 => "6½ digit",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A complete measurement setup
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceParams {
    pub function: MeasurementFunction,
    pub range: String,
    pub resolution: Resolution,
}

impl DeviceParams {
    pub fn new(function: MeasurementFunction) -> Self {
        Self {
            function,
            range: function.ranges()[0].to_string(),
            resolution: Resolution::default(),
        }
    }
}

/// Open the instrument named by `resource`, falling back to simulation
pub fn open_device(resource: &str) -> Box<dyn Device> {
    let resource = resource.trim();
    if resource.is_empty() || resource.eq_ignore_ascii_case(SIMULATION_RESOURCE) {
        tracing::info!("Using simulated instrument");
        return Box::new(SimulatedDevice::new());
    }

    let transport = match TcpTransport::connect(resource, DEVICE_TIMEOUT) {
        Ok(transport) => transport,
        Err(e) => {
            tracing::warn!(
                "Failed to reach instrument at {}: {}, falling back to simulation",
                resource,
                e
            );
            return Box::new(SimulatedDevice::new());
        }
    };

    let mut device = ScpiDevice::new(transport);
    match device.connect() {
        Ok(()) => {
            tracing::info!("Connected to {} at {}", device.identity(), resource);
            Box::new(device)
        }
        Err(e) => {
            tracing::warn!(
                "Instrument at {} rejected the connection: {}, falling back to simulation",
                resource,
                e
            );
            Box::new(SimulatedDevice::new())
        }
    }
}

/// An [`open_device`] call running on its own thread
///
/// Connecting to a networked instrument can take up to [`DEVICE_TIMEOUT`],
/// so the UI thread starts the attempt here and picks the device up with
/// [`try_take`](Self::try_take) on a later frame.
pub struct PendingDevice {
    resource: String,
    rx: Receiver<Box<dyn Device>>,
}

impl PendingDevice {
    pub fn spawn(resource: &str) -> std::io::Result<Self> {
        let (tx, rx) = bounded(1);
        let target = resource.to_string();
        std::thread::Builder::new()
            .name("meterlog-connect".to_string())
            .spawn(move || {
                let _ = tx.send(open_device(&target));
            })?;

        tracing::debug!("Connecting to {} in the background", resource);
        Ok(Self {
            resource: resource.to_string(),
            rx,
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The opened device once the attempt has finished, without waiting
    pub fn try_take(&self) -> Option<Box<dyn Device>> {
        self.rx.try_recv().ok()
    }
}
