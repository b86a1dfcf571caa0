//! Simulated instrument
//!
//! Produces readings around a nominal value for the configured function with
//! a small amount of gaussian noise, so the whole application can be used
//! without hardware.

use super::{Device, DeviceParams, MeasurementFunction};
use crate::error::DeviceError;

/// Instrument stand-in that generates noisy readings
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    function: MeasurementFunction,
    connected: bool,
    seed: u64,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::with_seed(0x2545_F491_4F6C_DD1D)
    }

    /// Create with a fixed noise seed (must be non-zero)
    pub fn with_seed(seed: u64) -> Self {
        Self {
            function: MeasurementFunction::default(),
            connected: true,
            seed: seed.max(1),
        }
    }

    pub fn function(&self) -> MeasurementFunction {
        self.function
    }

    /// Nominal reading and relative noise for a function
    fn nominal(function: MeasurementFunction) -> (f64, f64) {
        match function {
            MeasurementFunction::DcVoltage => (5.0, 5.0 * 0.002),
            MeasurementFunction::AcVoltage => (230.0, 230.0 * 0.002),
            MeasurementFunction::DcCurrent => (0.1, 0.1 * 0.005),
            MeasurementFunction::AcCurrent => (0.5, 0.5 * 0.005),
            MeasurementFunction::Resistance2W | MeasurementFunction::Resistance4W => (1000.0, 0.5),
            MeasurementFunction::Frequency => (50.0, 0.01),
            MeasurementFunction::Period => (0.02, 1e-6),
            MeasurementFunction::Continuity | MeasurementFunction::Diode => (0.0, 0.001),
        }
    }

    /// xorshift64, uniform in (0, 1]
    fn next_uniform(&mut self) -> f64 {
        let mut s = self.seed;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.seed = s;
        ((s >> 11) as f64 + 1.0) / (1u64 << 53) as f64
    }

    /// Standard normal deviate (Box-Muller)
    fn next_gaussian(&mut self) -> f64 {
        let u1 = self.next_uniform();
        let u2 = self.next_uniform();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

impl Device for SimulatedDevice {
    fn connect(&mut self) -> Result<(), DeviceError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn configure(&mut self, params: &DeviceParams) -> Result<(), DeviceError> {
        self.function = params.function;
        Ok(())
    }

    fn measure(&mut self) -> Result<f64, DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        let (base, sigma) = Self::nominal(self.function);
        let value = base + self.next_gaussian() * sigma;
        Ok(match self.function {
            MeasurementFunction::AcVoltage | MeasurementFunction::AcCurrent => value.abs(),
            _ => value,
        })
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn identity(&self) -> String {
        "Simulated 34401A".to_string()
    }
}
