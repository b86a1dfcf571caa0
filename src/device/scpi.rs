//! SCPI driver for the HP/Agilent 34401A
//!
//! The driver is generic over a line-oriented [`ScpiTransport`]. The shipped
//! transport is [`TcpTransport`] (raw SCPI socket, usually port 5025 on a
//! LAN/GPIB gateway). Each run configures a single immediate-trigger reading
//! and fetches it with `READ?`.

use super::{Device, DeviceParams};
use crate::error::DeviceError;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Instrument models this driver accepts in the `*IDN?` response
const SUPPORTED_MODELS: [&str; 2] = ["34401", "34410"];

/// Line-oriented command channel to an instrument
pub trait ScpiTransport: Send {
    /// Send one command, terminated by a newline
    fn write_line(&mut self, command: &str) -> io::Result<()>;

    /// Read one response line without the terminator
    fn read_line(&mut self) -> io::Result<String>;

    /// Send a query and read its response
    fn query(&mut self, command: &str) -> io::Result<String> {
        self.write_line(command)?;
        self.read_line()
    }
}

/// SCPI over a raw TCP socket
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TcpTransport {
    /// Connect to `host:port` (an optional `tcp://` prefix is accepted)
    pub fn connect(address: &str, timeout: Duration) -> io::Result<Self> {
        let address = address.strip_prefix("tcp://").unwrap_or(address);
        let socket_addr = address.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("no address for {}", address))
        })?;

        let stream = TcpStream::connect_timeout(&socket_addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
        })
    }
}

impl ScpiTransport for TcpTransport {
    fn write_line(&mut self, command: &str) -> io::Result<()> {
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "instrument closed the connection",
            ));
        }
        Ok(line.trim_end().to_string())
    }
}

/// 34401A / 34410A driver
pub struct ScpiDevice<T: ScpiTransport> {
    transport: T,
    connected: bool,
    idn: String,
}

impl<T: ScpiTransport> ScpiDevice<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            connected: false,
            idn: String::new(),
        }
    }

    /// Access the transport (mainly for tests)
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn write(&mut self, command: &str) -> Result<(), DeviceError> {
        tracing::trace!("SCPI > {}", command);
        self.transport
            .write_line(command)
            .map_err(|e| DeviceError::ReadFailure(format!("{}: {}", command, e)))
    }
}

impl<T: ScpiTransport> Device for ScpiDevice<T> {
    fn connect(&mut self) -> Result<(), DeviceError> {
        let idn = self
            .transport
            .query("*IDN?")
            .map_err(|e| DeviceError::ReadFailure(format!("*IDN?: {}", e)))?;

        if !SUPPORTED_MODELS.iter().any(|model| idn.contains(model)) {
            return Err(DeviceError::Unsupported(format!("unknown instrument: {}", idn)));
        }

        self.idn = idn;
        self.connected = true;
        self.write("*RST")?;
        self.write("*CLS")?;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            if let Err(e) = self.transport.write_line("SYST:LOC") {
                tracing::debug!("Failed to return instrument to local: {}", e);
            }
        }
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn configure(&mut self, params: &DeviceParams) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }

        let function = params.function.scpi();
        let range = match params.range.as_str() {
            "AUTO" | "–" | "" => "DEF".to_string(),
            other => parse_range(other)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "DEF".to_string()),
        };

        self.write(&format!("CONF:{} {}", function, range))?;
        if params.function.has_nplc() {
            self.write(&format!(
                "SENS:{}:NPLC {}",
                function,
                params.resolution.nplc()
            ))?;
        }
        self.write("TRIG:SOUR IMM")?;
        self.write("TRIG:DEL:AUTO ON")?;
        self.write("SAMP:COUN 1")
    }

    fn measure(&mut self) -> Result<f64, DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        let response = self
            .transport
            .query("READ?")
            .map_err(|e| DeviceError::ReadFailure(e.to_string()))?;

        response
            .trim()
            .parse::<f64>()
            .map_err(|_| DeviceError::ReadFailure(format!("unparsable reading '{}'", response)))
    }

    fn identity(&self) -> String {
        if self.idn.is_empty() {
            "34401A (not identified)".to_string()
        } else {
            self.idn.clone()
        }
    }
}

/// Convert a range label such as `100 mV` or `10 kΩ` to its numeric value
pub fn parse_range(label: &str) -> Option<f64> {
    // Longest suffixes first so "MV" is not read as "V"
    const SUFFIXES: [(&str, f64); 8] = [
        ("KΩ", 1e3),
        ("MΩ", 1e6),
        ("MV", 1e-3),
        ("MA", 1e-3),
        ("HZ", 1.0),
        ("V", 1.0),
        ("A", 1.0),
        ("Ω", 1.0),
    ];

    let compact: String = label
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    SUFFIXES.iter().find_map(|(suffix, scale)| {
        let number = compact.strip_suffix(suffix)?;
        let value: f64 = number.parse().ok()?;
        Some(if *scale < 1.0 {
            value / (1.0 / scale).round()
        } else {
            value * scale
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MeasurementFunction;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeTransport {
        written: Vec<String>,
        responses: VecDeque<String>,
    }

    impl FakeTransport {
        fn with_responses(responses: &[&str]) -> Self {
            Self {
                written: Vec::new(),
                responses: responses.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl ScpiTransport for FakeTransport {
        fn write_line(&mut self, command: &str) -> io::Result<()> {
            self.written.push(command.to_string());
            Ok(())
        }

        fn read_line(&mut self) -> io::Result<String> {
            self.responses
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "no response"))
        }
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("100 mV"), Some(0.1));
        assert_eq!(parse_range("10 mA"), Some(0.01));
        assert_eq!(parse_range("1 kΩ"), Some(1000.0));
        assert_eq!(parse_range("10 MΩ"), Some(10_000_000.0));
        assert_eq!(parse_range("750 V"), Some(750.0));
        assert_eq!(parse_range("3 A"), Some(3.0));
        assert_eq!(parse_range("AUTO"), None);
    }

    #[test]
    fn test_connect_checks_identity() {
        let transport = FakeTransport::with_responses(&["HEWLETT-PACKARD,34401A,0,11-5-2"]);
        let mut device = ScpiDevice::new(transport);
        device.connect().unwrap();
        assert!(device.is_connected());
        assert_eq!(device.transport().written, vec!["*IDN?", "*RST", "*CLS"]);
    }

    #[test]
    fn test_connect_rejects_other_instruments() {
        let transport = FakeTransport::with_responses(&["KEITHLEY,2000,0,A01"]);
        let mut device = ScpiDevice::new(transport);
        let err = device.connect().unwrap_err();
        assert!(matches!(err, DeviceError::Unsupported(_)));
        assert!(!device.is_connected());
    }

    #[test]
    fn test_configure_commands() {
        let transport = FakeTransport::with_responses(&["Agilent,34410A,0,2.35"]);
        let mut device = ScpiDevice::new(transport);
        device.connect().unwrap();

        let params = DeviceParams {
            function: MeasurementFunction::DcVoltage,
            range: "10 V".to_string(),
            resolution: crate::device::Resolution::Digits6_5,
        };
        device.configure(&params).unwrap();

        let written = &device.transport().written[3..];
        assert_eq!(
            written,
            &[
                "CONF:VOLT:DC 10",
                "SENS:VOLT:DC:NPLC 10",
                "TRIG:SOUR IMM",
                "TRIG:DEL:AUTO ON",
                "SAMP:COUN 1"
            ]
        );
    }

    #[test]
    fn test_configure_frequency_skips_nplc() {
        let transport = FakeTransport::with_responses(&["HP,34401A,0,1"]);
        let mut device = ScpiDevice::new(transport);
        device.connect().unwrap();
        device
            .configure(&DeviceParams::new(MeasurementFunction::Frequency))
            .unwrap();
        let written = &device.transport().written;
        assert!(written.contains(&"CONF:FREQ DEF".to_string()));
        assert!(!written.iter().any(|c| c.contains("NPLC")));
    }

    #[test]
    fn test_measure_parses_reading() {
        let transport = FakeTransport::with_responses(&["HP,34401A,0,1", "+4.99872100E+00", "garbage"]);
        let mut device = ScpiDevice::new(transport);
        device.connect().unwrap();

        let v = device.measure().unwrap();
        assert!((v - 4.998721).abs() < 1e-9);

        assert!(matches!(device.measure(), Err(DeviceError::ReadFailure(_))));
        // Transport timeout
        assert!(matches!(device.measure(), Err(DeviceError::ReadFailure(_))));
    }

    #[test]
    fn test_not_connected() {
        let mut device = ScpiDevice::new(FakeTransport::default());
        assert_eq!(device.measure(), Err(DeviceError::NotConnected));
        assert_eq!(
            device.configure(&DeviceParams::default()),
            Err(DeviceError::NotConnected)
        );
    }

    #[test]
    fn test_disconnect_returns_to_local() {
        let transport = FakeTransport::with_responses(&["HP,34401A,0,1"]);
        let mut device = ScpiDevice::new(transport);
        device.connect().unwrap();
        device.disconnect();
        assert_eq!(device.transport().written.last().unwrap(), "SYST:LOC");
        assert!(!device.is_connected());
    }
}
