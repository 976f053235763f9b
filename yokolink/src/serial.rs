//! Serial links. The meters use 8 data bits, no parity, one stop bit and no flow control, with
//! `"\r\n"` terminated lines.

use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortBuilder, StopBits};

use crate::{DEFAULT_TIMEOUT, Instrument, InstrumentError, InstrumentInterface};

/// Baud rates the meters can be configured for.
pub const BAUD_RATES: [u32; 7] = [1200, 2400, 4800, 9600, 19200, 38400, 57600];

/// Baud rate used when none is configured.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Line terminator on serial links.
pub const SERIAL_TERMINATOR: &str = "\r\n";

/// Constructors for serial links.
pub struct SerialInterface {}

impl SerialInterface {
    /// Open `port` at `baud_rate` with the default timeout.
    pub fn simple(
        port: &str,
        baud_rate: u32,
    ) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        Self::open(port, baud_rate, DEFAULT_TIMEOUT)
    }

    /// Open `port` at `baud_rate`. Only the rates in [`BAUD_RATES`] are accepted.
    pub fn open(
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        if !BAUD_RATES.contains(&baud_rate) {
            return Err(InstrumentError::InvalidArgument(format!(
                "unsupported baud rate {baud_rate}, use one of: {}",
                BAUD_RATES.map(|b| b.to_string()).join(", ")
            )));
        }

        let builder = serialport::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout);

        let serial = builder.open().map_err(|err| open_error(port, err))?;
        Ok(Self::wrap(serial, timeout))
    }

    /// Open a port from a fully configured [`SerialPortBuilder`].
    pub fn full(
        builder: SerialPortBuilder,
    ) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        let serial = builder.open()?;
        let timeout = serial.timeout();
        Ok(Self::wrap(serial, timeout))
    }

    fn wrap(serial: Box<dyn SerialPort>, timeout: Duration) -> Instrument<Box<dyn SerialPort>> {
        let mut inst = Instrument::new(serial, timeout);
        inst.set_terminator(SERIAL_TERMINATOR);
        inst
    }
}

fn open_error(port: &str, err: serialport::Error) -> InstrumentError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => InstrumentError::DeviceNotFound(port.to_string()),
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
            InstrumentError::DeviceNotFound(port.to_string())
        }
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            InstrumentError::PermissionDenied(port.to_string())
        }
        _ => InstrumentError::Serialport(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_baud_rate_is_rejected_before_opening() {
        let err = SerialInterface::open("/dev/ttyUSB99", 115200, DEFAULT_TIMEOUT).err();
        assert!(matches!(err, Some(InstrumentError::InvalidArgument(_))));
    }

    #[test]
    fn missing_port_maps_to_device_not_found() {
        let err = open_error(
            "/dev/ttyUSB99",
            serialport::Error::new(serialport::ErrorKind::NoDevice, "gone"),
        );
        assert!(matches!(err, InstrumentError::DeviceNotFound(p) if p == "/dev/ttyUSB99"));
    }
}
