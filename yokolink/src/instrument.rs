//! Generic link over anything that implements [`std::io::Read`] and [`std::io::Write`], and the
//! error type shared by all links.

use std::time::Duration;

use thiserror::Error;

use crate::InstrumentInterface;

/// A link built from any port that implements [`std::io::Read`] and [`std::io::Write`].
///
/// [`crate::SerialInterface`] returns this type wrapped around a serial port. Other ports, for
/// example a [`std::net::TcpStream`] to a serial-to-ethernet bridge, work the same way.
///
/// ```no_run
/// use std::{net::TcpStream, time::Duration};
///
/// use yokolink::Instrument;
///
/// let bridge = TcpStream::connect("192.168.10.1:4001").unwrap();
/// let link = Instrument::new(bridge, Duration::from_secs(3));
/// ```
pub struct Instrument<P: std::io::Read + std::io::Write> {
    port: P,
    terminator: String,
    timeout: Duration,
}

impl<P: std::io::Read + std::io::Write> Instrument<P> {
    /// Wrap a port. The terminator starts out as `"\n"`.
    pub fn new(port: P, timeout: Duration) -> Self {
        Self {
            port,
            terminator: "\n".to_string(),
            timeout,
        }
    }

    /// Change the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

impl<P: std::io::Read + std::io::Write> InstrumentInterface for Instrument<P> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        self.port.read_exact(buf)?;
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        self.terminator.as_str()
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }
}

/// Errors raised by links.
///
/// Opening errors ([`InstrumentError::DeviceNotFound`], [`InstrumentError::PermissionDenied`],
/// [`InstrumentError::NotUsbTmc`]) carry the device path so they can be shown to the user as is.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstrumentError {
    /// The device node does not exist.
    #[error("device '{0}' not found")]
    DeviceNotFound(String),
    /// The device node exists but cannot be opened by the current user.
    #[error("permission denied opening '{0}'")]
    PermissionDenied(String),
    /// The device node is not a USB-TMC character device.
    #[error("'{0}' is not a USB-TMC device")]
    NotUsbTmc(String),
    /// Error when an invalid argument is passed to a link, e.g., an unsupported baud rate.
    #[error("{0}")]
    InvalidArgument(String),
    /// Error when reading from/writing to a link. See [`std::io::Error`] for more details.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serial")]
    /// Serial port errors, see the [`serialport::Error`] documentation.
    #[error(transparent)]
    Serialport(#[from] serialport::Error),
    /// No complete response arrived in time.
    #[error("timed out after {0:?} waiting for a response")]
    Timeout(Duration),
    /// No complete response to a query arrived in time.
    #[error("timed out after {timeout:?} waiting for a response to '{query}'")]
    TimeoutQuery {
        /// The query that timed out.
        query: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },
}
