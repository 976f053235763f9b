//! `yokolink` moves command lines to and from Yokogawa power meters.
//!
//! Every link implements the [`InstrumentInterface`] trait. A link only has to know how to write
//! raw bytes and how to read bytes back, everything else (terminators, timeouts, queries) is
//! provided by default methods of the trait. The following links are available:
//!
//! - [`UsbTmcInterface`]: Linux USB-TMC character devices such as `/dev/usbtmc0` (feature
//!   `usbtmc`, Unix only).
//! - [`SerialInterface`]: serial ports with the 8N1 framing the meters use (feature `serial`).
//! - [`Instrument`]: any type that implements [`std::io::Read`] and [`std::io::Write`].
//! - [`LoopbackInterface`]: a scripted link for driver tests.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use yokolink::{InstrumentInterface, UsbTmcInterface};
//!
//! let mut link = UsbTmcInterface::open("/dev/usbtmc0", Duration::from_secs(5)).unwrap();
//! let identity = link.query("*IDN?").unwrap();
//! println!("{identity}");
//! ```

#![warn(missing_docs)]

use std::time::{Duration, Instant};

use tracing::trace;

mod instrument;
mod loopback;
#[cfg(feature = "serial")]
mod serial;
#[cfg(all(unix, feature = "usbtmc"))]
mod usbtmc;

pub use instrument::*;
pub use loopback::*;
#[cfg(feature = "serial")]
pub use serial::*;
#[cfg(all(unix, feature = "usbtmc"))]
pub use usbtmc::*;

/// Default time to wait for a response before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The interface trait that every link to a power meter implements.
///
/// Only [`InstrumentInterface::read_exact`] and [`InstrumentInterface::write_raw`] are required.
/// Links that know where a message ends by themselves (USB-TMC transfers, for example) can
/// override [`InstrumentInterface::read_until_terminator`] as well.
pub trait InstrumentInterface {
    /// Read exactly as many bytes as fit into `buf`.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError>;

    /// Write raw bytes to the link.
    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError>;

    /// Line terminator used for commands and responses.
    fn get_terminator(&self) -> &str {
        "\n"
    }

    /// Set a new line terminator. Links without a configurable terminator ignore this.
    fn set_terminator(&mut self, _terminator: &str) {}

    /// Maximum time to wait for a complete response.
    fn get_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Write a string to the link as is.
    fn write(&mut self, data: &str) -> Result<(), InstrumentError> {
        self.write_raw(data.as_bytes())
    }

    /// Send a command line, the terminator is appended.
    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        trace!(cmd, "write");
        let line = format!("{cmd}{}", self.get_terminator());
        self.write(&line)
    }

    /// Read one response line. The terminator and surrounding whitespace are stripped.
    fn read_until_terminator(&mut self) -> Result<String, InstrumentError> {
        let timeout = self.get_timeout();
        let terminator = self.get_terminator().as_bytes().to_vec();
        let mut response = Vec::new();
        let mut single = [0u8; 1];

        let start = Instant::now();
        loop {
            match self.read_exact(&mut single) {
                Ok(()) => response.push(single[0]),
                Err(InstrumentError::Io(err)) if err.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(InstrumentError::Timeout(timeout));
                }
                Err(err) => return Err(err),
            }
            if !terminator.is_empty() && response.ends_with(&terminator) {
                break;
            }
            if start.elapsed() > timeout {
                return Err(InstrumentError::Timeout(timeout));
            }
        }

        let line = String::from_utf8_lossy(&response).trim().to_string();
        trace!(%line, "read");
        Ok(line)
    }

    /// Send a query and return the response line.
    fn query(&mut self, cmd: &str) -> Result<String, InstrumentError> {
        self.sendcmd(cmd)?;
        self.read_until_terminator().map_err(|err| match err {
            InstrumentError::Timeout(timeout) => InstrumentError::TimeoutQuery {
                query: cmd.to_string(),
                timeout,
            },
            other => other,
        })
    }
}

impl<I: InstrumentInterface + ?Sized> InstrumentInterface for Box<I> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        (**self).read_exact(buf)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        (**self).write_raw(data)
    }

    fn get_terminator(&self) -> &str {
        (**self).get_terminator()
    }

    fn set_terminator(&mut self, terminator: &str) {
        (**self).set_terminator(terminator)
    }

    fn get_timeout(&self) -> Duration {
        (**self).get_timeout()
    }

    fn write(&mut self, data: &str) -> Result<(), InstrumentError> {
        (**self).write(data)
    }

    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        (**self).sendcmd(cmd)
    }

    fn read_until_terminator(&mut self) -> Result<String, InstrumentError> {
        (**self).read_until_terminator()
    }

    fn query(&mut self, cmd: &str) -> Result<String, InstrumentError> {
        (**self).query(cmd)
    }
}
