//! USB-TMC links through the Linux `usbtmc` kernel driver.
//!
//! The kernel driver frames every transfer, so a response is complete after a single `read`.
//! Responses are read in chunks of [`USBTMC_READ_SIZE`] bytes. The response timeout is handed to
//! the driver, a `read` that runs into it fails with `ETIMEDOUT`.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    os::{fd::AsRawFd, unix::fs::FileTypeExt},
    time::Duration,
};

use tracing::{debug, trace};

use crate::{InstrumentError, InstrumentInterface};

/// Maximum number of bytes read per transfer.
pub const USBTMC_READ_SIZE: usize = 4096;

/// `USBTMC_IOCTL_CLEAR`, `_IO('[', 2)` in `linux/usb/tmc.h`.
const USBTMC_IOCTL_CLEAR: u64 = 0x5b02;

/// `USBTMC_IOCTL_SET_TIMEOUT`, `_IOW('[', 10, __u32)` in `linux/usb/tmc.h`.
const USBTMC_IOCTL_SET_TIMEOUT: u64 = 0x4004_5b0a;

/// Smallest timeout the driver accepts.
const USBTMC_MIN_TIMEOUT_MS: u32 = 100;

/// A USB-TMC character device.
#[derive(Debug)]
pub struct UsbTmcInterface {
    path: String,
    file: File,
    timeout: Duration,
}

impl UsbTmcInterface {
    /// Open a USB-TMC device node and clear its input and output buffers.
    ///
    /// # Errors
    /// - [`InstrumentError::DeviceNotFound`] if `path` does not exist.
    /// - [`InstrumentError::PermissionDenied`] if the node cannot be opened for reading and
    ///   writing.
    /// - [`InstrumentError::NotUsbTmc`] if the node is not a character device or does not accept
    ///   the USB-TMC clear request.
    pub fn open(path: &str, timeout: Duration) -> Result<Self, InstrumentError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => InstrumentError::DeviceNotFound(path.to_string()),
                std::io::ErrorKind::PermissionDenied => {
                    InstrumentError::PermissionDenied(path.to_string())
                }
                _ => InstrumentError::Io(err),
            })?;

        if !file.metadata()?.file_type().is_char_device() {
            return Err(InstrumentError::NotUsbTmc(path.to_string()));
        }

        let link = Self {
            path: path.to_string(),
            file,
            timeout,
        };
        link.clear()?;
        link.apply_timeout()?;
        debug!(path, "opened USB-TMC device");
        Ok(link)
    }

    /// Path of the device node.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Change the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), InstrumentError> {
        self.timeout = timeout;
        self.apply_timeout()
    }

    fn clear(&self) -> Result<(), InstrumentError> {
        // SAFETY: the descriptor is owned by `self.file` and the request carries no argument.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), USBTMC_IOCTL_CLEAR as _) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::ENOTTY) | Some(libc::EINVAL) => {
                    Err(InstrumentError::NotUsbTmc(self.path.clone()))
                }
                _ => Err(InstrumentError::Io(err)),
            };
        }
        Ok(())
    }

    /// Hand the response timeout to the driver, which enforces it inside `read`.
    fn apply_timeout(&self) -> Result<(), InstrumentError> {
        let timeout_ms = driver_timeout_ms(self.timeout);
        // SAFETY: the descriptor is owned by `self.file` and `timeout_ms` outlives the call.
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                USBTMC_IOCTL_SET_TIMEOUT as _,
                &timeout_ms as *const u32,
            )
        };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            return match err.raw_os_error() {
                // drivers before Linux 4.20 keep their fixed default timeout
                Some(libc::ENOTTY) | Some(libc::EINVAL) => {
                    debug!(path = self.path, "driver timeout can not be changed");
                    Ok(())
                }
                _ => Err(InstrumentError::Io(err)),
            };
        }
        Ok(())
    }

    /// Read one transfer.
    fn read_transfer(&mut self, buf: &mut [u8]) -> Result<usize, InstrumentError> {
        loop {
            match self.file.read(buf) {
                Ok(len) => return Ok(len),
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(read_error(err, self.timeout)),
            }
        }
    }
}

/// The timeout in whole milliseconds as the driver takes it. The driver refuses values below
/// 100 ms.
fn driver_timeout_ms(timeout: Duration) -> u32 {
    timeout
        .as_millis()
        .clamp(USBTMC_MIN_TIMEOUT_MS as u128, u32::MAX as u128) as u32
}

fn read_error(err: std::io::Error, timeout: Duration) -> InstrumentError {
    match err.raw_os_error() {
        Some(libc::ETIMEDOUT) => InstrumentError::Timeout(timeout),
        _ => InstrumentError::Io(err),
    }
}

impl InstrumentInterface for UsbTmcInterface {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        let mut filled = 0;
        while filled < buf.len() {
            let len = self.read_transfer(&mut buf[filled..])?;
            if len == 0 {
                return Err(InstrumentError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
            filled += len;
        }
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        self.file.write_all(data)?;
        Ok(())
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }

    fn read_until_terminator(&mut self) -> Result<String, InstrumentError> {
        let mut buf = vec![0u8; USBTMC_READ_SIZE];
        let len = self.read_transfer(&mut buf)?;
        buf.truncate(len);
        let line = String::from_utf8_lossy(&buf).trim().to_string();
        trace!(%line, "read");
        Ok(line)
    }
}
