//! Opening the link and the power meter session.

use tracing::{info, warn};
use yokogawa_wt::{ModelKind, PowerMeter, PowerMeterError};
use yokolink::{DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT, InstrumentInterface, SerialInterface};

use crate::config::DeviceConfig;

/// A link of either kind.
pub type DynInterface = Box<dyn InstrumentInterface + Send>;

const NO_DEVNODE: &str = "the power meter device node was not found, give it as the first \
                          argument, name a configuration section, or add a [default] section \
                          to the configuration file";

const SERIAL_HINTS: &str = "use a null modem cable, configure the same baud rate on the meter, \
                            8 data bits, no parity, no handshaking and the CR+LF terminator";

/// Whether the settings select a serial link.
pub fn is_serial(config: &DeviceConfig) -> bool {
    config.baudrate.is_some()
        || config
            .devnode
            .as_ref()
            .is_some_and(|node| node.to_string_lossy().contains("tty"))
}

/// Open the link the settings describe.
pub fn open_interface(config: &DeviceConfig) -> Result<DynInterface, PowerMeterError> {
    let devnode = config
        .devnode
        .as_ref()
        .ok_or_else(|| PowerMeterError::Configuration(NO_DEVNODE.to_string()))?;
    let path = devnode.to_string_lossy();
    if is_serial(config) {
        let baud_rate = config.baudrate.unwrap_or(DEFAULT_BAUD_RATE);
        info!(%path, baud_rate, "opening serial link");
        Ok(Box::new(SerialInterface::open(&path, baud_rate, DEFAULT_TIMEOUT)?))
    } else {
        info!(%path, "opening USB-TMC link");
        open_usbtmc(&path)
    }
}

#[cfg(unix)]
fn open_usbtmc(path: &str) -> Result<DynInterface, PowerMeterError> {
    Ok(Box::new(yokolink::UsbTmcInterface::open(path, DEFAULT_TIMEOUT)?))
}

#[cfg(not(unix))]
fn open_usbtmc(path: &str) -> Result<DynInterface, PowerMeterError> {
    Err(PowerMeterError::Configuration(format!(
        "'{path}': USB-TMC links are only supported on Unix"
    )))
}

/// Open the link and set up a session with the configured or detected model.
pub fn connect(config: &DeviceConfig) -> Result<PowerMeter<DynInterface>, PowerMeterError> {
    let model = config
        .pmtype
        .as_deref()
        .map(|name| ModelKind::from_name(name).ok_or_else(|| PowerMeterError::UnknownModel(name.to_string())))
        .transpose()?;
    if model.is_none() {
        warn!("power meter type not configured, detecting it");
    }

    let interface = open_interface(config)?;
    let meter = PowerMeter::try_new(interface, model).inspect_err(|err| {
        if is_serial(config) && matches!(err, PowerMeterError::Transport(_)) {
            warn!(hints = SERIAL_HINTS, "serial link failed");
        }
    })?;
    if model.is_none() {
        warn!(model = meter.model().name, "detected power meter type");
    }
    Ok(meter)
}
