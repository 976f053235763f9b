//! A rust driver for the Yokogawa WT210 and WT310 family of digital power meters.
//!
//! This driver is built on top of [`yokolink`]: any link that implements
//! [`yokolink::InstrumentInterface`] can be used, USB-TMC and serial links are provided there.
//!
//! A [`PowerMeter`] session identifies the meter, looks up the compiled-in [`ModelDescriptor`]
//! for it, and from then on validates every property access and data item against that table
//! before anything is sent. Readings are produced by the lazy [`Sampler`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use yokogawa_wt::{CancelToken, PowerMeter, ReadBounds};
//! use yokolink::UsbTmcInterface;
//!
//! let link = UsbTmcInterface::open("/dev/usbtmc0", Duration::from_secs(5)).unwrap();
//! let mut meter = PowerMeter::try_new(link, None).unwrap();
//!
//! meter.set_property("interval", "1").unwrap();
//! println!("voltage range: {}", meter.get_property("voltage-range").unwrap());
//!
//! let bounds = ReadBounds { count: Some(5), ..Default::default() };
//! let sampler = meter.sampler(&["T", "P", "V"], bounds, false, CancelToken::new()).unwrap();
//! for row in sampler {
//!     println!("{:?}", row.unwrap());
//! }
//! ```

#![warn(missing_docs)]

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tracing::{debug, info, warn};
use yokolink::InstrumentInterface;

use crate::property::{Domain, ResponseShape, WriteMode};

mod cancel;
pub mod codec;
pub mod csv;
pub mod data_item;
mod error;
mod integration;
pub mod models;
pub mod property;
mod sampler;

pub use cancel::*;
pub use data_item::{DataItemDescriptor, Reading};
pub use error::*;
pub use integration::*;
pub use models::{ModelDescriptor, ModelKind, resolve};
pub use property::{PropertyDescriptor, Value};
pub use sampler::*;

/// Commands that prepare every session, before the model specific ones.
const SESSION_SETUP: &[&str] = &["*CLS", ":STAT:QMES ON", ":COMM:HEAD OFF"];

/// A session with one power meter.
///
/// Clones share the same link. The link is locked for one exchange (or one command followed by
/// its error check) at a time, so clones can be used from several threads.
pub struct PowerMeter<T: InstrumentInterface> {
    interface: Arc<Mutex<T>>,
    model: &'static ModelDescriptor,
}

impl<T: InstrumentInterface> Clone for PowerMeter<T> {
    fn clone(&self) -> Self {
        Self {
            interface: self.interface.clone(),
            model: self.model,
        }
    }
}

impl<T: InstrumentInterface> PowerMeter<T> {
    /// Bind a link to a model without talking to the meter.
    pub fn new(interface: T, model: ModelKind) -> Self {
        Self {
            interface: Arc::new(Mutex::new(interface)),
            model: model.descriptor(),
        }
    }

    /// Open a session: clear the meter, set up the response format and identify the meter.
    ///
    /// Without a `model` the model is detected from the `*IDN?` response. With a `model` the
    /// response is checked against it.
    ///
    /// # Errors
    /// - [`PowerMeterError::UnknownModel`] if the meter reports a WT model that is not supported.
    /// - [`PowerMeterError::Configuration`] if the meter does not match the given `model`.
    pub fn try_new(interface: T, model: Option<ModelKind>) -> Result<Self, PowerMeterError> {
        let mut meter = Self::new(interface, model.unwrap_or(ModelKind::Wt210));
        let identity = meter.setup_session()?;
        let detected = ModelKind::from_identity(&identity)?;

        let kind = match (model, detected) {
            (Some(configured), Some(detected)) if !configured.compatible_with(detected) => {
                return Err(PowerMeterError::Configuration(format!(
                    "the device identifies as '{identity}', which is not a {configured}"
                )));
            }
            (Some(configured), None) if configured != ModelKind::Wt210 => {
                return Err(PowerMeterError::Configuration(format!(
                    "the device identifies as '{identity}', which is not a {configured}"
                )));
            }
            (Some(configured), _) => configured,
            (None, Some(detected)) => detected,
            (None, None) => {
                warn!(%identity, "model not named in the device ID, assuming a WT210");
                ModelKind::Wt210
            }
        };

        meter.model = kind.descriptor();
        meter.setup_model()?;
        info!(model = meter.model.name, %identity, "power meter session ready");
        Ok(meter)
    }

    /// Common setup, returns the `*IDN?` response.
    fn setup_session(&mut self) -> Result<String, PowerMeterError> {
        let mut intf = self.lock();
        for cmd in SESSION_SETUP {
            debug!(cmd, "send");
            intf.sendcmd(cmd)?;
        }
        let identity = intf.query("*IDN?")?;
        debug!(%identity, "identified");
        Ok(identity)
    }

    fn setup_model(&mut self) -> Result<(), PowerMeterError> {
        let mut intf = self.lock();
        for cmd in self.model.init_commands {
            debug!(cmd, "send");
            intf.sendcmd(cmd)?;
        }
        check_error_queue(&mut *intf, "session setup")
    }

    /// The model descriptor of this session.
    pub fn model(&self) -> &'static ModelDescriptor {
        self.model
    }

    /// Read a property.
    ///
    /// # Errors
    /// [`ValidationError::UnsupportedProperty`] and [`ValidationError::NotReadable`] are returned
    /// before any I/O.
    pub fn get_property(&mut self, name: &str) -> Result<Value, PowerMeterError> {
        let prop = self.lookup(name)?;
        if !prop.readable {
            return Err(ValidationError::NotReadable(name.to_string()).into());
        }
        let cmd = codec::encode(prop, None);
        let raw = self.query(&cmd)?;
        Ok(codec::decode(prop, &raw)?)
    }

    /// Validate `raw` against the property domain and write it. Returns the normalized value.
    ///
    /// Numeric input is accepted in any spelling that equals an allowed value (`5`, `5.0`,
    /// `+5e0`), the canonical spelling is sent to the meter.
    ///
    /// # Errors
    /// [`ValidationError::UnsupportedProperty`], [`ValidationError::NotWritable`] and
    /// [`ValidationError::InvalidValue`] are returned before any I/O. If the meter reports an
    /// error after the command, [`PowerMeterError::Instrument`] is returned.
    ///
    /// Properties that are a field of a composite setting are written by reading the setting and
    /// writing it back with the field replaced. Setting a range to `auto` turns its auto range on,
    /// any other range turns it off; the smallest and the largest range are refused with
    /// [`PowerMeterError::InvalidState`] unless the crest factor allows them.
    pub fn set_property(&mut self, name: &str, raw: &str) -> Result<Value, PowerMeterError> {
        let prop = self.lookup(name)?;
        let value = prop.validate(raw)?;
        match prop.write {
            WriteMode::Direct => self.command(&codec::encode(prop, Some(&value)))?,
            WriteMode::Steps => {
                let steps = codec::encode_steps(prop, &value);
                self.exchange(|intf| steps.iter().try_for_each(|cmd| run_command(intf, cmd)))?;
            }
            WriteMode::Field { whole } => self.write_field(prop, whole, &value)?,
            WriteMode::Range { auto, crest_factor } => self.write_range(prop, auto, crest_factor, &value)?,
        }
        Ok(value)
    }

    fn write_field(
        &mut self,
        prop: &'static PropertyDescriptor,
        whole: &str,
        value: &Value,
    ) -> Result<(), PowerMeterError> {
        let whole = self.lookup(whole)?;
        let not_a_field = || {
            PowerMeterError::InvalidState(format!("'{}' is not a field of '{}'", prop.name, whole.name))
        };
        let ResponseShape::Field(index) = prop.response else {
            return Err(not_a_field());
        };
        self.exchange(|intf| {
            let query = codec::encode(whole, None);
            let raw = intf.query(&query)?;
            debug!(cmd = %query, response = %raw, "query");
            let current = codec::decode(whole, &raw)?;
            let cmd = codec::encode_field(whole, &current, index, prop, value).ok_or_else(not_a_field)?;
            run_command(intf, &cmd)
        })
    }

    fn write_range(
        &mut self,
        prop: &'static PropertyDescriptor,
        auto: &str,
        crest_factor: &str,
        value: &Value,
    ) -> Result<(), PowerMeterError> {
        let auto = self.lookup(auto)?;
        if *value == Value::Token(property::AUTO) {
            return self.command(&codec::encode(auto, Some(&Value::Switch(true))));
        }
        let crest_factor = self.lookup(crest_factor)?;
        let needed = crest_factor_needed(prop, value);
        self.exchange(|intf| {
            if let Some(needed) = needed {
                let query = codec::encode(crest_factor, None);
                let raw = intf.query(&query)?;
                debug!(cmd = %query, response = %raw, "query");
                let current = codec::decode(crest_factor, &raw)?;
                if !current.matches(&Value::Number(needed)) {
                    return Err(PowerMeterError::InvalidState(format!(
                        "{} {value} is only available with crest factor {needed}, the crest factor is {current}",
                        prop.name
                    )));
                }
            }
            run_command(intf, &codec::encode(auto, Some(&Value::Switch(false))))?;
            run_command(intf, &codec::encode(prop, Some(value)))
        })
    }

    /// Allowed values of a property, in the same form [`ValidationError::InvalidValue`] lists
    /// them.
    pub fn list_allowed_values(&self, name: &str) -> Result<Vec<String>, PowerMeterError> {
        self.model.list_allowed_values(name)
    }

    /// Read every readable property.
    pub fn info(&mut self) -> Result<Vec<(&'static PropertyDescriptor, Value)>, PowerMeterError> {
        self.model
            .readable_properties()
            .into_iter()
            .map(|prop| Ok((prop, self.get_property(prop.name)?)))
            .collect()
    }

    /// The configured data update interval.
    pub fn interval(&mut self) -> Result<Duration, PowerMeterError> {
        let value = self.get_property("interval")?;
        value
            .as_f64()
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
            .ok_or_else(|| PowerMeterError::InvalidState(format!("unusable interval '{value}'")))
    }

    /// Run the zero level compensation. Returns `true` on success.
    pub fn calibrate(&mut self) -> Result<bool, PowerMeterError> {
        let mut intf = self.lock();
        intf.sendcmd("*CLS")?;
        let result = intf.query("*CAL?")?;
        debug!(%result, "calibration");
        Ok(result.trim() == "0")
    }

    /// Reset the meter to factory settings and set the session up again.
    ///
    /// With `configure`, the model defaults (auto ranges on, smoothing off, normal integration
    /// with the timer at 0) are applied afterwards.
    pub fn factory_reset(&mut self, configure: bool) -> Result<(), PowerMeterError> {
        self.sendcmd("*RST")?;
        self.setup_session()?;
        self.setup_model()?;
        if configure {
            for (name, value) in self.model.defaults {
                self.set_property(name, value)?;
            }
        }
        info!(configure, "factory reset done");
        Ok(())
    }

    /// Create a lazy [`Sampler`] reading `items` from this meter.
    pub fn sampler(
        &self,
        items: &[&str],
        bounds: ReadBounds,
        integration_gate: bool,
        cancel: CancelToken,
    ) -> Result<Sampler<T>, PowerMeterError> {
        Sampler::new(self.clone(), items, bounds, integration_gate, cancel)
    }

    fn lookup(&self, name: &str) -> Result<&'static PropertyDescriptor, PowerMeterError> {
        self.model
            .property(name)
            .ok_or_else(|| ValidationError::UnsupportedProperty(name.to_string()).into())
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.interface.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a command without checking the error queue.
    pub(crate) fn sendcmd(&mut self, cmd: &str) -> Result<(), PowerMeterError> {
        debug!(cmd, "send");
        self.lock().sendcmd(cmd)?;
        Ok(())
    }

    /// Send a query and return the response.
    pub(crate) fn query(&mut self, cmd: &str) -> Result<String, PowerMeterError> {
        let response = self.lock().query(cmd)?;
        debug!(cmd, %response, "query");
        Ok(response)
    }

    /// Send a command and check the error queue, without releasing the link in between.
    pub(crate) fn command(&mut self, cmd: &str) -> Result<(), PowerMeterError> {
        run_command(&mut *self.lock(), cmd)
    }

    /// Run several exchanges while holding the link.
    pub(crate) fn exchange<R>(
        &mut self,
        f: impl FnOnce(&mut T) -> Result<R, PowerMeterError>,
    ) -> Result<R, PowerMeterError> {
        let mut intf = self.lock();
        f(&mut intf)
    }
}

/// Crest factor the smallest range needs.
const SMALLEST_RANGE_CREST_FACTOR: f64 = 6.0;
/// Crest factor the largest range needs.
const LARGEST_RANGE_CREST_FACTOR: f64 = 3.0;

/// The crest factor a range value is limited to, if any.
fn crest_factor_needed(prop: &PropertyDescriptor, value: &Value) -> Option<f64> {
    let Domain::Numbers(ranges) = prop.domain else {
        return None;
    };
    let value = value.as_f64()?;
    let is = |range: Option<&&str>| {
        range
            .and_then(|r| r.parse::<f64>().ok())
            .is_some_and(|r| property::numbers_equal(value, r))
    };
    if is(ranges.first()) {
        Some(SMALLEST_RANGE_CREST_FACTOR)
    } else if is(ranges.last()) {
        Some(LARGEST_RANGE_CREST_FACTOR)
    } else {
        None
    }
}

/// Send a command and check the error queue.
fn run_command<I: InstrumentInterface + ?Sized>(intf: &mut I, cmd: &str) -> Result<(), PowerMeterError> {
    debug!(cmd, "send");
    intf.sendcmd(cmd)?;
    check_error_queue(intf, cmd)
}

/// Read the error queue and turn a non-zero code into [`PowerMeterError::Instrument`].
pub(crate) fn check_error_queue<I: InstrumentInterface + ?Sized>(
    intf: &mut I,
    command: &str,
) -> Result<(), PowerMeterError> {
    let raw = intf.query(codec::ERROR_QUERY)?;
    let (code, message) = codec::decode_error(&raw)?;
    if code == 0 {
        return Ok(());
    }
    warn!(command, code, %message, "instrument error");
    Err(PowerMeterError::Instrument {
        command: command.to_string(),
        code,
        message,
    })
}
