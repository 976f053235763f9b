//! The read loop.
//!
//! A [`Sampler`] is an iterator: nothing is sent to the meter before the first call to `next`,
//! and every call produces one [`SampleRow`] or ends the loop.

use std::{
    process::{Child, Command, ExitStatus},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use tracing::{debug, info};
use yokolink::InstrumentInterface;

use crate::{
    CancelToken, IntegrationState, PowerMeter, check_error_queue, codec,
    data_item::{self, DataItemDescriptor, ItemSource, Reading},
    error::{PowerMeterError, ValidationError},
    models::{ModelDescriptor, ReadPlan},
};

/// When a read ends. Bounds combine, the first one that is hit ends the read.
#[derive(Debug, Default)]
pub struct ReadBounds {
    /// Stop after this many rows.
    pub count: Option<usize>,
    /// Stop once this much time has passed since the first row.
    pub duration: Option<Duration>,
    /// Start this program with the read and stop when it exits.
    pub command: Option<Command>,
}

/// Why a read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cancel token was triggered.
    Cancelled,
    /// The requested number of rows was produced.
    CountReached,
    /// The requested duration elapsed.
    DurationElapsed,
    /// The integration timer elapsed.
    IntegrationFinished,
    /// The monitored program exited.
    ProcessExited,
    /// An error ended the read.
    Failed,
}

/// One row of readings, in the order the items were requested.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    timestamp: f64,
    values: Vec<(&'static str, f64)>,
}

impl SampleRow {
    /// Create a row from a timestamp (seconds since the Unix epoch) and `(code, value)` pairs.
    pub fn new(timestamp: f64, values: Vec<(&'static str, f64)>) -> Self {
        Self { timestamp, values }
    }

    /// Seconds since the Unix epoch at the time the row was read.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// The `(code, value)` pairs.
    pub fn values(&self) -> &[(&'static str, f64)] {
        &self.values
    }

    /// The value of one item.
    pub fn get(&self, code: &str) -> Option<f64> {
        self.values.iter().find(|(c, _)| *c == code).map(|(_, v)| *v)
    }

    /// The values as unitful readings, typed by the data items of `model`. Codes the model does
    /// not know are left out.
    pub fn readings(&self, model: &ModelDescriptor) -> Vec<(&'static str, Reading)> {
        self.values
            .iter()
            .filter_map(|(code, value)| Some((*code, model.data_item(code)?.reading(*value))))
            .collect()
    }
}

/// Lazily reads data items from a meter at its update interval.
///
/// Before the first row the sampler reads the update interval, configures the item selection
/// on the meter and, with the integration gate on, checks that integration is running. If it
/// is not, the gate is dropped and the read continues until another bound is hit.
pub struct Sampler<T: InstrumentInterface> {
    meter: PowerMeter<T>,
    items: Vec<&'static DataItemDescriptor>,
    measured: Vec<&'static DataItemDescriptor>,
    count: Option<usize>,
    duration: Option<Duration>,
    command: Option<Command>,
    program: String,
    child: Option<Child>,
    gate: bool,
    cancel: CancelToken,
    interval: Duration,
    started: Option<Instant>,
    produced: usize,
    stop: Option<StopReason>,
    exit_status: Option<ExitStatus>,
}

impl<T: InstrumentInterface> Sampler<T> {
    /// Validate `items` and create the sampler. No I/O happens here.
    ///
    /// # Errors
    /// - [`ValidationError::MissingValue`] if `items` is empty.
    /// - [`ValidationError::UnsupportedItem`] for a code the model does not know.
    /// - [`ValidationError::TooManyItems`] if more items need to be measured than the model can
    ///   report at once.
    pub fn new(
        meter: PowerMeter<T>,
        items: &[&str],
        bounds: ReadBounds,
        integration_gate: bool,
        cancel: CancelToken,
    ) -> Result<Self, PowerMeterError> {
        let model = meter.model;
        if items.is_empty() {
            return Err(ValidationError::MissingValue.into());
        }
        let items = items
            .iter()
            .map(|code| {
                model
                    .data_item(code)
                    .ok_or_else(|| ValidationError::UnsupportedItem(code.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut measured: Vec<&'static DataItemDescriptor> = Vec::new();
        for item in &items {
            let needed = match item.source {
                ItemSource::Instrument { .. } => Some(*item),
                ItemSource::Energy => model.data_item("P"),
                ItemSource::Timestamp => None,
            };
            if let Some(needed) = needed {
                if !measured.iter().any(|m| m.code == needed.code) {
                    measured.push(needed);
                }
            }
        }
        if measured.len() > model.max_items {
            return Err(ValidationError::TooManyItems {
                requested: measured.len(),
                max: model.max_items,
            }
            .into());
        }
        if let ReadPlan::Selected { .. } = model.read_plan {
            // The meter reports selected items in table order.
            measured.sort_by_key(|m| model.data_items.iter().position(|d| d.code == m.code));
        }

        let program = bounds
            .command
            .as_ref()
            .map(|cmd| cmd.get_program().to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            meter,
            items,
            measured,
            count: bounds.count,
            duration: bounds.duration,
            command: bounds.command,
            program,
            child: None,
            gate: integration_gate,
            cancel,
            interval: Duration::ZERO,
            started: None,
            produced: 0,
            stop: None,
            exit_status: None,
        })
    }

    /// Codes of the requested items, in output order.
    pub fn codes(&self) -> Vec<&'static str> {
        self.items.iter().map(|d| d.code).collect()
    }

    /// Why the read ended, `None` while it is still going.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Exit status of the monitored program, once it exited.
    pub fn child_exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Number of rows produced so far.
    pub fn rows_produced(&self) -> usize {
        self.produced
    }

    /// The update interval, known after the first row.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the read stops when integration finishes.
    pub fn integration_gate(&self) -> bool {
        self.gate
    }

    fn prepare(&mut self) -> Result<(), PowerMeterError> {
        self.interval = self.meter.interval()?;
        if self.gate {
            let state = self.meter.integration_state()?;
            if state != IntegrationState::Running {
                info!(%state, "integration is not running, ignoring it");
                self.gate = false;
            }
        }
        self.configure_items()?;

        if let Some(mut command) = self.command.take() {
            let child = command
                .spawn()
                .map_err(|source| PowerMeterError::ChildProcess {
                    program: self.program.clone(),
                    source,
                })?;
            info!(program = self.program, pid = child.id(), "started");
            self.child = Some(child);
        }

        self.started = Some(Instant::now());
        debug!(interval = ?self.interval, items = ?self.codes(), "read started");
        Ok(())
    }

    fn configure_items(&mut self) -> Result<(), PowerMeterError> {
        if self.measured.is_empty() {
            return Ok(());
        }
        let model = self.meter.model;
        let measured = self.measured.clone();
        match model.read_plan {
            ReadPlan::Indexed {
                count,
                item,
                element,
                ..
            } => self.meter.exchange(|intf| {
                intf.sendcmd(&format!("{count} {}", measured.len()))?;
                for (idx, data_item) in measured.iter().enumerate() {
                    let (wire, suffix) = match data_item.source {
                        ItemSource::Instrument { wire, per_element } => {
                            (wire, if per_element { element } else { "" })
                        }
                        _ => continue,
                    };
                    intf.sendcmd(&format!("{item}{} {wire}{suffix}", idx + 1))?;
                }
                check_error_queue(intf, "data item selection")
            }),
            ReadPlan::Selected { item, .. } => self.meter.exchange(|intf| {
                for data_item in model.data_items {
                    if let Some(wire) = data_item.wire() {
                        let on = measured.iter().any(|m| m.code == data_item.code);
                        intf.sendcmd(&format!("{item}{wire} {}", if on { "ON" } else { "OFF" }))?;
                    }
                }
                check_error_queue(intf, "data item selection")
            }),
        }
    }

    fn read_values(&mut self) -> Result<Vec<f64>, PowerMeterError> {
        let count = self.measured.len();
        if count == 0 {
            return Ok(Vec::new());
        }
        match self.meter.model.read_plan {
            ReadPlan::Indexed { value, .. } => self.meter.exchange(|intf| {
                (1..=count)
                    .map(|slot| -> Result<f64, PowerMeterError> {
                        let cmd = format!("{value} {slot}");
                        let raw = intf.query(&cmd)?;
                        Ok(codec::decode_number(&cmd, &raw)?)
                    })
                    .collect()
            }),
            ReadPlan::Selected { value, .. } => {
                let raw = self.meter.query(value)?;
                Ok(codec::decode_numbers(value, &raw, count)?)
            }
        }
    }

    fn read_row(&mut self) -> Result<SampleRow, PowerMeterError> {
        let values = self.read_values()?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let measured_value = |code: &str| {
            self.measured
                .iter()
                .position(|m| m.code == code)
                .and_then(|idx| values.get(idx).copied())
                .unwrap_or(f64::NAN)
        };

        let row = self
            .items
            .iter()
            .map(|item| {
                let value = match item.source {
                    ItemSource::Timestamp => timestamp,
                    ItemSource::Energy => data_item::energy_joules(measured_value("P"), self.interval),
                    ItemSource::Instrument { .. } => measured_value(item.code),
                };
                (item.code, value)
            })
            .collect();
        Ok(SampleRow::new(timestamp, row))
    }

    /// Bounds that need no I/O.
    fn check_limits(&self) -> Option<StopReason> {
        if self.cancel.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self.count.is_some_and(|count| self.produced >= count) {
            Some(StopReason::CountReached)
        } else {
            None
        }
    }

    fn check_termination(&mut self) -> Result<Option<StopReason>, PowerMeterError> {
        if let Some(reason) = self.check_limits() {
            return Ok(Some(reason));
        }
        let Some(started) = self.started else {
            return Ok(None);
        };
        if self.duration.is_some_and(|duration| started.elapsed() >= duration) {
            return Ok(Some(StopReason::DurationElapsed));
        }
        if self.gate
            && self.produced > 0
            && self.meter.integration_state()? == IntegrationState::Finished
        {
            return Ok(Some(StopReason::IntegrationFinished));
        }
        if let Some(child) = self.child.as_mut() {
            let status = child
                .try_wait()
                .map_err(|source| PowerMeterError::ChildProcess {
                    program: self.program.clone(),
                    source,
                })?;
            if let Some(status) = status {
                info!(program = self.program, %status, "exited");
                self.exit_status = Some(status);
                return Ok(Some(StopReason::ProcessExited));
            }
        }
        Ok(None)
    }

    fn cycle(&mut self) -> Result<Option<SampleRow>, PowerMeterError> {
        if let Some(reason) = self.check_limits() {
            return Ok(self.finish(reason));
        }

        match self.started {
            None => self.prepare()?,
            Some(started) => {
                let mut tick = started + self.interval.mul_f64(self.produced as f64);
                if let Some(duration) = self.duration {
                    tick = tick.min(started + duration);
                }
                self.cancel.sleep_until(tick);
            }
        }

        if let Some(reason) = self.check_termination()? {
            return Ok(self.finish(reason));
        }
        self.read_row().map(Some)
    }

    fn finish(&mut self, reason: StopReason) -> Option<SampleRow> {
        info!(?reason, rows = self.produced, "read finished");
        self.stop = Some(reason);
        None
    }
}

impl<T: InstrumentInterface> Iterator for Sampler<T> {
    type Item = Result<SampleRow, PowerMeterError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stop.is_some() {
            return None;
        }
        match self.cycle() {
            Ok(Some(row)) => {
                self.produced += 1;
                Some(Ok(row))
            }
            Ok(None) => None,
            Err(err) => {
                self.finish(StopReason::Failed);
                Some(Err(err))
            }
        }
    }
}
