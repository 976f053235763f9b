//! Runs a [`Request`] against a power meter session and writes the output lines.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    process::{Command, ExitStatus},
    time::Duration,
};

use thiserror::Error;
use yokogawa_wt::{
    CancelToken, IntegrationState, PowerMeter, PowerMeterError, PropertyDescriptor, ReadBounds,
    StopReason, ValidationError, csv::CsvFormatter,
};
use yokolink::InstrumentInterface;

use crate::protocol::{IntegrationAction, ReadArgs, Request};

/// Poll interval of `integration wait`.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Where output lines go.
pub trait ReplySink {
    /// Write one line.
    fn line(&mut self, line: &str) -> io::Result<()>;
}

/// Writes lines to any [`Write`], flushing after every line.
pub struct WriterSink<W: Write>(W);

impl<W: Write> WriterSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self(writer)
    }

    /// The wrapped writer.
    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: Write> ReplySink for WriterSink<W> {
    fn line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.0, "{line}")?;
        self.0.flush()
    }
}

impl ReplySink for Vec<String> {
    fn line(&mut self, line: &str) -> io::Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

/// Errors of a command.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommandError {
    /// The power meter operation failed.
    #[error(transparent)]
    PowerMeter(#[from] PowerMeterError),
    /// The command was used wrongly.
    #[error("{0}")]
    Usage(String),
    /// Writing output failed.
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl From<ValidationError> for CommandError {
    fn from(err: ValidationError) -> Self {
        CommandError::PowerMeter(err.into())
    }
}

/// How a command ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Outcome {
    /// Done.
    #[default]
    Done,
    /// Stopped by cancellation.
    Interrupted,
    /// The program run by `read -c` failed, with this exit code.
    ProgramFailed(i32),
}

/// Run `request`, writing its output to `sink`.
pub fn execute<T: InstrumentInterface>(
    meter: &mut PowerMeter<T>,
    request: &Request,
    sink: &mut dyn ReplySink,
    cancel: &CancelToken,
) -> Result<Outcome, CommandError> {
    match request {
        Request::Info => {
            for (prop, value) in meter.info()? {
                sink.line(&format!("{}: {value}", capitalize(prop.description)))?;
            }
        }
        Request::Read(args) => return read(meter, args, sink, cancel),
        Request::Get { list: true, .. } => list_properties(meter.model().readable_properties(), sink)?,
        Request::Get { property: None, .. } => {
            return Err(CommandError::Usage(
                "specify the property to get, use 'get --list' to list them".to_string(),
            ));
        }
        Request::Get {
            property: Some(name),
            ..
        } => sink.line(&meter.get_property(name)?.to_string())?,
        Request::Set { list: true, .. } => list_properties(meter.model().writable_properties(), sink)?,
        Request::Set { property: None, .. } => {
            return Err(CommandError::Usage(
                "specify the property to set, use 'set --list' to list them".to_string(),
            ));
        }
        Request::Set {
            property: Some(name),
            value: None,
            ..
        } => {
            let prop = meter
                .model()
                .property(name)
                .ok_or_else(|| ValidationError::UnsupportedProperty(name.clone()))?;
            if !prop.writable {
                return Err(ValidationError::NotWritable(name.clone()).into());
            }
            sink.line(&format!("Use: {}", meter.list_allowed_values(name)?.join(", ")))?;
        }
        Request::Set {
            property: Some(name),
            value: Some(value),
            ..
        } => {
            meter.set_property(name, value)?;
        }
        Request::Integration { action } => return integration(meter, action, sink, cancel),
        Request::Calibrate => {
            let result = if meter.calibrate()? { "succeeded" } else { "failed" };
            sink.line(&format!("calibration {result}"))?;
        }
        Request::FactoryReset { configure } => meter.factory_reset(*configure)?,
    }
    Ok(Outcome::Done)
}

fn list_properties(props: Vec<&'static PropertyDescriptor>, sink: &mut dyn ReplySink) -> io::Result<()> {
    for prop in props {
        sink.line(&format!(" * {} - {}", prop.name, prop.description))?;
    }
    Ok(())
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn integration<T: InstrumentInterface>(
    meter: &mut PowerMeter<T>,
    action: &IntegrationAction,
    sink: &mut dyn ReplySink,
    cancel: &CancelToken,
) -> Result<Outcome, CommandError> {
    let state = match action {
        IntegrationAction::Start => meter.integration_start()?,
        IntegrationAction::Stop => meter.integration_stop()?,
        IntegrationAction::Reset => meter.integration_reset()?,
        IntegrationAction::State => meter.integration_state()?,
        IntegrationAction::Wait { timeout } => {
            let state = meter.wait_until_finished(*timeout, WAIT_POLL_INTERVAL, cancel)?;
            if state != IntegrationState::Finished {
                return Ok(Outcome::Interrupted);
            }
            state
        }
        IntegrationAction::Mode { value } => return property(meter, "integration-mode", value, sink),
        IntegrationAction::Timer { value } => return property(meter, "integration-timer", value, sink),
    };
    sink.line(&state.to_string())?;
    Ok(Outcome::Done)
}

fn property<T: InstrumentInterface>(
    meter: &mut PowerMeter<T>,
    name: &str,
    value: &Option<String>,
    sink: &mut dyn ReplySink,
) -> Result<Outcome, CommandError> {
    match value {
        Some(value) => {
            meter.set_property(name, value)?;
        }
        None => sink.line(&meter.get_property(name)?.to_string())?,
    }
    Ok(Outcome::Done)
}

fn read<T: InstrumentInterface>(
    meter: &mut PowerMeter<T>,
    args: &ReadArgs,
    sink: &mut dyn ReplySink,
    cancel: &CancelToken,
) -> Result<Outcome, CommandError> {
    let codes: Vec<&str> = args
        .items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .collect();
    if codes.is_empty() {
        sink.line("Use the following data items:")?;
        for item in meter.model().data_items {
            sink.line(&format!(" * {} - {}", item.code, item.description))?;
        }
        return Ok(Outcome::Done);
    }

    let command = args.command.split_first().map(|(program, rest)| {
        let mut command = Command::new(program);
        command.args(rest);
        command
    });
    let bounds = ReadBounds {
        count: args.count,
        duration: args.time,
        command,
    };
    let mut sampler = meter.sampler(&codes, bounds, !args.ignore_integration, cancel.clone())?;

    let mut file_sink;
    let out: &mut dyn ReplySink = match &args.output {
        Some(path) => {
            let file = File::create(path).map_err(|err| {
                CommandError::Usage(format!("cannot open '{}': {err}", path.display()))
            })?;
            file_sink = WriterSink::new(BufWriter::new(file));
            &mut file_sink
        }
        None => sink,
    };

    let mut csv = CsvFormatter::new(meter.model(), !args.no_align);
    if !args.no_header {
        out.line(&csv.header(&sampler.codes()))?;
    }
    for row in &mut sampler {
        out.line(&csv.format_row(&row?))?;
    }

    Ok(match sampler.stop_reason() {
        Some(StopReason::Cancelled) => Outcome::Interrupted,
        Some(StopReason::ProcessExited) => match sampler.child_exit_status() {
            Some(status) if !status.success() => Outcome::ProgramFailed(failure_code(status)),
            _ => Outcome::Done,
        },
        _ => Outcome::Done,
    })
}

/// Exit code for a failed program. Killed by a signal it is 128 plus the signal number, as
/// shells report it.
fn failure_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
