//! Error types of the power meter engine.

use std::time::Duration;

use thiserror::Error;
use yokolink::InstrumentError;

use crate::IntegrationState;

/// Errors raised by a power meter session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PowerMeterError {
    /// Bad model, section or device node in the configuration.
    #[error("{0}")]
    Configuration(String),
    /// The model name is not known, or the device identified as an unsupported model.
    #[error("unknown power meter model '{0}'")]
    UnknownModel(String),
    /// The link failed.
    #[error(transparent)]
    Transport(#[from] InstrumentError),
    /// The meter answered something the codec could not decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The request was rejected before any I/O.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The meter reported an error in its error queue after `command`.
    #[error("'{command}' failed: {message} (error {code})")]
    Instrument {
        /// Command that caused the error.
        command: String,
        /// Instrument error code.
        code: i32,
        /// Human readable message.
        message: String,
    },
    /// The operation is not possible in the current meter configuration or state.
    #[error("{0}")]
    InvalidState(String),
    /// Integration did not finish within the timeout.
    #[error("integration did not finish within {0:?}")]
    IntegrationTimedOut(Duration),
    /// Integration is in a state that never finishes by itself.
    #[error("integration is {0}, it will not finish by itself")]
    IntegrationNotRunning(IntegrationState),
    /// Starting the external program failed.
    #[error("failed to start '{program}': {source}")]
    ChildProcess {
        /// Program that was started.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// A response did not have the expected shape.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The raw response can not be decoded for `command`.
    #[error("malformed response to '{command}': '{response}'")]
    MalformedResponse {
        /// Command the response belongs to.
        command: String,
        /// The raw response.
        response: String,
    },
}

/// Requests rejected before anything is sent to the meter.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// The model has no property with this name.
    #[error("unsupported property '{0}'")]
    UnsupportedProperty(String),
    /// The model has no data item with this code.
    #[error("unsupported data item '{0}'")]
    UnsupportedItem(String),
    /// The value is not in the property's domain. `allowed` is the full list of allowed values.
    #[error("invalid value '{value}' for '{property}', use: {}", allowed.join(", "))]
    InvalidValue {
        /// The property.
        property: String,
        /// The rejected input.
        value: String,
        /// Allowed values, as listed for the property.
        allowed: Vec<String>,
    },
    /// The property can not be read.
    #[error("property '{0}' is not readable")]
    NotReadable(String),
    /// The property can not be written.
    #[error("property '{0}' is not writable")]
    NotWritable(String),
    /// More instrument items were requested than the meter can report at once.
    #[error("too many data items: {requested} requested, at most {max} supported")]
    TooManyItems {
        /// Number of instrument items requested.
        requested: usize,
        /// Maximum supported by the model.
        max: usize,
    },
    /// No data items were requested.
    #[error("no data items given")]
    MissingValue,
}
