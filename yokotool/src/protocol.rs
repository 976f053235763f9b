//! The command vocabulary shared by the command line and the command server.
//!
//! The server reads one request per line, using the same words as the command line, and
//! answers with any number of output lines followed by [`OK`] or an [`error_reply`] line.

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::duration::parse_duration;

/// Last line of a successful reply.
pub const OK: &str = "OK";

/// Ends a server connection.
pub const QUIT: &str = "quit";

/// One power meter command.
#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Request {
    /// Print all readable properties.
    Info,
    /// Read data items periodically and print them as CSV.
    Read(ReadArgs),
    /// Print the value of a property.
    Get {
        /// List the readable properties.
        #[arg(long)]
        list: bool,
        /// Property name.
        property: Option<String>,
    },
    /// Change a property. Without a value the allowed values are printed.
    Set {
        /// List the writable properties.
        #[arg(long)]
        list: bool,
        /// Property name.
        property: Option<String>,
        /// New value.
        value: Option<String>,
    },
    /// Control the integration (energy accumulation).
    Integration {
        /// What to do.
        #[command(subcommand)]
        action: IntegrationAction,
    },
    /// Run the zero level compensation.
    Calibrate,
    /// Reset the meter to factory settings.
    FactoryReset {
        /// Also turn auto ranges on and reset smoothing and integration settings.
        #[arg(long)]
        configure: bool,
    },
}

/// Arguments of `read`.
#[derive(Debug, Clone, Default, PartialEq, Args)]
pub struct ReadArgs {
    /// Comma separated data items, e.g. `T,P,V`. Without items the available ones are listed.
    #[arg(value_delimiter = ',')]
    pub items: Vec<String>,
    /// Stop after this many rows.
    #[arg(long)]
    pub count: Option<usize>,
    /// Stop after this much time, e.g. `90`, `4m30s` or `1h`.
    #[arg(long, value_parser = parse_duration)]
    pub time: Option<Duration>,
    /// Do not stop when the integration finishes.
    #[arg(long)]
    pub ignore_integration: bool,
    /// Do not print the header line.
    #[arg(long)]
    pub no_header: bool,
    /// Do not pad the columns.
    #[arg(long)]
    pub no_align: bool,
    /// Write the rows to this file.
    #[arg(short = 'o', long = "outfile")]
    pub output: Option<PathBuf>,
    /// Run this program and stop reading when it exits.
    #[arg(short = 'c', long = "command", num_args = 1.., allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Subcommands of `integration`.
#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum IntegrationAction {
    /// Start or resume integration.
    Start,
    /// Stop integration.
    Stop,
    /// Reset integration.
    Reset,
    /// Wait until the integration timer elapses.
    Wait {
        /// Give up after this much time.
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },
    /// Print the integration state.
    State,
    /// Print or change the integration mode.
    Mode {
        /// New mode.
        value: Option<String>,
    },
    /// Print or change the integration timer (seconds).
    Timer {
        /// New timer value.
        value: Option<String>,
    },
}

/// A line received by the command server.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Nothing to do.
    Empty,
    /// Close the connection.
    Quit,
    /// Run a command.
    Request(Request),
}

#[derive(Debug, Parser)]
#[command(name = "request", no_binary_name = true, disable_help_subcommand = true)]
struct Line {
    #[command(subcommand)]
    request: Request,
}

/// Parse a line received by the command server. The error is the message to send back.
pub fn parse_line(line: &str) -> Result<Message, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => return Ok(Message::Empty),
        [word] if *word == QUIT => return Ok(Message::Quit),
        _ => {}
    }

    let request = Line::try_parse_from(words)
        .map_err(|err| first_line(&err.to_string()))?
        .request;
    if let Request::Read(args) = &request {
        if !args.command.is_empty() {
            return Err("running programs is not supported by the server".to_string());
        }
        if args.output.is_some() {
            return Err("writing files is not supported by the server".to_string());
        }
    }
    Ok(Message::Request(request))
}

/// Last line of a failed reply.
pub fn error_reply(message: &str) -> String {
    format!("ERROR {}", message.lines().collect::<Vec<_>>().join(" "))
}

fn first_line(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("bad request");
    line.trim_start_matches("error: ").to_string()
}
