//! Scripted link for testing power meter drivers without hardware.

use std::{collections::VecDeque, time::Duration};

use crate::{DEFAULT_TIMEOUT, InstrumentError, InstrumentInterface};

/// Response placeholder that makes the next read time out instead of returning a line.
pub const NO_RESPONSE: &str = "\u{0}no-response";

/// A link that replays a script of expected commands and canned responses.
///
/// Commands written by the host are compared, in order, against `from_host`. Every line the host
/// reads is taken, in order, from `from_inst`. A command that does not match the script panics.
/// When the interface is dropped, [`LoopbackInterface::finalize`] checks that the whole script was
/// used.
///
/// Use [`NO_RESPONSE`] in `from_inst` to simulate a meter that does not answer.
///
/// ```
/// use yokolink::{InstrumentInterface, LoopbackInterface};
///
/// let mut link = LoopbackInterface::new(
///     vec!["*IDN?"],
///     vec!["YOKOGAWA,WT310,C2PH13047V,F1.03"],
///     "\n",
/// );
/// assert_eq!("YOKOGAWA,WT310,C2PH13047V,F1.03", link.query("*IDN?").unwrap());
/// ```
#[derive(Debug)]
pub struct LoopbackInterface {
    from_host: VecDeque<String>,
    from_inst: VecDeque<String>,
    line_end: String,
    pending: VecDeque<u8>,
    terminator: String,
    timeout: Duration,
}

impl LoopbackInterface {
    /// Create a new loopback link.
    ///
    /// # Arguments:
    /// * `from_host` - Commands expected from host to meter, without terminator.
    /// * `from_inst` - Responses from meter to host, without terminator.
    /// * `line_end` - Terminator appended to every scripted line.
    pub fn new<S: Into<String>>(from_host: Vec<S>, from_inst: Vec<S>, line_end: &str) -> Self {
        Self {
            from_host: from_host.into_iter().map(Into::into).collect(),
            from_inst: from_inst.into_iter().map(Into::into).collect(),
            line_end: line_end.to_string(),
            pending: VecDeque::new(),
            terminator: "\n".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Timeout reported to the host, the loopback itself never waits.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Panic if any part of the script was not used.
    pub fn finalize(&mut self) {
        if let Some(cmd) = self.from_host.front() {
            panic!("Leftover expected commands found from host to instrument: {cmd}");
        }
        if let Some(resp) = self.from_inst.front() {
            panic!("Leftover expected commands found from instrument to host: {resp}");
        }
    }

    /// Number of scripted commands the host has not sent yet.
    pub fn remaining_commands(&self) -> usize {
        self.from_host.len()
    }

    fn next_byte(&mut self) -> Result<u8, InstrumentError> {
        while self.pending.is_empty() {
            let resp = self
                .from_inst
                .pop_front()
                .expect("No more commands were expected from instrument to host.");
            if resp == NO_RESPONSE {
                return Err(InstrumentError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "scripted timeout",
                )));
            }
            self.pending.extend(resp.bytes().chain(self.line_end.bytes()));
        }
        Ok(self.pending.pop_front().unwrap_or_default())
    }
}

impl InstrumentInterface for LoopbackInterface {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        for byte in buf.iter_mut() {
            *byte = self.next_byte()?;
        }
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        let cmd = self
            .from_host
            .pop_front()
            .expect("No more commands were expected from host to instrument.");
        let expected = format!("{cmd}{}", self.line_end);
        assert_eq!(
            expected.as_bytes(),
            data,
            "Expected sendcmd '{expected}', got '{:?}'",
            String::from_utf8_lossy(data)
        );
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        &self.terminator
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for LoopbackInterface {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.finalize();
        }
    }
}
