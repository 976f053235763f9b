//! The integration (energy accumulation) state machine.
//!
//! The meter is authoritative: every command is followed by a fresh state query instead of
//! assuming the transition happened.

use std::{
    fmt::Display,
    time::{Duration, Instant},
};

use tracing::{debug, info};
use yokolink::InstrumentInterface;

use crate::{
    CancelToken, PowerMeter, codec,
    error::{PowerMeterError, ProtocolError},
    models::StateCheck,
    property::Value,
};

/// Shortest delay between two state polls.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The meters do not accept commands right after an integration start.
pub const START_SETTLE_TIME: Duration = Duration::from_millis(200);

/// Integration state as reported by the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegrationState {
    /// Reset, nothing accumulated.
    Idle,
    /// Accumulating.
    Running,
    /// Stopped by the user, can be resumed.
    Stopped,
    /// The integration timer elapsed.
    Finished,
}

impl Display for IntegrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IntegrationState::Idle => "idle",
            IntegrationState::Running => "running",
            IntegrationState::Stopped => "stopped",
            IntegrationState::Finished => "finished",
        };
        write!(f, "{name}")
    }
}

impl<T: InstrumentInterface> PowerMeter<T> {
    /// Query the integration state.
    pub fn integration_state(&mut self) -> Result<IntegrationState, PowerMeterError> {
        let state = match self.model.integration.state {
            StateCheck::Query { query, states } => {
                let raw = self.query(query)?;
                let raw = raw.trim();
                states
                    .iter()
                    .find(|(token, _)| token.eq_ignore_ascii_case(raw))
                    .or_else(|| states.iter().find(|(token, _)| codec::abbreviates(token, raw)))
                    .map(|(_, state)| *state)
                    .ok_or_else(|| ProtocolError::MalformedResponse {
                        command: query.to_string(),
                        response: raw.to_string(),
                    })?
            }
            StateCheck::RewriteProperty(name) => {
                let current = self.get_property(name)?;
                match self.set_property(name, &current.to_string()) {
                    Ok(_) => IntegrationState::Idle,
                    Err(PowerMeterError::Instrument { .. }) => IntegrationState::Running,
                    Err(err) => return Err(err),
                }
            }
        };
        debug!(%state, "integration state");
        Ok(state)
    }

    /// Start or resume integration and return the state the meter reports afterwards.
    ///
    /// # Errors
    /// [`PowerMeterError::InvalidState`] if the meter is in continuous mode with a zero timer,
    /// which it would refuse.
    pub fn integration_start(&mut self) -> Result<IntegrationState, PowerMeterError> {
        let mode = self.get_property("integration-mode")?;
        let timer = self.get_property("integration-timer")?;
        if mode == Value::Token("continuous") && timer == Value::Seconds(0) {
            return Err(PowerMeterError::InvalidState(
                "continuous integration requires a non-zero integration timer".to_string(),
            ));
        }

        let cmd = self.model.integration.start;
        self.command(cmd)?;
        std::thread::sleep(START_SETTLE_TIME);
        info!("integration started");
        self.integration_state()
    }

    /// Stop integration and return the state the meter reports afterwards.
    pub fn integration_stop(&mut self) -> Result<IntegrationState, PowerMeterError> {
        let cmd = self.model.integration.stop;
        self.command(cmd)?;
        info!("integration stopped");
        self.integration_state()
    }

    /// Reset integration and return the state the meter reports afterwards.
    pub fn integration_reset(&mut self) -> Result<IntegrationState, PowerMeterError> {
        let cmd = self.model.integration.reset;
        self.command(cmd)?;
        info!("integration reset");
        self.integration_state()
    }

    /// Poll the integration state until it is [`IntegrationState::Finished`].
    ///
    /// `poll` is raised to [`MIN_POLL_INTERVAL`] if shorter. Without a `timeout` this waits until
    /// the meter finishes or `cancel` is triggered, in which case the last state is returned.
    ///
    /// # Errors
    /// - [`PowerMeterError::IntegrationTimedOut`] if `timeout` elapses first.
    /// - [`PowerMeterError::IntegrationNotRunning`] if integration is idle or stopped.
    pub fn wait_until_finished(
        &mut self,
        timeout: Option<Duration>,
        poll: Duration,
        cancel: &CancelToken,
    ) -> Result<IntegrationState, PowerMeterError> {
        let poll = poll.max(MIN_POLL_INTERVAL);
        let start = Instant::now();
        loop {
            let state = self.integration_state()?;
            match state {
                IntegrationState::Finished => return Ok(state),
                IntegrationState::Idle | IntegrationState::Stopped => {
                    return Err(PowerMeterError::IntegrationNotRunning(state));
                }
                IntegrationState::Running => {}
            }

            let mut wait = poll;
            if let Some(timeout) = timeout {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Err(PowerMeterError::IntegrationTimedOut(timeout));
                }
                wait = wait.min(timeout - elapsed).max(MIN_POLL_INTERVAL);
            }
            if !cancel.sleep(wait) {
                return Ok(state);
            }
        }
    }
}
