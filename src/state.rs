//! Session lifecycle states and the legal transitions between them.

use crate::errors::{CameraError, Result};
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a camera session. Exactly one is current at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Opening,
    Opened,
    Streaming,
    Capturing,
    Error {
        message: String,
        #[serde(skip)]
        cause: Option<CameraError>,
    },
}

impl SessionState {
    pub fn error(cause: CameraError) -> Self {
        SessionState::Error {
            message: cause.to_string(),
            cause: Some(cause),
        }
    }

    /// True while a device handle is held.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Opened | SessionState::Streaming | SessionState::Capturing
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SessionState::Error { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Opening => "Opening",
            SessionState::Opened => "Opened",
            SessionState::Streaming => "Streaming",
            SessionState::Capturing => "Capturing",
            SessionState::Error { .. } => "Error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionState::Error { message, .. } => write!(f, "Error({})", message),
            other => f.write_str(other.name()),
        }
    }
}

/// Events that move a session between states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Open,
    DeviceOpened,
    OpenFailed(CameraError),
    PreviewStarted,
    PreviewFailed(CameraError),
    CaptureStarted,
    CaptureFinished,
    Close,
}

/// Validates triggers against the current state.
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    current: SessionState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &SessionState {
        &self.current
    }

    /// Compute the state `trigger` leads to without applying it.
    ///
    /// `Open` while active is accepted and leaves the state untouched.
    pub fn next(&self, trigger: &Trigger) -> Result<SessionState> {
        use SessionState::*;

        let next = match (&self.current, trigger) {
            (_, Trigger::Close) => Idle,
            (state, Trigger::Open) if state.is_active() => state.clone(),
            (Idle | Error { .. }, Trigger::Open) => Opening,
            (Opening, Trigger::DeviceOpened) => Opened,
            (Opening, Trigger::OpenFailed(cause)) => SessionState::error(cause.clone()),
            (Opened | Streaming, Trigger::PreviewStarted) => Streaming,
            (Opened | Streaming, Trigger::PreviewFailed(cause)) => {
                SessionState::error(cause.clone())
            }
            (Streaming, Trigger::CaptureStarted) => Capturing,
            (Capturing, Trigger::CaptureFinished) => Streaming,
            (state, trigger) => {
                return Err(CameraError::InvalidState(format!(
                    "{} cannot handle {:?}",
                    state.name(),
                    trigger
                )))
            }
        };
        Ok(next)
    }

    /// Apply `trigger`, returning the new state.
    pub fn transition(&mut self, trigger: Trigger) -> Result<&SessionState> {
        let next = self.next(&trigger)?;
        if next != self.current {
            log::debug!("Session state {} -> {}", self.current, next);
        }
        self.current = next;
        Ok(&self.current)
    }
}
