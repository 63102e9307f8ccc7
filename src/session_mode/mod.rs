//! Session Mode State Machine
//!
//! Tracks which input mode the classifier session is in and rejects
//! transitions the session cannot make. Only actual transitions are logged.
//!
//! ```text
//! Loading ──ok──> Idle <──> WebcamActive
//!    │             │  ^          │
//!    │             v  │          v
//!    └──fail──> Error ──> UploadActive
//! ```
//!
//! Any mode may enter `Error` or `Loading` (model reload).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Session mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Model loaded, no input source active
    Idle,
    /// Model fetch in progress
    Loading,
    /// Camera streaming, continuous inference
    WebcamActive,
    /// Static image submitted
    UploadActive,
    /// Model or source failed
    Error,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Loading => "loading",
            Mode::WebcamActive => "webcam_active",
            Mode::UploadActive => "upload_active",
            Mode::Error => "error",
        }
    }

    /// Fixed status line shown for the mode
    pub fn status_text(&self) -> &'static str {
        match self {
            Mode::Idle => "Model ready. Start the webcam or upload an image.",
            Mode::Loading => "Loading Teachable Machine model…",
            Mode::WebcamActive => "Webcam mode active. Move into frame to classify.",
            Mode::UploadActive => "Image mode active. Upload a new image to classify.",
            Mode::Error => "Model unavailable. Please refresh and try again.",
        }
    }

    /// Whether an input source may be held in this mode
    pub fn holds_source(&self) -> bool {
        matches!(self, Mode::WebcamActive | Mode::UploadActive)
    }

    pub fn can_transition_to(self, next: Mode) -> bool {
        match (self, next) {
            (_, Mode::Error) | (_, Mode::Loading) => true,
            (Mode::Loading, Mode::Idle) => true,
            (Mode::Loading, _) => false,
            (_, Mode::Idle) => true,
            (Mode::WebcamActive, Mode::WebcamActive) => false,
            (_, Mode::WebcamActive) => true,
            (_, Mode::UploadActive) => true,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applied mode change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Mode,
    pub to: Mode,
}

/// Current mode plus the cause of the last failure
#[derive(Debug, Clone)]
pub struct ModeMachine {
    mode: Mode,
    error_cause: Option<String>,
    entered_at: DateTime<Utc>,
}

impl ModeMachine {
    /// Sessions start in Loading
    pub fn new() -> Self {
        Self {
            mode: Mode::Loading,
            error_cause: None,
            entered_at: Utc::now(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn status_text(&self) -> &'static str {
        self.mode.status_text()
    }

    /// Set only while in Error
    pub fn error_cause(&self) -> Option<&str> {
        self.error_cause.as_deref()
    }

    pub fn entered_at(&self) -> DateTime<Utc> {
        self.entered_at
    }

    /// Move to `next`, rejecting transitions the table does not allow
    pub fn transition(&mut self, next: Mode) -> Result<Transition> {
        let from = self.mode;
        if !from.can_transition_to(next) {
            return Err(Error::InvalidTransition { from, to: next });
        }

        self.apply(next);
        tracing::debug!(from = %from, to = %next, "Session mode changed");
        Ok(Transition { from, to: next })
    }

    /// Enter Error with a human-readable cause
    pub fn fail(&mut self, cause: impl Into<String>) -> Transition {
        let from = self.mode;
        let cause = cause.into();
        tracing::warn!(from = %from, cause = %cause, "Session entered error mode");
        self.apply(Mode::Error);
        self.error_cause = Some(cause);
        Transition {
            from,
            to: Mode::Error,
        }
    }

    fn apply(&mut self, next: Mode) {
        self.mode = next;
        self.error_cause = None;
        self.entered_at = Utc::now();
    }
}

impl Default for ModeMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Mode; 5] = [
        Mode::Idle,
        Mode::Loading,
        Mode::WebcamActive,
        Mode::UploadActive,
        Mode::Error,
    ];

    #[test]
    fn test_initial_mode_is_loading() {
        let machine = ModeMachine::new();
        assert_eq!(machine.mode(), Mode::Loading);
        assert_eq!(machine.status_text(), "Loading Teachable Machine model…");
        assert!(machine.error_cause().is_none());
    }

    #[test]
    fn test_any_mode_can_fail_or_reload() {
        for mode in ALL {
            assert!(mode.can_transition_to(Mode::Error), "{mode} -> error");
            assert!(mode.can_transition_to(Mode::Loading), "{mode} -> loading");
        }
    }

    #[test]
    fn test_loading_only_resolves_to_idle_or_error() {
        assert!(Mode::Loading.can_transition_to(Mode::Idle));
        assert!(!Mode::Loading.can_transition_to(Mode::WebcamActive));
        assert!(!Mode::Loading.can_transition_to(Mode::UploadActive));
    }

    #[test]
    fn test_webcam_transitions() {
        assert!(Mode::Idle.can_transition_to(Mode::WebcamActive));
        assert!(Mode::WebcamActive.can_transition_to(Mode::Idle));
        assert!(Mode::UploadActive.can_transition_to(Mode::WebcamActive));
        assert!(Mode::Error.can_transition_to(Mode::WebcamActive));
        assert!(!Mode::WebcamActive.can_transition_to(Mode::WebcamActive));
    }

    #[test]
    fn test_upload_transitions() {
        for mode in [Mode::Idle, Mode::WebcamActive, Mode::UploadActive, Mode::Error] {
            assert!(mode.can_transition_to(Mode::UploadActive), "{mode} -> upload");
        }
        assert!(Mode::UploadActive.can_transition_to(Mode::Idle));
        assert!(Mode::Error.can_transition_to(Mode::Idle));
    }

    #[test]
    fn test_rejected_transition_leaves_mode() {
        let mut machine = ModeMachine::new();
        let err = machine.transition(Mode::WebcamActive).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: Mode::Loading,
                to: Mode::WebcamActive
            }
        ));
        assert_eq!(machine.mode(), Mode::Loading);
    }

    #[test]
    fn test_fail_records_cause_until_next_transition() {
        let mut machine = ModeMachine::new();
        let transition = machine.fail("Failed to load model.");
        assert_eq!(transition.from, Mode::Loading);
        assert_eq!(machine.mode(), Mode::Error);
        assert_eq!(machine.error_cause(), Some("Failed to load model."));

        machine.transition(Mode::Loading).unwrap();
        assert!(machine.error_cause().is_none());
    }

    #[test]
    fn test_mode_serializes_snake_case() {
        let json = serde_json::to_string(&Mode::WebcamActive).unwrap();
        assert_eq!(json, "\"webcam_active\"");
    }
}
