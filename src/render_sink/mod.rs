//! Render sink - what the session shows the operator
//!
//! The controller never formats output itself beyond choosing texts; every
//! visible change goes out as a `RenderEvent`.

use serde::Serialize;
use std::sync::Arc;

use crate::result_ranker::{RankedEntry, RankedResult};
use crate::session_mode::Mode;

pub const NO_PREDICTIONS_TEXT: &str = "No predictions to show yet.";
pub const LOW_CONFIDENCE_TEXT: &str = "Low confidence across all classes.";
pub const REQUESTING_CAMERA_TEXT: &str = "Requesting camera access…";
pub const ANALYZING_IMAGE_TEXT: &str = "Analyzing image…";

/// Visible state change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RenderEvent {
    ModeChanged(ModeView),
    Busy(BusyView),
    Results(ResultView),
    Media(MediaView),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeView {
    pub mode: Mode,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `None` clears the indicator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusyView {
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    NoPredictions,
    LowConfidence,
}

impl EmptyReason {
    pub fn message(&self) -> &'static str {
        match self {
            EmptyReason::NoPredictions => NO_PREDICTIONS_TEXT,
            EmptyReason::LowConfidence => LOW_CONFIDENCE_TEXT,
        }
    }
}

/// Results pane content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultView {
    Ranked { entries: Vec<RankedEntry> },
    Empty { reason: EmptyReason, message: String },
    Error { message: String },
}

impl ResultView {
    pub fn empty(reason: EmptyReason) -> Self {
        ResultView::Empty {
            reason,
            message: reason.message().to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ResultView::Error {
            message: message.into(),
        }
    }
}

impl From<RankedResult> for ResultView {
    fn from(result: RankedResult) -> Self {
        match result {
            RankedResult::NoPredictions => ResultView::empty(EmptyReason::NoPredictions),
            RankedResult::BelowThreshold => ResultView::empty(EmptyReason::LowConfidence),
            RankedResult::Ranked(entries) => ResultView::Ranked { entries },
        }
    }
}

/// Media pane content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaView {
    None,
    Camera,
    Image { url: String },
}

/// Receives render events from the session controller
pub trait RenderSink: Send + Sync + 'static {
    fn render(&self, event: RenderEvent);
}

impl<T: RenderSink> RenderSink for Arc<T> {
    fn render(&self, event: RenderEvent) {
        (**self).render(event)
    }
}
