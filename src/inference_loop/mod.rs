//! Inference Loop Scheduler
//!
//! ## Responsibilities
//!
//! - Continuous webcam loop: one tick per frame-clock beat while scheduled
//! - Throttle engine calls against the time of the last completed prediction
//! - Hold at most one in-flight engine call
//! - Cooperative cancellation via a generation counter; completions from an
//!   older generation are reported stale and must not be rendered
//!
//! The scheduler owns no camera or engine. The session controller captures
//! frames, builds the engine future and hands it to `dispatch`.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::Instant;

use crate::inference_engine::{InferenceError, Prediction};

pub type InferenceFuture = BoxFuture<'static, Result<Vec<Prediction>, InferenceError>>;

/// Token for one scheduled tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickHandle {
    generation: u64,
    sequence: u64,
}

impl TickHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Finished engine call
#[derive(Debug)]
pub struct Completion {
    pub generation: u64,
    /// Loop was cancelled or restarted while the call was running
    pub stale: bool,
    pub result: Result<Vec<Prediction>, InferenceError>,
    pub started_at: Instant,
    pub finished_at: Instant,
}

impl Completion {
    pub fn latency(&self) -> Duration {
        self.finished_at.duration_since(self.started_at)
    }
}

struct InFlight {
    generation: u64,
    started_at: Instant,
    future: InferenceFuture,
}

pub struct InferenceLoop {
    throttle: Duration,
    running: bool,
    generation: u64,
    sequence: u64,
    scheduled: Option<TickHandle>,
    last_prediction_at: Option<Instant>,
    in_flight: Option<InFlight>,
    dispatched: u64,
}

impl InferenceLoop {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            running: false,
            generation: 0,
            sequence: 0,
            scheduled: None,
            last_prediction_at: None,
            in_flight: None,
            dispatched: 0,
        }
    }

    /// Begin a new loop generation and schedule its first tick
    pub fn start(&mut self) -> TickHandle {
        self.generation += 1;
        self.running = true;
        self.last_prediction_at = None;
        tracing::debug!(generation = self.generation, "Inference loop started");
        self.schedule()
    }

    /// Stop scheduling; any in-flight call becomes stale.
    /// Returns whether the loop was running.
    pub fn cancel(&mut self) -> bool {
        let was_running = self.running;
        self.running = false;
        self.scheduled = None;
        self.generation += 1;
        if was_running {
            tracing::debug!(generation = self.generation, "Inference loop cancelled");
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Consume the scheduled tick, if it belongs to the current generation
    pub fn take_tick(&mut self) -> Option<TickHandle> {
        let handle = self.scheduled.take()?;
        (self.running && handle.generation == self.generation).then_some(handle)
    }

    /// Schedule the next tick of a running loop
    pub fn reschedule(&mut self) -> Option<TickHandle> {
        if !self.running {
            return None;
        }
        Some(self.schedule())
    }

    fn schedule(&mut self) -> TickHandle {
        self.sequence += 1;
        let handle = TickHandle {
            generation: self.generation,
            sequence: self.sequence,
        };
        self.scheduled = Some(handle);
        handle
    }

    pub fn throttle_allows(&self, now: Instant) -> bool {
        match self.last_prediction_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.throttle,
        }
    }

    pub fn record_prediction(&mut self, at: Instant) {
        self.last_prediction_at = Some(at);
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Take ownership of an engine call. Refused while another is in flight.
    pub fn dispatch(&mut self, future: InferenceFuture, now: Instant) -> bool {
        if self.in_flight.is_some() {
            tracing::warn!("Inference call refused, previous call still in flight");
            return false;
        }
        self.in_flight = Some(InFlight {
            generation: self.generation,
            started_at: now,
            future,
        });
        self.dispatched += 1;
        true
    }

    /// Number of engine calls dispatched over the loop's lifetime
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Wait for the in-flight call. Pending forever when there is none.
    ///
    /// Cancel safe: dropping this future leaves the call in flight.
    pub async fn next_completion(&mut self) -> Completion {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return std::future::pending().await;
        };

        let result = (&mut in_flight.future).await;
        let generation = in_flight.generation;
        let started_at = in_flight.started_at;
        self.in_flight = None;

        Completion {
            generation,
            stale: generation != self.generation,
            result,
            started_at,
            finished_at: Instant::now(),
        }
    }

    /// Drain the in-flight call before a new source or model starts
    pub async fn settle(&mut self) -> Option<Completion> {
        if !self.has_in_flight() {
            return None;
        }
        let completion = self.next_completion().await;
        tracing::debug!(
            stale = completion.stale,
            latency_ms = completion.latency().as_millis() as u64,
            "Settled in-flight inference"
        );
        Some(completion)
    }
}
