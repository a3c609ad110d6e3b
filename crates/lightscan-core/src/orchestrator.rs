//! Scan session state machine.
//!
//! [`CaptureOrchestrator`] owns the heading tracker, the sample history and
//! the capture admission state. It performs no I/O: every input is a method
//! call and every piece of work it wants done is returned as a [`Step`]. The
//! owner must serialize all calls (one thread or actor), run the requested
//! work elsewhere, and report completion back through the same context.

use crate::angle::{is_valid_heading, Rotation};
use crate::capture::CaptureError;
use crate::gate::{SampleGate, SampleHistory};
use crate::heading::{HeadingEvent, HeadingTracker};

/// UI-facing notifications.
pub trait ScanObserver: Send {
    fn scan_complete(&mut self) {}
    fn sample_stored(&mut self, _heading: i32, _acked: u32) {}
    fn sample_dropped(&mut self, _heading: i32, _error: &CaptureError) {}
    fn sampling_complete(&mut self, _sent: u32, _acked: u32) {}
    fn light_direction(&mut self, _heading: i32) {}
    fn navigate(&mut self, _direction: Rotation, _magnitude: i32) {}
    fn target_reached(&mut self, _heading: i32) {}
}

/// Observer that ignores every notification.
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// Work requested by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Nothing,
    /// Run the capture pipeline for `heading`, then call
    /// [`CaptureOrchestrator::upload_started`] and
    /// [`CaptureOrchestrator::capture_finished`].
    Capture { heading: i32 },
    /// Sampling is over: fetch the aggregate light direction and pass it to
    /// [`CaptureOrchestrator::result_ready`].
    FetchResult,
    /// The user reached the target heading. The session is over.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    /// Coverage reached, waiting for outstanding uploads to settle.
    Settling,
    AwaitingResult,
    Navigating,
    Finished,
    ShutDown,
}

pub struct CaptureOrchestrator<O: ScanObserver> {
    tracker: HeadingTracker,
    gate: SampleGate,
    history: SampleHistory,
    /// Uploads that ended in a network error.
    failed_uploads: u32,
    in_flight: Option<i32>,
    phase: Phase,
    observer: O,
}

impl<O: ScanObserver> CaptureOrchestrator<O> {
    pub fn new(tracker: HeadingTracker, gate: SampleGate, observer: O) -> Self {
        Self {
            tracker,
            gate,
            history: SampleHistory::default(),
            failed_uploads: 0,
            in_flight: None,
            phase: Phase::Idle,
            observer,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &SampleHistory {
        &self.history
    }

    pub fn in_flight(&self) -> Option<i32> {
        self.in_flight
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Whether heading readings are still useful.
    pub fn wants_readings(&self) -> bool {
        matches!(self.phase, Phase::Scanning | Phase::Navigating)
    }

    /// Start a new scan, clearing coverage and sample history.
    pub fn start_scan(&mut self) {
        if self.phase == Phase::ShutDown {
            return;
        }
        self.tracker.start_scan();
        self.history = SampleHistory::default();
        self.failed_uploads = 0;
        self.in_flight = None;
        self.phase = Phase::Scanning;
    }

    /// Process one heading reading. Readings outside [0, 360) are ignored.
    pub fn on_heading(&mut self, heading: i32) -> Step {
        if !is_valid_heading(heading) {
            tracing::warn!(heading, "ignoring out-of-range heading");
            return Step::Nothing;
        }
        match self.phase {
            Phase::Scanning => self.scan_heading(heading),
            Phase::Navigating => self.navigate_heading(heading),
            _ => Step::Nothing,
        }
    }

    fn scan_heading(&mut self, heading: i32) -> Step {
        if self.tracker.update(heading) == Some(HeadingEvent::ScanComplete) {
            self.observer.scan_complete();
            self.phase = Phase::Settling;
            return self.check_settled();
        }

        if self.in_flight.is_none() && self.gate.should_sample(heading, &self.history) {
            tracing::debug!(heading, "capture admitted");
            self.in_flight = Some(heading);
            return Step::Capture { heading };
        }
        Step::Nothing
    }

    fn navigate_heading(&mut self, heading: i32) -> Step {
        match self.tracker.update(heading) {
            Some(HeadingEvent::Navigate {
                direction,
                magnitude,
            }) => {
                self.observer.navigate(direction, magnitude);
                Step::Nothing
            }
            Some(HeadingEvent::TargetReached) => {
                self.observer.target_reached(heading);
                self.phase = Phase::Finished;
                Step::Finished
            }
            Some(HeadingEvent::ScanComplete) | None => Step::Nothing,
        }
    }

    /// The in-flight capture for `heading` has been handed to the session
    /// client.
    pub fn upload_started(&mut self, heading: i32) {
        if self.phase == Phase::ShutDown || self.in_flight != Some(heading) {
            return;
        }
        self.history.sent += 1;
    }

    /// The in-flight capture for `heading` ended.
    ///
    /// Only an acknowledged upload marks the heading as sampled. A failed
    /// heading stays eligible and is retried once the device has moved out
    /// of the debounce window and back.
    pub fn capture_finished(&mut self, heading: i32, result: Result<(), CaptureError>) -> Step {
        if self.phase == Phase::ShutDown {
            return Step::Nothing;
        }
        if self.in_flight != Some(heading) {
            tracing::warn!(heading, in_flight = ?self.in_flight, "ignoring stale capture completion");
            return Step::Nothing;
        }
        self.in_flight = None;

        match result {
            Ok(()) => {
                self.history.acked += 1;
                self.history.mark_sampled(heading);
                tracing::info!(heading, acked = self.history.acked, "sample stored");
                self.observer.sample_stored(heading, self.history.acked);
            }
            Err(e) => {
                if matches!(e, CaptureError::Network(_)) {
                    self.failed_uploads += 1;
                }
                tracing::warn!(heading, error = %e, "sample dropped");
                self.observer.sample_dropped(heading, &e);
            }
        }

        if self.phase == Phase::Settling {
            return self.check_settled();
        }
        Step::Nothing
    }

    /// Sampling is complete once at most one upload is still unresolved.
    fn check_settled(&mut self) -> Step {
        let resolved = self.history.acked + self.failed_uploads;
        if resolved + 1 < self.history.sent {
            return Step::Nothing;
        }
        tracing::info!(
            sent = self.history.sent,
            acked = self.history.acked,
            failed = self.failed_uploads,
            "sampling phase complete"
        );
        self.observer
            .sampling_complete(self.history.sent, self.history.acked);
        self.phase = Phase::AwaitingResult;
        Step::FetchResult
    }

    /// The backend reported the dominant light direction: guide the user
    /// toward it.
    pub fn result_ready(&mut self, heading: i32) {
        if self.phase != Phase::AwaitingResult {
            return;
        }
        self.observer.light_direction(heading);
        self.tracker.navigate_to(heading);
        self.phase = Phase::Navigating;
    }

    /// Stop the session. Every later call is a no-op.
    pub fn shutdown(&mut self) {
        self.tracker.stop();
        self.in_flight = None;
        self.phase = Phase::ShutDown;
    }
}
