//! Admission control for per-heading samples.

use crate::angle::smallest_signed_diff;
use std::collections::BTreeSet;

/// Headings already sampled during a scan, plus upload counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleHistory {
    pub sampled_headings: BTreeSet<i32>,
    pub last_sampled_heading: Option<i32>,
    /// Uploads submitted to the session client.
    pub sent: u32,
    /// Uploads acknowledged by the session client.
    pub acked: u32,
}

impl SampleHistory {
    /// Record a heading whose capture completed end to end.
    ///
    /// Must only be called after the upload was acknowledged; a failed
    /// capture leaves the heading eligible again.
    pub fn mark_sampled(&mut self, heading: i32) {
        self.sampled_headings.insert(heading);
        self.last_sampled_heading = Some(heading);
    }
}

/// Debounce rule deciding whether a heading is worth sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleGate {
    /// Minimum angular distance from the last sampled heading.
    pub debounce_degrees: i32,
}

impl Default for SampleGate {
    fn default() -> Self {
        Self {
            debounce_degrees: 10,
        }
    }
}

impl SampleGate {
    pub fn new(debounce_degrees: i32) -> Self {
        Self { debounce_degrees }
    }

    pub fn should_sample(&self, heading: i32, history: &SampleHistory) -> bool {
        if history.sampled_headings.contains(&heading) {
            return false;
        }
        match history.last_sampled_heading {
            Some(last) => smallest_signed_diff(last, heading).abs() >= self.debounce_degrees,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_with(headings: &[i32]) -> SampleHistory {
        let mut history = SampleHistory::default();
        for &h in headings {
            history.mark_sampled(h);
        }
        history
    }

    #[test]
    fn test_first_heading_accepted() {
        assert!(SampleGate::default().should_sample(123, &SampleHistory::default()));
    }

    #[test]
    fn test_debounce_window() {
        let gate = SampleGate::default();
        let history = history_with(&[100]);
        assert!(!gate.should_sample(100, &history));
        assert!(!gate.should_sample(109, &history));
        assert!(!gate.should_sample(91, &history));
        assert!(gate.should_sample(111, &history));
        assert!(gate.should_sample(89, &history));
    }

    #[test]
    fn test_debounce_boundary_is_exclusive() {
        // Only differences strictly below the window are rejected.
        let history = history_with(&[100]);
        assert!(SampleGate::default().should_sample(110, &history));
    }

    #[test]
    fn test_debounce_wraps_around_north() {
        let gate = SampleGate::default();
        let history = history_with(&[355]);
        assert!(!gate.should_sample(3, &history));
        assert!(gate.should_sample(6, &history));
    }

    #[test]
    fn test_previously_sampled_heading_rejected() {
        let gate = SampleGate::default();
        let history = history_with(&[40, 200]);
        assert_eq!(history.last_sampled_heading, Some(200));
        assert!(!gate.should_sample(40, &history));
        assert!(gate.should_sample(60, &history));
    }
}
