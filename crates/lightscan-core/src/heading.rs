//! Heading state machine: scan-coverage detection and target navigation.
//!
//! A scan is complete once every 90° quadrant has been seen densely enough
//! and across a wide enough arc. After the scan, the same tracker guides the
//! user toward a target heading using wrap-around angle arithmetic.

use crate::angle::{is_valid_heading, smallest_signed_diff, Rotation};
use serde::Serialize;
use std::collections::BTreeSet;

/// Number of quadrants a full turn is split into for coverage accounting.
pub const QUADRANTS: usize = 4;
const QUADRANT_SPAN: i32 = 90;

/// Thresholds deciding when a scan has enough angular coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy {
    /// Distinct headings required in every quadrant.
    pub min_headings_per_quadrant: usize,
    /// Required `max - min` spread of headings within every quadrant.
    pub min_quadrant_spread: i32,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            min_headings_per_quadrant: 50,
            min_quadrant_spread: 70,
        }
    }
}

/// Thresholds for target navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationPolicy {
    /// A heading within this many degrees of the target counts as arrival.
    pub arrival_tolerance: i32,
}

impl Default for NavigationPolicy {
    fn default() -> Self {
        Self {
            arrival_tolerance: 10,
        }
    }
}

/// Observed headings of an ongoing scan, bucketed by quadrant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanState {
    pub initial_heading: Option<i32>,
    pub buckets: [BTreeSet<i32>; QUADRANTS],
}

impl ScanState {
    /// Record a valid heading in its quadrant bucket.
    fn observe(&mut self, heading: i32) {
        debug_assert!(is_valid_heading(heading));
        self.initial_heading.get_or_insert(heading);
        self.buckets[(heading / QUADRANT_SPAN) as usize].insert(heading);
    }

    /// `max - min` of a bucket, or 0 when empty.
    fn spread(bucket: &BTreeSet<i32>) -> i32 {
        match (bucket.first(), bucket.last()) {
            (Some(min), Some(max)) => max - min,
            _ => 0,
        }
    }

    /// Whether every quadrant satisfies `policy`.
    pub fn is_complete(&self, policy: &ScanPolicy) -> bool {
        self.buckets.iter().all(|bucket| {
            bucket.len() >= policy.min_headings_per_quadrant
                && Self::spread(bucket) >= policy.min_quadrant_spread
        })
    }

    /// Per-quadrant `(distinct headings, spread)`, for progress reporting.
    pub fn coverage(&self) -> [(usize, i32); QUADRANTS] {
        std::array::from_fn(|i| (self.buckets[i].len(), Self::spread(&self.buckets[i])))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationState {
    pub target_heading: i32,
    pub last_heading: Option<i32>,
}

/// Tracker mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Scanning(ScanState),
    ScanComplete,
    Navigating(NavigationState),
    TargetReached,
}

/// Notification produced by a heading reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadingEvent {
    ScanComplete,
    Navigate { direction: Rotation, magnitude: i32 },
    TargetReached,
}

/// State machine over a stream of heading readings.
#[derive(Debug, Clone)]
pub struct HeadingTracker {
    state: TrackerState,
    scan_policy: ScanPolicy,
    nav_policy: NavigationPolicy,
}

impl Default for HeadingTracker {
    fn default() -> Self {
        Self::new(ScanPolicy::default(), NavigationPolicy::default())
    }
}

impl HeadingTracker {
    pub fn new(scan_policy: ScanPolicy, nav_policy: NavigationPolicy) -> Self {
        Self {
            state: TrackerState::Idle,
            scan_policy,
            nav_policy,
        }
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// Begin a fresh scan, discarding any previous coverage.
    pub fn start_scan(&mut self) {
        tracing::info!("heading scan started");
        self.state = TrackerState::Scanning(ScanState::default());
    }

    /// Begin guiding the user toward `target` degrees.
    pub fn navigate_to(&mut self, target: i32) {
        let target = target.rem_euclid(crate::angle::FULL_TURN);
        tracing::info!(target, "navigating to target heading");
        self.state = TrackerState::Navigating(NavigationState {
            target_heading: target,
            last_heading: None,
        });
    }

    /// Return to idle.
    pub fn stop(&mut self) {
        self.state = TrackerState::Idle;
    }

    /// Whether the tracker still needs heading readings.
    pub fn wants_readings(&self) -> bool {
        matches!(
            self.state,
            TrackerState::Scanning(_) | TrackerState::Navigating(_)
        )
    }

    /// Feed one heading reading and return the resulting event, if any.
    ///
    /// Readings outside [0, 360) are skipped.
    pub fn update(&mut self, heading: i32) -> Option<HeadingEvent> {
        if !is_valid_heading(heading) {
            tracing::warn!(heading, "skipping out-of-range heading");
            return None;
        }

        match &mut self.state {
            TrackerState::Scanning(scan) => {
                scan.observe(heading);
                if !scan.is_complete(&self.scan_policy) {
                    return None;
                }
                tracing::info!(
                    initial_heading = ?scan.initial_heading,
                    coverage = ?scan.coverage(),
                    "scan coverage complete"
                );
                self.state = TrackerState::ScanComplete;
                Some(HeadingEvent::ScanComplete)
            }
            TrackerState::Navigating(nav) => {
                nav.last_heading = Some(heading);
                let delta = smallest_signed_diff(nav.target_heading, heading);
                if delta.abs() <= self.nav_policy.arrival_tolerance {
                    tracing::info!(target = nav.target_heading, heading, "target heading reached");
                    self.state = TrackerState::TargetReached;
                    return Some(HeadingEvent::TargetReached);
                }
                Some(HeadingEvent::Navigate {
                    direction: Rotation::toward(delta),
                    magnitude: delta.abs(),
                })
            }
            TrackerState::Idle | TrackerState::ScanComplete | TrackerState::TargetReached => None,
        }
    }
}
