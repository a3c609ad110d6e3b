//! Compass-heading arithmetic with 360° wrap-around.

use serde::Serialize;

/// Number of degrees in a full turn.
pub const FULL_TURN: i32 = 360;

/// Returns true if `heading` is a valid compass reading in [0, 360).
pub fn is_valid_heading(heading: i32) -> bool {
    (0..FULL_TURN).contains(&heading)
}

/// Smallest signed difference `a - b` in degrees, accounting for roll-over
/// from 359 to 0.
///
/// The result lies in [-180, 180]. When the direct difference is not the
/// shorter way around the circle, the wrapped difference is returned instead.
pub fn smallest_signed_diff(a: i32, b: i32) -> i32 {
    let direct = a - b;
    let d = direct.abs();
    if d > FULL_TURN - d {
        // Roll over.
        if direct >= 0 {
            d - FULL_TURN
        } else {
            FULL_TURN - d
        }
    } else {
        direct
    }
}

/// Direction the user should turn to close the gap to a target heading.
///
/// Compass headings grow clockwise, so a positive `target - current`
/// difference means turning clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

impl Rotation {
    /// Rotation that reduces a signed `target - current` delta.
    pub fn toward(delta: i32) -> Self {
        if delta > 0 {
            Rotation::Clockwise
        } else {
            Rotation::CounterClockwise
        }
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rotation::Clockwise => f.write_str("clockwise"),
            Rotation::CounterClockwise => f.write_str("counter-clockwise"),
        }
    }
}
