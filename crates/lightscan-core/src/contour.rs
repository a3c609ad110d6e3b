//! Named facial contours as returned by a landmark detector.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of points in a complete face outline contour.
pub const FACE_CONTOUR_POINTS: usize = 36;
/// Number of points in the nose bridge contour.
pub const NOSE_BRIDGE_CONTOUR_POINTS: usize = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expected 1 contour of type {kind}, got {count}")]
    ContourCount { kind: ContourType, count: usize },
    #[error("expected {expected} points in {kind} contour, got {actual}")]
    PointCount {
        kind: ContourType,
        expected: usize,
        actual: usize,
    },
}

/// Integer pixel coordinate.
///
/// Serialized as `[x, y]`. Deserialization accepts fractional detector
/// coordinates and truncates them toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self::new(x as i32, y as i32)
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// Facial feature outlined by a contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContourType {
    Face,
    NoseBridge,
    NoseBottom,
    LeftEye,
    RightEye,
    LeftEyebrowTop,
    LeftEyebrowBottom,
    RightEyebrowTop,
    RightEyebrowBottom,
    UpperLipTop,
    UpperLipBottom,
    LowerLipTop,
    LowerLipBottom,
}

impl ContourType {
    pub const ALL: [ContourType; 13] = [
        ContourType::Face,
        ContourType::NoseBridge,
        ContourType::NoseBottom,
        ContourType::LeftEye,
        ContourType::RightEye,
        ContourType::LeftEyebrowTop,
        ContourType::LeftEyebrowBottom,
        ContourType::RightEyebrowTop,
        ContourType::RightEyebrowBottom,
        ContourType::UpperLipTop,
        ContourType::UpperLipBottom,
        ContourType::LowerLipTop,
        ContourType::LowerLipBottom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContourType::Face => "face",
            ContourType::NoseBridge => "nose_bridge",
            ContourType::NoseBottom => "nose_bottom",
            ContourType::LeftEye => "left_eye",
            ContourType::RightEye => "right_eye",
            ContourType::LeftEyebrowTop => "left_eyebrow_top",
            ContourType::LeftEyebrowBottom => "left_eyebrow_bottom",
            ContourType::RightEyebrowTop => "right_eyebrow_top",
            ContourType::RightEyebrowBottom => "right_eyebrow_bottom",
            ContourType::UpperLipTop => "upper_lip_top",
            ContourType::UpperLipBottom => "upper_lip_bottom",
            ContourType::LowerLipTop => "lower_lip_top",
            ContourType::LowerLipBottom => "lower_lip_bottom",
        }
    }
}

impl std::fmt::Display for ContourType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected contour. Point order is the detector's traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour {
    #[serde(rename = "type")]
    pub kind: ContourType,
    pub points: Vec<Point>,
}

/// All contours detected on a single face, in detection order.
///
/// A well-formed result holds each [`ContourType`] at most once; this is
/// checked lazily by [`ContourSet::validate`] rather than on construction so
/// that malformed detector output can be represented and rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContourSet {
    pub contours: Vec<Contour>,
}

impl ContourSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a contour, preserving detection order.
    pub fn push(&mut self, kind: ContourType, points: Vec<Point>) {
        self.contours.push(Contour { kind, points });
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, kind: ContourType, points: Vec<Point>) -> Self {
        self.push(kind, points);
        self
    }

    /// Return the single contour of `kind`, or an error if it is missing or
    /// duplicated.
    pub fn validate(&self, kind: ContourType) -> Result<&Contour, ValidationError> {
        let mut found = self.contours.iter().filter(|c| c.kind == kind);
        match (found.next(), found.count()) {
            (Some(contour), 0) => Ok(contour),
            (first, rest) => Err(ValidationError::ContourCount {
                kind,
                count: usize::from(first.is_some()) + rest,
            }),
        }
    }

    /// Like [`validate`](Self::validate), additionally requiring an exact
    /// point count.
    pub fn validate_points(
        &self,
        kind: ContourType,
        expected: usize,
    ) -> Result<&Contour, ValidationError> {
        let contour = self.validate(kind)?;
        if contour.points.len() != expected {
            return Err(ValidationError::PointCount {
                kind,
                expected,
                actual: contour.points.len(),
            });
        }
        Ok(contour)
    }
}
