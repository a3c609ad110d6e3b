//! Ordered polygons derived from facial contours.
//!
//! Every polygon is a closed boundary: the last point connects back to the
//! first. Point order follows the detector's traversal direction and is
//! preserved exactly, both for rasterization and for upload.

use crate::contour::{
    ContourSet, ContourType, Point, ValidationError, FACE_CONTOUR_POINTS,
    NOSE_BRIDGE_CONTOUR_POINTS,
};
use serde::Serialize;

/// Face outline indices kept for the face-till-nose-end polygon: the upper
/// outline from the left temple (26) over the forehead to the right cheek (10).
const FACE_UPPER_TAIL: std::ops::Range<usize> = 26..FACE_CONTOUR_POINTS;
const FACE_UPPER_HEAD: std::ops::Range<usize> = 0..11;

/// Midpoint of the two nose-bridge points, truncated toward zero.
pub fn nose_midpoint(set: &ContourSet) -> Result<Point, ValidationError> {
    let bridge = set.validate_points(ContourType::NoseBridge, NOSE_BRIDGE_CONTOUR_POINTS)?;
    let n = NOSE_BRIDGE_CONTOUR_POINTS as i64;
    let (sx, sy) = bridge
        .points
        .iter()
        .fold((0i64, 0i64), |(sx, sy), p| (sx + i64::from(p.x), sy + i64::from(p.y)));
    // The mean of i32 values always fits back into i32.
    Ok(Point::new((sx / n) as i32, (sy / n) as i32))
}

/// Face outline down to the bottom of the nose.
///
/// Chin and jaw are deliberately left out so facial hair is never confused
/// with skin. The polygon is `face[26..36] ++ face[0..11] ++ reverse(nose_bottom)`.
pub fn face_till_nose_end(set: &ContourSet) -> Result<Vec<Point>, ValidationError> {
    let face = set.validate_points(ContourType::Face, FACE_CONTOUR_POINTS)?;
    let nose_bottom = set.validate(ContourType::NoseBottom)?;

    let mut polygon = Vec::with_capacity(
        FACE_UPPER_TAIL.len() + FACE_UPPER_HEAD.len() + nose_bottom.points.len(),
    );
    polygon.extend_from_slice(&face.points[FACE_UPPER_TAIL]);
    polygon.extend_from_slice(&face.points[FACE_UPPER_HEAD]);
    polygon.extend(nose_bottom.points.iter().rev());
    Ok(polygon)
}

/// Eye outline, as detected.
pub fn eye(set: &ContourSet, kind: ContourType) -> Result<Vec<Point>, ValidationError> {
    Ok(set.validate(kind)?.points.clone())
}

/// Closed eyebrow loop: the top edge followed by the bottom edge walked
/// backwards.
pub fn eyebrow_loop(
    set: &ContourSet,
    top: ContourType,
    bottom: ContourType,
) -> Result<Vec<Point>, ValidationError> {
    let top = set.validate(top)?;
    let bottom = set.validate(bottom)?;
    Ok(top
        .points
        .iter()
        .chain(bottom.points.iter().rev())
        .copied()
        .collect())
}

/// Inner mouth opening: `upper_lip_bottom ++ lower_lip_top`.
pub fn mouth_without_lips(set: &ContourSet) -> Result<Vec<Point>, ValidationError> {
    let upper = set.validate(ContourType::UpperLipBottom)?;
    let lower = set.validate(ContourType::LowerLipTop)?;
    Ok(upper.points.iter().chain(&lower.points).copied().collect())
}

/// Outer mouth outline including lips: `upper_lip_top ++ reverse(lower_lip_bottom)`.
pub fn mouth_with_lips(set: &ContourSet) -> Result<Vec<Point>, ValidationError> {
    let upper = set.validate(ContourType::UpperLipTop)?;
    let lower = set.validate(ContourType::LowerLipBottom)?;
    Ok(upper
        .points
        .iter()
        .chain(lower.points.iter().rev())
        .copied()
        .collect())
}

/// The named polygons uploaded with every sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacePolygons {
    pub face_till_nose_end: Vec<Point>,
    pub mouth_without_lips: Vec<Point>,
    pub mouth_with_lips: Vec<Point>,
    pub left_eye: Vec<Point>,
    pub right_eye: Vec<Point>,
    pub left_eyebrow: Vec<Point>,
    pub right_eyebrow: Vec<Point>,
}

impl FacePolygons {
    /// Derive every polygon from one detection result. Fails as a whole if
    /// any contour is missing, duplicated or has the wrong point count.
    pub fn from_contours(set: &ContourSet) -> Result<Self, ValidationError> {
        Ok(Self {
            face_till_nose_end: face_till_nose_end(set)?,
            mouth_without_lips: mouth_without_lips(set)?,
            mouth_with_lips: mouth_with_lips(set)?,
            left_eye: eye(set, ContourType::LeftEye)?,
            right_eye: eye(set, ContourType::RightEye)?,
            left_eyebrow: eyebrow_loop(
                set,
                ContourType::LeftEyebrowTop,
                ContourType::LeftEyebrowBottom,
            )?,
            right_eyebrow: eyebrow_loop(
                set,
                ContourType::RightEyebrowTop,
                ContourType::RightEyebrowBottom,
            )?,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_nose_midpoint() {
        let set = ContourSet::new().with(
            ContourType::NoseBridge,
            vec![Point::new(100, 100), Point::new(110, 100)],
        );
        assert_eq!(nose_midpoint(&set).unwrap(), Point::new(105, 100));
    }

    #[test]
    fn test_nose_midpoint_truncates() {
        let set = ContourSet::new().with(
            ContourType::NoseBridge,
            vec![Point::new(100, 7), Point::new(101, 8)],
        );
        assert_eq!(nose_midpoint(&set).unwrap(), Point::new(100, 7));
    }

    #[test]
    fn test_nose_midpoint_extreme_coordinates() {
        let set = ContourSet::new().with(
            ContourType::NoseBridge,
            vec![Point::new(i32::MAX, i32::MIN), Point::new(i32::MAX, i32::MIN)],
        );
        assert_eq!(
            nose_midpoint(&set).unwrap(),
            Point::new(i32::MAX, i32::MIN)
        );
    }

    #[test]
    fn test_nose_midpoint_requires_two_points() {
        let set = ContourSet::new().with(ContourType::NoseBridge, vec![Point::new(1, 1)]);
        assert!(matches!(
            nose_midpoint(&set),
            Err(ValidationError::PointCount { actual: 1, .. })
        ));
    }

    #[test]
    fn test_face_till_nose_end_point_count_and_order() {
        let face: Vec<Point> = (0..36).map(|i| Point::new(i, 0)).collect();
        let nose: Vec<Point> = (0..5).map(|i| Point::new(100 + i, 1)).collect();
        let set = ContourSet::new()
            .with(ContourType::Face, face)
            .with(ContourType::NoseBottom, nose);

        let polygon = face_till_nose_end(&set).unwrap();
        assert_eq!(polygon.len(), 26);

        let xs: Vec<i32> = polygon.iter().map(|p| p.x).collect();
        let mut expected: Vec<i32> = (26..36).chain(0..11).collect();
        expected.extend([104, 103, 102, 101, 100]);
        assert_eq!(xs, expected);
    }

    #[test]
    fn test_face_till_nose_end_rejects_short_face() {
        let set = ContourSet::new()
            .with(ContourType::Face, (0..35).map(|i| Point::new(i, 0)).collect())
            .with(ContourType::NoseBottom, rect(0, 0, 1, 1));
        assert_eq!(
            face_till_nose_end(&set),
            Err(ValidationError::PointCount {
                kind: ContourType::Face,
                expected: 36,
                actual: 35
            })
        );
    }

    #[test]
    fn test_eyebrow_loop_reverses_bottom() {
        let set = ContourSet::new()
            .with(
                ContourType::LeftEyebrowTop,
                vec![Point::new(0, 0), Point::new(1, 0), Point::new(2, 0)],
            )
            .with(
                ContourType::LeftEyebrowBottom,
                vec![Point::new(0, 1), Point::new(1, 1), Point::new(2, 1)],
            );
        let loop_points =
            eyebrow_loop(&set, ContourType::LeftEyebrowTop, ContourType::LeftEyebrowBottom)
                .unwrap();
        assert_eq!(
            loop_points,
            vec![
                Point::new(0, 0),
                Point::new(1, 0),
                Point::new(2, 0),
                Point::new(2, 1),
                Point::new(1, 1),
                Point::new(0, 1),
            ]
        );
    }

    #[test]
    fn test_mouth_polygons() {
        let set = full_face();
        let inner = mouth_without_lips(&set).unwrap();
        assert_eq!(inner.first(), Some(&Point::new(82, 140)));
        assert_eq!(inner.last(), Some(&Point::new(82, 142)));
        assert_eq!(inner.len(), 6);

        let outer = mouth_with_lips(&set).unwrap();
        assert_eq!(outer[3], Point::new(118, 150));
        assert_eq!(outer.last(), Some(&Point::new(82, 150)));
    }

    #[test]
    fn test_face_polygons_complete() {
        let polygons = FacePolygons::from_contours(&full_face()).unwrap();
        assert_eq!(polygons.face_till_nose_end.len(), 26);
        assert_eq!(polygons.left_eye.len(), 4);
        assert_eq!(polygons.right_eyebrow.len(), 6);
    }

    #[test]
    fn test_face_polygons_missing_contour_fails_whole_build() {
        let set = without(&full_face(), ContourType::LowerLipBottom);
        assert_eq!(
            FacePolygons::from_contours(&set),
            Err(ValidationError::ContourCount {
                kind: ContourType::LowerLipBottom,
                count: 0
            })
        );
    }

    #[test]
    fn test_face_polygons_serialize_as_point_lists() {
        let polygons = FacePolygons::from_contours(&full_face()).unwrap();
        let json = serde_json::to_value(&polygons).unwrap();
        assert_eq!(json["left_eye"][0], serde_json::json!([60, 70]));
        assert_eq!(json["mouth_with_lips"].as_array().unwrap().len(), 6);
    }
}
