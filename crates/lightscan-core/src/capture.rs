//! Capture pipeline and the external collaborators it drives.
//!
//! One capture turns the most recent camera frame into a [`CaptureRecord`]:
//! contour detection, polygon and mask derivation, then JPEG encoding.
//! Uploading the record is left to the caller so that it can apply its own
//! retry policy.

use crate::contour::{ContourSet, ValidationError};
use crate::geometry::{self, FacePolygons};
use crate::mask::{FaceMasks, GeometryError, MaskError};
use crate::types::{Ack, CaptureRecord, Frame, SessionId};
use thiserror::Error;

/// Default JPEG quality for uploaded frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("expected 1 face, got {0}")]
    FaceCount(usize),
    #[error("contour detection failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned HTTP {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no camera frame available yet")]
    NoFrame,
    #[error("detection: {0}")]
    Detection(#[from] DetectionError),
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),
    #[error("geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("upload: {0}")]
    Network(#[from] NetworkError),
}

impl From<MaskError> for CaptureError {
    fn from(e: MaskError) -> Self {
        match e {
            MaskError::Validation(e) => CaptureError::Validation(e),
            MaskError::Geometry(e) => CaptureError::Geometry(e),
        }
    }
}

/// Pull-based access to the most recent camera frame. No queueing: a frame
/// not pulled before the next one arrives is lost.
pub trait FrameSource: Send + Sync {
    fn latest_frame(&self) -> Option<Frame>;
}

/// Facial contour detection. Exactly one face must be present in the frame.
pub trait ContourDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<ContourSet, DetectionError>;
}

/// Backend analysis session.
pub trait SessionClient: Send + Sync {
    fn create_session(&self) -> Result<SessionId, NetworkError>;
    fn upload_sample(&self, session: &SessionId, record: &CaptureRecord)
        -> Result<Ack, NetworkError>;
    /// Dominant light direction, in compass degrees.
    fn aggregate_result(&self, session: &SessionId) -> Result<i32, NetworkError>;
}

impl<T: FrameSource + ?Sized> FrameSource for std::sync::Arc<T> {
    fn latest_frame(&self) -> Option<Frame> {
        (**self).latest_frame()
    }
}

impl<T: SessionClient + ?Sized> SessionClient for std::sync::Arc<T> {
    fn create_session(&self) -> Result<SessionId, NetworkError> {
        (**self).create_session()
    }

    fn upload_sample(
        &self,
        session: &SessionId,
        record: &CaptureRecord,
    ) -> Result<Ack, NetworkError> {
        (**self).upload_sample(session, record)
    }

    fn aggregate_result(&self, session: &SessionId) -> Result<i32, NetworkError> {
        (**self).aggregate_result(session)
    }
}

/// Build a [`CaptureRecord`] for `heading` from the latest frame.
///
/// Masks are built and discarded here: they only gate the sample. A frame
/// whose face mask is empty (face entirely off-frame) is rejected.
pub fn capture_sample(
    frames: &dyn FrameSource,
    detector: &mut dyn ContourDetector,
    heading: i32,
    jpeg_quality: u8,
) -> Result<CaptureRecord, CaptureError> {
    let frame = frames.latest_frame().ok_or(CaptureError::NoFrame)?;
    let contours = detector.detect(&frame)?;

    let masks = FaceMasks::build(&contours, frame.width(), frame.height())?;
    if masks.face.is_empty() {
        return Err(GeometryError::EmptyMask.into());
    }

    let polygons = FacePolygons::from_contours(&contours)?;
    let nose_midpoint = geometry::nose_midpoint(&contours)?;
    let image = frame.encode_jpeg(jpeg_quality)?;

    tracing::debug!(
        heading,
        frame = frame.sequence,
        jpeg_bytes = image.len(),
        "capture record built"
    );

    Ok(CaptureRecord {
        heading,
        image,
        nose_midpoint,
        polygons,
    })
}

#[cfg(test)]
pub(crate) mod mocks {
    use super::*;
    use image::RgbImage;
    use std::sync::Mutex;

    pub struct StaticFrames(pub Option<Frame>);

    impl FrameSource for StaticFrames {
        fn latest_frame(&self) -> Option<Frame> {
            self.0.clone()
        }
    }

    pub fn frame(width: u32, height: u32) -> Frame {
        Frame::new(RgbImage::from_pixel(width, height, image::Rgb([180, 140, 120])), 7)
    }

    /// Replays a fixed detection outcome and counts calls.
    pub struct ScriptedDetector {
        pub outcome: Result<ContourSet, DetectionError>,
        pub calls: usize,
    }

    impl ContourDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<ContourSet, DetectionError> {
            self.calls += 1;
            self.outcome.clone()
        }
    }

    #[derive(Default)]
    pub struct RecordingSession {
        pub uploads: Mutex<Vec<i32>>,
        pub fail_uploads: bool,
    }

    impl SessionClient for RecordingSession {
        fn create_session(&self) -> Result<SessionId, NetworkError> {
            Ok(SessionId("session-1".into()))
        }

        fn upload_sample(
            &self,
            _session: &SessionId,
            record: &CaptureRecord,
        ) -> Result<Ack, NetworkError> {
            if self.fail_uploads {
                return Err(NetworkError::Status(503));
            }
            self.uploads
                .lock()
                .map_err(|e| NetworkError::Transport(e.to_string()))?
                .push(record.heading);
            Ok(Ack {
                heading: record.heading,
            })
        }

        fn aggregate_result(&self, _session: &SessionId) -> Result<i32, NetworkError> {
            Ok(135)
        }
    }
}
