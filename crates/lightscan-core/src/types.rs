use crate::contour::Point;
use crate::geometry::FacePolygons;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A camera frame as delivered by a frame source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Monotonic producer sequence number.
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// JPEG-encode the frame at `quality` (1–100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::new();
        self.image
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
        Ok(buf)
    }
}

/// Identifier of a backend analysis session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend acknowledgment of an uploaded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub heading: i32,
}

/// One accepted sample, ready for upload.
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    pub heading: i32,
    /// JPEG-encoded frame.
    pub image: Vec<u8>,
    pub nose_midpoint: Point,
    pub polygons: FacePolygons,
}
