//! Contour detector adapters.
//!
//! Both adapters consume the detection service's response format:
//! `{"faces": [{"contours": [{"type": "face", "points": [[x, y], ...]}]}]}`.

use lightscan_core::{Contour, ContourDetector, ContourSet, DetectionError, Frame};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Deserialize)]
struct DetectionResponse {
    faces: Vec<DetectedFace>,
}

#[derive(Deserialize)]
struct DetectedFace {
    contours: Vec<Contour>,
}

/// Parse a detection response, requiring exactly one face.
pub fn parse_detection(body: &[u8]) -> Result<ContourSet, DetectionError> {
    let response: DetectionResponse =
        serde_json::from_slice(body).map_err(|e| DetectionError::Failed(e.to_string()))?;
    let count = response.faces.len();
    let mut faces = response.faces.into_iter();
    match (faces.next(), count) {
        (Some(face), 1) => Ok(ContourSet {
            contours: face.contours,
        }),
        _ => Err(DetectionError::FaceCount(count)),
    }
}

/// Sends each frame as JPEG to a remote detection service.
pub struct RemoteContourDetector {
    client: Client,
    url: String,
    jpeg_quality: u8,
}

impl RemoteContourDetector {
    pub fn new(url: &str, timeout: Duration, jpeg_quality: u8) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectionError::Failed(e.to_string()))?;
        Ok(Self::with_client(client, url, jpeg_quality))
    }

    pub fn with_client(client: Client, url: &str, jpeg_quality: u8) -> Self {
        Self {
            client,
            url: url.to_string(),
            jpeg_quality,
        }
    }
}

impl ContourDetector for RemoteContourDetector {
    fn detect(&mut self, frame: &Frame) -> Result<ContourSet, DetectionError> {
        let failed = |e: &dyn std::fmt::Display| DetectionError::Failed(e.to_string());

        let jpeg = frame.encode_jpeg(self.jpeg_quality).map_err(|e| failed(&e))?;
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .map_err(|e| failed(&e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DetectionError::Failed(format!("detector returned HTTP {status}")));
        }
        let body = resp.bytes().map_err(|e| failed(&e))?;
        let set = parse_detection(&body)?;
        tracing::debug!(frame = frame.sequence, contours = set.contours.len(), "contours detected");
        Ok(set)
    }
}

/// Replays a recorded detection response for every frame.
pub struct ContourFileDetector {
    body: Vec<u8>,
}

impl ContourFileDetector {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read(path)?;
        tracing::info!(path = %path.display(), "loaded recorded detection");
        Ok(Self { body })
    }
}

impl ContourDetector for ContourFileDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<ContourSet, DetectionError> {
        parse_detection(&self.body)
    }
}
