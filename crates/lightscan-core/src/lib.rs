//! lightscan-core — Heading tracking, facial contour geometry and capture
//! orchestration for light-direction scans.
//!
//! Everything in this crate is free of I/O. Cameras, heading sensors, the
//! contour detector and the analysis backend are reached through the traits
//! in [`capture`].

pub mod angle;
pub mod capture;
pub mod contour;
pub mod gate;
pub mod geometry;
pub mod heading;
pub mod mask;
pub mod orchestrator;
pub mod retry;
pub mod types;

pub use angle::{smallest_signed_diff, Rotation};
pub use capture::{
    capture_sample, CaptureError, ContourDetector, DetectionError, FrameSource, NetworkError,
    SessionClient,
};
pub use contour::{Contour, ContourSet, ContourType, Point, ValidationError};
pub use gate::{SampleGate, SampleHistory};
pub use geometry::FacePolygons;
pub use heading::{HeadingEvent, HeadingTracker, NavigationPolicy, ScanPolicy};
pub use mask::{FaceMasks, GeometryError, Mask, MaskError};
pub use orchestrator::{CaptureOrchestrator, Phase, ScanObserver, Step};
pub use retry::RetryPolicy;
pub use types::{Ack, CaptureRecord, Frame, SessionId};
