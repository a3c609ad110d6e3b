//! lightscan-hw — Device abstractions for heading sensors and camera frames.
//!
//! Provides trace-replay heading sensors, a file-watching camera, and frame
//! sources implementing [`lightscan_core::FrameSource`].

pub mod frame;
pub mod sensor;

pub use frame::{FrameError, ImageFileCamera, LatestFrame, StillFrameSource};
pub use sensor::{HeadingCallback, HeadingSensor, ReplaySensor, SensorError};
