use anyhow::{Context, Result};
use lightscan_core::{ContourDetector, FrameSource, HeadingTracker, SessionClient};
use lightscan_hw::{HeadingSensor, ImageFileCamera, ReplaySensor, StillFrameSource};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod detector;
mod engine;
mod session;

use config::Config;
use detector::{ContourFileDetector, RemoteContourDetector};
use engine::{EngineParts, EngineSettings, SessionOutcome};
use session::HttpSessionClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("lightscand starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        backend = %config.backend_url,
        user = %config.user_id,
        samples_per_quadrant = config.min_headings_per_quadrant,
        quadrant_spread = config.min_quadrant_spread,
        "configuration loaded"
    );

    let mut sensor = open_sensor(&config)?;
    if !sensor.is_available() {
        anyhow::bail!("heading sensor unavailable");
    }

    // The HTTP clients block, so set up the session off the async runtime.
    let setup_config = config.clone();
    let (engine, mut camera) = tokio::task::spawn_blocking(move || start_session(&setup_config))
        .await
        .context("session setup task failed")??;

    let handle = engine.handle.clone();
    sensor
        .start(Box::new(move |heading| handle.post_heading(heading)))
        .context("failed to start heading sensor")?;

    tracing::info!("lightscand ready, turn slowly in a full circle");

    tokio::select! {
        outcome = engine.outcome => match outcome {
            Ok(SessionOutcome::TargetReached { light_direction }) => {
                tracing::info!(light_direction, "scan session complete");
            }
            Ok(SessionOutcome::ResultUnavailable(e)) => {
                tracing::error!(error = %e, "scan session failed");
            }
            Err(_) => tracing::warn!("engine stopped without a result"),
        },
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupted");
        }
    }

    sensor.stop();
    if let Some(camera) = camera.as_mut() {
        camera.stop();
    }
    if engine.handle.shutdown().await.is_err() {
        tracing::debug!("engine already stopped");
    }
    let thread = engine.thread;
    tokio::task::spawn_blocking(move || thread.join())
        .await?
        .map_err(|_| anyhow::anyhow!("engine thread panicked"))?;

    tracing::info!("lightscand shutting down");
    Ok(())
}

fn open_sensor(config: &Config) -> Result<ReplaySensor> {
    let path = config
        .heading_trace
        .as_ref()
        .context("LIGHTSCAN_HEADING_TRACE is not set")?;
    Ok(ReplaySensor::from_file(path, config.sensor_rate_hz)
        .with_context(|| format!("failed to load heading trace {}", path.display()))?
        .looping(config.loop_trace))
}

/// Frames come from a watched image file when polling is configured, else
/// from a still image loaded once.
fn open_frames(config: &Config) -> Result<(Arc<dyn FrameSource>, Option<ImageFileCamera>)> {
    let path = config
        .frame_image
        .as_ref()
        .context("LIGHTSCAN_FRAME_IMAGE is not set")?;
    match config.frame_poll() {
        Some(interval) => {
            let mut camera = ImageFileCamera::new(path, interval);
            camera
                .start()
                .with_context(|| format!("failed to start camera on {}", path.display()))?;
            let frames: Arc<dyn FrameSource> = camera.frames();
            Ok((frames, Some(camera)))
        }
        None => Ok((Arc::new(StillFrameSource::open(path)?), None)),
    }
}

fn open_detector(config: &Config) -> Result<Box<dyn ContourDetector>> {
    if let Some(url) = &config.detector_url {
        tracing::info!(url = %url, "using remote contour detector");
        let detector =
            RemoteContourDetector::new(url, config.request_timeout(), config.jpeg_quality())?;
        return Ok(Box::new(detector));
    }
    let path = config
        .contours_file
        .as_ref()
        .context("neither LIGHTSCAN_DETECTOR_URL nor LIGHTSCAN_CONTOURS_FILE is set")?;
    let detector = ContourFileDetector::open(path)
        .with_context(|| format!("failed to load recorded detection {}", path.display()))?;
    Ok(Box::new(detector))
}

fn start_session(config: &Config) -> Result<(engine::Engine, Option<ImageFileCamera>)> {
    let (frames, camera) = open_frames(config)?;
    let detector = open_detector(config)?;

    let session = Arc::new(HttpSessionClient::new(
        &config.backend_url,
        &config.user_id,
        config.request_timeout(),
        config.upload_retry(),
    )?);
    let session_id = session
        .create_session()
        .context("failed to create backend session")?;

    let engine = engine::spawn_engine(
        EngineParts {
            frames,
            detector,
            session,
            session_id,
        },
        EngineSettings {
            tracker: HeadingTracker::new(config.scan_policy(), config.navigation_policy()),
            gate: config.sample_gate(),
            jpeg_quality: config.jpeg_quality(),
            result_retry: config.result_retry(),
        },
    );
    Ok((engine, camera))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::time::{Duration, Instant};

    fn write_frame(path: &std::path::Path, width: u32) {
        RgbImage::from_pixel(width, 4, image::Rgb([90; 3]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_open_frames_still_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        write_frame(&path, 8);
        let config = Config {
            frame_image: Some(path),
            ..Config::default()
        };

        let (frames, camera) = open_frames(&config).unwrap();
        assert!(camera.is_none());
        assert_eq!(frames.latest_frame().map(|f| f.width()), Some(8));
    }

    #[test]
    fn test_open_frames_watches_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        write_frame(&path, 8);
        let config = Config {
            frame_image: Some(path.clone()),
            frame_poll_ms: 5,
            ..Config::default()
        };

        let (frames, mut camera) = open_frames(&config).unwrap();
        assert!(camera.as_ref().is_some_and(|c| c.is_active()));
        assert_eq!(frames.latest_frame().map(|f| f.sequence), Some(1));

        write_frame(&path, 16);
        let deadline = Instant::now() + Duration::from_secs(5);
        while frames.latest_frame().map(|f| f.width()) != Some(16) {
            assert!(Instant::now() < deadline, "updated frame never published");
            std::thread::sleep(Duration::from_millis(5));
        }
        if let Some(camera) = camera.as_mut() {
            camera.stop();
        }
    }

    #[test]
    fn test_open_frames_requires_image() {
        assert!(open_frames(&Config::default()).is_err());
    }
}
