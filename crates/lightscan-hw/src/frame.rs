//! Frame sources: a last-write-wins slot fed by a camera callback, a camera
//! that republishes an image file whenever it changes, and a still image for
//! offline runs.

use image::RgbImage;
use lightscan_core::{Frame, FrameSource};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to load frame image {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

fn load_rgb(path: &Path) -> Result<RgbImage, FrameError> {
    Ok(image::open(path)
        .map_err(|source| FrameError::Load {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8())
}

/// Holds only the most recent frame published by a producer.
///
/// The producer (camera callback) calls [`publish`](Self::publish) at its own
/// rate; consumers pull whatever is newest. Older frames are overwritten,
/// never queued.
#[derive(Default)]
pub struct LatestFrame {
    slot: Mutex<Option<Frame>>,
    sequence: AtomicU64,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame, returning its sequence number.
    pub fn publish(&self, image: RgbImage) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Frame::new(image, sequence));
        sequence
    }

    /// Drop the current frame, e.g. when the camera stops.
    pub fn clear(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl FrameSource for LatestFrame {
    fn latest_frame(&self) -> Option<Frame> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Publishes an image file into a [`LatestFrame`] each time the file changes.
///
/// An external capture process overwrites the file; a poll thread notices the
/// new modification time or length and republishes. Partially written files
/// fail to decode and are picked up on the next poll.
pub struct ImageFileCamera {
    path: PathBuf,
    interval: Duration,
    frames: Arc<LatestFrame>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

type FileStamp = (SystemTime, u64);

fn file_stamp(path: &Path) -> Option<FileStamp> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

impl ImageFileCamera {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval: interval.max(Duration::from_millis(1)),
            frames: Arc::new(LatestFrame::new()),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// The slot this camera publishes into.
    pub fn frames(&self) -> Arc<LatestFrame> {
        Arc::clone(&self.frames)
    }

    /// Publish the current file, then keep watching it. The first load must
    /// succeed. Starting an active camera is a no-op.
    pub fn start(&mut self) -> Result<(), FrameError> {
        if self.is_active() {
            tracing::info!("skip starting since camera already started");
            return Ok(());
        }
        let mut last = file_stamp(&self.path);
        let image = load_rgb(&self.path)?;
        tracing::info!(
            path = %self.path.display(),
            width = image.width(),
            height = image.height(),
            "camera publishing frame file"
        );
        self.frames.publish(image);

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let frames = Arc::clone(&self.frames);
        let path = self.path.clone();
        let interval = self.interval;

        let worker = std::thread::Builder::new()
            .name("lightscan-camera".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    std::thread::sleep(interval);
                    let stamp = file_stamp(&path);
                    if stamp.is_none() || stamp == last {
                        continue;
                    }
                    match load_rgb(&path) {
                        Ok(image) => {
                            let sequence = frames.publish(image);
                            tracing::debug!(sequence, "camera frame updated");
                            last = stamp;
                        }
                        Err(e) => tracing::debug!(error = %e, "frame file not readable yet"),
                    }
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                e
            })?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Stop watching. The last published frame stays available.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        if worker.join().is_err() {
            tracing::warn!("camera thread panicked");
        }
        tracing::info!("camera stopped");
    }

    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for ImageFileCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Always yields the same image, loaded once from disk.
pub struct StillFrameSource {
    frame: Frame,
}

impl StillFrameSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let path = path.as_ref();
        let image = load_rgb(path)?;
        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "loaded still frame"
        );
        Ok(Self {
            frame: Frame::new(image, 1),
        })
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self {
            frame: Frame::new(image, 1),
        }
    }
}

impl FrameSource for StillFrameSource {
    fn latest_frame(&self) -> Option<Frame> {
        Some(self.frame.clone())
    }
}
