use lightscan_core::{
    capture_sample, CaptureError, CaptureOrchestrator, ContourDetector, FrameSource,
    HeadingTracker, NetworkError, RetryPolicy, Rotation, SampleGate, ScanObserver, SessionClient,
    SessionId, Step,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Heading readings buffered before new ones are dropped.
const INBOX_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine thread exited")]
    ChannelClosed,
}

/// How a scan session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The user turned to face the light source.
    TargetReached { light_direction: i32 },
    /// Sampling finished but the backend never produced a light direction.
    ResultUnavailable(NetworkError),
}

/// Messages processed by the engine thread.
enum EngineRequest {
    Heading(i32),
    UploadStarted(i32),
    CaptureFinished {
        heading: i32,
        result: Result<(), CaptureError>,
    },
    ResultReady(i32),
    ResultFailed(NetworkError),
    Shutdown,
}

/// Work handed to the capture worker.
enum Job {
    Capture { heading: i32 },
    FetchResult,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Feed a heading reading. Never blocks: when the engine is behind the
    /// reading is dropped, and after shutdown it is ignored.
    pub fn post_heading(&self, heading: i32) {
        if let Err(mpsc::error::TrySendError::Full(_)) =
            self.tx.try_send(EngineRequest::Heading(heading))
        {
            tracing::debug!(heading, "engine busy, heading dropped");
        }
    }

    /// Stop the session. Work still in flight is discarded.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.tx
            .send(EngineRequest::Shutdown)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Collaborators owned by the engine for one session.
pub struct EngineParts {
    pub frames: Arc<dyn FrameSource>,
    pub detector: Box<dyn ContourDetector>,
    pub session: Arc<dyn SessionClient>,
    pub session_id: SessionId,
}

pub struct EngineSettings {
    pub tracker: HeadingTracker,
    pub gate: SampleGate,
    pub jpeg_quality: u8,
    pub result_retry: RetryPolicy,
}

pub struct Engine {
    pub handle: EngineHandle,
    /// Resolves once when the session ends on its own.
    pub outcome: oneshot::Receiver<SessionOutcome>,
    pub thread: JoinHandle<()>,
}

/// Logs every scan notification.
pub struct LogObserver;

impl ScanObserver for LogObserver {
    fn scan_complete(&mut self) {
        tracing::info!("heading coverage complete");
    }

    fn sample_stored(&mut self, heading: i32, acked: u32) {
        tracing::debug!(heading, acked, "sample acknowledged");
    }

    fn sample_dropped(&mut self, heading: i32, error: &CaptureError) {
        tracing::debug!(heading, error = %error, "sample dropped");
    }

    fn sampling_complete(&mut self, sent: u32, acked: u32) {
        tracing::info!(sent, acked, "sampling complete, fetching light direction");
    }

    fn light_direction(&mut self, heading: i32) {
        tracing::info!(heading, "light direction received");
    }

    fn navigate(&mut self, direction: Rotation, magnitude: i32) {
        tracing::info!(%direction, magnitude, "turn toward the light");
    }

    fn target_reached(&mut self, heading: i32) {
        tracing::info!(heading, "facing the light");
    }
}

/// Spawn the engine and its capture worker on dedicated OS threads and
/// start scanning.
pub fn spawn_engine(parts: EngineParts, settings: EngineSettings) -> Engine {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(INBOX_CAPACITY);
    let (jobs_tx, jobs_rx) = mpsc::channel::<Job>(4);
    let (outcome_tx, outcome_rx) = oneshot::channel();

    spawn_worker(
        parts,
        settings.jpeg_quality,
        settings.result_retry,
        jobs_rx,
        tx.clone(),
    );

    let mut orchestrator =
        CaptureOrchestrator::new(settings.tracker, settings.gate, LogObserver);

    let thread = std::thread::Builder::new()
        .name("lightscan-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            orchestrator.start_scan();
            let mut outcome_tx = Some(outcome_tx);
            let mut light_direction = None;
            let mut finish = |outcome: SessionOutcome| {
                if let Some(tx) = outcome_tx.take() {
                    let _ = tx.send(outcome);
                }
            };

            while let Some(req) = rx.blocking_recv() {
                let step = match req {
                    EngineRequest::Heading(heading) => orchestrator.on_heading(heading),
                    EngineRequest::UploadStarted(heading) => {
                        orchestrator.upload_started(heading);
                        Step::Nothing
                    }
                    EngineRequest::CaptureFinished { heading, result } => {
                        orchestrator.capture_finished(heading, result)
                    }
                    EngineRequest::ResultReady(heading) => {
                        light_direction = Some(heading);
                        orchestrator.result_ready(heading);
                        Step::Nothing
                    }
                    EngineRequest::ResultFailed(e) => {
                        tracing::error!(error = %e, "light direction unavailable");
                        orchestrator.shutdown();
                        finish(SessionOutcome::ResultUnavailable(e));
                        Step::Nothing
                    }
                    EngineRequest::Shutdown => {
                        orchestrator.shutdown();
                        break;
                    }
                };

                let job = match step {
                    Step::Nothing => continue,
                    Step::Capture { heading } => Job::Capture { heading },
                    Step::FetchResult => Job::FetchResult,
                    Step::Finished => {
                        if let Some(light_direction) = light_direction {
                            finish(SessionOutcome::TargetReached { light_direction });
                        }
                        continue;
                    }
                };
                if jobs_tx.blocking_send(job).is_err() {
                    tracing::error!("capture worker exited");
                    orchestrator.shutdown();
                }
            }
            tracing::info!(phase = ?orchestrator.phase(), "engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Engine {
        handle: EngineHandle { tx },
        outcome: outcome_rx,
        thread,
    }
}

/// Runs captures, uploads and the result fetch off the engine thread, one
/// job at a time.
fn spawn_worker(
    parts: EngineParts,
    jpeg_quality: u8,
    result_retry: RetryPolicy,
    mut jobs: mpsc::Receiver<Job>,
    engine: mpsc::Sender<EngineRequest>,
) {
    let EngineParts {
        frames,
        mut detector,
        session,
        session_id,
    } = parts;

    std::thread::Builder::new()
        .name("lightscan-capture".into())
        .spawn(move || {
            // Sends fail only once the engine is gone, which ends the session anyway.
            let post = |req: EngineRequest| engine.blocking_send(req).is_ok();

            while let Some(job) = jobs.blocking_recv() {
                let delivered = match job {
                    Job::Capture { heading } => {
                        let result =
                            match capture_sample(&*frames, &mut *detector, heading, jpeg_quality) {
                                Ok(record) => {
                                    post(EngineRequest::UploadStarted(heading));
                                    session
                                        .upload_sample(&session_id, &record)
                                        .map(|_| ())
                                        .map_err(CaptureError::from)
                                }
                                Err(e) => Err(e),
                            };
                        post(EngineRequest::CaptureFinished { heading, result })
                    }
                    Job::FetchResult => {
                        match result_retry.run("fetch light direction", || {
                            session.aggregate_result(&session_id)
                        }) {
                            Ok(heading) => post(EngineRequest::ResultReady(heading)),
                            Err(e) => post(EngineRequest::ResultFailed(e)),
                        }
                    }
                };
                if !delivered {
                    break;
                }
            }
            tracing::debug!("capture worker exiting");
        })
        .expect("failed to spawn capture worker thread");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::ContourFileDetector;
    use image::RgbImage;
    use lightscan_core::{
        Ack, CaptureRecord, ContourSet, DetectionError, Frame, NavigationPolicy, ScanPolicy,
    };
    use lightscan_hw::StillFrameSource;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    const FACE: &str = include_str!("../../../testdata/face_contours.json");

    #[derive(Default)]
    struct FakeBackend {
        uploads: Mutex<Vec<i32>>,
        fail_result: bool,
    }

    impl SessionClient for FakeBackend {
        fn create_session(&self) -> Result<SessionId, NetworkError> {
            Ok(SessionId("s-1".into()))
        }

        fn upload_sample(
            &self,
            _session: &SessionId,
            record: &CaptureRecord,
        ) -> Result<Ack, NetworkError> {
            self.uploads.lock().unwrap().push(record.heading);
            Ok(Ack {
                heading: record.heading,
            })
        }

        fn aggregate_result(&self, _session: &SessionId) -> Result<i32, NetworkError> {
            if self.fail_result {
                Err(NetworkError::Status(500))
            } else {
                Ok(90)
            }
        }
    }

    struct NoFace;

    impl ContourDetector for NoFace {
        fn detect(&mut self, _frame: &Frame) -> Result<ContourSet, DetectionError> {
            Err(DetectionError::FaceCount(0))
        }
    }

    fn face_detector() -> Box<dyn ContourDetector> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FACE.as_bytes()).unwrap();
        Box::new(ContourFileDetector::open(file.path()).unwrap())
    }

    fn parts(detector: Box<dyn ContourDetector>, backend: Arc<FakeBackend>) -> EngineParts {
        let image = RgbImage::from_pixel(200, 200, image::Rgb([180, 140, 120]));
        EngineParts {
            frames: Arc::new(StillFrameSource::from_image(image)),
            detector,
            session: backend,
            session_id: SessionId("s-1".into()),
        }
    }

    fn settings(result_attempts: u32) -> EngineSettings {
        EngineSettings {
            tracker: HeadingTracker::new(
                ScanPolicy {
                    min_headings_per_quadrant: 2,
                    min_quadrant_spread: 10,
                },
                NavigationPolicy::default(),
            ),
            gate: SampleGate::default(),
            jpeg_quality: 80,
            result_retry: RetryPolicy::new(result_attempts, Duration::ZERO),
        }
    }

    /// Feed headings slowly enough for each capture to settle.
    fn feed(handle: &EngineHandle, headings: impl IntoIterator<Item = i32>) {
        for h in headings {
            handle.post_heading(h);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_session_reaches_target() {
        let backend = Arc::new(FakeBackend::default());
        let engine = spawn_engine(parts(face_detector(), backend.clone()), settings(1));

        feed(&engine.handle, (0..=300).step_by(10));

        // Keep turning toward the 90° result until the engine reports arrival.
        let mut outcome_rx = engine.outcome;
        let mut outcome = None;
        for _ in 0..200 {
            feed(&engine.handle, [330, 30, 60, 85]);
            if let Ok(o) = outcome_rx.try_recv() {
                outcome = Some(o);
                break;
            }
        }
        assert_eq!(
            outcome,
            Some(SessionOutcome::TargetReached {
                light_direction: 90
            })
        );
        assert!(!backend.uploads.lock().unwrap().is_empty());

        let _ = engine.handle.tx.blocking_send(EngineRequest::Shutdown);
        engine.thread.join().unwrap();
    }

    #[test]
    fn test_result_failure_ends_session() {
        let backend = Arc::new(FakeBackend {
            fail_result: true,
            ..FakeBackend::default()
        });
        let engine = spawn_engine(parts(face_detector(), backend), settings(2));

        feed(&engine.handle, (0..=300).step_by(10));
        let outcome = engine.outcome.blocking_recv().unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::ResultUnavailable(NetworkError::Status(500))
        );
    }

    #[test]
    fn test_dropped_samples_are_not_uploaded() {
        let backend = Arc::new(FakeBackend::default());
        let engine = spawn_engine(parts(Box::new(NoFace), backend.clone()), settings(1));

        feed(&engine.handle, [0, 20, 40]);
        let _ = engine.handle.tx.blocking_send(EngineRequest::Shutdown);
        engine.thread.join().unwrap();
        assert!(backend.uploads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_headings_after_shutdown_are_ignored() {
        let backend = Arc::new(FakeBackend::default());
        let engine = spawn_engine(parts(face_detector(), backend.clone()), settings(1));

        let _ = engine.handle.tx.blocking_send(EngineRequest::Shutdown);
        engine.thread.join().unwrap();
        engine.handle.post_heading(0);
        engine.handle.post_heading(20);
        assert!(backend.uploads.lock().unwrap().is_empty());
    }
}
