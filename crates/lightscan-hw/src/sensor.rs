//! Heading sensors.
//!
//! A sensor delivers integer compass headings (degrees from magnetic north)
//! to a callback on its own thread, at a fixed rate.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// Nominal heading update rate.
pub const DEFAULT_RATE_HZ: f64 = 30.0;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("heading sensor unavailable: {0}")]
    Unavailable(String),
    #[error("invalid heading on trace line {line}: {text:?}")]
    InvalidTrace { line: usize, text: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives heading readings on the sensor thread.
pub type HeadingCallback = Box<dyn FnMut(i32) + Send>;

pub trait HeadingSensor: Send {
    fn is_available(&self) -> bool;

    /// Start delivering readings to `on_heading`. Starting an already active
    /// sensor is a no-op.
    fn start(&mut self, on_heading: HeadingCallback) -> Result<(), SensorError>;

    /// Stop delivery and wait for the sensor thread. After this returns the
    /// callback is never invoked again. Stopping an inactive sensor is a
    /// no-op.
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Parse a heading trace: one reading per line, `#` comments allowed.
/// Fractional readings are truncated toward zero.
pub fn parse_trace(text: &str) -> Result<Vec<i32>, SensorError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.split('#').next().unwrap_or("").trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(line, text)| {
            text.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v as i32)
                .ok_or_else(|| SensorError::InvalidTrace {
                    line,
                    text: text.to_string(),
                })
        })
        .collect()
}

/// Replays recorded headings at a fixed interval.
pub struct ReplaySensor {
    headings: Arc<Vec<i32>>,
    interval: Duration,
    looping: bool,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ReplaySensor {
    pub fn new(headings: Vec<i32>, rate_hz: f64) -> Self {
        let interval = if rate_hz > 0.0 {
            Duration::from_secs_f64(1.0 / rate_hz)
        } else {
            Duration::ZERO
        };
        Self {
            headings: Arc::new(headings),
            interval,
            looping: false,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Load a trace file (see [`parse_trace`]).
    pub fn from_file(path: impl AsRef<Path>, rate_hz: f64) -> Result<Self, SensorError> {
        let path = path.as_ref();
        let headings = parse_trace(&std::fs::read_to_string(path)?)?;
        tracing::info!(path = %path.display(), readings = headings.len(), "loaded heading trace");
        Ok(Self::new(headings, rate_hz))
    }

    /// Restart from the beginning of the trace when it runs out, until
    /// stopped.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

impl HeadingSensor for ReplaySensor {
    fn is_available(&self) -> bool {
        !self.headings.is_empty()
    }

    fn start(&mut self, mut on_heading: HeadingCallback) -> Result<(), SensorError> {
        if !self.is_available() {
            return Err(SensorError::Unavailable("heading trace is empty".into()));
        }
        if self.is_active() {
            tracing::info!("skip starting since heading sensor already started");
            return Ok(());
        }
        // Reap a worker that ran to the end of a non-looping trace.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let headings = Arc::clone(&self.headings);
        let interval = self.interval;
        let looping = self.looping;

        let worker = std::thread::Builder::new()
            .name("lightscan-heading".into())
            .spawn(move || {
                'replay: loop {
                    for &heading in headings.iter() {
                        if !running.load(Ordering::SeqCst) {
                            break 'replay;
                        }
                        on_heading(heading);
                        if !interval.is_zero() {
                            std::thread::sleep(interval);
                        }
                    }
                    if !looping {
                        break;
                    }
                }
                running.store(false, Ordering::SeqCst);
                tracing::debug!("heading replay finished");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                e
            })?;
        self.worker = Some(worker);
        tracing::info!(
            readings = self.headings.len(),
            interval_ms = self.interval.as_millis() as u64,
            looping,
            "heading replay started"
        );
        Ok(())
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            tracing::info!("skip stopping since heading sensor already inactive");
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        if worker.join().is_err() {
            tracing::warn!("heading replay thread panicked");
        }
        tracing::info!("heading replay stopped");
    }

    fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for ReplaySensor {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::mpsc;

    fn collector() -> (HeadingCallback, mpsc::Receiver<i32>) {
        let (tx, rx) = mpsc::channel();
        (
            Box::new(move |h| {
                let _ = tx.send(h);
            }),
            rx,
        )
    }

    #[test]
    fn test_parse_trace() {
        let text = "# rotation trace\n10\n 20.9 \n\n-0.5\n359 # last\n";
        assert_eq!(parse_trace(text).unwrap(), vec![10, 20, 0, 359]);
    }

    #[test]
    fn test_parse_trace_rejects_garbage() {
        let err = parse_trace("10\nnorth\n").unwrap_err();
        assert!(matches!(err, SensorError::InvalidTrace { line: 2, .. }));
        assert!(parse_trace("NaN\n").is_err());
    }

    #[test]
    fn test_replay_delivers_in_order() {
        let mut sensor = ReplaySensor::new(vec![5, 10, 15], 0.0);
        let (cb, rx) = collector();
        sensor.start(cb).unwrap();
        let received: Vec<i32> = rx.iter().take(3).collect();
        assert_eq!(received, vec![5, 10, 15]);
        sensor.stop();
        assert!(!sensor.is_active());
    }

    #[test]
    fn test_replay_unavailable_when_empty() {
        let mut sensor = ReplaySensor::new(Vec::new(), 30.0);
        assert!(!sensor.is_available());
        let (cb, _rx) = collector();
        assert!(matches!(sensor.start(cb), Err(SensorError::Unavailable(_))));
    }

    #[test]
    fn test_looping_replay_stops_on_request() {
        let mut sensor = ReplaySensor::new(vec![1, 2], 0.0).looping(true);
        let (cb, rx) = collector();
        sensor.start(cb).unwrap();
        let received: Vec<i32> = rx.iter().take(5).collect();
        assert_eq!(received, vec![1, 2, 1, 2, 1]);
        sensor.stop();
        assert!(!sensor.is_active());
        // The callback (and its sender) is dropped with the thread.
        while rx.recv().is_ok() {}
    }

    #[test]
    fn test_stop_when_inactive_is_noop() {
        let mut sensor = ReplaySensor::new(vec![1], 30.0);
        sensor.stop();
        sensor.stop();
        assert!(!sensor.is_active());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "90\n180\n270").unwrap();
        let sensor = ReplaySensor::from_file(file.path(), 30.0).unwrap();
        assert!(sensor.is_available());
        assert_eq!(*sensor.headings, vec![90, 180, 270]);
    }
}
