use lightscan_core::{NavigationPolicy, RetryPolicy, SampleGate, ScanPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Daemon configuration.
///
/// Values come from an optional TOML file named by `LIGHTSCAN_CONFIG`, then
/// `LIGHTSCAN_*` environment variables override individual keys.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the analysis backend.
    pub backend_url: String,
    /// Remote contour detection endpoint. Takes precedence over `contours_file`.
    pub detector_url: Option<String>,
    /// Fixed detection result used instead of a remote detector.
    pub contours_file: Option<PathBuf>,
    pub user_id: String,
    /// Recorded heading trace replayed as the heading sensor.
    pub heading_trace: Option<PathBuf>,
    /// Image served as the camera frame.
    pub frame_image: Option<PathBuf>,
    /// Re-read `frame_image` at this interval when it changes. Zero loads it once.
    pub frame_poll_ms: u64,
    pub sensor_rate_hz: f64,
    /// Keep replaying the heading trace until the session ends.
    pub loop_trace: bool,
    pub jpeg_quality: u8,
    pub request_timeout_secs: u64,
    pub upload_attempts: u32,
    pub result_attempts: u32,
    pub result_backoff_ms: u64,
    pub min_headings_per_quadrant: usize,
    pub min_quadrant_spread: i32,
    pub debounce_degrees: i32,
    pub arrival_tolerance: i32,
}

impl Default for Config {
    fn default() -> Self {
        let scan = ScanPolicy::default();
        Self {
            backend_url: "http://127.0.0.1:8000".to_string(),
            detector_url: None,
            contours_file: None,
            user_id: "anonymous".to_string(),
            heading_trace: None,
            frame_image: None,
            frame_poll_ms: 0,
            sensor_rate_hz: lightscan_hw::sensor::DEFAULT_RATE_HZ,
            loop_trace: false,
            jpeg_quality: lightscan_core::capture::DEFAULT_JPEG_QUALITY,
            request_timeout_secs: 10,
            upload_attempts: 1,
            result_attempts: 3,
            result_backoff_ms: 500,
            min_headings_per_quadrant: scan.min_headings_per_quadrant,
            min_quadrant_spread: scan.min_quadrant_spread,
            debounce_degrees: SampleGate::default().debounce_degrees,
            arrival_tolerance: NavigationPolicy::default().arrival_tolerance,
        }
    }
}

impl Config {
    /// Load the config file named by `LIGHTSCAN_CONFIG` (if any), then apply
    /// `LIGHTSCAN_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var_os("LIGHTSCAN_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        env.string("LIGHTSCAN_BACKEND_URL", &mut self.backend_url);
        env.string("LIGHTSCAN_USER_ID", &mut self.user_id);
        if let Some(v) = lookup("LIGHTSCAN_DETECTOR_URL") {
            self.detector_url = Some(v);
        }
        env.path("LIGHTSCAN_CONTOURS_FILE", &mut self.contours_file);
        env.path("LIGHTSCAN_HEADING_TRACE", &mut self.heading_trace);
        env.path("LIGHTSCAN_FRAME_IMAGE", &mut self.frame_image);
        env.parse("LIGHTSCAN_FRAME_POLL_MS", &mut self.frame_poll_ms)?;
        env.parse("LIGHTSCAN_SENSOR_RATE_HZ", &mut self.sensor_rate_hz)?;
        if let Some(v) = lookup("LIGHTSCAN_LOOP_TRACE") {
            self.loop_trace = v != "0";
        }
        env.parse("LIGHTSCAN_JPEG_QUALITY", &mut self.jpeg_quality)?;
        env.parse("LIGHTSCAN_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs)?;
        env.parse("LIGHTSCAN_UPLOAD_ATTEMPTS", &mut self.upload_attempts)?;
        env.parse("LIGHTSCAN_RESULT_ATTEMPTS", &mut self.result_attempts)?;
        env.parse("LIGHTSCAN_RESULT_BACKOFF_MS", &mut self.result_backoff_ms)?;
        env.parse(
            "LIGHTSCAN_MIN_HEADINGS_PER_QUADRANT",
            &mut self.min_headings_per_quadrant,
        )?;
        env.parse("LIGHTSCAN_MIN_QUADRANT_SPREAD", &mut self.min_quadrant_spread)?;
        env.parse("LIGHTSCAN_DEBOUNCE_DEGREES", &mut self.debounce_degrees)?;
        env.parse("LIGHTSCAN_ARRIVAL_TOLERANCE", &mut self.arrival_tolerance)?;
        Ok(self)
    }

    pub fn scan_policy(&self) -> ScanPolicy {
        ScanPolicy {
            min_headings_per_quadrant: self.min_headings_per_quadrant,
            min_quadrant_spread: self.min_quadrant_spread,
        }
    }

    pub fn navigation_policy(&self) -> NavigationPolicy {
        NavigationPolicy {
            arrival_tolerance: self.arrival_tolerance,
        }
    }

    pub fn sample_gate(&self) -> SampleGate {
        SampleGate::new(self.debounce_degrees)
    }

    /// Poll interval for a watched frame file, if watching is enabled.
    pub fn frame_poll(&self) -> Option<Duration> {
        (self.frame_poll_ms > 0).then(|| Duration::from_millis(self.frame_poll_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Uploads retry immediately: a stale sample is worth less than the next one.
    pub fn upload_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.upload_attempts, Duration::ZERO)
    }

    pub fn result_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.result_attempts,
            Duration::from_millis(self.result_backoff_ms),
        )
    }

    /// JPEG quality clamped to the encoder's accepted range.
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, key: &str, slot: &mut String) {
        if let Some(v) = (self.0)(key) {
            *slot = v;
        }
    }

    fn path(&self, key: &str, slot: &mut Option<PathBuf>) {
        if let Some(v) = (self.0)(key) {
            *slot = Some(PathBuf::from(v));
        }
    }

    fn parse<T: FromStr>(&self, key: &'static str, slot: &mut T) -> Result<(), ConfigError> {
        if let Some(v) = (self.0)(key) {
            *slot = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: v })?;
        }
        Ok(())
    }
}
