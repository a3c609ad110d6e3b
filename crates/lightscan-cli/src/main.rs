use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lightscan_core::geometry;
use lightscan_core::{
    smallest_signed_diff, CaptureOrchestrator, ContourSet, FaceMasks, FacePolygons,
    HeadingTracker, NavigationPolicy, Rotation, SampleGate, ScanObserver, ScanPolicy, Step,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lightscan", about = "LightScan light-direction scan diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the polygons derived from a detection result
    Polygons {
        /// Detection JSON (a detector response or a bare contour set)
        #[arg(short, long)]
        contours: PathBuf,
    },
    /// Rasterize the face and mouth masks for a frame
    Mask {
        #[arg(short, long)]
        contours: PathBuf,
        /// Frame the contours were detected on (sets the mask size)
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Replay a heading trace through the scan state machine
    Replay {
        /// One heading per line
        #[arg(short, long)]
        trace: PathBuf,
        /// Light direction to navigate to once coverage completes
        #[arg(long)]
        target: Option<i32>,
        #[arg(long, default_value_t = ScanPolicy::default().min_headings_per_quadrant)]
        samples_per_quadrant: usize,
        #[arg(long, default_value_t = ScanPolicy::default().min_quadrant_spread)]
        spread: i32,
    },
    /// Signed shortest rotation from one heading to another
    Diff {
        /// Target heading
        to: i32,
        /// Current heading
        from: i32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Polygons { contours } => {
            let set = load_contours(&contours)?;
            let polygons = FacePolygons::from_contours(&set)?;
            let nose = geometry::nose_midpoint(&set)?;
            let out = serde_json::json!({
                "nose_middle_point": nose,
                "polygons": polygons,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Mask {
            contours,
            image,
            out_dir,
        } => {
            let set = load_contours(&contours)?;
            let (width, height) = image::image_dimensions(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let masks = FaceMasks::build(&set, width, height)?;

            std::fs::create_dir_all(&out_dir)?;
            for (name, mask) in [("face", &masks.face), ("mouth", &masks.mouth)] {
                let path = out_dir.join(format!("{name}_mask.png"));
                mask.as_image()
                    .save(&path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("{name}: {} px -> {}", mask.coverage(), path.display());
            }
            if masks.face.is_empty() {
                println!("warning: face mask is empty, this frame would be dropped");
            }
        }
        Commands::Replay {
            trace,
            target,
            samples_per_quadrant,
            spread,
        } => {
            let headings = lightscan_hw::sensor::parse_trace(
                &std::fs::read_to_string(&trace)
                    .with_context(|| format!("failed to read {}", trace.display()))?,
            )?;
            let policy = ScanPolicy {
                min_headings_per_quadrant: samples_per_quadrant,
                min_quadrant_spread: spread,
            };
            let summary = replay(&headings, policy, target, PrintObserver);
            println!(
                "{} readings, {} samples, scan {}",
                headings.len(),
                summary.samples.len(),
                match summary.completed_at {
                    Some(h) => format!("complete at {h}"),
                    None => "incomplete".to_string(),
                }
            );
        }
        Commands::Diff { to, from } => {
            let delta = smallest_signed_diff(to, from);
            if delta == 0 {
                println!("0");
            } else {
                println!("{delta} ({} {})", Rotation::toward(delta), delta.abs());
            }
        }
    }

    Ok(())
}

/// Detection files may be a detector response or a bare contour set.
#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionFile {
    Response { faces: Vec<ContourSet> },
    Contours(ContourSet),
}

fn parse_contours(text: &str) -> Result<ContourSet> {
    match serde_json::from_str(text)? {
        DetectionFile::Contours(set) => Ok(set),
        DetectionFile::Response { mut faces } => {
            anyhow::ensure!(faces.len() == 1, "expected 1 face, got {}", faces.len());
            Ok(faces.remove(0))
        }
    }
}

fn load_contours(path: &Path) -> Result<ContourSet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_contours(&text).with_context(|| format!("invalid detection file {}", path.display()))
}

struct PrintObserver;

impl ScanObserver for PrintObserver {
    fn scan_complete(&mut self) {
        println!("scan complete");
    }

    fn sampling_complete(&mut self, sent: u32, acked: u32) {
        println!("sampling complete: {acked}/{sent} acknowledged");
    }

    fn navigate(&mut self, direction: Rotation, magnitude: i32) {
        println!("turn {direction} {magnitude}");
    }

    fn target_reached(&mut self, heading: i32) {
        println!("target reached at {heading}");
    }
}

#[derive(Debug, Default)]
struct ReplaySummary {
    /// Headings that would have been captured, in order.
    samples: Vec<i32>,
    completed_at: Option<i32>,
    reached_at: Option<i32>,
}

/// Drive the scan state machine with every capture acknowledged at once.
fn replay<O: ScanObserver>(
    headings: &[i32],
    policy: ScanPolicy,
    target: Option<i32>,
    observer: O,
) -> ReplaySummary {
    let tracker = HeadingTracker::new(policy, NavigationPolicy::default());
    let mut orchestrator = CaptureOrchestrator::new(tracker, SampleGate::default(), observer);
    orchestrator.start_scan();

    let mut summary = ReplaySummary::default();
    for &heading in headings {
        let mut step = orchestrator.on_heading(heading);
        if let Step::Capture { heading } = step {
            summary.samples.push(heading);
            orchestrator.upload_started(heading);
            step = orchestrator.capture_finished(heading, Ok(()));
        }
        match step {
            Step::FetchResult => {
                summary.completed_at = Some(heading);
                match target {
                    Some(target) => orchestrator.result_ready(target),
                    None => break,
                }
            }
            Step::Finished => {
                summary.reached_at = Some(heading);
                break;
            }
            Step::Nothing | Step::Capture { .. } => {}
        }
    }
    summary
}
