use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Parser;
use conductor_lib::diagnostics::{TraceEntry, TraceWriter};
use conductor_lib::gestures::calibration::{CalibrationStep, Calibrator};
use conductor_lib::gestures::{CalibrationProfile, GestureConfig, GestureEngine, GestureEvent, GestureMode, ThresholdStore};
use conductor_lib::landmarks::{Frame, LandmarkSample};
use conductor_lib::{event_bus, landmark_stream, storage};
use serde::Deserialize;

#[derive(Parser, Debug)]
struct Args {
    /// Recorded landmark frames, one JSON object per line
    #[arg(long, required_unless_present = "list_profiles")]
    frames: Option<PathBuf>,

    /// Print the stored calibration profiles and exit
    #[arg(long, default_value_t = false)]
    list_profiles: bool,

    /// Engine configuration (JSON); defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Calibrate from the first N ms of the recording before classifying
    #[arg(long, conflicts_with = "profile")]
    calibrate_ms: Option<u64>,

    /// Stop calibrating early once this many valid samples are in
    #[arg(long, requires = "calibrate_ms")]
    calibrate_samples: Option<usize>,

    /// Save the calibration under this profile name in the app data directory
    #[arg(long, requires = "calibrate_ms")]
    save_profile: Option<String>,

    /// Apply a stored calibration profile
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Append every classifier decision and published event to this JSONL file
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Only run the halt classifier
    #[arg(long, default_value_t = false)]
    halt_only: bool,
}

/// A recorded line: either a raw MediaPipe landmark array or a named-point frame
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordedFrame {
    Pose {
        timestamp_ms: f64,
        landmarks: Vec<LandmarkSample>,
    },
    Named(Frame),
}

impl From<RecordedFrame> for Frame {
    fn from(recorded: RecordedFrame) -> Self {
        match recorded {
            RecordedFrame::Pose {
                timestamp_ms,
                landmarks,
            } => Frame::from_pose_landmarks(timestamp_ms, &landmarks),
            RecordedFrame::Named(frame) => frame,
        }
    }
}

fn load_frames(path: &Path) -> Result<Vec<Frame>, Box<dyn Error>> {
    let reader = BufReader::new(File::open(path)?);
    let mut frames = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let recorded: RecordedFrame = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: {}", path.display(), line_no + 1, e))?;
        frames.push(recorded.into());
    }

    Ok(frames)
}

fn calibrate_offline(
    frames: &[Frame],
    duration_ms: u64,
    target_samples: Option<usize>,
    config: &GestureConfig,
    save_as: Option<&str>,
    engine: &GestureEngine,
) -> Result<(), Box<dyn Error>> {
    let mut calibrator = Calibrator::new(duration_ms as f64, config.min_visibility);
    if let Some(target) = target_samples {
        calibrator = calibrator.with_target_samples(target);
    }
    for frame in frames {
        if calibrator.observe(frame) == CalibrationStep::Complete {
            break;
        }
    }

    let report = calibrator.report()?;
    log::info!(
        "Calibrated from {} samples: {}",
        report.samples,
        serde_json::to_string(&report.thresholds)?
    );

    let profile = CalibrationProfile::from_report(save_as.unwrap_or("replay").to_string(), report);
    engine.apply_profile(&profile)?;

    if save_as.is_some() {
        let (path, hash) = storage::store_calibration_profile(&profile)?;
        log::info!("Saved profile to {} (sha256 {})", path.display(), hash);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_profiles {
        let dir = storage::get_calibration_dir()?;
        for path in storage::list_calibration_profiles_in(&dir)? {
            println!("{}", path.display());
        }
        return Ok(());
    }
    let frames_path = args.frames.as_deref().ok_or("--frames is required")?;

    let mut config = match &args.config {
        Some(path) => GestureConfig::load(path)?,
        None => GestureConfig::default(),
    };
    if args.halt_only {
        config.mode = GestureMode::HaltOnly;
    }

    let frames = load_frames(frames_path)?;
    log::info!("Loaded {} frames from {}", frames.len(), frames_path.display());

    let stream = landmark_stream();
    let bus = event_bus();
    let engine = GestureEngine::new(stream.clone(), bus.clone(), Rc::new(ThresholdStore::new()), config.clone());

    if let Some(path) = &args.profile {
        let profile = storage::load_calibration_profile(path)?;
        engine.apply_profile(&profile)?;
    } else if let Some(duration_ms) = args.calibrate_ms {
        calibrate_offline(
            &frames,
            duration_ms,
            args.calibrate_samples,
            &config,
            args.save_profile.as_deref(),
            &engine,
        )?;
    }

    let trace = args.trace.clone().map(TraceWriter::new);
    let _trace_subs = trace.as_ref().map(|writer| {
        log::info!("Tracing to {}", writer.path().display());
        let events = writer.clone();
        let event_sub = bus.subscribe(move |event: &GestureEvent| {
            if let Err(e) = events.write(&TraceEntry::from_event(event)) {
                log::warn!("Failed to trace {}: {}", event.topic(), e);
            }
        });
        (engine.on_debug(writer.observer()), event_sub)
    });

    let counts: Rc<RefCell<BTreeMap<&'static str, usize>>> = Rc::default();
    let tally = Rc::clone(&counts);
    let _printer = bus.subscribe(move |event: &GestureEvent| {
        *tally.borrow_mut().entry(event.topic()).or_default() += 1;
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => log::error!("Failed to serialize {}: {}", event.topic(), e),
        }
    });

    engine.init();
    for frame in &frames {
        stream.publish(frame);
    }
    engine.dispose();

    for (topic, count) in counts.borrow().iter() {
        log::info!("{}: {}", topic, count);
    }
    Ok(())
}
