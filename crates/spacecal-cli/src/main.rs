use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use spacecal_core::{Pose, Real};
use spacecal_pipeline::{
    CalibrationEngine, CalibrationHost, CalibrationSpeed, CalibrationState, DeviceId,
    DeviceTransform, EngineConfig, Profile, SolverMode, TrackedPose,
};

/// Replay a recorded pose stream through the space calibration engine.
#[derive(Debug, Parser)]
#[command(author, version, about = "Offline tracking-space calibration from a recording")]
struct Args {
    /// JSON recording of reference/target device poses.
    #[arg(long)]
    recording: PathBuf,

    /// Optional JSON EngineConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where the resulting profile is stored.
    #[arg(long, default_value = "spacecal-profile.json")]
    profile: PathBuf,

    /// Override the configured speed tier.
    #[arg(long, value_enum)]
    speed: Option<SpeedArg>,

    /// Override the configured solver mode.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SpeedArg {
    Fast,
    Slow,
    VerySlow,
}

impl From<SpeedArg> for CalibrationSpeed {
    fn from(value: SpeedArg) -> Self {
        match value {
            SpeedArg::Fast => Self::Fast,
            SpeedArg::Slow => Self::Slow,
            SpeedArg::VerySlow => Self::VerySlow,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    TwoPhase,
    Joint,
}

impl From<ModeArg> for SolverMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::TwoPhase => Self::TwoPhase,
            ModeArg::Joint => Self::Joint,
        }
    }
}

type PoseRows = [[Real; 4]; 3];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Frame {
    time: f64,
    /// Row-major `[R | t]`; absent when the device was not tracking.
    reference: Option<PoseRows>,
    target: Option<PoseRows>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Recording {
    reference_device: DeviceId,
    target_device: DeviceId,
    reference_system: String,
    target_system: String,
    frames: Vec<Frame>,
}

/// Host serving one recorded frame per tick and storing profiles on disk.
struct ReplayHost<'a> {
    recording: &'a Recording,
    frame: Option<&'a Frame>,
    profile_path: PathBuf,
    applied: Vec<(DeviceId, DeviceTransform)>,
}

impl<'a> ReplayHost<'a> {
    fn new(recording: &'a Recording, profile_path: &Path) -> Self {
        Self {
            recording,
            frame: None,
            profile_path: profile_path.to_path_buf(),
            applied: Vec::new(),
        }
    }
}

impl CalibrationHost for ReplayHost<'_> {
    fn device_pose(&mut self, id: DeviceId) -> Result<TrackedPose> {
        let Some(frame) = self.frame else {
            bail!("no frame loaded");
        };
        let rows = if id == self.recording.reference_device {
            frame.reference.as_ref()
        } else if id == self.recording.target_device {
            frame.target.as_ref()
        } else {
            bail!("device {id} is not part of the recording");
        };
        Ok(rows
            .map(|rows| TrackedPose::tracked(Pose::from_rows(rows)))
            .unwrap_or_else(TrackedPose::lost))
    }

    fn apply_device_transform(&mut self, id: DeviceId, transform: &DeviceTransform) -> Result<()> {
        debug!("apply to device {id}: {transform:?}");
        self.applied.push((id, *transform));
        Ok(())
    }

    fn persist_profile(&mut self, profile: &Profile) -> Result<()> {
        fs::write(&self.profile_path, profile.to_json()?)
            .with_context(|| format!("failed to write {}", self.profile_path.display()))
    }

    fn load_profile(&mut self) -> Result<Option<Profile>> {
        if !self.profile_path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.profile_path)
            .with_context(|| format!("failed to read {}", self.profile_path.display()))?;
        Profile::from_json(&json).map(Some)
    }
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

/// Run one calibration over `recording`, starting at its first frame.
fn run_replay(recording: &Recording, config: EngineConfig, profile_path: &Path) -> Result<Profile> {
    let mut engine = CalibrationEngine::new(config)?;
    engine.set_devices(Some(recording.reference_device), Some(recording.target_device));
    engine.set_tracking_systems(&recording.reference_system, &recording.target_system);

    let mut host = ReplayHost::new(recording, profile_path);
    engine.start_calibration()?;

    for frame in &recording.frames {
        host.frame = Some(frame);
        engine.tick(frame.time, &mut host)?;
        if engine.state() == CalibrationState::None {
            break;
        }
    }
    info!("replay applied {} device transforms", host.applied.len());

    match engine.profile() {
        Some(profile) if engine.state() == CalibrationState::None => Ok(profile.clone()),
        _ => {
            let log: Vec<String> = engine.messages().texts().map(str::to_owned).collect();
            bail!(
                "calibration did not complete (state {:?}): {}",
                engine.state(),
                log.join("; ")
            )
        }
    }
}

fn run_from_args(args: &Args) -> Result<String> {
    let recording: Recording = load_json_file(&args.recording)?;
    let mut config = match &args.config {
        Some(path) => load_json_file::<EngineConfig>(path)?,
        None => EngineConfig::default(),
    };
    if let Some(speed) = args.speed {
        config.speed = speed.into();
    }
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }

    let profile = run_replay(&recording, config, &args.profile)?;
    profile.to_json()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let json = run_from_args(&args)?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacecal_core::synthetic::{rig_samples, PoseGenerator};
    use spacecal_core::rotation_distance;
    use tempfile::{tempdir, NamedTempFile};

    fn rows(pose: &Pose) -> PoseRows {
        let m = pose.to_matrix34();
        let mut out = [[0.0; 4]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = m[(r, c)];
            }
        }
        out
    }

    fn write_json<T: Serialize>(value: &T, path: &Path) {
        serde_json::to_writer_pretty(fs::File::create(path).unwrap(), value).unwrap();
    }

    fn synthetic_recording(seed: u64, frames: usize) -> (Recording, spacecal_core::Iso3) {
        let mut poses = PoseGenerator::new(seed);
        let calibration = poses.isometry(2.0, 1.0);
        let offset = poses.isometry(0.5, 0.1);
        let references = poses.reference_poses(frames, 1.0);
        let frames = rig_samples(&calibration, &offset, &references)
            .iter()
            .enumerate()
            .map(|(k, s)| Frame {
                time: k as f64 * 0.02,
                reference: Some(rows(&s.reference)),
                target: Some(rows(&s.target)),
            })
            .collect();
        let recording = Recording {
            reference_device: 0,
            target_device: 5,
            reference_system: "lighthouse".into(),
            target_system: "oculus".into(),
            frames,
        };
        (recording, calibration)
    }

    #[test]
    fn replay_writes_profile_matching_recording() {
        let (recording, calibration) = synthetic_recording(8, 201);
        let dir = tempdir().unwrap();
        let recording_path = dir.path().join("recording.json");
        let profile_path = dir.path().join("profile.json");
        write_json(&recording, &recording_path);

        let args = Args {
            recording: recording_path,
            config: None,
            profile: profile_path.clone(),
            speed: Some(SpeedArg::Fast),
            mode: None,
        };
        let json = run_from_args(&args).unwrap();

        let printed = Profile::from_json(&json).unwrap();
        let stored = Profile::from_json(&fs::read_to_string(&profile_path).unwrap()).unwrap();
        assert_eq!(printed, stored);
        assert_eq!(stored.target_tracking_system, "oculus");

        let err = rotation_distance(
            &stored.result.rotation_matrix(),
            &calibration.rotation.to_rotation_matrix().into_inner(),
        );
        assert!(err < 1e-5, "rotation error {err}");
        let t_err = (stored.result.translation - calibration.translation.vector * 100.0).norm();
        assert!(t_err < 1e-3, "translation error {t_err} cm");
    }

    #[test]
    fn untracked_target_reports_messages() {
        let (mut recording, _) = synthetic_recording(9, 10);
        for frame in &mut recording.frames {
            frame.target = None;
        }
        let profile = NamedTempFile::new().unwrap();

        let err = run_replay(&recording, EngineConfig::default(), profile.path()).unwrap_err();
        assert!(err.to_string().contains("Target device is not tracking"), "{err}");
    }

    #[test]
    fn short_recording_does_not_complete() {
        let (recording, _) = synthetic_recording(10, 20);
        let dir = tempdir().unwrap();
        let err = run_replay(&recording, EngineConfig::default(), &dir.path().join("p.json"))
            .unwrap_err();
        assert!(err.to_string().contains("Rotation"), "{err}");
    }
}
