//! Tick-driven calibration engine.
//!
//! The host loop owns one [`CalibrationEngine`], forwards operator actions to
//! it and calls [`CalibrationEngine::tick`] at (roughly) the interval
//! returned by [`CalibrationEngine::wanted_update_interval`].

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use spacecal_core::{CalibrationResult, Mat3, Real, Sample, Vec3};
use spacecal_linear::{estimate_rotation, estimate_translation, JointAccumulator};

use crate::{
    CalibrationEvent, CalibrationHost, CalibrationSpeed, CalibrationState, DeviceId,
    DeviceTransform, EngineConfig, MessageLog, Profile, SolverMode,
};

const CENTIMETERS_PER_METER: Real = 100.0;

/// State captured when the operator grabs the calibration.
#[derive(Debug, Clone, Copy)]
struct ReferencingSnapshot {
    reference_position: Vec3,
    /// Working translation (cm) before the grab.
    translation: Vec3,
}

#[derive(Debug)]
pub struct CalibrationEngine {
    config: EngineConfig,
    state: CalibrationState,

    reference_device: Option<DeviceId>,
    target_device: Option<DeviceId>,
    reference_system: String,
    target_system: String,

    samples: Vec<Sample>,
    joint: JointAccumulator,
    solved_rotation: Option<Mat3>,

    working: CalibrationResult,
    committed: Option<Profile>,
    messages: MessageLog,

    last_apply: Option<f64>,
    profile_loaded: bool,
    referencing: Option<ReferencingSnapshot>,
}

impl CalibrationEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate().context("invalid engine configuration")?;
        Ok(Self {
            working: CalibrationResult {
                convention: config.convention,
                ..CalibrationResult::default()
            },
            config,
            state: CalibrationState::None,
            reference_device: None,
            target_device: None,
            reference_system: String::new(),
            target_system: String::new(),
            samples: Vec::new(),
            joint: JointAccumulator::new(),
            solved_rotation: None,
            committed: None,
            messages: MessageLog::default(),
            last_apply: None,
            profile_loaded: false,
            referencing: None,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Working result: the last solve, or the operator's edits.
    pub fn result(&self) -> &CalibrationResult {
        &self.working
    }

    /// Mutable access to the working result; edits are pushed to the target
    /// device while in `Editing`.
    pub fn result_mut(&mut self) -> &mut CalibrationResult {
        &mut self.working
    }

    /// Last committed profile.
    pub fn profile(&self) -> Option<&Profile> {
        self.committed.as_ref()
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    /// Samples currently buffered (or accumulated) for the running phase.
    pub fn sample_count(&self) -> usize {
        self.samples.len().max(self.joint.len())
    }

    pub fn reference_device(&self) -> Option<DeviceId> {
        self.reference_device
    }

    pub fn target_device(&self) -> Option<DeviceId> {
        self.target_device
    }

    /// Seconds the host should wait before the next tick.
    pub fn wanted_update_interval(&self) -> Real {
        match self.state {
            CalibrationState::None => self.config.intervals.idle,
            CalibrationState::Editing | CalibrationState::Referencing => {
                self.config.intervals.editing
            }
            _ => self.config.intervals.sampling,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Setup
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_devices(&mut self, reference: Option<DeviceId>, target: Option<DeviceId>) {
        self.reference_device = reference;
        self.target_device = target;
    }

    pub fn set_tracking_systems(
        &mut self,
        reference: impl Into<String>,
        target: impl Into<String>,
    ) {
        self.reference_system = reference.into();
        self.target_system = target.into();
    }

    pub fn set_speed(&mut self, speed: CalibrationSpeed) {
        self.config.speed = speed;
    }

    pub fn set_mode(&mut self, mode: SolverMode) {
        self.config.mode = mode;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Operator actions
    // ─────────────────────────────────────────────────────────────────────

    /// Request a new calibration run; device checks happen on the next tick.
    pub fn start_calibration(&mut self) -> Result<()> {
        self.transition(CalibrationEvent::Start)?;
        self.messages.clear();
        Ok(())
    }

    /// Drop the running calibration and return to idle.
    ///
    /// A half-finished run is rolled back: the target gets the committed
    /// transform again, or none if nothing was committed.
    pub fn abort_calibration<H: CalibrationHost>(&mut self, host: &mut H) -> Result<()> {
        let was_sampling = self.state.is_sampling();
        self.transition(CalibrationEvent::Abort)?;
        if was_sampling {
            self.roll_back(host)?;
        }
        self.messages.push_text("Calibration aborted");
        info!("calibration aborted");
        Ok(())
    }

    pub fn begin_editing(&mut self) -> Result<()> {
        self.transition(CalibrationEvent::Edit)?;
        self.working = self.committed_result();
        Ok(())
    }

    /// Persist the edited result and return to idle.
    pub fn commit_edit<H: CalibrationHost>(&mut self, host: &mut H) -> Result<()> {
        if self.state != CalibrationState::Editing {
            bail!("cannot commit an edit in state {:?}", self.state);
        }
        self.commit_working(host);
        self.transition(CalibrationEvent::Commit)
    }

    /// Discard edits; the committed profile is re-applied on the next idle
    /// tick.
    pub fn cancel_edit(&mut self) -> Result<()> {
        self.transition(CalibrationEvent::Cancel)?;
        self.working = self.committed_result();
        Ok(())
    }

    /// Start dragging the calibration with the reference device.
    pub fn begin_referencing<H: CalibrationHost>(&mut self, host: &mut H) -> Result<()> {
        if self.state != CalibrationState::Editing {
            bail!("cannot start referencing in state {:?}", self.state);
        }
        let reference = self.require_reference()?;
        let pose = host
            .device_pose(reference)
            .with_context(|| format!("failed to read pose of reference device {reference}"))?;
        if !pose.valid {
            bail!("reference device {reference} is not tracking");
        }

        self.transition(CalibrationEvent::Grab)?;
        self.referencing = Some(ReferencingSnapshot {
            reference_position: pose.pose.translation,
            translation: self.working.translation,
        });
        Ok(())
    }

    /// Release the grab, persist the nudged result and go back to editing.
    pub fn end_referencing<H: CalibrationHost>(&mut self, host: &mut H) -> Result<()> {
        self.transition(CalibrationEvent::Release)?;
        self.commit_working(host);
        Ok(())
    }

    /// Forget the committed calibration and clear the target's offset.
    pub fn clear_profile<H: CalibrationHost>(&mut self, host: &mut H) -> Result<()> {
        if self.state.is_sampling() {
            self.transition(CalibrationEvent::Abort)?;
        }
        self.committed = None;
        self.solved_rotation = None;
        self.working = self.blank_result();
        if let Some(target) = self.target_device {
            host.clear_device_transform(target)
                .with_context(|| format!("failed to clear transform of device {target}"))?;
        }
        self.report(host, "Calibration cleared");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tick
    // ─────────────────────────────────────────────────────────────────────

    /// Advance the engine by one step; `now` is a monotonic time in seconds.
    ///
    /// Tracking loss and solver failures are reported as messages and send
    /// the engine back to idle. Host failures are returned.
    pub fn tick<H: CalibrationHost>(&mut self, now: f64, host: &mut H) -> Result<()> {
        host.refresh_poses().context("failed to refresh device poses")?;

        match self.state {
            CalibrationState::None => self.tick_idle(now, host),
            CalibrationState::Begin => self.tick_begin(host),
            CalibrationState::Rotation => self.tick_rotation(host),
            CalibrationState::Translation => self.tick_translation(host),
            CalibrationState::Editing => self.tick_editing(now, host),
            CalibrationState::Referencing => self.tick_referencing(host),
        }
    }

    fn tick_idle<H: CalibrationHost>(&mut self, now: f64, host: &mut H) -> Result<()> {
        if !self.profile_loaded {
            self.profile_loaded = true;
            if self.committed.is_none() {
                self.load_profile(host);
            }
        }

        let Some((transform, system)) = self
            .committed
            .as_ref()
            .filter(|p| p.valid)
            .map(|p| (DeviceTransform::from_result(&p.result), p.target_tracking_system.clone()))
        else {
            return Ok(());
        };
        if !self.interval_elapsed(now, self.config.intervals.idle) {
            return Ok(());
        }
        self.apply_to_targets(host, &transform, &system)
    }

    fn tick_begin<H: CalibrationHost>(&mut self, host: &mut H) -> Result<()> {
        let (Some(reference), Some(target)) = (self.reference_device, self.target_device) else {
            self.report(host, "Missing reference or target device");
            return self.transition(CalibrationEvent::DevicesMissing);
        };
        if reference == target {
            self.report(host, "Reference and target must be different devices");
            return self.transition(CalibrationEvent::DevicesMissing);
        }

        let reference_pose = host
            .device_pose(reference)
            .with_context(|| format!("failed to read pose of reference device {reference}"))?;
        let target_pose = host
            .device_pose(target)
            .with_context(|| format!("failed to read pose of target device {target}"))?;
        if !reference_pose.valid {
            self.report(host, "Reference device is not tracking");
            return self.transition(CalibrationEvent::DevicesMissing);
        }
        if !target_pose.valid {
            self.report(host, "Target device is not tracking");
            return self.transition(CalibrationEvent::DevicesMissing);
        }

        host.clear_device_transform(target)
            .with_context(|| format!("failed to clear transform of device {target}"))?;
        self.solved_rotation = None;
        self.working = self.blank_result();

        self.report(host, "Starting calibration...");
        self.transition(CalibrationEvent::DevicesReady)
    }

    fn tick_rotation<H: CalibrationHost>(&mut self, host: &mut H) -> Result<()> {
        if self.config.mode == SolverMode::Joint {
            // The joint solve recovers rotation itself.
            self.report(host, "Joint mode: solving rotation and translation together");
            return self.transition(CalibrationEvent::RotationSolved);
        }

        let target_count = self.config.speed.sample_count();
        let sample = self.capture_sample(host)?;
        if !sample.valid {
            debug!("rotation phase: skipping untracked sample");
            return Ok(());
        }
        self.samples.push(sample);
        self.progress(host, self.samples.len(), target_count);
        if self.samples.len() < target_count {
            return Ok(());
        }

        let estimate = match estimate_rotation(&self.samples, &self.config.rotation) {
            Ok(estimate) => estimate,
            Err(err) => {
                warn!("rotation solve failed: {err}");
                self.report(host, format!("Rotation calibration failed: {err}"));
                self.transition(CalibrationEvent::SolveFailed)?;
                return self.roll_back(host);
            }
        };

        self.solved_rotation = Some(estimate.rotation);
        self.working.set_rotation(&estimate.rotation);
        let target = self.require_target()?;
        host.apply_device_transform(
            target,
            &DeviceTransform::rotation_only(self.working.rotation_quaternion()),
        )
        .with_context(|| format!("failed to apply rotation to device {target}"))?;

        let angles = self.working.rotation;
        self.report(
            host,
            format!(
                "Rotation solved from {} deltas: yaw {:.2} pitch {:.2} roll {:.2}",
                estimate.delta_count, angles.yaw, angles.pitch, angles.roll
            ),
        );
        self.transition(CalibrationEvent::RotationSolved)
    }

    fn tick_translation<H: CalibrationHost>(&mut self, host: &mut H) -> Result<()> {
        let sample = self.capture_sample(host)?;
        if !sample.valid {
            debug!("translation phase: skipping untracked sample");
            return Ok(());
        }

        let solved = match self.config.mode {
            SolverMode::TwoPhase => {
                let target_count = self.config.speed.sample_count();
                self.samples.push(sample);
                self.progress(host, self.samples.len(), target_count);
                if self.samples.len() < target_count {
                    return Ok(());
                }
                self.solve_translation()
            }
            SolverMode::Joint => {
                let target_count = self.config.joint.sample_count;
                self.joint.add_sample(&sample);
                self.progress(host, self.joint.len(), target_count);
                if self.joint.len() < target_count {
                    return Ok(());
                }
                self.solve_joint()
            }
        };

        if let Err(text) = solved {
            warn!("{text}");
            self.report(host, text);
            self.transition(CalibrationEvent::SolveFailed)?;
            return self.roll_back(host);
        }

        let target = self.require_target()?;
        host.apply_device_transform(target, &DeviceTransform::from_result(&self.working))
            .with_context(|| format!("failed to apply calibration to device {target}"))?;

        let t = self.working.translation;
        self.report(
            host,
            format!(
                "Translation solved: {:.2} {:.2} {:.2} cm (scale {:.4})",
                t.x, t.y, t.z, self.working.scale
            ),
        );
        self.commit_working(host);
        self.report(host, "Calibration complete");
        self.transition(CalibrationEvent::TranslationSolved)
    }

    fn solve_translation(&mut self) -> std::result::Result<(), String> {
        let rotation = self
            .solved_rotation
            .unwrap_or_else(|| self.working.rotation_matrix());
        let estimate = estimate_translation(&self.samples, &rotation)
            .map_err(|err| format!("Translation calibration failed: {err}"))?;
        self.working.set_translation_meters(&estimate.translation);
        self.working.scale = 1.0;
        Ok(())
    }

    fn solve_joint(&mut self) -> std::result::Result<(), String> {
        let estimate = self
            .joint
            .solve(&self.config.joint)
            .map_err(|err| format!("Joint calibration failed: {err}"))?;
        let mut result = CalibrationResult::from_rotation_translation(
            &estimate.rotation,
            &estimate.translation,
            self.config.convention,
        );
        result.scale = estimate.scale;
        self.working = result;
        Ok(())
    }

    fn tick_editing<H: CalibrationHost>(&mut self, now: f64, host: &mut H) -> Result<()> {
        if !self.interval_elapsed(now, self.config.intervals.editing) {
            return Ok(());
        }
        let transform = DeviceTransform::from_result(&self.working);
        let system = self.target_system.clone();
        self.apply_to_targets(host, &transform, &system)
    }

    fn tick_referencing<H: CalibrationHost>(&mut self, host: &mut H) -> Result<()> {
        let Some(snapshot) = self.referencing else {
            bail!("referencing without a captured reference pose");
        };
        let reference = self.require_reference()?;
        let pose = host
            .device_pose(reference)
            .with_context(|| format!("failed to read pose of reference device {reference}"))?;
        if !pose.valid {
            return Ok(());
        }

        let moved = pose.pose.translation - snapshot.reference_position;
        self.working.translation = snapshot.translation + moved * CENTIMETERS_PER_METER;

        let target = self.require_target()?;
        host.apply_device_transform(target, &DeviceTransform::from_result(&self.working))
            .with_context(|| format!("failed to apply calibration to device {target}"))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────

    /// Move along `event`; every transition discards buffered samples.
    fn transition(&mut self, event: CalibrationEvent) -> Result<()> {
        let Some(next) = self.state.next(event) else {
            bail!("{event:?} is not allowed in state {:?}", self.state);
        };
        info!("calibration state {:?} -> {next:?} on {event:?}", self.state);
        self.state = next;
        self.samples.clear();
        self.joint.reset();
        self.last_apply = None;
        self.referencing = None;
        Ok(())
    }

    fn capture_sample<H: CalibrationHost>(&mut self, host: &mut H) -> Result<Sample> {
        let reference = self.require_reference()?;
        let target = self.require_target()?;
        let reference_pose = host
            .device_pose(reference)
            .with_context(|| format!("failed to read pose of reference device {reference}"))?;
        let target_pose = host
            .device_pose(target)
            .with_context(|| format!("failed to read pose of target device {target}"))?;

        if reference_pose.valid && target_pose.valid {
            Ok(Sample::new(reference_pose.pose, target_pose.pose))
        } else {
            Ok(Sample::invalid())
        }
    }

    /// Drop the partial result of a failed or aborted run and put the
    /// committed transform back on the target.
    fn roll_back<H: CalibrationHost>(&mut self, host: &mut H) -> Result<()> {
        self.working = self.committed_result();
        self.solved_rotation = None;
        let Some(target) = self.target_device else {
            return Ok(());
        };
        match self.committed.as_ref().filter(|p| p.valid) {
            Some(profile) => host
                .apply_device_transform(target, &DeviceTransform::from_result(&profile.result))
                .with_context(|| format!("failed to restore calibration of device {target}")),
            None => host
                .clear_device_transform(target)
                .with_context(|| format!("failed to clear transform of device {target}")),
        }
    }

    fn load_profile<H: CalibrationHost>(&mut self, host: &mut H) {
        match host.load_profile() {
            Ok(Some(profile)) => {
                self.reference_system = profile.reference_tracking_system.clone();
                self.target_system = profile.target_tracking_system.clone();
                self.working = profile.result;
                self.config.speed = profile.speed;
                self.report(
                    host,
                    format!(
                        "Loaded profile {} -> {}",
                        profile.target_tracking_system, profile.reference_tracking_system
                    ),
                );
                self.committed = Some(profile);
            }
            Ok(None) => debug!("no stored calibration profile"),
            Err(err) => {
                warn!("failed to load profile: {err:#}");
                self.report(host, format!("Failed to load profile: {err:#}"));
            }
        }
    }

    /// Promote the working result to the committed profile and persist it.
    ///
    /// A failed save is reported; the in-memory profile stays in use.
    fn commit_working<H: CalibrationHost>(&mut self, host: &mut H) {
        let profile = Profile::new(
            self.reference_system.clone(),
            self.target_system.clone(),
            self.working,
            self.config.speed,
        );
        if let Err(err) = host.persist_profile(&profile) {
            warn!("failed to persist profile: {err:#}");
            self.report(host, format!("Failed to save profile: {err:#}"));
        }
        self.profile_loaded = true;
        self.committed = Some(profile);
    }

    fn apply_to_targets<H: CalibrationHost>(
        &mut self,
        host: &mut H,
        transform: &DeviceTransform,
        system: &str,
    ) -> Result<()> {
        let mut devices: Vec<DeviceId> = self.target_device.into_iter().collect();
        if !system.is_empty() {
            devices.extend(
                host.devices_in_system(system)
                    .with_context(|| format!("failed to list devices of {system}"))?,
            );
        }
        devices.sort_unstable();
        devices.dedup();

        for id in devices {
            if Some(id) == self.reference_device {
                continue;
            }
            host.apply_device_transform(id, transform)
                .with_context(|| format!("failed to apply calibration to device {id}"))?;
        }
        Ok(())
    }

    fn interval_elapsed(&mut self, now: f64, interval: Real) -> bool {
        if let Some(last) = self.last_apply {
            if now - last < interval {
                return false;
            }
        }
        self.last_apply = Some(now);
        true
    }

    fn progress<H: CalibrationHost>(&mut self, host: &mut H, current: usize, target: usize) {
        self.messages.push_progress(current, target);
        host.report_progress(current, target);
    }

    fn report<H: CalibrationHost>(&mut self, host: &mut H, text: impl Into<String>) {
        let message = self.messages.push_text(text);
        info!("{message}");
        host.report_message(message);
    }

    fn committed_result(&self) -> CalibrationResult {
        self.committed
            .as_ref()
            .map(|p| p.result)
            .unwrap_or_else(|| self.blank_result())
    }

    fn blank_result(&self) -> CalibrationResult {
        CalibrationResult {
            convention: self.config.convention,
            ..CalibrationResult::default()
        }
    }

    fn require_reference(&self) -> Result<DeviceId> {
        self.reference_device
            .context("no reference device selected")
    }

    fn require_target(&self) -> Result<DeviceId> {
        self.target_device.context("no target device selected")
    }
}
