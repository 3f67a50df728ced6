//! Capture session: the operations the host calls.

use log::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use crate::buffer::SampleBuffer;
use crate::calibration::{self, CalibrationStage};
use crate::compiler::{compile_recording, CompileSummary};
use crate::config::CaptureConfig;
use crate::convert::RootScale;
use crate::device::{DeviceRegistry, InputState, SharedRegistry};
use crate::error::Result;
use crate::host::HostScene;
use crate::polling::{PollContext, PollingLoop, SharedInputs};
use crate::preview::PreviewDriver;
use crate::scheduler::Scheduler;
use crate::source::SharedPoseSource;

/// One capture session: tracked devices, the polling thread, live preview and
/// recording state.
///
/// Everything except the polling thread runs on the host's main context.
/// Call [`stop_preview`](Self::stop_preview) before dropping a session so its
/// preview task leaves the scheduler; dropping only stops the polling thread.
pub struct CaptureSession {
    config: CaptureConfig,
    source: SharedPoseSource,
    registry: SharedRegistry,
    buffer: Arc<SampleBuffer>,
    root_scale: Arc<RootScale>,
    inputs: SharedInputs,
    poller: PollingLoop,
    preview: PreviewDriver,
    enabled: bool,
    recording: bool,
    record_start_frame: i32,
    calibration: CalibrationStage,
}

impl CaptureSession {
    pub fn new(source: SharedPoseSource, config: CaptureConfig) -> Self {
        let poller = PollingLoop::new(config.join_timeout());
        let preview = PreviewDriver::new(config.preview_period());
        Self {
            config,
            source,
            registry: Arc::new(RwLock::new(DeviceRegistry::new())),
            buffer: Arc::new(SampleBuffer::new()),
            root_scale: Arc::new(RootScale::default()),
            inputs: Arc::new(Mutex::new(HashMap::new())),
            poller,
            preview,
            enabled: false,
            recording: false,
            record_start_frame: 0,
            calibration: CalibrationStage::Idle,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn devices(&self) -> RwLockReadGuard<'_, DeviceRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_previewing(&self) -> bool {
        self.preview.is_active()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    pub fn record_start_frame(&self) -> i32 {
        self.record_start_frame
    }

    pub fn calibration_stage(&self) -> CalibrationStage {
        self.calibration
    }

    pub fn input_state(&self, serial: &str) -> Option<InputState> {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(serial)
            .copied()
    }

    fn poll_context(&self) -> PollContext {
        PollContext {
            source: self.source.clone(),
            registry: self.registry.clone(),
            buffer: self.buffer.clone(),
            root_scale: self.root_scale.clone(),
            inputs: self.inputs.clone(),
            error_backoff: self.config.error_backoff(),
        }
    }

    /// Enumerates devices and merges them into the registry by serial.
    /// Returns how many new devices were found.
    ///
    /// While polling, enumeration runs on the polling thread and is waited on
    /// for at most the join timeout. Fails with
    /// [`PollingStillRunning`](crate::CaptureError::PollingStillRunning) while a
    /// stopped thread has yet to exit.
    pub fn load_trackers(&mut self, reset: bool) -> Result<usize> {
        let context = self.poll_context();
        let added = self.poller.load_devices(&context, reset)?;
        info!(
            "Loaded trackers: {} known, {} new",
            self.devices().len(),
            added
        );
        Ok(added)
    }

    pub fn start_preview(
        &mut self,
        host: &dyn HostScene,
        scheduler: &mut dyn Scheduler,
    ) -> Result<()> {
        if self.is_previewing() && self.is_polling() {
            return Ok(());
        }
        self.root_scale.refresh(host, &self.config.root_object);
        self.poller.start(self.poll_context())?;
        self.preview.start(
            scheduler,
            self.buffer.clone(),
            self.registry.clone(),
            self.root_scale.clone(),
            self.config.root_object.clone(),
        );
        info!("Preview started");
        Ok(())
    }

    /// Unregisters the preview task and stops the polling thread. Safe to call
    /// at any time.
    pub fn stop_preview(&mut self, scheduler: &mut dyn Scheduler) {
        if !self.is_previewing() && !self.is_polling() {
            return;
        }
        self.preview.stop(scheduler);
        self.poller.stop();
        info!("Preview stopped");
    }

    /// Starts a new take at `record_start_frame`, discarding buffered samples.
    pub fn start_recording(&mut self, record_start_frame: i32) {
        self.record_start_frame = record_start_frame;
        self.buffer.clear();
        self.recording = true;
        info!("Recording started at frame {}", record_start_frame);
    }

    /// Ends the take and writes it as curves.
    ///
    /// Preview is paused while compiling and resumed afterwards if it was
    /// running. Stopping when not recording does nothing.
    pub fn stop_recording(
        &mut self,
        host: &mut dyn HostScene,
        scheduler: &mut dyn Scheduler,
    ) -> Result<CompileSummary> {
        if !self.recording {
            return Ok(CompileSummary::default());
        }
        self.recording = false;

        let resume_preview = self.is_previewing();
        self.stop_preview(scheduler);

        let frames = self.buffer.snapshot();
        let summary = {
            let registry = self.devices();
            compile_recording(host, &registry, &frames, self.record_start_frame)
        };
        self.buffer.clear();
        info!("Recording stopped");

        if resume_preview {
            self.start_preview(host, scheduler)?;
        }
        Ok(summary)
    }

    /// Enables the session (load trackers, start preview) or disables it.
    pub fn toggle_active(
        &mut self,
        host: &mut dyn HostScene,
        scheduler: &mut dyn Scheduler,
    ) -> Result<()> {
        if self.enabled {
            if self.recording {
                self.stop_recording(host, scheduler)?;
            }
            self.stop_preview(scheduler);
            self.enabled = false;
        } else {
            self.load_trackers(false)?;
            self.start_preview(host, scheduler)?;
            self.enabled = true;
        }
        Ok(())
    }

    /// Flips recording. Ignored while inactive or calibrating.
    pub fn toggle_recording(
        &mut self,
        host: &mut dyn HostScene,
        scheduler: &mut dyn Scheduler,
    ) -> Result<()> {
        if !self.enabled || self.calibration != CalibrationStage::Idle {
            debug!("Ignoring record toggle");
            return Ok(());
        }
        if self.recording {
            let summary = self.stop_recording(host, scheduler)?;
            debug!("{:?}", summary);
        } else {
            let start_frame = host.current_frame();
            self.start_preview(host, scheduler)?;
            self.start_recording(start_frame);
        }
        Ok(())
    }

    /// Advances calibration one stage. Ignored while recording.
    ///
    /// Preview is off for both calibration stages and back on once
    /// calibration completes.
    pub fn toggle_calibration(
        &mut self,
        host: &mut dyn HostScene,
        scheduler: &mut dyn Scheduler,
    ) -> Result<CalibrationStage> {
        if self.recording {
            debug!("Ignoring calibration toggle while recording");
            return Ok(self.calibration);
        }
        self.calibration = self.calibration.next();
        match self.calibration {
            CalibrationStage::Alignment => {
                self.stop_preview(scheduler);
                calibration::enter_alignment(
                    host,
                    &mut self.registry.write().unwrap_or_else(PoisonError::into_inner),
                );
                host.set_armature_rest_pose(true);
            }
            CalibrationStage::Offsetting => {
                self.stop_preview(scheduler);
                host.set_armature_rest_pose(false);
            }
            CalibrationStage::Idle => {
                calibration::finish_calibration(
                    host,
                    &mut self.registry.write().unwrap_or_else(PoisonError::into_inner),
                );
                host.set_armature_rest_pose(false);
                self.start_preview(host, scheduler)?;
            }
        }
        info!("Calibration stage: {:?}", self.calibration);
        Ok(self.calibration)
    }

    pub fn rename_device(
        &mut self,
        host: &mut dyn HostScene,
        serial: &str,
        new_name: &str,
    ) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.rename(host, &self.config, serial, new_name)
    }

    pub fn bind_bone(
        &mut self,
        host: &mut dyn HostScene,
        serial: &str,
        armature: &str,
        bone: &str,
    ) -> Result<()> {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.bind_bone(host, &self.config, serial, armature, bone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceClass;
    use crate::host::{Channel, CurveKey};
    use crate::mock::{MockScene, MockSource};
    use crate::scheduler::TimerQueue;
    use crate::source::DeviceDescriptor;
    use nalgebra as na;
    use std::thread;
    use std::time::{Duration, Instant};

    fn tracker_source() -> Arc<Mutex<MockSource>> {
        let mut source = MockSource::new();
        source.add_device(
            DeviceDescriptor {
                index: 3,
                serial: String::from("T1"),
                class: DeviceClass::Tracker,
            },
            na::Matrix4::new_translation(&na::Vector3::new(0.0, 1.0, 0.5)),
        );
        Arc::new(Mutex::new(source))
    }

    fn session(source: &Arc<Mutex<MockSource>>) -> CaptureSession {
        CaptureSession::new(source.clone(), CaptureConfig::default())
    }

    fn scene() -> MockScene {
        let mut scene = MockScene::new();
        scene.add_object("T1");
        scene.set_frame_rate(60.0);
        scene
    }

    fn wait_for_frames(session: &CaptureSession, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.buffer().len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for frames");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn activation_previews_live_poses() {
        let source = tracker_source();
        let mut session = session(&source);
        let mut scene = scene();
        let mut queue = TimerQueue::new();

        session.toggle_active(&mut scene, &mut queue).unwrap();
        assert!(session.is_enabled());
        assert!(session.is_previewing());
        assert_eq!(session.devices().len(), 1);

        wait_for_frames(&session, 1);
        queue.run_due(Instant::now(), &mut scene);
        // runtime y-up 1.0 lands on scene z
        assert_eq!(scene.object("T1").world[(2, 3)], 1.0);

        session.toggle_active(&mut scene, &mut queue).unwrap();
        assert!(!session.is_previewing());
        assert!(!session.is_polling());
        assert!(queue.is_empty());
    }

    #[test]
    fn recording_writes_curves_and_resumes_preview() {
        let source = tracker_source();
        let mut session = session(&source);
        let mut scene = scene();
        scene.current_frame = 12;
        let mut queue = TimerQueue::new();

        session.toggle_active(&mut scene, &mut queue).unwrap();
        session.toggle_recording(&mut scene, &mut queue).unwrap();
        assert!(session.is_recording());
        assert_eq!(session.record_start_frame(), 12);

        wait_for_frames(&session, 3);
        session.toggle_recording(&mut scene, &mut queue).unwrap();
        assert!(!session.is_recording());
        assert!(session.is_previewing());

        let curve = scene
            .curve("T1", CurveKey::new(Channel::Location, 2))
            .unwrap();
        assert!(curve.len() >= 3);
        assert_eq!(curve[0].frame, 12.0);
        assert!(curve.windows(2).all(|pair| pair[0].frame <= pair[1].frame));
        assert_eq!(scene.object("T1").curves.len(), 10);

        session.stop_preview(&mut queue);
    }

    #[test]
    fn stopping_an_empty_take_creates_no_curves() {
        let source = tracker_source();
        let mut session = session(&source);
        let mut scene = scene();
        let mut queue = TimerQueue::new();

        session.load_trackers(false).unwrap();
        session.start_recording(0);
        let summary = session.stop_recording(&mut scene, &mut queue).unwrap();
        assert_eq!(summary, CompileSummary::default());
        assert!(scene.object("T1").curves.is_empty());
        assert!(!session.is_previewing());
    }

    #[test]
    fn stopping_without_recording_is_a_no_op() {
        let source = tracker_source();
        let mut session = session(&source);
        let mut scene = scene();
        let mut queue = TimerQueue::new();
        session.buffer().append(crate::buffer::Frame::default());

        let summary = session.stop_recording(&mut scene, &mut queue).unwrap();
        assert_eq!(summary, CompileSummary::default());
        assert_eq!(session.buffer().len(), 1);
    }

    #[test]
    fn loading_trackers_after_a_timed_out_stop_returns_at_once() {
        let mut mock = MockSource::new();
        mock.add_device(
            DeviceDescriptor {
                index: 3,
                serial: String::from("T1"),
                class: DeviceClass::Tracker,
            },
            na::Matrix4::identity(),
        );
        mock.frame_delay = Duration::from_millis(500);
        let source = Arc::new(Mutex::new(mock));
        let config = CaptureConfig {
            join_timeout_ms: 10,
            ..CaptureConfig::default()
        };
        let mut session = CaptureSession::new(source, config);
        let scene = scene();
        let mut queue = TimerQueue::new();

        session.start_preview(&scene, &mut queue).unwrap();
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        session.stop_preview(&mut queue);
        assert!(started.elapsed() < Duration::from_millis(200));

        let started = Instant::now();
        assert!(matches!(
            session.load_trackers(false),
            Err(crate::CaptureError::PollingStillRunning)
        ));
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn loading_trackers_while_polling_merges_new_devices() {
        let source = tracker_source();
        let mut session = session(&source);
        let scene = scene();
        let mut queue = TimerQueue::new();

        assert_eq!(session.load_trackers(false).unwrap(), 1);
        session.start_preview(&scene, &mut queue).unwrap();
        source.lock().unwrap().add_device(
            DeviceDescriptor {
                index: 4,
                serial: String::from("T2"),
                class: DeviceClass::Tracker,
            },
            na::Matrix4::identity(),
        );
        assert_eq!(session.load_trackers(false).unwrap(), 1);
        assert_eq!(session.devices().len(), 2);

        session.stop_preview(&mut queue);
    }

    #[test]
    fn stop_preview_is_idempotent() {
        let source = tracker_source();
        let mut session = session(&source);
        let mut scene = scene();
        let mut queue = TimerQueue::new();

        session.stop_preview(&mut queue);
        session.start_preview(&scene, &mut queue).unwrap();
        session.start_preview(&scene, &mut queue).unwrap();
        assert_eq!(queue.len(), 1);

        session.stop_preview(&mut queue);
        session.stop_preview(&mut queue);
        assert!(!session.is_previewing());
        assert!(!session.is_polling());
        assert!(queue.is_empty());
        assert_eq!(queue.run_due(Instant::now(), &mut scene), 0);
    }

    #[test]
    fn record_toggle_needs_active_idle_session() {
        let source = tracker_source();
        let mut session = session(&source);
        let mut scene = scene();
        let mut queue = TimerQueue::new();

        session.toggle_recording(&mut scene, &mut queue).unwrap();
        assert!(!session.is_recording());

        session.toggle_active(&mut scene, &mut queue).unwrap();
        session.toggle_calibration(&mut scene, &mut queue).unwrap();
        session.toggle_recording(&mut scene, &mut queue).unwrap();
        assert!(!session.is_recording());

        session.toggle_active(&mut scene, &mut queue).unwrap();
    }

    #[test]
    fn calibration_pauses_preview() {
        let source = tracker_source();
        let mut session = session(&source);
        let mut scene = scene();
        let mut queue = TimerQueue::new();
        session.toggle_active(&mut scene, &mut queue).unwrap();

        let stage = session.toggle_calibration(&mut scene, &mut queue).unwrap();
        assert_eq!(stage, CalibrationStage::Alignment);
        assert!(!session.is_previewing());
        assert!(!session.is_polling());
        assert!(scene.rest_pose);

        let stage = session.toggle_calibration(&mut scene, &mut queue).unwrap();
        assert_eq!(stage, CalibrationStage::Offsetting);
        assert!(!session.is_previewing());
        assert!(!scene.rest_pose);

        let stage = session.toggle_calibration(&mut scene, &mut queue).unwrap();
        assert_eq!(stage, CalibrationStage::Idle);
        assert!(session.is_previewing());
        assert!(session.is_polling());

        session.toggle_active(&mut scene, &mut queue).unwrap();
    }

    #[test]
    fn reloading_trackers_does_not_duplicate() {
        let source = tracker_source();
        let mut session = session(&source);
        assert_eq!(session.load_trackers(false).unwrap(), 1);
        assert_eq!(session.load_trackers(false).unwrap(), 0);
        assert_eq!(session.devices().len(), 1);
        assert_eq!(session.load_trackers(true).unwrap(), 1);
    }

    #[test]
    fn renamed_devices_preview_under_new_name() {
        let source = tracker_source();
        let mut session = session(&source);
        let mut scene = scene();
        let mut queue = TimerQueue::new();
        session.toggle_active(&mut scene, &mut queue).unwrap();

        assert!(session.rename_device(&mut scene, "T1", "Hips"));
        assert!(scene.object_exists("Hips"));
        wait_for_frames(&session, 1);
        queue.run_due(Instant::now(), &mut scene);
        assert_eq!(scene.object("Hips").world[(2, 3)], 1.0);

        session.toggle_active(&mut scene, &mut queue).unwrap();
    }
}
