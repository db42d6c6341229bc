//! Capture loop of one monitored camera.
//!
//! A [`CameraSession`] owns everything tied to its camera: the frame source,
//! the ring buffer of recent frames, the optional recording writer and the
//! alert cooldown. It runs on its own task and only talks to the outside
//! through channels:
//!
//! - a `watch` stop flag, checked at the top of every iteration and during
//!   every pause (reads in flight are never interrupted, so stopping can take
//!   up to one read timeout),
//! - a command queue for recording requests, drained at the same point,
//! - a `watch` of [`SessionInfo`] it publishes to,
//! - a `broadcast` tap carrying every frame to live viewers.
//!
//! Only a failure to open the camera ends a session on its own. Read errors
//! move it to `Reconnecting` and are retried after a backoff, re-opening the
//! source every few consecutive failures. Classifier errors and timeouts
//! count as "no detection".

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep, timeout, Instant};

use crate::alerting::{AlertDispatcher, DeliveryStatus};
use crate::camera_registry::CameraDescriptor;
use crate::classification::{Classifier, DetectionPolicy, Verdict};
use crate::configuration::MonitoringConfig;
use crate::data_capture::{
    ClipWriter, Frame, FrameRingBuffer, FrameSource, FrameSourceFactory, FrameWriter,
    IncidentClip, RecordingFactory,
};
use crate::error_handling::types::CaptureError;
use crate::session_management::session::{SessionCommand, SessionInfo};
use crate::session_management::SessionState;

/// Collaborators shared by every session.
pub struct SessionContext {
    pub sources: Arc<dyn FrameSourceFactory>,
    pub classifier: Arc<dyn Classifier>,
    pub clip_writer: Arc<dyn ClipWriter>,
    pub recordings: Arc<dyn RecordingFactory>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub config: MonitoringConfig,
    pub classifier_timeout: Duration,
}

/// Runs once the session released its camera, before `Stopped` is published.
pub type ExitHook = Box<dyn FnOnce() + Send>;

pub struct CameraSession {
    camera: CameraDescriptor,
    label: String,
    context: Arc<SessionContext>,
    policy: DetectionPolicy,
    buffer: FrameRingBuffer,
    frame_counter: u64,
    last_alert: Option<Instant>,
    source: Option<Box<dyn FrameSource>>,
    recording: Option<Box<dyn FrameWriter>>,
    stop: watch::Receiver<bool>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    info: watch::Sender<SessionInfo>,
    tap: broadcast::Sender<Frame>,
    on_exit: Option<ExitHook>,
}

impl CameraSession {
    pub fn new(
        camera: CameraDescriptor,
        context: Arc<SessionContext>,
        stop: watch::Receiver<bool>,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        info: watch::Sender<SessionInfo>,
        tap: broadcast::Sender<Frame>,
    ) -> Self {
        let label = camera.label();
        let policy = DetectionPolicy::new(context.config.confidence_threshold);
        let buffer = FrameRingBuffer::new(context.config.buffer_capacity);
        Self {
            camera,
            label,
            context,
            policy,
            buffer,
            frame_counter: 0,
            last_alert: None,
            source: None,
            recording: None,
            stop,
            commands,
            info,
            tap,
            on_exit: None,
        }
    }

    pub fn with_exit_hook(mut self, hook: ExitHook) -> Self {
        self.on_exit = Some(hook);
        self
    }

    pub async fn run(mut self) {
        info!("{} Connecting to '{}'", self.label, self.camera.uri);
        match self.context.sources.open(&self.camera).await {
            Ok(source) => self.source = Some(source),
            Err(e) => {
                error!("{} Cannot open camera, giving up: {}", self.label, e);
                self.shutdown().await;
                return;
            }
        }
        self.set_state(SessionState::Streaming);
        info!("{} Monitoring started", self.label);

        let config = self.context.config.clone();
        let reopen_after = config.reopen_after_failures.max(1);
        let mut consecutive_failures: u32 = 0;

        loop {
            if self.stop_requested() {
                break;
            }
            self.drain_commands().await;

            let read = match self.source.as_mut() {
                Some(source) => source.read_frame().await,
                None => Err(CaptureError::ReadFailure("source not open".into())),
            };

            match read {
                Ok(frame) => {
                    if consecutive_failures > 0 {
                        info!(
                            "{} Feed recovered after {} failed reads",
                            self.label, consecutive_failures
                        );
                        consecutive_failures = 0;
                        self.set_state(SessionState::Streaming);
                    }
                    self.on_frame(frame).await;
                    if self.pause(config.frame_interval()).await {
                        break;
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        "{} Read failed ({} in a row): {}",
                        self.label, consecutive_failures, e
                    );
                    self.set_state(SessionState::Reconnecting);
                    if self.pause(config.reconnect_backoff()).await {
                        break;
                    }
                    if consecutive_failures % reopen_after == 0 {
                        self.reopen().await;
                    }
                }
            }
        }

        info!("{} Stop requested", self.label);
        self.shutdown().await;
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Sleeps for `duration`; returns `true` if a stop was requested meanwhile.
    async fn pause(&mut self, duration: Duration) -> bool {
        if self.stop_requested() {
            return true;
        }
        tokio::select! {
            _ = sleep(duration) => false,
            // A dropped sender means the supervisor is gone.
            _ = self.stop.changed() => true,
        }
    }

    async fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            debug!("{} Applying {:?}", self.label, command);
            match command {
                SessionCommand::StartRecording(writer) => {
                    self.finish_recording("replaced by a new recording").await;
                    self.recording = Some(writer);
                    self.info.send_modify(|info| info.recording = true);
                    info!("{} Recording started", self.label);
                }
                SessionCommand::StopRecording => {
                    self.finish_recording("stop requested").await;
                }
            }
        }
    }

    async fn on_frame(&mut self, frame: Frame) {
        self.buffer.append(frame.clone());
        self.frame_counter += 1;
        let frames_read = self.frame_counter;
        self.info.send_modify(|info| info.frames_read = frames_read);

        // No subscribers is the normal case.
        let _ = self.tap.send(frame.clone());

        self.write_recording(&frame).await;

        if self.frame_counter % self.context.config.sample_interval.max(1) == 0 {
            self.classify(&frame).await;
        }
    }

    async fn write_recording(&mut self, frame: &Frame) {
        let Some(writer) = self.recording.as_mut() else {
            return;
        };
        if let Err(e) = writer.write_frame(frame).await {
            warn!("{} Recording write failed: {}", self.label, e);
            self.finish_recording("write error").await;
            return;
        }
        if writer.frames_written() >= self.context.config.recording_max_frames {
            self.finish_recording("frame limit reached").await;
        }
    }

    async fn finish_recording(&mut self, reason: &str) {
        let Some(mut writer) = self.recording.take() else {
            return;
        };
        self.info.send_modify(|info| info.recording = false);
        match writer.finish().await {
            Ok(path) => info!(
                "{} Recording saved to {} ({})",
                self.label,
                path.display(),
                reason
            ),
            Err(e) => error!("{} Recording could not be finalised: {}", self.label, e),
        }
    }

    async fn classify(&mut self, frame: &Frame) {
        let call = self.context.classifier.classify(frame);
        let verdict = match timeout(self.context.classifier_timeout, call).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                warn!("{} Classifier error, skipping sample: {}", self.label, e);
                return;
            }
            Err(_) => {
                warn!("{} Classifier timed out, skipping sample", self.label);
                return;
            }
        };

        if !self.policy.is_alert(&verdict) {
            debug!(
                "{} Frame {}: fall={} confidence={:.2}",
                self.label, self.frame_counter, verdict.fall_detected, verdict.confidence
            );
            return;
        }

        let now = Instant::now();
        if let Some(last) = self.last_alert {
            if now.duration_since(last) <= self.context.config.cooldown() {
                info!(
                    "{} Fall detected (confidence {:.2}) within cooldown, suppressed",
                    self.label, verdict.confidence
                );
                return;
            }
        }
        self.last_alert = Some(now);
        self.raise_alert(frame, verdict);
    }

    fn raise_alert(&mut self, frame: &Frame, verdict: Verdict) {
        let detected_at = frame.captured_at();
        warn!(
            "{} FALL DETECTED (confidence {:.2})",
            self.label, verdict.confidence
        );

        let clip = IncidentClip {
            user_id: self.camera.key.user_id.clone(),
            camera_index: self.camera.key.index,
            camera_name: self.camera.name.clone(),
            detected_at,
            confidence: verdict.confidence,
            frames: self.buffer.snapshot(),
            nominal_fps: self.context.config.nominal_fps,
        };
        let writer = Arc::clone(&self.context.clip_writer);
        let label = self.label.clone();
        tokio::spawn(async move {
            match writer.write_clip(clip).await {
                Ok(record) => debug!("{} Clip {} stored", label, record.file_name),
                Err(e) => error!("{} Incident clip failed: {}", label, e),
            }
        });

        let message = format!(
            "Fall detected in {} at {}!",
            self.camera.name,
            detected_at.with_timezone(&Local).format("%H:%M:%S")
        );
        match self
            .context
            .dispatcher
            .send(&self.camera.key.user_id, &message)
        {
            DeliveryStatus::Delivered => info!("{} Alert delivered", self.label),
            status => info!("{} Alert not delivered: {:?}", self.label, status),
        }
        self.info.send_modify(|info| info.alerts_sent += 1);
    }

    async fn reopen(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close().await;
        }
        info!("{} Re-opening camera", self.label);
        match self.context.sources.open(&self.camera).await {
            Ok(source) => self.source = Some(source),
            Err(e) => warn!("{} Re-open failed, still reconnecting: {}", self.label, e),
        }
    }

    fn set_state(&self, state: SessionState) {
        self.info.send_modify(|info| {
            if info.transition(state) {
                debug!("{} State -> {:?}", self.label, state);
            }
        });
    }

    async fn shutdown(&mut self) {
        self.finish_recording("session stopped").await;
        // Later requests are handed back to the supervisor; queued ones never started.
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let SessionCommand::StartRecording(mut writer) = command {
                info!("{} Dropping a recording requested while stopping", self.label);
                writer.discard().await;
            }
        }
        if let Some(mut source) = self.source.take() {
            source.close().await;
        }
        if let Some(hook) = self.on_exit.take() {
            hook();
        }
        self.set_state(SessionState::Stopped);
        info!(
            "{} Session stopped after {} frames",
            self.label, self.frame_counter
        );
    }
}
