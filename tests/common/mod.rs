#![allow(dead_code)]

use parking_lot::Mutex;
use pose_pipeline::config::PipelineConfig;
use pose_pipeline::display::{DisplayAction, DisplayStats, FrameDisplay};
use pose_pipeline::slots::Slot;
use pose_pipeline::{
    EstimatorError, FeedbackBus, Frame, FrameHeader, ImageMessage, Keypoint, Orchestrator, Pose,
    PoseEstimator, SharedState,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.pipeline.first_frame_poll_ms = 10;
    config.pipeline.ready_poll_ms = 1;
    config
}

/// Uniform grey frame whose pixel value encodes the sequence number.
pub fn stream_message(seq: u64) -> ImageMessage {
    let value = (seq % 200) as u8 + 20;
    ImageMessage::bgr8(FrameHeader::new(seq, "camera"), 64, 48, vec![value; 64 * 48 * 3])
}

/// Deterministic estimator: one pose whose joints depend only on the frame
/// content, so equal inputs render equal outputs.
#[derive(Default)]
pub struct ScriptedEstimator {
    pub loaded_model: Arc<Mutex<Option<std::path::PathBuf>>>,
    pub inferences: Arc<AtomicUsize>,
    pending: Option<Vec<Pose>>,
}

impl PoseEstimator for ScriptedEstimator {
    fn name(&self) -> String {
        "scripted".into()
    }

    fn load(&mut self, config: &pose_pipeline::config::EstimatorConfig) -> Result<(), EstimatorError> {
        *self.loaded_model.lock() = Some(config.model_path());
        Ok(())
    }

    fn reshape(&mut self, _frame: &Frame) -> Result<(), EstimatorError> {
        Ok(())
    }

    fn submit(&mut self, frame: &Frame) -> Result<(), EstimatorError> {
        let shade = frame.data.first().copied().unwrap_or(0) as f32;
        let cx = frame.width as f32 / 2.0;
        let mut pose = Pose::empty(1.0);
        pose.keypoints[0] = Some(Keypoint { x: cx, y: 6.0 + shade % 5.0 });
        pose.keypoints[1] = Some(Keypoint { x: cx, y: 16.0 });
        pose.keypoints[8] = Some(Keypoint { x: cx - 6.0, y: 36.0 });
        pose.keypoints[11] = Some(Keypoint { x: cx + 6.0, y: 36.0 });
        self.pending = Some(vec![pose]);
        self.inferences.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        self.pending.is_some()
    }

    fn collect_results(&mut self) -> Result<Vec<Pose>, EstimatorError> {
        self.pending
            .take()
            .ok_or_else(|| EstimatorError::Inference("nothing submitted".into()))
    }
}

/// Estimator whose result only becomes ready once `gate` is opened.
pub struct GatedEstimator {
    pub gate: Arc<AtomicBool>,
    pub submitted: Arc<Notify>,
    pub completed: Arc<AtomicUsize>,
}

impl GatedEstimator {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(AtomicBool::new(false)),
            submitted: Arc::new(Notify::new()),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl PoseEstimator for GatedEstimator {
    fn name(&self) -> String {
        "gated".into()
    }

    fn reshape(&mut self, _frame: &Frame) -> Result<(), EstimatorError> {
        Ok(())
    }

    fn submit(&mut self, _frame: &Frame) -> Result<(), EstimatorError> {
        self.submitted.notify_one();
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        self.gate.load(Ordering::SeqCst)
    }

    fn collect_results(&mut self) -> Result<Vec<Pose>, EstimatorError> {
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

/// Always fails at submit time.
pub struct FailingEstimator;

impl PoseEstimator for FailingEstimator {
    fn name(&self) -> String {
        "failing".into()
    }

    fn reshape(&mut self, _frame: &Frame) -> Result<(), EstimatorError> {
        Ok(())
    }

    fn submit(&mut self, _frame: &Frame) -> Result<(), EstimatorError> {
        Err(EstimatorError::Inference("accelerator unavailable".into()))
    }

    fn is_ready(&mut self) -> bool {
        false
    }

    fn collect_results(&mut self) -> Result<Vec<Pose>, EstimatorError> {
        Ok(Vec::new())
    }
}

/// Panics inside `submit`, as a crashing driver would.
pub struct PanickingEstimator;

impl PoseEstimator for PanickingEstimator {
    fn name(&self) -> String {
        "panicking".into()
    }

    fn reshape(&mut self, _frame: &Frame) -> Result<(), EstimatorError> {
        Ok(())
    }

    fn submit(&mut self, _frame: &Frame) -> Result<(), EstimatorError> {
        panic!("inference driver crashed");
    }

    fn is_ready(&mut self) -> bool {
        true
    }

    fn collect_results(&mut self) -> Result<Vec<Pose>, EstimatorError> {
        Ok(Vec::new())
    }
}

/// Records the sequence number and render state of every displayed slot.
#[derive(Clone, Default)]
pub struct RecordingDisplay {
    pub shown: Arc<Mutex<Vec<(u64, bool)>>>,
}

impl FrameDisplay for RecordingDisplay {
    fn show(&mut self, slot: &Slot, _stats: &DisplayStats) -> DisplayAction {
        self.shown.lock().push((slot.frame.header.seq, slot.rendered));
        DisplayAction::Continue
    }
}

pub fn orchestrator(
    shared: &Arc<SharedState>,
    estimator: Box<dyn PoseEstimator>,
) -> (Orchestrator, FeedbackBus) {
    let bus = FeedbackBus::new(16);
    let orchestrator = Orchestrator::new(test_config(), shared.clone(), estimator, bus.clone())
        .expect("orchestrator builds");
    (orchestrator, bus)
}
