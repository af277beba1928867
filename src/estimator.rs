// THEORY:
// The pose estimator is an external collaborator: the pipeline never knows how a
// model is loaded or how inference is computed. It only relies on a narrow
// capability surface and on the order in which those capabilities are used:
//
//     load (once) -> reshape -> submit -> wait until ready -> collect -> render
//
// `run_estimate` is the single place that encodes that order, so every stage
// worker drives an estimator the same way.
//
// Waiting for readiness blocks on a `CancelToken` condvar between polls rather
// than spinning. Graceful shutdown never trips the token, so an in-flight
// inference always finishes; only a hard abort cancels the wait.

use crate::config::EstimatorConfig;
use crate::error::EstimatorError;
use crate::frame::Frame;
use crate::render;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

/// Number of keypoints in the body model (COCO-18 layout).
pub const KEYPOINT_COUNT: usize = 18;

/// One detected body joint in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

/// One detected human figure.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Pose {
    /// Indexed by joint id; `None` for joints that were not found.
    pub keypoints: [Option<Keypoint>; KEYPOINT_COUNT],
    pub score: f32,
}

impl Pose {
    pub fn empty(score: f32) -> Self {
        Self {
            keypoints: [None; KEYPOINT_COUNT],
            score,
        }
    }

    pub fn visible_keypoints(&self) -> usize {
        self.keypoints.iter().flatten().count()
    }
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Shared cancellation flag with a blocking, wakeable wait.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Blocks for up to `timeout`, returning early (with `true`) on cancel.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        if !*cancelled {
            self.inner.wake.wait_for(&mut cancelled, timeout);
        }
        *cancelled
    }
}

/// Capability interface of a pose estimation backend.
pub trait PoseEstimator: Send + 'static {
    fn name(&self) -> String;

    /// Called once when the orchestrator is built.
    fn load(&mut self, _config: &EstimatorConfig) -> Result<(), EstimatorError> {
        Ok(())
    }

    /// Adapts the network input to the frame geometry.
    fn reshape(&mut self, frame: &Frame) -> Result<(), EstimatorError>;

    /// Starts inference on `frame`.
    fn submit(&mut self, frame: &Frame) -> Result<(), EstimatorError>;

    /// Non-blocking readiness probe for the submitted request.
    fn is_ready(&mut self) -> bool;

    /// Blocks until the submitted request is ready or `cancel` fires.
    /// Backends with a native blocking wait should override this.
    fn wait_ready(&mut self, cancel: &CancelToken, poll: Duration) -> Result<(), EstimatorError> {
        loop {
            if self.is_ready() {
                return Ok(());
            }
            if cancel.wait_timeout(poll) {
                return Err(EstimatorError::Cancelled);
            }
        }
    }

    fn collect_results(&mut self) -> Result<Vec<Pose>, EstimatorError>;

    /// Draws `poses` over `frame` in place.
    fn render_poses(&self, poses: &[Pose], frame: &mut Frame) {
        render::draw_poses(poses, frame);
    }
}

/// Runs one full estimate cycle on `frame` and renders the result into it.
pub fn run_estimate(
    estimator: &mut dyn PoseEstimator,
    frame: &mut Frame,
    cancel: &CancelToken,
    poll: Duration,
) -> Result<Vec<Pose>, EstimatorError> {
    estimator.reshape(frame)?;
    estimator.submit(frame)?;
    estimator.wait_ready(cancel, poll)?;
    let poses = estimator.collect_results()?;
    estimator.render_poses(&poses, frame);
    Ok(poses)
}
