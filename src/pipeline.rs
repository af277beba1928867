// THEORY:
// The `pipeline` module is the top-level API of the engine. The `Orchestrator`
// owns the three rotating slots and drives the Fetch / Estimate / Display stages
// through a simple state machine:
//
//     WaitingForFirstFrame --(image received)--> Running --(stop)--> Stopped
//                |                                                     ^
//                +-------------------(running cleared)-----------------+
//
// Each iteration hands the fetch slot and the estimate slot to the two stage
// workers, shows the display slot inline, and then joins both workers before the
// counter advances. Stopping is only ever observed after that join, so an
// inference that is in flight when shutdown is requested always completes.
//
// Nothing that goes wrong with a single frame stops the loop: an empty store or a
// failed inference leaves the slot as it was and the next iteration carries on.
// Only a lost worker (a panic inside a stage) is fatal.

use crate::config::PipelineConfig;
use crate::control::ControlMode;
use crate::display::{DisplayAction, DisplayStats, FrameDisplay};
use crate::error::{PipelineError, Result};
use crate::estimator::{CancelToken, PoseEstimator};
use crate::feedback::{Feedback, FeedbackBus};
use crate::goal::GoalResult;
use crate::slots::{Slot, SlotArena, StageIndices};
use crate::store::SharedState;
use crate::workers::{EstimateOutcome, StageWorkers};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    WaitingForFirstFrame,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `running` was cleared.
    Shutdown,
    /// The display asked to exit.
    QuitRequested,
    /// A hard abort cancelled the inference wait.
    Aborted,
}

/// What happened to the estimate slot in one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EstimateStatus {
    Rendered { poses: usize },
    Skipped,
    Failed(String),
}

/// Per-iteration trace, mostly for tests and diagnostics.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: u64,
    pub indices: StageIndices,
    /// Sequence number copied into the fetch slot, `None` if the store was empty.
    pub fetched: Option<u64>,
    /// Sequence number of the frame the Estimate stage worked on.
    pub estimated: u64,
    pub estimate: EstimateStatus,
    /// Sequence number shown, `None` when display is disabled.
    pub displayed: Option<u64>,
    pub fps: f64,
    pub stop: Option<StopReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    /// `None` when the pipeline stopped before its first iteration.
    pub stop: Option<StopReason>,
}

/// Cloneable control surface for stopping a running orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    shared: Arc<SharedState>,
    cancel: CancelToken,
}

impl PipelineHandle {
    /// Clears `running`. In-flight inference is allowed to finish.
    pub fn shutdown(&self) -> bool {
        self.shared.status.stop()
    }

    /// Clears `running` and cancels any in-flight inference wait.
    pub fn abort(&self) {
        self.shared.status.stop();
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.shared.status.is_running()
    }
}

pub struct Orchestrator {
    config: PipelineConfig,
    shared: Arc<SharedState>,
    feedback: FeedbackBus,
    estimator: Option<Box<dyn PoseEstimator>>,
    workers: Option<StageWorkers>,
    display: Option<Box<dyn FrameDisplay>>,
    arena: SlotArena,
    cancel: CancelToken,
    state: PipelineState,
    iteration: u64,
    last_tick: Instant,
    fps: f64,
    stop: Option<StopReason>,
}

impl Orchestrator {
    /// Builds the orchestrator and loads the estimator with the configured
    /// model path. Workers are spawned lazily by [`Orchestrator::start`].
    pub fn new(
        config: PipelineConfig,
        shared: Arc<SharedState>,
        mut estimator: Box<dyn PoseEstimator>,
        feedback: FeedbackBus,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            estimator = %estimator.name(),
            model = %config.estimator.model_path().display(),
            device = %config.estimator.device,
            "loading pose estimator"
        );
        estimator.load(&config.estimator)?;
        Ok(Self {
            config,
            shared,
            feedback,
            estimator: Some(estimator),
            workers: None,
            display: None,
            arena: SlotArena::default(),
            cancel: CancelToken::new(),
            state: PipelineState::WaitingForFirstFrame,
            iteration: 0,
            last_tick: Instant::now(),
            fps: 0.0,
            stop: None,
        })
    }

    pub fn with_display(mut self, display: Box<dyn FrameDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            shared: self.shared.clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Read access to slot `index`, e.g. to inspect rendered output.
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.arena.get(index)
    }

    /// Waits for the first frame, seeds all slots with it and spawns the stage
    /// workers. Returns `false` if the pipeline was stopped while waiting.
    pub async fn start(&mut self) -> bool {
        if self.state != PipelineState::WaitingForFirstFrame {
            return self.state == PipelineState::Running;
        }
        let poll = self.config.pipeline.first_frame_poll();
        loop {
            if !self.shared.status.is_running() {
                tracing::info!("stopped while waiting for the first image");
                self.enter_stopped(StopReason::Shutdown);
                return false;
            }
            if self.shared.status.image_received() {
                break;
            }
            tracing::info!("waiting for image");
            tokio::time::sleep(poll).await;
        }

        let Some(first) = self.shared.store.read_snapshot() else {
            self.enter_stopped(StopReason::Shutdown);
            return false;
        };
        self.arena = SlotArena::seeded(&first);

        let Some(estimator) = self.estimator.take() else {
            self.enter_stopped(StopReason::Shutdown);
            return false;
        };
        self.workers = Some(StageWorkers::spawn(
            self.shared.clone(),
            estimator,
            self.cancel.clone(),
            self.config.pipeline.ready_poll(),
        ));
        self.last_tick = Instant::now();
        self.state = PipelineState::Running;
        tracing::info!(
            seq = first.header.seq,
            width = first.width,
            height = first.height,
            "pipeline running"
        );
        true
    }

    /// Runs exactly one Fetch / Estimate / Display iteration.
    pub async fn step(&mut self) -> Result<IterationReport> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning);
        }
        let workers = self.workers.as_ref().ok_or(PipelineError::NotRunning)?;

        self.iteration += 1;
        let indices = StageIndices::for_iteration(self.iteration);
        let mode = self.shared.control_mode();

        let fetch_done = workers.submit_fetch(self.arena.take(indices.fetch))?;
        let estimate_slot = self.arena.take(indices.estimate);
        let estimated = estimate_slot.frame.header.seq;
        let infer = mode.armed
            || estimate_slot
                .frame
                .correlation
                .as_ref()
                .is_some_and(|id| self.shared.goals.is_active(id));
        let estimate_done = workers.submit_estimate(estimate_slot, infer)?;

        let (displayed, quit) = self.display_stage(indices.display);

        let (fetch, estimate) = futures::future::join(fetch_done, estimate_done).await;
        let fetch = fetch.map_err(|_| PipelineError::WorkerLost { stage: "fetch" })?;
        let estimate = estimate.map_err(|_| PipelineError::WorkerLost { stage: "estimate" })?;

        let fetched = fetch.fetched.then_some(fetch.slot.frame.header.seq);
        self.arena.restore(indices.fetch, fetch.slot);

        let status = match &estimate.outcome {
            EstimateOutcome::Rendered => EstimateStatus::Rendered {
                poses: estimate.slot.poses.len(),
            },
            EstimateOutcome::Skipped => EstimateStatus::Skipped,
            EstimateOutcome::Failed(err) => {
                tracing::warn!(seq = estimated, %err, "estimate failed, slot left unrendered");
                EstimateStatus::Failed(err.to_string())
            }
        };
        if matches!(estimate.outcome, EstimateOutcome::Rendered) {
            self.publish(&estimate.slot, &mode);
        }
        self.arena.restore(indices.estimate, estimate.slot);

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick).max(Duration::from_micros(1));
        self.fps = 1.0 / elapsed.as_secs_f64();
        self.last_tick = now;

        let stop = if quit {
            Some(StopReason::QuitRequested)
        } else if self.cancel.is_cancelled() {
            Some(StopReason::Aborted)
        } else if !self.shared.status.is_running() {
            Some(StopReason::Shutdown)
        } else {
            None
        };
        if let Some(reason) = stop {
            self.enter_stopped(reason);
        }

        tracing::debug!(
            iteration = self.iteration,
            ?fetched,
            estimated,
            ?displayed,
            fps = self.fps,
            "iteration complete"
        );
        Ok(IterationReport {
            iteration: self.iteration,
            indices,
            fetched,
            estimated,
            estimate: status,
            displayed,
            fps: self.fps,
            stop,
        })
    }

    /// Runs until stopped and shuts the workers down.
    pub async fn run(self) -> Result<RunSummary> {
        let span = tracing::info_span!("pose.pipeline", device = %self.config.estimator.device);
        self.run_loop().instrument(span).await
    }

    async fn run_loop(mut self) -> Result<RunSummary> {
        if self.start().await {
            while self.state == PipelineState::Running {
                self.step().await?;
            }
        }
        Ok(self.finish().await)
    }

    /// Stops the loop (if still running) and waits for the workers to exit.
    pub async fn finish(mut self) -> RunSummary {
        if self.state != PipelineState::Stopped {
            self.enter_stopped(StopReason::Shutdown);
        }
        if let Some(workers) = self.workers.take() {
            workers.shutdown().await;
        }
        RunSummary {
            iterations: self.iteration,
            stop: self.stop.filter(|_| self.iteration > 0),
        }
    }

    fn display_stage(&mut self, index: usize) -> (Option<u64>, bool) {
        if !self.config.display.enabled {
            return (None, false);
        }
        let (Some(display), Some(slot)) = (self.display.as_mut(), self.arena.get(index)) else {
            return (None, false);
        };
        let stats = DisplayStats {
            iteration: self.iteration,
            fps: self.fps,
        };
        let shown = slot.frame.header.seq;
        let mut quit = display.show(slot, &stats) == DisplayAction::Quit;
        if !quit {
            let delay = Duration::from_millis(self.config.display.wait_key_delay_ms);
            quit = display.wait_key(delay) == DisplayAction::Quit;
        }
        (Some(shown), quit)
    }

    fn publish(&self, slot: &Slot, mode: &ControlMode) {
        if let Some(id) = &slot.frame.correlation {
            if self.shared.goals.complete(id) {
                self.feedback.publish_goal(GoalResult {
                    id: id.clone(),
                    header: slot.frame.header.clone(),
                    poses: slot.poses.clone(),
                });
            }
        }
        if mode.armed && mode.publish_results {
            self.feedback.publish_frame(&slot.frame);
            self.feedback.publish_feedback(Feedback {
                header: slot.frame.header.clone(),
                correlation: slot.frame.correlation.clone(),
                poses: slot.poses.clone(),
                detect_specific_pose: mode.detect_specific_pose,
                target_pose: mode.target_pose.clone(),
                fps: self.fps,
            });
        }
    }

    fn enter_stopped(&mut self, reason: StopReason) {
        self.shared.status.stop();
        self.state = PipelineState::Stopped;
        self.stop = Some(reason);
        tracing::info!(?reason, iterations = self.iteration, "pipeline stopped");
    }
}
