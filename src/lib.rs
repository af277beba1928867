// THEORY:
// This file is the main entry point for the `pose_pipeline` library crate.
//
// The crate is the concurrent frame-processing core of a perception node: camera
// frames and goal images come in through the ingestion handlers, land in a single
// lock-guarded `FrameStore`, and are pulled through a three-slot Fetch / Estimate /
// Display pipeline by the `Orchestrator`. The pose model itself is an external
// collaborator behind the `PoseEstimator` trait.
//
// The top-level API a node needs is re-exported here: build a `SharedState`,
// hand clones of it to `StreamHandler`, `GoalHandler` and `ControlInterpreter`,
// and run an `Orchestrator` with an estimator and an optional display.

pub mod config;
pub mod control;
pub mod display;
pub mod error;
pub mod estimator;
pub mod feedback;
pub mod frame;
pub mod goal;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod slots;
pub mod store;
pub mod workers;

pub use config::PipelineConfig;
pub use control::{ControlCommand, ControlInterpreter, ControlMode, StopMatch};
pub use display::{ConsoleDisplay, DisplayAction, FrameDisplay, SnapshotDisplay};
pub use error::{ConfigError, DecodeError, EstimatorError, GoalError, PipelineError};
pub use estimator::{CancelToken, Keypoint, Pose, PoseEstimator};
pub use feedback::{Feedback, FeedbackBus};
pub use frame::{Frame, FrameHeader, GoalId, ImageMessage};
pub use goal::{GoalController, GoalRecord, GoalRequest, GoalResult};
pub use ingest::{GoalHandler, StreamHandler};
pub use pipeline::{Orchestrator, PipelineHandle, PipelineState, RunSummary, StopReason};
pub use store::{FrameStore, RunStatus, SharedState};
