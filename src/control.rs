//! Control command interpreter.
//!
//! Commands arrive from a mission/control node and toggle a small mode state that
//! the orchestrator reads once per iteration.

use crate::store::SharedState;
use serde::Deserialize;
use std::sync::Arc;

/// An inbound control command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlCommand {
    pub target: String,
    pub action: String,
    /// `attributes.gesture` of the command; empty when absent.
    pub gesture: String,
}

impl ControlCommand {
    pub fn new(target: &str, action: &str, gesture: &str) -> Self {
        Self {
            target: target.to_string(),
            action: action.to_string(),
            gesture: gesture.to_string(),
        }
    }
}

/// Mode state mutated only by [`ControlInterpreter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMode {
    pub armed: bool,
    pub detect_specific_pose: bool,
    pub target_pose: Option<String>,
    pub publish_results: bool,
}

impl ControlMode {
    pub fn new(armed: bool) -> Self {
        Self {
            armed,
            detect_specific_pose: false,
            target_pose: None,
            publish_results: false,
        }
    }
}

/// How a "stop" action is recognised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMatch {
    /// Any action containing `"stop"` disarms.
    #[default]
    Contains,
    /// Disarms whenever `"stop"` is not at the very start of the action,
    /// mirroring a position-as-boolean test.
    LegacyPosition,
}

impl StopMatch {
    fn matches(self, action: &str) -> bool {
        match self {
            Self::Contains => action.contains("stop"),
            Self::LegacyPosition => action.find("stop") != Some(0),
        }
    }
}

/// What a command did to the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTransition {
    Ignored,
    DetectPose,
    EstimateAll,
    Disarmed,
    Unchanged,
}

impl ControlMode {
    /// Applies one command. Commands for other targets and unknown actions
    /// leave the mode untouched.
    pub fn apply(&mut self, cmd: &ControlCommand, target: &str, stop: StopMatch) -> ControlTransition {
        if cmd.target != target {
            return ControlTransition::Ignored;
        }
        if cmd.action == "detect" && !cmd.gesture.is_empty() {
            self.detect_specific_pose = true;
            self.target_pose = Some(cmd.gesture.clone());
            self.armed = true;
            self.publish_results = true;
            ControlTransition::DetectPose
        } else if cmd.action == "estimate" {
            self.detect_specific_pose = false;
            self.armed = true;
            self.publish_results = true;
            ControlTransition::EstimateAll
        } else if stop.matches(&cmd.action) {
            self.armed = false;
            ControlTransition::Disarmed
        } else {
            ControlTransition::Unchanged
        }
    }
}

/// Applies inbound commands to the shared [`ControlMode`].
#[derive(Debug, Clone)]
pub struct ControlInterpreter {
    shared: Arc<SharedState>,
    target: String,
    stop_match: StopMatch,
}

impl ControlInterpreter {
    pub fn new(shared: Arc<SharedState>, target: impl Into<String>, stop_match: StopMatch) -> Self {
        Self {
            shared,
            target: target.into(),
            stop_match,
        }
    }

    pub fn handle(&self, cmd: &ControlCommand) -> ControlTransition {
        let transition = self
            .shared
            .control
            .write()
            .apply(cmd, &self.target, self.stop_match);
        match transition {
            ControlTransition::Ignored => {
                tracing::trace!(target = %cmd.target, "control command for another target")
            }
            ControlTransition::Unchanged => {
                tracing::debug!(action = %cmd.action, "unrecognised control action")
            }
            _ => tracing::info!(action = %cmd.action, ?transition, "control mode changed"),
        }
        transition
    }

    pub fn mode(&self) -> ControlMode {
        self.shared.control_mode()
    }
}
