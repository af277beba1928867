// THEORY:
// The `goal` module tracks the single external "check for human poses" request
// that may be in flight at any time. A goal carries its own image; accepting the
// goal pushes that image into the `FrameStore` tagged with the goal's id, and the
// orchestrator later recognises the tagged slot once it has been estimated.
//
// Exclusivity is enforced here, not by callers: the record lock is held across
// the whole check-decode-write-activate sequence, so two racing `accept_goal`
// calls can never both observe "idle".

use crate::error::GoalError;
use crate::estimator::Pose;
use crate::frame::{FrameHeader, GoalId, ImageMessage};
use crate::store::FrameStore;
use parking_lot::Mutex;

/// An inbound goal: an opaque id plus the image to analyse.
#[derive(Debug, Clone)]
pub struct GoalRequest {
    pub id: GoalId,
    pub image: ImageMessage,
}

/// State of the (at most one) tracked goal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalRecord {
    pub id: Option<GoalId>,
    pub active: bool,
    pub preempt_requested: bool,
}

/// Terminal report for a goal, published on the feedback bus.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GoalResult {
    pub id: GoalId,
    pub header: FrameHeader,
    pub poses: Vec<Pose>,
}

#[derive(Debug, Default)]
pub struct GoalController {
    record: Mutex<GoalRecord>,
}

impl GoalController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `goal` if no goal is active (or the active one was preempted),
    /// decodes its image and writes it into `store` tagged with the goal id.
    pub fn accept_goal(&self, goal: GoalRequest, store: &FrameStore) -> Result<GoalRecord, GoalError> {
        if !store.status().is_running() {
            return Err(GoalError::ShuttingDown);
        }
        let mut record = self.record.lock();
        if record.active && !record.preempt_requested {
            let active = record.id.as_ref().map(ToString::to_string).unwrap_or_default();
            tracing::warn!(goal = %goal.id, %active, "goal rejected, another goal is in progress");
            return Err(GoalError::Busy { active });
        }

        let mut frame = goal.image.decode().map_err(|err| {
            tracing::error!(goal = %goal.id, %err, "goal image could not be decoded");
            err
        })?;

        if record.active {
            tracing::info!(goal = ?record.id, "clearing preempted goal");
        }
        frame.correlation = Some(goal.id.clone());
        store.write(frame);
        *record = GoalRecord {
            id: Some(goal.id),
            active: true,
            preempt_requested: false,
        };
        tracing::info!(goal = ?record.id, "goal accepted");
        Ok(record.clone())
    }

    /// Flags the active goal as preempted. Returns `false` when idle.
    pub fn request_preempt(&self) -> bool {
        let mut record = self.record.lock();
        if !record.active {
            return false;
        }
        record.preempt_requested = true;
        tracing::debug!(goal = ?record.id, "preempt requested");
        true
    }

    pub fn is_processing(&self, running: bool) -> bool {
        let record = self.record.lock();
        running && record.active && !record.preempt_requested
    }

    /// Whether `id` is the active, non-preempted goal.
    pub fn is_active(&self, id: &GoalId) -> bool {
        let record = self.record.lock();
        record.active && !record.preempt_requested && record.id.as_ref() == Some(id)
    }

    /// Clears the active goal if it is `id` and was not preempted.
    pub fn complete(&self, id: &GoalId) -> bool {
        let mut record = self.record.lock();
        if !record.active || record.preempt_requested || record.id.as_ref() != Some(id) {
            return false;
        }
        record.active = false;
        tracing::info!(goal = %id, "goal completed");
        true
    }

    pub fn record(&self) -> GoalRecord {
        self.record.lock().clone()
    }
}
