//! Ingestion controllers.
//!
//! Both handlers run on whatever thread the transport delivers callbacks on. The
//! only synchronisation between them and the pipeline is the `FrameStore` lock.

use crate::error::GoalError;
use crate::frame::ImageMessage;
use crate::goal::{GoalRecord, GoalRequest};
use crate::store::SharedState;
use std::sync::Arc;

/// Per-frame handler for the continuous camera stream.
#[derive(Debug, Clone)]
pub struct StreamHandler {
    shared: Arc<SharedState>,
}

impl StreamHandler {
    pub fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// Decodes and stores one frame. Undecodable frames are logged and dropped.
    pub fn on_frame(&self, msg: &ImageMessage) -> bool {
        tracing::debug!(seq = msg.header.seq, encoding = %msg.encoding, "stream image received");
        match msg.decode() {
            Ok(frame) => {
                self.shared.store.write(frame);
                true
            }
            Err(err) => {
                tracing::error!(seq = msg.header.seq, %err, "dropping undecodable stream frame");
                false
            }
        }
    }
}

/// Entry point for goal and preemption requests.
#[derive(Debug, Clone)]
pub struct GoalHandler {
    shared: Arc<SharedState>,
}

impl GoalHandler {
    pub fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    pub fn on_goal(&self, goal: GoalRequest) -> Result<GoalRecord, GoalError> {
        tracing::debug!(goal = %goal.id, "goal received");
        self.shared.goals.accept_goal(goal, &self.shared.store)
    }

    pub fn on_preempt(&self) -> bool {
        self.shared.goals.request_preempt()
    }

    pub fn is_processing(&self) -> bool {
        self.shared.goals.is_processing(self.shared.status.is_running())
    }
}
