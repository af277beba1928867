//! Outbound bus for rendered frames, per-frame feedback and goal results.
//!
//! Broadcast channels never block the sender: with no subscribers a publish is
//! a no-op, and slow subscribers lag and skip instead of stalling the pipeline.

use crate::estimator::Pose;
use crate::frame::{Frame, FrameHeader, GoalId};
use crate::goal::GoalResult;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Per-frame estimation summary for the control side.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Feedback {
    pub header: FrameHeader,
    pub correlation: Option<GoalId>,
    pub poses: Vec<Pose>,
    pub detect_specific_pose: bool,
    pub target_pose: Option<String>,
    pub fps: f64,
}

#[derive(Clone)]
pub struct FeedbackBus {
    pub frames_tx: broadcast::Sender<Arc<Frame>>,
    pub feedback_tx: broadcast::Sender<Feedback>,
    pub goals_tx: broadcast::Sender<GoalResult>,
}

impl FeedbackBus {
    pub fn new(capacity: usize) -> Self {
        let (frames_tx, _) = broadcast::channel(capacity.max(1));
        let (feedback_tx, _) = broadcast::channel(capacity.max(1));
        let (goals_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            frames_tx,
            feedback_tx,
            goals_tx,
        }
    }

    pub fn publish_frame(&self, frame: &Frame) {
        if self.frames_tx.receiver_count() > 0 {
            let _ = self.frames_tx.send(Arc::new(frame.clone()));
        }
    }

    pub fn publish_feedback(&self, feedback: Feedback) {
        let _ = self.feedback_tx.send(feedback);
    }

    pub fn publish_goal(&self, result: GoalResult) {
        if self.goals_tx.send(result).is_err() {
            tracing::debug!("goal result dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let bus = FeedbackBus::new(1);
        bus.publish_frame(&Frame::default());
        bus.publish_goal(GoalResult {
            id: GoalId::from("g"),
            header: FrameHeader::default(),
            poses: Vec::new(),
        });
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = FeedbackBus::new(2);
        let mut rx = bus.frames_tx.subscribe();
        for seq in 0..5 {
            let mut frame = Frame::default();
            frame.header.seq = seq;
            bus.publish_frame(&frame);
        }
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(3))));
        assert_eq!(rx.recv().await.unwrap().header.seq, 3);
    }
}
