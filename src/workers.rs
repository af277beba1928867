//! Fixed two-worker pool for the per-iteration Fetch and Estimate stages.
//!
//! Each worker is a long-lived task fed through an unbounded channel; every task
//! carries the slot it owns for the iteration plus a oneshot for the reply. The
//! orchestrator awaits both replies before it advances, which gives the same
//! join-before-next-iteration ordering as spawning and joining threads.

use crate::error::{EstimatorError, PipelineError};
use crate::estimator::{CancelToken, PoseEstimator, run_estimate};
use crate::slots::Slot;
use crate::store::SharedState;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub struct FetchTask {
    pub slot: Slot,
    pub reply: oneshot::Sender<FetchDone>,
}

#[derive(Debug)]
pub struct FetchDone {
    pub slot: Slot,
    /// `false` when the store had nothing to copy and the slot kept its content.
    pub fetched: bool,
}

pub struct EstimateTask {
    pub slot: Slot,
    /// Run inference; otherwise the slot passes through unrendered.
    pub infer: bool,
    pub reply: oneshot::Sender<EstimateDone>,
}

#[derive(Debug)]
pub enum EstimateOutcome {
    Rendered,
    Skipped,
    Failed(EstimatorError),
}

#[derive(Debug)]
pub struct EstimateDone {
    pub slot: Slot,
    pub outcome: EstimateOutcome,
}

pub struct StageWorkers {
    fetch_tx: mpsc::UnboundedSender<FetchTask>,
    estimate_tx: mpsc::UnboundedSender<EstimateTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl StageWorkers {
    /// Spawns both workers on the current tokio runtime.
    pub fn spawn(
        shared: Arc<SharedState>,
        estimator: Box<dyn PoseEstimator>,
        cancel: CancelToken,
        ready_poll: Duration,
    ) -> Self {
        let (fetch_tx, mut fetch_rx) = mpsc::unbounded_channel::<FetchTask>();
        let (estimate_tx, mut estimate_rx) = mpsc::unbounded_channel::<EstimateTask>();

        let fetch_worker = tokio::spawn(async move {
            while let Some(FetchTask { mut slot, reply }) = fetch_rx.recv().await {
                let fetched = shared.store.read_into(&mut slot.frame);
                if fetched {
                    slot.poses.clear();
                    slot.rendered = false;
                } else {
                    tracing::warn!("fetch found an empty store, keeping slot content");
                }
                let _ = reply.send(FetchDone { slot, fetched });
            }
        });

        let estimate_worker = tokio::spawn(async move {
            let mut estimator = Some(estimator);
            while let Some(EstimateTask { mut slot, infer, reply }) = estimate_rx.recv().await {
                if !infer {
                    slot.poses.clear();
                    slot.rendered = false;
                    let _ = reply.send(EstimateDone {
                        slot,
                        outcome: EstimateOutcome::Skipped,
                    });
                    continue;
                }
                let Some(mut backend) = estimator.take() else {
                    break;
                };
                let cancel = cancel.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        run_estimate(backend.as_mut(), &mut slot.frame, &cancel, ready_poll)
                    }))
                    .unwrap_or_else(|_| {
                        tracing::warn!(estimator = %backend.name(), "estimator panicked during inference");
                        Err(EstimatorError::Inference("estimator panicked".into()))
                    });
                    (backend, slot, result)
                })
                .await;

                match joined {
                    Ok((backend, mut slot, result)) => {
                        estimator = Some(backend);
                        let outcome = match result {
                            Ok(poses) => {
                                slot.poses = poses;
                                slot.rendered = true;
                                EstimateOutcome::Rendered
                            }
                            Err(err) => {
                                slot.poses.clear();
                                slot.rendered = false;
                                EstimateOutcome::Failed(err)
                            }
                        };
                        let _ = reply.send(EstimateDone { slot, outcome });
                    }
                    Err(err) => {
                        tracing::error!(%err, "estimate task aborted, estimate worker exiting");
                        break;
                    }
                }
            }
        });

        Self {
            fetch_tx,
            estimate_tx,
            workers: vec![fetch_worker, estimate_worker],
        }
    }

    pub fn submit_fetch(&self, slot: Slot) -> Result<oneshot::Receiver<FetchDone>, PipelineError> {
        let (reply, done) = oneshot::channel();
        self.fetch_tx
            .send(FetchTask { slot, reply })
            .map_err(|_| PipelineError::WorkerLost { stage: "fetch" })?;
        Ok(done)
    }

    pub fn submit_estimate(&self, slot: Slot, infer: bool) -> Result<oneshot::Receiver<EstimateDone>, PipelineError> {
        let (reply, done) = oneshot::channel();
        self.estimate_tx
            .send(EstimateTask { slot, infer, reply })
            .map_err(|_| PipelineError::WorkerLost { stage: "estimate" })?;
        Ok(done)
    }

    /// Closes both queues and waits for the workers to drain.
    pub async fn shutdown(self) {
        let Self {
            fetch_tx,
            estimate_tx,
            workers,
        } = self;
        drop(fetch_tx);
        drop(estimate_tx);
        for worker in workers {
            let _ = worker.await;
        }
    }
}
