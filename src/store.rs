// THEORY:
// The `store` module holds the only mutable state that is shared between the
// ingestion side (transport callbacks on arbitrary threads) and the pipeline side
// (the orchestrator and its stage workers).
//
// Key architectural principles:
// 1.  **Readers copy, never borrow**: `FrameStore` hands out deep copies. No
//     reference into the store ever escapes a critical section, so a concurrent
//     write can never be observed half-done.
// 2.  **Short critical sections**: Every lock is held for one assignment or one
//     copy. Inference, decoding and display all happen outside the locks.
// 3.  **Monotonic flags**: `RunStatus` flags only ever move in one direction
//     (`image_received` false -> true, `running` true -> false), and the write
//     lock makes each transition happen exactly once.

use crate::control::ControlMode;
use crate::frame::Frame;
use crate::goal::GoalController;
use parking_lot::RwLock;
use std::sync::Arc;

/// Liveness flags read by the orchestrator and written by ingestion/shutdown.
#[derive(Debug)]
pub struct RunStatus {
    image_received: RwLock<bool>,
    running: RwLock<bool>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            image_received: RwLock::new(false),
            running: RwLock::new(true),
        }
    }
}

impl RunStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image_received(&self) -> bool {
        *self.image_received.read()
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Records that an image has arrived. Returns `true` only for the call that
    /// performed the transition.
    pub fn mark_image_received(&self) -> bool {
        if *self.image_received.read() {
            return false;
        }
        let mut received = self.image_received.write();
        !std::mem::replace(&mut *received, true)
    }

    /// Requests the pipeline to stop. Returns `true` only for the call that
    /// performed the transition.
    pub fn stop(&self) -> bool {
        let mut running = self.running.write();
        std::mem::replace(&mut *running, false)
    }
}

#[derive(Debug, Default)]
struct Latest {
    frame: Option<Frame>,
    dimensions: Option<(u32, u32)>,
}

/// Multi-reader/single-writer home of the most recently captured frame.
#[derive(Debug)]
pub struct FrameStore {
    latest: RwLock<Latest>,
    status: Arc<RunStatus>,
}

impl FrameStore {
    pub fn new(status: Arc<RunStatus>) -> Self {
        Self {
            latest: RwLock::new(Latest::default()),
            status,
        }
    }

    /// Replaces the stored frame, then flags that an image has been received.
    pub fn write(&self, frame: Frame) {
        {
            let mut latest = self.latest.write();
            latest.dimensions = Some((frame.width, frame.height));
            latest.frame = Some(frame);
        }
        if self.status.mark_image_received() {
            tracing::info!("first image received");
        }
    }

    /// Returns an independent copy of the latest frame.
    pub fn read_snapshot(&self) -> Option<Frame> {
        self.latest.read().frame.clone()
    }

    /// Copies the latest frame into `dst`, reusing its buffer. Returns `false`
    /// (leaving `dst` untouched) when nothing has been written yet.
    pub fn read_into(&self, dst: &mut Frame) -> bool {
        match &self.latest.read().frame {
            Some(frame) => {
                dst.copy_from(frame);
                true
            }
            None => false,
        }
    }

    /// Width and height of the most recent write.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.latest.read().dimensions
    }

    pub fn status(&self) -> &Arc<RunStatus> {
        &self.status
    }
}

/// Everything the ingestion side and the pipeline side share.
///
/// The control mode is written only through a `ControlInterpreter`; other
/// holders read snapshots via [`SharedState::control_mode`].
///
/// ```compile_fail
/// let shared = pose_pipeline::SharedState::new(true);
/// shared.control.write().armed = false;
/// ```
#[derive(Debug)]
pub struct SharedState {
    pub status: Arc<RunStatus>,
    pub store: FrameStore,
    pub(crate) control: RwLock<ControlMode>,
    pub goals: GoalController,
}

impl SharedState {
    pub fn new(start_armed: bool) -> Arc<Self> {
        let status = Arc::new(RunStatus::new());
        Arc::new(Self {
            store: FrameStore::new(status.clone()),
            status,
            control: RwLock::new(ControlMode::new(start_armed)),
            goals: GoalController::new(),
        })
    }

    /// Snapshot of the current control mode.
    pub fn control_mode(&self) -> ControlMode {
        self.control.read().clone()
    }
}
