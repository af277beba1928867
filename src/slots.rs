// THEORY:
// Three rotating slots let capture, inference and display overlap. For the
// 1-based iteration counter `n`, every stage's slot is a pure function of `n`:
//
//     fetch    = n       mod 3   (written this iteration)
//     estimate = (n + 2) mod 3   (fetched in iteration n - 1)
//     display  = (n + 1) mod 3   (fetched in n - 2, estimated in n - 1)
//
// The three indices are always distinct, so no slot is touched by two stages in
// the same iteration. Ownership makes this explicit: the fetch and estimate
// slots are moved out of the arena to their workers and moved back at the join;
// the display slot is only ever borrowed by the orchestrator.

use crate::estimator::Pose;
use crate::frame::Frame;

pub const SLOT_COUNT: usize = 3;

/// One rotating pipeline buffer.
#[derive(Debug, Clone, Default)]
pub struct Slot {
    pub frame: Frame,
    /// Poses found by the last estimate on this slot.
    pub poses: Vec<Pose>,
    /// Whether `frame` carries a rendered overlay.
    pub rendered: bool,
}

impl Slot {
    pub fn seeded(frame: Frame) -> Self {
        Self {
            frame,
            poses: Vec::new(),
            rendered: false,
        }
    }
}

/// Slot indices used by each stage in one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageIndices {
    pub fetch: usize,
    pub estimate: usize,
    pub display: usize,
}

impl StageIndices {
    pub fn for_iteration(iteration: u64) -> Self {
        let n = (iteration % SLOT_COUNT as u64) as usize;
        Self {
            fetch: n,
            estimate: (n + 2) % SLOT_COUNT,
            display: (n + 1) % SLOT_COUNT,
        }
    }
}

/// Fixed arena of the three slots. A slot is `None` only while a worker owns it.
#[derive(Debug, Default)]
pub struct SlotArena {
    slots: [Option<Slot>; SLOT_COUNT],
}

impl SlotArena {
    /// Fills every slot with a copy of `frame`.
    pub fn seeded(frame: &Frame) -> Self {
        Self {
            slots: std::array::from_fn(|_| Some(Slot::seeded(frame.clone()))),
        }
    }

    /// Moves slot `index` out for a worker. An already-taken slot yields an
    /// empty placeholder.
    pub fn take(&mut self, index: usize) -> Slot {
        self.slots[index].take().unwrap_or_default()
    }

    pub fn restore(&mut self, index: usize, slot: Slot) {
        self.slots[index] = Some(slot);
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots[index].as_ref()
    }
}
