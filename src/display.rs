//! Display stage backends.
//!
//! The orchestrator shows one slot per iteration, synchronously, while the
//! Fetch and Estimate workers run. A backend can ask the loop to exit by
//! returning [`DisplayAction::Quit`].

use crate::slots::Slot;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayAction {
    Continue,
    Quit,
}

/// Per-iteration numbers handed to the display.
#[derive(Debug, Clone, Copy)]
pub struct DisplayStats {
    pub iteration: u64,
    pub fps: f64,
}

pub trait FrameDisplay: Send {
    fn show(&mut self, slot: &Slot, stats: &DisplayStats) -> DisplayAction;

    /// Gives interactive backends a chance to read a key for up to `delay`.
    fn wait_key(&mut self, _delay: Duration) -> DisplayAction {
        DisplayAction::Continue
    }
}

/// Logs what would be shown, and exits when its quit flag is raised.
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    verbose: bool,
    quit: Arc<AtomicBool>,
}

impl ConsoleDisplay {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that, once set, makes the next `wait_key` return `Quit`.
    pub fn quit_flag(&self) -> Arc<AtomicBool> {
        self.quit.clone()
    }
}

impl FrameDisplay for ConsoleDisplay {
    fn show(&mut self, slot: &Slot, stats: &DisplayStats) -> DisplayAction {
        if self.verbose {
            tracing::info!(
                iteration = stats.iteration,
                fps = stats.fps,
                seq = slot.frame.header.seq,
                poses = slot.poses.len(),
                rendered = slot.rendered,
                "display"
            );
        }
        DisplayAction::Continue
    }

    fn wait_key(&mut self, _delay: Duration) -> DisplayAction {
        if self.quit.load(Ordering::SeqCst) {
            DisplayAction::Quit
        } else {
            DisplayAction::Continue
        }
    }
}

/// Saves every n-th displayed frame as a PNG.
#[derive(Debug)]
pub struct SnapshotDisplay {
    dir: PathBuf,
    every: u64,
    shown: u64,
}

impl SnapshotDisplay {
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            every: every.max(1),
            shown: 0,
        })
    }

    fn save(&self, slot: &Slot, iteration: u64) -> Result<PathBuf, image::ImageError> {
        let path = self
            .dir
            .join(format!("frame_{iteration:06}_seq{}.png", slot.frame.header.seq));
        let Some(rgb) = slot.frame.to_rgb_image() else {
            return Err(image::ImageError::Parameter(image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::DimensionMismatch,
            )));
        };
        rgb.save_with_format(&path, image::ImageFormat::Png)?;
        Ok(path)
    }
}

impl FrameDisplay for SnapshotDisplay {
    fn show(&mut self, slot: &Slot, stats: &DisplayStats) -> DisplayAction {
        self.shown += 1;
        if (self.shown - 1) % self.every == 0 {
            match self.save(slot, stats.iteration) {
                Ok(path) => tracing::debug!(path = %path.display(), "snapshot written"),
                Err(err) => tracing::warn!(%err, "snapshot failed"),
            }
        }
        DisplayAction::Continue
    }
}
