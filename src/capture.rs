// src/capture.rs
//
// Seams to the outside world: pixels in, key presses out.
// Live screen grabbing and OS-level key injection plug in behind these
// traits; the crate ships a replay source for recorded screenshots and a
// key sink that only records.

use crate::env::Key;
use crate::error::PerceptionError;
use crate::types::{ColorMode, Frame, Region};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

pub trait ScreenCapture {
    /// Grab the given screen region. Transient failures come back as
    /// `PerceptionError::Capture`, never as a panic.
    fn capture(&mut self, region: &Region, mode: ColorMode) -> Result<Frame, PerceptionError>;
}

pub trait KeyInput {
    /// Fire-and-forget key press.
    fn press(&mut self, key: Key);

    /// The key that starts or restarts a run.
    fn press_start(&mut self) {
        self.press(Key::Space);
    }
}

// ============================================================================
// REPLAY CAPTURE
// ============================================================================

/// Serves recorded screenshots from a directory in file-name order, looping
/// back to the first one when the recording runs out.
pub struct ReplayCapture {
    frames: Vec<PathBuf>,
    cursor: usize,
    pre_cropped: bool,
}

impl ReplayCapture {
    /// `pre_cropped` means the recordings already cover exactly the game
    /// region; otherwise they are treated as full screenshots and cropped.
    pub fn new<P: AsRef<Path>>(dir: P, pre_cropped: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let frames: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("png"))
                    .unwrap_or(false)
            })
            .collect();

        if frames.is_empty() {
            bail!(PerceptionError::InvalidConfig(format!(
                "no recorded frames in {}",
                dir.display()
            )));
        }

        info!("Replaying {} frames from {}", frames.len(), dir.display());
        Ok(Self {
            frames,
            cursor: 0,
            pre_cropped,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl ScreenCapture for ReplayCapture {
    fn capture(&mut self, region: &Region, mode: ColorMode) -> Result<Frame, PerceptionError> {
        let path = &self.frames[self.cursor % self.frames.len()];
        self.cursor += 1;

        let img = image::open(path)
            .map_err(|e| PerceptionError::Capture(format!("{}: {}", path.display(), e)))?;
        let frame = Frame::from_image(&img, mode);
        debug!("Replayed {} ({}x{})", path.display(), frame.width, frame.height);

        if self.pre_cropped {
            return Ok(frame);
        }
        frame.crop(region).ok_or_else(|| {
            PerceptionError::Capture(format!(
                "region {:?} lies outside {}x{} screenshot {}",
                region,
                frame.width,
                frame.height,
                path.display()
            ))
        })
    }
}

// ============================================================================
// RECORDING KEYS
// ============================================================================

/// Key sink for dry runs: remembers and logs every press.
#[derive(Debug, Default)]
pub struct RecordingKeys {
    pressed: Vec<Key>,
}

impl RecordingKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pressed(&self) -> &[Key] {
        &self.pressed
    }
}

impl KeyInput for RecordingKeys {
    fn press(&mut self, key: Key) {
        debug!("⌨ {:?}", key);
        self.pressed.push(key);
    }
}
