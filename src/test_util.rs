// src/test_util.rs
//
// Synthetic frames, templates and scripted collaborators shared by unit tests.

use crate::capture::{KeyInput, ScreenCapture};
use crate::env::Key;
use crate::error::PerceptionError;
use crate::templates::{ControlMarker, Template, TemplateClass, TemplateStore};
use crate::types::{ClassId, ColorMode, Config, Frame, Region};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Deterministic high-variance texture, pixel values in [30, 230).
pub fn pattern(width: usize, height: usize, seed: u32) -> Frame {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(12_345);
    let data = (0..width * height)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            30 + ((state >> 16) % 200) as u8
        })
        .collect();
    Frame {
        data,
        width,
        height,
        mode: ColorMode::Gray,
    }
}

pub fn blank(width: usize, height: usize, value: u8) -> Frame {
    Frame {
        data: vec![value; width * height],
        width,
        height,
        mode: ColorMode::Gray,
    }
}

pub fn paste(frame: &mut Frame, template: &Frame, x: usize, y: usize) {
    for j in 0..template.height {
        let dst = (y + j) * frame.width + x;
        let src = j * template.width;
        frame.data[dst..dst + template.width]
            .copy_from_slice(&template.data[src..src + template.width]);
    }
}

/// Fresh, empty directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lane_runner_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write_png(path: &Path, frame: &Frame) {
    image::GrayImage::from_raw(frame.width as u32, frame.height as u32, frame.data.clone())
        .unwrap()
        .save(path)
        .unwrap();
}

// ============================================================================
// SYNTHETIC GAME SCENE
// ============================================================================

pub const SCENE_W: usize = 60;
pub const SCENE_H: usize = 60;
pub const SPRITE: usize = 8;

/// Top-left x that centres a sprite in `lane`.
pub fn lane_x(lane: usize) -> usize {
    lane * 20 + 6
}

/// Top y whose bottom edge (y + 8 = 38) sits inside the default danger zone [24, 57].
pub const DANGER_Y: usize = 30;

pub fn sprite_for(name: &str) -> Frame {
    let seed = match name {
        "barrier_low" => 11,
        "barrier_high" => 12,
        "train" => 13,
        "coin" => 14,
        "game_over" => 21,
        _ => 22,
    };
    pattern(SPRITE, SPRITE, seed)
}

/// Store with every default obstacle class and both control screens.
pub fn scene_store() -> TemplateStore {
    let obstacle = |name: &str, id: u8| Template {
        name: name.to_string(),
        class: TemplateClass::Obstacle(ClassId(id)),
        image: sprite_for(name),
    };
    let control = |name: &str, marker: ControlMarker| Template {
        name: name.to_string(),
        class: TemplateClass::Control(marker),
        image: sprite_for(name),
    };
    TemplateStore::from_templates(vec![
        obstacle("barrier_low", 1),
        obstacle("barrier_high", 2),
        obstacle("train", 3),
        obstacle("coin", 4),
        control("game_over", ControlMarker::GameOver),
        control("start_game", ControlMarker::StartScreen),
    ])
}

/// Default config with no waiting and a region matching the scene size.
pub fn scene_config() -> Config {
    let mut config = Config::default();
    config.capture.region = Region::new(0, 0, SCENE_W, SCENE_H);
    config.timing.focus_delay_ms = 0;
    config.timing.restart_settle_ms = 0;
    config.timing.retry_pause_ms = 0;
    config.timing.action_settle_ms = 0;
    config
}

/// Empty scene plus the named sprites at (x, y).
pub fn scene(sprites: &[(&str, usize, usize)]) -> Frame {
    let mut frame = blank(SCENE_W, SCENE_H, 40);
    for &(name, x, y) in sprites {
        paste(&mut frame, &sprite_for(name), x, y);
    }
    frame
}

// ============================================================================
// SCRIPTED COLLABORATORS
// ============================================================================

/// Replays queued capture results, then repeats `fallback` (or fails) forever.
pub struct ScriptedCapture {
    queue: VecDeque<Result<Frame, PerceptionError>>,
    fallback: Option<Frame>,
    pub calls: usize,
}

impl ScriptedCapture {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            fallback: None,
            calls: 0,
        }
    }

    pub fn then(mut self, frame: Frame) -> Self {
        self.queue.push_back(Ok(frame));
        self
    }

    pub fn then_fail(mut self) -> Self {
        self.queue
            .push_back(Err(PerceptionError::Capture("scripted failure".to_string())));
        self
    }

    pub fn always(mut self, frame: Frame) -> Self {
        self.fallback = Some(frame);
        self
    }
}

impl ScreenCapture for ScriptedCapture {
    fn capture(&mut self, _region: &Region, _mode: ColorMode) -> Result<Frame, PerceptionError> {
        self.calls += 1;
        match self.queue.pop_front() {
            Some(result) => result,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| PerceptionError::Capture("script exhausted".to_string())),
        }
    }
}

#[derive(Default)]
pub struct KeyLog {
    pub keys: Vec<Key>,
}

impl KeyInput for KeyLog {
    fn press(&mut self, key: Key) {
        self.keys.push(key);
    }
}
