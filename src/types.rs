// src/types.rs

use serde::{Deserialize, Serialize};

use crate::error::PerceptionError;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub detection: DetectionConfig,
    pub obstacles: ObstacleConfig,
    pub control: ControlConfig,
    pub corrective: Vec<CorrectiveRule>,
    pub rewards: RewardConfig,
    pub timing: TimingConfig,
    pub reset: ResetConfig,
    pub eval: EvalConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub region: Region,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub template_dir: String,
    /// Minimum correlation for an obstacle match
    pub match_threshold: f32,
    /// Minimum correlation for control screens (game over / start)
    pub critical_threshold: f32,
    /// Fraction of frame height where the danger zone begins
    pub danger_zone_y_start: f32,
    /// Fraction of frame height where the danger zone ends
    pub danger_zone_y_end: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    /// Reserved id for a lane with nothing in it
    pub clear_id: u8,
    pub classes: Vec<ObstacleClassConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleClassConfig {
    pub name: String,
    pub id: u8,
    #[serde(default)]
    pub lethal: bool,
    #[serde(default)]
    pub collectible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub game_over: String,
    pub start_screen: String,
}

/// One row of the obstacle → corrective action table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectiveRule {
    pub obstacle: String,
    pub action: crate::env::Action,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub survive: f32,
    pub coin: f32,
    pub crash: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub focus_delay_ms: u64,
    pub restart_settle_ms: u64,
    pub retry_pause_ms: u64,
    pub action_settle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetConfig {
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub episodes: usize,
    pub max_steps: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

// ============================================================================
// FRAMES
// ============================================================================

/// Screen rectangle in absolute pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: usize,
    pub top: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    pub fn new(left: usize, top: usize, width: usize, height: usize) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Gray,
    Rgb,
}

impl ColorMode {
    pub fn channels(self) -> usize {
        match self {
            ColorMode::Gray => 1,
            ColorMode::Rgb => 3,
        }
    }
}

/// Captured pixel buffer.
/// Row-major storage: pixel at (x, y) starts at data[(y * width + x) * channels]
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub mode: ColorMode,
}

impl Frame {
    pub fn gray(data: Vec<u8>, width: usize, height: usize) -> Result<Self, PerceptionError> {
        Self::with_mode(data, width, height, ColorMode::Gray)
    }

    pub fn rgb(data: Vec<u8>, width: usize, height: usize) -> Result<Self, PerceptionError> {
        Self::with_mode(data, width, height, ColorMode::Rgb)
    }

    fn with_mode(
        data: Vec<u8>,
        width: usize,
        height: usize,
        mode: ColorMode,
    ) -> Result<Self, PerceptionError> {
        let expected = width * height * mode.channels();
        if data.len() != expected {
            return Err(PerceptionError::Capture(format!(
                "buffer holds {} bytes, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                mode,
                expected
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            mode,
        })
    }

    pub fn from_image(image: &image::DynamicImage, mode: ColorMode) -> Self {
        match mode {
            ColorMode::Gray => {
                let gray = image.to_luma8();
                let (w, h) = gray.dimensions();
                Self {
                    data: gray.into_raw(),
                    width: w as usize,
                    height: h as usize,
                    mode,
                }
            }
            ColorMode::Rgb => {
                let rgb = image.to_rgb8();
                let (w, h) = rgb.dimensions();
                Self {
                    data: rgb.into_raw(),
                    width: w as usize,
                    height: h as usize,
                    mode,
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Single-channel copy using ITU-R BT.601 luma.
    pub fn to_gray(&self) -> Frame {
        match self.mode {
            ColorMode::Gray => self.clone(),
            ColorMode::Rgb => {
                let data = self
                    .data
                    .chunks_exact(3)
                    .map(|p| {
                        (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32).round()
                            as u8
                    })
                    .collect();
                Frame {
                    data,
                    width: self.width,
                    height: self.height,
                    mode: ColorMode::Gray,
                }
            }
        }
    }

    /// Intersection of this frame with `region`, or `None` if they don't overlap.
    pub fn crop(&self, region: &Region) -> Option<Frame> {
        let x0 = region.left.min(self.width);
        let y0 = region.top.min(self.height);
        let x1 = (region.left + region.width).min(self.width);
        let y1 = (region.top + region.height).min(self.height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        let ch = self.mode.channels();
        let w = x1 - x0;
        let mut data = Vec::with_capacity(w * (y1 - y0) * ch);
        for y in y0..y1 {
            let start = (y * self.width + x0) * ch;
            data.extend_from_slice(&self.data[start..start + w * ch]);
        }
        Some(Frame {
            data,
            width: w,
            height: y1 - y0,
            mode: self.mode,
        })
    }
}

// ============================================================================
// DETECTION + OBSERVATION
// ============================================================================

/// Discrete obstacle class id as it appears in an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub u8);

pub const NUM_LANES: usize = 3;
pub const MIDDLE_LANE: usize = 1;

/// One class id per lane, left to right.
pub type Observation = [ClassId; NUM_LANES];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    /// Correlation score in [0, 1]
    pub confidence: f32,
}

impl Detection {
    /// [x1, y1, x2, y2], right/bottom exclusive
    pub fn bbox(&self) -> [usize; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    pub fn center_x(&self) -> f32 {
        self.x as f32 + self.width as f32 / 2.0
    }

    pub fn overlaps(&self, other: &Detection) -> bool {
        let [ax1, ay1, ax2, ay2] = self.bbox();
        let [bx1, by1, bx2, by2] = other.bbox();
        let x_overlap = ax2.min(bx2).saturating_sub(ax1.max(bx1));
        let y_overlap = ay2.min(by2).saturating_sub(ay1.max(by1));
        x_overlap * y_overlap > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_short_buffer() {
        assert!(Frame::gray(vec![0; 10], 4, 4).is_err());
        assert!(Frame::rgb(vec![0; 48], 4, 4).is_ok());
    }

    #[test]
    fn test_to_gray_uses_luma_weights() {
        let frame = Frame::rgb(vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255], 4, 1).unwrap();
        let gray = frame.to_gray();
        assert_eq!(gray.mode, ColorMode::Gray);
        assert_eq!(gray.data, vec![76, 150, 29, 255]);
    }

    #[test]
    fn test_crop_clips_to_frame() {
        let data: Vec<u8> = (0..16).collect();
        let frame = Frame::gray(data, 4, 4).unwrap();

        let cropped = frame.crop(&Region::new(2, 1, 10, 2)).unwrap();
        assert_eq!(cropped.width, 2);
        assert_eq!(cropped.height, 2);
        assert_eq!(cropped.data, vec![6, 7, 10, 11]);

        assert!(frame.crop(&Region::new(5, 0, 2, 2)).is_none());
    }

    #[test]
    fn test_touching_boxes_do_not_overlap() {
        let a = Detection {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            confidence: 0.9,
        };
        let touching = Detection { x: 10, ..a };
        let corner = Detection { x: 9, y: 9, ..a };

        assert!(!a.overlaps(&touching));
        assert!(a.overlaps(&corner));
    }
}
