// src/state_extractor.rs
//
// Turns raw template matches into the per-lane observation.
//
// Only matches whose BOTTOM edge falls inside the vertical danger zone
// count. Per lane we keep the match with the smallest bottom y, i.e. the
// one furthest up the screen. Equal bottoms never overwrite, so the
// first template processed wins a tie; templates are processed in
// ascending class-id order.

use crate::matcher;
use crate::templates::Template;
use crate::types::{ClassId, Config, Frame, Observation, NUM_LANES};
use tracing::debug;

/// Lane index for a horizontal position. Boundaries belong to the lane on
/// their right.
pub fn classify_lane(x_center: f32, screen_width: usize) -> usize {
    let lane_width = screen_width as f32 / NUM_LANES as f32;
    if x_center < lane_width {
        0
    } else if x_center < 2.0 * lane_width {
        1
    } else {
        2
    }
}

#[derive(Debug, Clone, Copy)]
struct LaneSlot {
    class: ClassId,
    bottom: usize,
}

#[derive(Debug, Clone)]
pub struct StateExtractor {
    threshold: f32,
    y_start: f32,
    y_end: f32,
    clear: ClassId,
}

impl StateExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            threshold: config.detection.match_threshold,
            y_start: config.detection.danger_zone_y_start,
            y_end: config.detection.danger_zone_y_end,
            clear: ClassId(config.obstacles.clear_id),
        }
    }

    pub fn all_clear(&self) -> Observation {
        [self.clear; NUM_LANES]
    }

    /// Danger zone as inclusive pixel rows `[start, end]` for a frame height.
    pub fn danger_zone(&self, height: usize) -> (usize, usize) {
        (
            (height as f32 * self.y_start) as usize,
            (height as f32 * self.y_end) as usize,
        )
    }

    /// `None` when there is no frame; the caller decides what to substitute.
    pub fn extract<'a, I>(&self, frame: Option<&Frame>, obstacles: I) -> Option<Observation>
    where
        I: IntoIterator<Item = (ClassId, &'a Template)>,
    {
        let frame = frame?;
        let (zone_start, zone_end) = self.danger_zone(frame.height);

        let mut lanes = [LaneSlot {
            class: self.clear,
            bottom: frame.height + 1,
        }; NUM_LANES];

        for (class, template) in obstacles {
            if class == self.clear {
                continue;
            }

            for det in matcher::detect(frame, &template.image, self.threshold) {
                let bottom = det.bottom();
                if bottom < zone_start || bottom > zone_end {
                    continue;
                }

                let lane = classify_lane(det.center_x(), frame.width);
                if bottom < lanes[lane].bottom {
                    debug!(
                        "Lane {}: {} at bottom y={} (conf {:.2})",
                        lane, template.name, bottom, det.confidence
                    );
                    lanes[lane] = LaneSlot { class, bottom };
                }
            }
        }

        Some(lanes.map(|slot| slot.class))
    }
}
