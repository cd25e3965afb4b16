//! Two-finger scroll direction and speed.
//!
//! Speed comes from the vertical travel of the averaged index/middle tips across the
//! scroll window. When recent travel is too small to call a direction, the hand's
//! position on screen decides (top zone scrolls up, bottom zone scrolls down).

use super::ScrollDirection;
use super::window::{ScrollSample, ScrollWindow};
use crate::config::ScrollConfig;
use crate::landmarks::LandmarkFrame;

#[derive(Debug, Clone)]
pub struct ScrollEstimator {
    cfg: ScrollConfig,
}

impl ScrollEstimator {
    pub fn new(cfg: ScrollConfig) -> Self {
        Self { cfg }
    }

    /// Appends the frame's sample to `window`, then estimates `(direction, velocity)`.
    pub fn estimate(
        &self,
        frame: &LandmarkFrame,
        window: &mut ScrollWindow,
    ) -> Option<(ScrollDirection, f32)> {
        let avg_y = (frame.index_tip().y + frame.middle_tip().y) / 2.0;
        let now = frame.timestamp;
        window.push(ScrollSample {
            avg_y,
            timestamp: now,
        });

        if window.len() < 2 {
            return self.zone(avg_y);
        }
        let oldest = window.oldest()?;

        let dy = avg_y - oldest.avg_y;
        let dt = now - oldest.timestamp;
        if dt <= 0.0 {
            return None;
        }

        let velocity = self.normalize((dy.abs() as f64 / dt) as f32);

        if dy < 0.0 {
            let threshold = self.cfg.direction_threshold * self.cfg.up_threshold_multiplier;
            if dy.abs() > threshold {
                let boosted = (velocity * self.cfg.up_velocity_boost).min(1.0);
                return Some((ScrollDirection::Up, boosted));
            }
        } else if dy > self.cfg.direction_threshold {
            return Some((ScrollDirection::Down, velocity));
        }

        self.zone(avg_y)
    }

    /// Maps raw vertical speed onto `[min_velocity, 1.0]`.
    fn normalize(&self, velocity_y: f32) -> f32 {
        let min = self.cfg.min_velocity;
        let max_threshold = self.cfg.max_velocity_threshold;
        if velocity_y >= max_threshold {
            1.0
        } else if velocity_y <= 0.0 {
            min
        } else {
            min + (velocity_y / max_threshold) * (1.0 - min)
        }
    }

    fn zone(&self, avg_y: f32) -> Option<(ScrollDirection, f32)> {
        if avg_y < self.cfg.up_zone {
            Some((ScrollDirection::Up, self.cfg.up_base_velocity))
        } else if avg_y > self.cfg.down_zone {
            Some((ScrollDirection::Down, self.cfg.min_velocity))
        } else {
            None
        }
    }
}
