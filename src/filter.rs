//! Cursor smoothing applied right before pointer actuation.
//!
//! The classifier works on raw positions; jitter is only damped here so swipe and
//! scroll detection still see true velocity.

use crate::landmarks::NormalizedPoint;

#[derive(Debug, Clone)]
pub struct PositionFilter {
    alpha: f32,
    value: Option<NormalizedPoint>,
}

impl PositionFilter {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, value: None }
    }

    /// First call seeds the state and passes the point through unchanged.
    pub fn update(&mut self, p: NormalizedPoint) -> NormalizedPoint {
        let next = match self.value {
            None => p,
            Some(prev) => NormalizedPoint {
                x: self.alpha * p.x + (1.0 - self.alpha) * prev.x,
                y: self.alpha * p.y + (1.0 - self.alpha) * prev.y,
            },
        };
        self.value = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.value = None;
    }

    #[cfg(test)]
    pub fn value(&self) -> Option<NormalizedPoint> {
        self.value
    }
}

/// EMA followed by dead-zone suppression against the last emitted point.
#[derive(Debug, Clone)]
pub struct CursorSmoother {
    filter: PositionFilter,
    dead_zone: f32,
    last: Option<NormalizedPoint>,
}

impl CursorSmoother {
    pub fn new(alpha: f32, dead_zone: f32) -> Self {
        Self {
            filter: PositionFilter::new(alpha),
            dead_zone,
            last: None,
        }
    }

    /// Returns `None` when the smoothed point stays inside the dead zone on both axes.
    pub fn update(&mut self, p: NormalizedPoint) -> Option<NormalizedPoint> {
        let s = self.filter.update(p);
        if let Some(last) = self.last {
            if (s.x - last.x).abs() < self.dead_zone && (s.y - last.y).abs() < self.dead_zone {
                return None;
            }
        }
        self.last = Some(s);
        Some(s)
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.last = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    /// Normalised point to pixel coordinates, clamped onto the screen.
    pub fn to_pixels(&self, p: NormalizedPoint) -> (i32, i32) {
        let max_x = self.width.saturating_sub(1) as i32;
        let max_y = self.height.saturating_sub(1) as i32;
        let px = ((p.x * self.width as f32) as i32).clamp(0, max_x);
        let py = ((p.y * self.height as f32) as i32).clamp(0, max_y);
        (px, py)
    }
}
