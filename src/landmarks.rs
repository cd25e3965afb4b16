//! Hand landmark frames as delivered by the external detector.

pub const LANDMARK_COUNT: usize = 21;

/// Frame-relative position, both axes in `[0, 1]`, y growing downward.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(&self, other: &NormalizedPoint) -> f32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

impl From<(f32, f32)> for NormalizedPoint {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Keypoints the classifier reads, indexed the way the detector numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landmark {
    ThumbTip = 4,
    IndexPip = 6,
    IndexTip = 8,
    MiddlePip = 10,
    MiddleTip = 12,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    pub timestamp: f64,
    points: [NormalizedPoint; LANDMARK_COUNT],
}

impl LandmarkFrame {
    pub fn new(timestamp: f64, points: [NormalizedPoint; LANDMARK_COUNT]) -> Self {
        Self { timestamp, points }
    }

    /// Frame with every keypoint at the centre; tests override the ones they need.
    #[cfg(test)]
    pub fn neutral(timestamp: f64) -> Self {
        Self::new(timestamp, [NormalizedPoint::new(0.5, 0.5); LANDMARK_COUNT])
    }

    #[cfg(test)]
    pub fn with(mut self, which: Landmark, x: f32, y: f32) -> Self {
        self.points[which as usize] = NormalizedPoint::new(x, y);
        self
    }

    pub fn get(&self, which: Landmark) -> NormalizedPoint {
        self.points[which as usize]
    }

    pub fn index_tip(&self) -> NormalizedPoint {
        self.get(Landmark::IndexTip)
    }

    pub fn thumb_tip(&self) -> NormalizedPoint {
        self.get(Landmark::ThumbTip)
    }

    pub fn middle_tip(&self) -> NormalizedPoint {
        self.get(Landmark::MiddleTip)
    }
}

/// One reading from the detector: either a hand or an explicit absence.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Hand(LandmarkFrame),
    NoHand { timestamp: f64 },
}

impl Observation {
    pub fn timestamp(&self) -> f64 {
        match self {
            Observation::Hand(f) => f.timestamp,
            Observation::NoHand { timestamp } => *timestamp,
        }
    }
}
