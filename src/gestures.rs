//! Per-frame gesture classification.
//!
//! Each landmark frame yields an ordered list of actions: always a pointer move, then
//! an optional click, swipe, and scroll transition. Scroll start/stop are edge
//! triggered; while scrolling, every frame refreshes direction and velocity.

pub mod velocity;
pub mod window;

use log::debug;
use std::fmt;

use crate::config::{GestureConfig, ScrollConfig};
use crate::landmarks::{Landmark, LandmarkFrame};
use velocity::ScrollEstimator;
use window::{HISTORY_CAPACITY, HistorySample, HistoryWindow, SCROLL_CAPACITY, ScrollWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    /// Wheel sign: positive notches scroll up.
    pub fn sign(self) -> i32 {
        match self {
            ScrollDirection::Up => 1,
            ScrollDirection::Down => -1,
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrollDirection::Up => f.write_str("up"),
            ScrollDirection::Down => f.write_str("down"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Raw normalised index fingertip position.
    Move { x: f32, y: f32 },
    Click,
    SwipeRight,
    SwipeLeft,
    StartScroll {
        direction: ScrollDirection,
        velocity: f32,
    },
    UpdateScroll {
        direction: ScrollDirection,
        velocity: f32,
    },
    StopScroll,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Move { .. } => "move",
            Action::Click => "click",
            Action::SwipeRight => "swipe_right",
            Action::SwipeLeft => "swipe_left",
            Action::StartScroll { .. } => "start_scroll",
            Action::UpdateScroll { .. } => "update_scroll",
            Action::StopScroll => "stop_scroll",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrollSignal {
    Start,
    Stop,
}

#[derive(Debug)]
pub struct GestureClassifier {
    cfg: GestureConfig,
    estimator: ScrollEstimator,
    history: HistoryWindow,
    scroll_window: ScrollWindow,
    last_click: Option<f64>,
    scrolling: bool,
}

impl GestureClassifier {
    pub fn new(cfg: GestureConfig, scroll: ScrollConfig) -> Self {
        Self {
            cfg,
            estimator: ScrollEstimator::new(scroll),
            history: HistoryWindow::new(HISTORY_CAPACITY),
            scroll_window: ScrollWindow::new(SCROLL_CAPACITY),
            last_click: None,
            scrolling: false,
        }
    }

    pub fn update(&mut self, frame: &LandmarkFrame) -> Vec<Action> {
        let mut actions = Vec::with_capacity(3);
        let now = frame.timestamp;
        let index = frame.index_tip();

        actions.push(Action::Move {
            x: index.x,
            y: index.y,
        });

        if self.detect_click(frame) {
            actions.push(Action::Click);
        }

        if let Some(swipe) = self.detect_swipe(frame) {
            actions.push(swipe);
        }

        match (self.scroll_signal(frame), self.scrolling) {
            (Some(ScrollSignal::Start), false) => {
                if let Some((direction, velocity)) =
                    self.estimator.estimate(frame, &mut self.scroll_window)
                {
                    debug!("scroll start: {direction} @ {velocity:.2}");
                    actions.push(Action::StartScroll {
                        direction,
                        velocity,
                    });
                    self.scrolling = true;
                }
            }
            (Some(ScrollSignal::Stop), true) => {
                debug!("scroll stop");
                actions.push(Action::StopScroll);
                self.scrolling = false;
                self.scroll_window.clear();
            }
            (_, true) => {
                if let Some((direction, velocity)) =
                    self.estimator.estimate(frame, &mut self.scroll_window)
                {
                    actions.push(Action::UpdateScroll {
                        direction,
                        velocity,
                    });
                }
            }
            _ => {}
        }

        self.history.push(HistorySample {
            x: index.x,
            y: index.y,
            timestamp: now,
        });
        actions
    }

    /// Drops all gesture state, as if no frame had ever been seen.
    pub fn reset(&mut self) {
        self.history.clear();
        self.scroll_window.clear();
        self.last_click = None;
        self.scrolling = false;
    }

    #[cfg(test)]
    pub fn is_scrolling(&self) -> bool {
        self.scrolling
    }

    #[cfg(test)]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    #[cfg(test)]
    pub fn scroll_window_len(&self) -> usize {
        self.scroll_window.len()
    }

    #[cfg(test)]
    pub fn last_click(&self) -> Option<f64> {
        self.last_click
    }

    fn detect_click(&mut self, frame: &LandmarkFrame) -> bool {
        let dist = frame.index_tip().manhattan(&frame.thumb_tip());
        if dist >= self.cfg.pinch_threshold {
            return false;
        }
        let cooled = self
            .last_click
            .is_none_or(|t| frame.timestamp - t > self.cfg.click_cooldown);
        if cooled {
            self.last_click = Some(frame.timestamp);
        }
        cooled
    }

    fn detect_swipe(&mut self, frame: &LandmarkFrame) -> Option<Action> {
        if self.history.len() < 3 {
            return None;
        }
        let initial = self.history.oldest()?;
        let dx = frame.index_tip().x - initial.x;
        let dt = frame.timestamp - initial.timestamp;
        if dt <= 0.0 {
            return None;
        }

        let velocity = (dx.abs() as f64 / dt) as f32;
        if dx.abs() <= self.cfg.swipe_threshold || velocity <= self.cfg.swipe_velocity_threshold {
            return None;
        }

        debug!("swipe: dx={dx:.3} v={velocity:.2}/s");
        if self.cfg.swipe_rearm {
            self.history.clear();
        }
        Some(if dx > 0.0 {
            Action::SwipeRight
        } else {
            Action::SwipeLeft
        })
    }

    fn scroll_signal(&self, frame: &LandmarkFrame) -> Option<ScrollSignal> {
        let index_tip = frame.index_tip();
        let middle_tip = frame.middle_tip();
        let index_extended = index_tip.y < frame.get(Landmark::IndexPip).y;
        let middle_extended = middle_tip.y < frame.get(Landmark::MiddlePip).y;
        let close = index_tip.manhattan(&middle_tip) < self.cfg.scroll_gesture_threshold;

        if index_extended && middle_extended && close {
            Some(ScrollSignal::Start)
        } else if self.scrolling {
            Some(ScrollSignal::Stop)
        } else {
            None
        }
    }
}
