use log::{error, info, trace};
use std::sync::PoisonError;
use thiserror::Error;

use crate::actions::{InputSink, MouseButton, SharedSink, SinkError};
use crate::config::Profile;
use crate::filter::{CursorSmoother, ScreenSize};
use crate::gestures::Action;
use crate::scroll::ScrollActuator;

#[derive(Debug, Error)]
#[error("{action} failed: {source}")]
pub struct DispatchError {
    pub action: &'static str,
    #[source]
    pub source: SinkError,
}

#[derive(Debug)]
pub struct ActionOutcome {
    pub action: Action,
    pub result: Result<(), DispatchError>,
}

impl ActionOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Maps classifier actions onto the input sink and the scroll actuator.
pub struct Dispatcher {
    sink: SharedSink,
    smoother: CursorSmoother,
    screen: ScreenSize,
    scroll: ScrollActuator,
}

impl Dispatcher {
    pub fn new(profile: &Profile, sink: SharedSink) -> Self {
        let scroll = ScrollActuator::new(
            profile.actuator.clone(),
            profile.scroll.min_velocity,
            sink.clone(),
        );
        Self {
            sink,
            smoother: CursorSmoother::new(profile.cursor.ema_alpha, profile.cursor.dead_zone),
            screen: profile.screen.size(),
            scroll,
        }
    }

    /// Runs every action in order; a failing action is logged and the batch continues.
    pub fn dispatch(&mut self, actions: &[Action]) -> Vec<ActionOutcome> {
        actions
            .iter()
            .map(|&action| {
                let result = self.apply(action).map_err(|source| DispatchError {
                    action: action.name(),
                    source,
                });
                if let Err(e) = &result {
                    error!("dispatch: {e}");
                }
                ActionOutcome { action, result }
            })
            .collect()
    }

    fn apply(&mut self, action: Action) -> Result<(), SinkError> {
        match action {
            Action::Move { x, y } => {
                let Some(p) = self.smoother.update((x, y).into()) else {
                    return Ok(());
                };
                let (px, py) = self.screen.to_pixels(p);
                trace!("cursor -> {px},{py}");
                self.with_sink(|s| s.move_absolute(px, py))
            }
            Action::Click => self.with_sink(|s| s.click(MouseButton::Left)),
            Action::SwipeRight => self.with_sink(|s| s.press_key("RIGHT")),
            Action::SwipeLeft => self.with_sink(|s| s.press_key("LEFT")),
            Action::StartScroll {
                direction,
                velocity,
            } => {
                self.scroll.start(direction, velocity);
                Ok(())
            }
            Action::UpdateScroll {
                direction,
                velocity,
            } => {
                self.scroll.update(direction, velocity);
                Ok(())
            }
            Action::StopScroll => {
                self.scroll.stop();
                Ok(())
            }
        }
    }

    fn with_sink<F>(&self, f: F) -> Result<(), SinkError>
    where
        F: FnOnce(&mut dyn InputSink) -> Result<(), SinkError>,
    {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *sink)
    }

    /// Drops cursor smoothing state and halts any scroll; used when the hand is lost.
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.scroll.stop();
    }

    pub fn shutdown(&mut self) {
        let snap = self.scroll.snapshot();
        if snap.active {
            info!("stopping {} scroll @ {:.2}", snap.direction, snap.velocity);
        }
        self.scroll.stop();
    }

    #[cfg(test)]
    pub fn is_scrolling(&self) -> bool {
        self.scroll.is_running()
    }
}
