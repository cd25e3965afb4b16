//! Continuous scrolling on a background thread.
//!
//! The frame loop only reparameterises a shared `ScrollIntent`; the worker reads it
//! under the same lock every iteration and emits one wheel tick per interval. Tick
//! size and rate both grow with velocity.

use log::{debug, info, warn};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::actions::SharedSink;
use crate::config::ActuatorConfig;
use crate::gestures::ScrollDirection;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSnapshot {
    pub active: bool,
    pub direction: ScrollDirection,
    pub velocity: f32,
}

#[derive(Debug)]
struct ScrollIntent {
    active: bool,
    direction: ScrollDirection,
    velocity: f32,
    // bumped on every activation so a lingering worker can tell it is stale
    generation: u64,
}

#[derive(Debug)]
struct Shared {
    intent: Mutex<ScrollIntent>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ScrollIntent> {
        self.intent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

const FALLBACK_STOP_TIMEOUT: Duration = Duration::from_millis(500);
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// One wheel tick: signed notches, then the pause before the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub amount: i32,
    pub interval: Duration,
}

pub fn tick_for(cfg: &ActuatorConfig, direction: ScrollDirection, velocity: f32) -> Tick {
    let mut amount = cfg.base_amount + (cfg.max_amount - cfg.base_amount) * velocity;
    let mut interval =
        cfg.base_interval - (cfg.base_interval - cfg.min_interval) * velocity as f64;
    if direction == ScrollDirection::Up {
        amount *= cfg.up_amount_boost;
        interval *= cfg.up_interval_multiplier;
    }
    Tick {
        amount: amount as i32 * direction.sign(),
        interval: Duration::try_from_secs_f64(interval).unwrap_or(MIN_TICK_INTERVAL),
    }
}

struct Worker {
    handle: JoinHandle<()>,
    exited: mpsc::Receiver<()>,
}

pub struct ScrollActuator {
    cfg: ActuatorConfig,
    min_velocity: f32,
    shared: Arc<Shared>,
    sink: SharedSink,
    worker: Option<Worker>,
}

impl ScrollActuator {
    pub fn new(cfg: ActuatorConfig, min_velocity: f32, sink: SharedSink) -> Self {
        let shared = Arc::new(Shared {
            intent: Mutex::new(ScrollIntent {
                active: false,
                direction: ScrollDirection::Down,
                velocity: min_velocity,
                generation: 0,
            }),
            wake: Condvar::new(),
        });
        Self {
            cfg,
            min_velocity,
            shared,
            sink,
            worker: None,
        }
    }

    /// Starts the tick loop, or just retargets it when already running.
    pub fn start(&mut self, direction: ScrollDirection, velocity: f32) {
        let velocity = self.clamp(velocity);
        let generation = {
            let mut intent = self.shared.lock();
            intent.direction = direction;
            intent.velocity = velocity;
            if intent.active {
                return;
            }
            intent.active = true;
            intent.generation += 1;
            intent.generation
        };

        self.shared.wake.notify_all();
        self.reap();
        let (tx, rx) = mpsc::channel();
        let worker = ScrollLoop {
            cfg: self.cfg.clone(),
            shared: Arc::clone(&self.shared),
            sink: Arc::clone(&self.sink),
            generation,
            _exited: tx,
        };
        let handle = thread::spawn(move || worker.run());
        self.worker = Some(Worker {
            handle,
            exited: rx,
        });
        info!("scroll started: {direction} @ {velocity:.2}");
    }

    /// Retargets a running loop; no-op while idle.
    pub fn update(&mut self, direction: ScrollDirection, velocity: f32) {
        let velocity = self.clamp(velocity);
        let mut intent = self.shared.lock();
        if intent.active {
            intent.direction = direction;
            intent.velocity = velocity;
        }
    }

    /// Clears the intent and waits, bounded by `stop_timeout`, for the loop to exit.
    pub fn stop(&mut self) {
        let was_active = {
            let mut intent = self.shared.lock();
            std::mem::replace(&mut intent.active, false)
        };
        self.shared.wake.notify_all();

        let Some(worker) = self.worker.take() else {
            return;
        };
        let timeout =
            Duration::try_from_secs_f64(self.cfg.stop_timeout).unwrap_or(FALLBACK_STOP_TIMEOUT);
        match worker.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!("scroll loop did not exit within {timeout:?}; detaching it");
            }
            _ => {
                if worker.handle.join().is_err() {
                    warn!("scroll loop panicked");
                }
            }
        }
        if was_active {
            info!("scroll stopped");
        }
    }

    pub fn snapshot(&self) -> ScrollSnapshot {
        let intent = self.shared.lock();
        ScrollSnapshot {
            active: intent.active,
            direction: intent.direction,
            velocity: intent.velocity,
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.snapshot().active
    }

    fn clamp(&self, velocity: f32) -> f32 {
        if velocity.is_nan() {
            return self.min_velocity;
        }
        velocity.clamp(self.min_velocity, 1.0)
    }

    // Joins a worker left over from a stop that timed out, if it has exited since.
    fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.handle.is_finished() {
                let _ = worker.handle.join();
            } else {
                debug!("previous scroll loop still winding down");
            }
        }
    }
}

impl Drop for ScrollActuator {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ScrollLoop {
    cfg: ActuatorConfig,
    shared: Arc<Shared>,
    sink: SharedSink,
    generation: u64,
    // dropped when the loop returns, which wakes `stop`
    _exited: mpsc::Sender<()>,
}

impl ScrollLoop {
    fn current(&self, intent: &ScrollIntent) -> bool {
        intent.active && intent.generation == self.generation
    }

    fn run(self) {
        loop {
            let (direction, velocity) = {
                let intent = self.shared.lock();
                if !self.current(&intent) {
                    break;
                }
                (intent.direction, intent.velocity)
            };

            let tick = tick_for(&self.cfg, direction, velocity);
            let res = self
                .sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .scroll_vertical(tick.amount);
            if let Err(e) = res {
                warn!("scroll tick failed: {e}");
            }

            let intent = self.shared.lock();
            let _ = self
                .shared
                .wake
                .wait_timeout_while(intent, tick.interval, |i| self.current(i));
        }
        debug!("scroll loop {} exited", self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::InputSink;
    use crate::actions::testing::RecordingSink;
    use crate::actions::{MouseButton, SinkError};
    use std::time::Instant;

    const MIN_VELOCITY: f32 = 0.2;

    fn fast_cfg() -> ActuatorConfig {
        ActuatorConfig {
            base_interval: 0.01,
            min_interval: 0.005,
            stop_timeout: 0.5,
            ..ActuatorConfig::default()
        }
    }

    fn actuator(sink: &RecordingSink) -> ScrollActuator {
        let shared: SharedSink = Arc::new(Mutex::new(sink.clone()));
        ScrollActuator::new(fast_cfg(), MIN_VELOCITY, shared)
    }

    #[test]
    fn tick_scales_with_velocity_and_direction() {
        let cfg = ActuatorConfig::default();
        let slow = tick_for(&cfg, ScrollDirection::Down, 0.0);
        assert_eq!(slow.amount, -1);
        assert_eq!(slow.interval, Duration::from_secs_f64(0.1));

        let fast = tick_for(&cfg, ScrollDirection::Down, 1.0);
        assert_eq!(fast.amount, -5);
        assert!((fast.interval.as_secs_f64() - 0.02).abs() < 1e-9);

        // 5 * 1.2 notches, 0.02 * 0.8 s
        let up = tick_for(&cfg, ScrollDirection::Up, 1.0);
        assert_eq!(up.amount, 6);
        assert!((up.interval.as_secs_f64() - 0.016).abs() < 1e-9);
    }

    #[test]
    fn non_finite_interval_still_paces_ticks() {
        let cfg = ActuatorConfig {
            base_interval: f64::NAN,
            ..ActuatorConfig::default()
        };
        let tick = tick_for(&cfg, ScrollDirection::Down, 0.5);
        assert!(tick.interval > Duration::ZERO);
    }

    #[test]
    fn stop_survives_infinite_timeout() {
        let cfg = ActuatorConfig {
            stop_timeout: f64::INFINITY,
            ..fast_cfg()
        };
        let sink = RecordingSink::default();
        let shared: SharedSink = Arc::new(Mutex::new(sink.clone()));
        let mut act = ScrollActuator::new(cfg, MIN_VELOCITY, shared);
        act.start(ScrollDirection::Up, 0.5);
        act.stop();
        assert!(!act.is_running());
    }

    #[test]
    fn ticks_until_stopped() {
        let sink = RecordingSink::default();
        let mut act = actuator(&sink);
        act.start(ScrollDirection::Down, 0.2);
        assert!(act.is_running());
        thread::sleep(Duration::from_millis(60));
        act.stop();
        assert!(!act.is_running());

        let ticks = sink.scrolls();
        assert!(!ticks.is_empty());
        assert!(ticks.iter().all(|&t| t < 0));

        thread::sleep(Duration::from_millis(40));
        assert_eq!(sink.scrolls().len(), ticks.len());
    }

    #[test]
    fn second_start_only_retargets() {
        let sink = RecordingSink::default();
        let mut act = actuator(&sink);
        act.start(ScrollDirection::Down, 0.2);
        act.start(ScrollDirection::Up, 0.9);
        assert_eq!(act.shared.lock().generation, 1);

        let snap = act.snapshot();
        assert_eq!(snap.direction, ScrollDirection::Up);
        assert!((snap.velocity - 0.9).abs() < 1e-6);
        act.stop();
    }

    #[test]
    fn update_is_noop_while_idle() {
        let sink = RecordingSink::default();
        let mut act = actuator(&sink);
        act.update(ScrollDirection::Up, 0.9);
        let snap = act.snapshot();
        assert!(!snap.active);
        assert_eq!(snap.direction, ScrollDirection::Down);
        assert_eq!(snap.velocity, MIN_VELOCITY);
    }

    #[test]
    fn velocity_is_clamped() {
        let sink = RecordingSink::default();
        let mut act = actuator(&sink);
        act.start(ScrollDirection::Down, 5.0);
        assert_eq!(act.snapshot().velocity, 1.0);
        act.update(ScrollDirection::Down, -3.0);
        assert_eq!(act.snapshot().velocity, MIN_VELOCITY);
        act.update(ScrollDirection::Down, f32::NAN);
        assert_eq!(act.snapshot().velocity, MIN_VELOCITY);
        act.stop();
    }

    #[test]
    fn stop_when_idle_is_harmless() {
        let sink = RecordingSink::default();
        let mut act = actuator(&sink);
        act.stop();
        act.stop();
        assert!(!act.is_running());
        assert!(sink.scrolls().is_empty());
    }

    #[test]
    fn restart_after_stop_runs_again() {
        let sink = RecordingSink::default();
        let mut act = actuator(&sink);
        act.start(ScrollDirection::Down, 0.5);
        act.stop();
        let before = sink.scrolls().len();
        act.start(ScrollDirection::Up, 0.5);
        thread::sleep(Duration::from_millis(40));
        act.stop();
        let after = sink.scrolls();
        assert!(after.len() > before);
        assert!(after[before..].iter().all(|&t| t > 0));
    }

    #[test]
    fn failing_sink_does_not_kill_loop() {
        let sink = RecordingSink {
            fail_scrolls: true,
            ..RecordingSink::default()
        };
        let mut act = actuator(&sink);
        act.start(ScrollDirection::Down, 0.5);
        thread::sleep(Duration::from_millis(30));
        assert!(act.is_running());
        act.stop();
        assert!(!act.is_running());
    }

    struct SlowSink;

    impl InputSink for SlowSink {
        fn move_absolute(&mut self, _: i32, _: i32) -> Result<(), SinkError> {
            Ok(())
        }
        fn click(&mut self, _: MouseButton) -> Result<(), SinkError> {
            Ok(())
        }
        fn key_chord(&mut self, _: &str) -> Result<(), SinkError> {
            Ok(())
        }
        fn scroll_vertical(&mut self, _: i32) -> Result<(), SinkError> {
            thread::sleep(Duration::from_millis(400));
            Ok(())
        }
    }

    #[test]
    fn stop_wait_is_bounded() {
        let cfg = ActuatorConfig {
            stop_timeout: 0.05,
            ..fast_cfg()
        };
        let sink: SharedSink = Arc::new(Mutex::new(SlowSink));
        let mut act = ScrollActuator::new(cfg, MIN_VELOCITY, sink);
        act.start(ScrollDirection::Down, 0.5);
        thread::sleep(Duration::from_millis(20));

        let t0 = Instant::now();
        act.stop();
        assert!(t0.elapsed() < Duration::from_millis(300));
        assert!(!act.is_running());
    }
}
