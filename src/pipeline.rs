use anyhow::Result;
use log::{debug, error, info, warn};
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::actions::SharedSink;
use crate::config::{ConfigState, Profile};
use crate::dispatch::{ActionOutcome, Dispatcher};
use crate::gestures::{Action, GestureClassifier};
use crate::landmarks::Observation;

const POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub no_hand: u64,
    pub actions: u64,
    pub clicks: u64,
    pub swipes: u64,
    pub failures: u64,
    pub pauses: u64,
    pub reloads: u64,
}

impl SessionStats {
    fn record(&mut self, outcomes: &[ActionOutcome]) {
        for o in outcomes {
            self.actions += 1;
            if !o.is_ok() {
                self.failures += 1;
                continue;
            }
            match o.action {
                Action::Click => self.clicks += 1,
                Action::SwipeLeft | Action::SwipeRight => self.swipes += 1,
                _ => {}
            }
        }
    }
}

/// Classifier + dispatcher pair plus the hand-presence bookkeeping around them.
pub struct Session {
    classifier: GestureClassifier,
    dispatcher: Dispatcher,
    sink: SharedSink,
    no_hand_timeout: f64,
    last_hand: Option<f64>,
    paused: bool,
    stats: SessionStats,
}

impl Session {
    pub fn new(profile: &Profile, sink: SharedSink) -> Self {
        Self {
            classifier: GestureClassifier::new(profile.gesture.clone(), profile.scroll.clone()),
            dispatcher: Dispatcher::new(profile, sink.clone()),
            sink,
            no_hand_timeout: profile.session.no_hand_timeout,
            last_hand: None,
            paused: false,
            stats: SessionStats::default(),
        }
    }

    pub fn observe(&mut self, obs: Observation) -> Vec<ActionOutcome> {
        match obs {
            Observation::Hand(frame) => {
                self.stats.frames += 1;
                self.last_hand = Some(frame.timestamp);
                if self.paused {
                    self.paused = false;
                    info!("hand detected again; control resumed");
                }
                let actions = self.classifier.update(&frame);
                let outcomes = self.dispatcher.dispatch(&actions);
                self.stats.record(&outcomes);
                outcomes
            }
            Observation::NoHand { timestamp } => {
                self.stats.no_hand += 1;
                let last = *self.last_hand.get_or_insert(timestamp);
                if !self.paused && timestamp - last > self.no_hand_timeout {
                    self.paused = true;
                    self.stats.pauses += 1;
                    info!("no hand for {:.2}s; control paused", timestamp - last);
                    self.classifier.reset();
                    self.dispatcher.reset();
                }
                Vec::new()
            }
        }
    }

    /// Swaps in a new profile; gesture state starts fresh and any scroll is stopped.
    pub fn reconfigure(&mut self, profile: &Profile) {
        self.dispatcher.shutdown();
        self.classifier = GestureClassifier::new(profile.gesture.clone(), profile.scroll.clone());
        self.dispatcher = Dispatcher::new(profile, self.sink.clone());
        self.no_hand_timeout = profile.session.no_hand_timeout;
        self.stats.reloads += 1;
    }

    pub fn shutdown(&mut self) {
        self.dispatcher.shutdown();
    }

    #[cfg(test)]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[cfg(test)]
    pub fn is_scrolling(&self) -> bool {
        self.dispatcher.is_scrolling()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

/// Runs the session until the feed closes or a termination signal arrives.
pub fn run(
    mut cfg: ConfigState,
    feed: Receiver<Observation>,
    sink: SharedSink,
    watch: bool,
) -> Result<SessionStats> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();
    {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("received signal {sig}; shutting down");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    let (reload_tx, reload_rx) = mpsc::channel::<()>();
    let _watcher = if watch {
        Some(watch_profile(cfg.profiles_dir.clone(), cfg.profile_path(), reload_tx)?)
    } else {
        None
    };

    info!(
        "running with profile '{}' ({}x{} screen)",
        cfg.active_name, cfg.profile.screen.width, cfg.profile.screen.height
    );
    let mut session = Session::new(&cfg.profile, sink);
    drive(&mut session, &feed, &shutdown, || {
        if reload_rx.try_iter().count() == 0 {
            return None;
        }
        match cfg.reload() {
            Ok(()) => {
                info!("profile '{}' reloaded", cfg.active_name);
                Some(cfg.profile.clone())
            }
            Err(e) => {
                error!("reload failed; keeping last good profile: {e}");
                None
            }
        }
    });
    session.shutdown();
    signals_handle.close();

    let stats = session.stats().clone();
    info!(
        "session ended: {} frames, {} no-hand, {} actions ({} clicks, {} swipes), {} failed, \
         {} pauses, {} reloads",
        stats.frames,
        stats.no_hand,
        stats.actions,
        stats.clicks,
        stats.swipes,
        stats.failures,
        stats.pauses,
        stats.reloads
    );
    Ok(stats)
}

/// Frame loop. `reload` is polled between observations and returns a profile to swap in.
pub fn drive<F>(
    session: &mut Session,
    feed: &Receiver<Observation>,
    shutdown: &AtomicBool,
    mut reload: F,
) where
    F: FnMut() -> Option<Profile>,
{
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if let Some(profile) = reload() {
            session.reconfigure(&profile);
        }
        match feed.recv_timeout(POLL) {
            Ok(obs) => {
                session.observe(obs);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("detector feed closed");
                break;
            }
        }
    }
}

fn watch_profile(
    dir: PathBuf,
    file: PathBuf,
    tx: mpsc::Sender<()>,
) -> Result<notify::RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(ev) => {
                let relevant = matches!(ev.kind, EventKind::Modify(_) | EventKind::Create(_))
                    && ev.paths.iter().any(|p| p == &file);
                if relevant {
                    debug!("profile changed: {:?}", ev.kind);
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!("profile watch error: {e}"),
        }
    })?;
    // watch the directory so editors that replace the file are still seen
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!("watching {} for changes", dir.display());
    Ok(watcher)
}
