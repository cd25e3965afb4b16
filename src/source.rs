//! Line-oriented feed from the external hand-landmark detector.
//!
//! One JSON object per line:
//!
//! ```text
//! {"timestamp": 12.345, "landmarks": [[0.51, 0.42], [0.50, 0.47], ...]}
//! {"timestamp": 12.378, "landmarks": null}
//! ```
//!
//! `landmarks: null` (or a missing key) is an explicit "no hand". Points may also be
//! objects with `x`/`y` (extra keys such as `z` are ignored). A line without a timestamp
//! is placed on the detector's timeline by [`FeedClock`], using the reader's monotonic
//! clock since the last stamped line.

use log::{error, trace, warn};
use serde::Deserialize;
use std::io::BufRead;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;
use thiserror::Error;

use crate::landmarks::{LANDMARK_COUNT, LandmarkFrame, NormalizedPoint, Observation};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("malformed detector line: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected 21 landmarks, got {0}")]
    TooFewPoints(usize),
    #[error("landmark {0} needs at least x and y")]
    BadPoint(usize),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPoint {
    Seq(Vec<f32>),
    Object { x: f32, y: f32 },
}

#[derive(Debug, Deserialize)]
struct RawLine {
    timestamp: Option<f64>,
    #[serde(default)]
    landmarks: Option<Vec<RawPoint>>,
}

/// Keeps every observation of one feed on a single timeline.
#[derive(Debug, Default)]
pub struct FeedClock {
    // detector time minus reader time at the last stamped line
    offset: Option<f64>,
    saw_stamped: bool,
    saw_unstamped: bool,
}

impl FeedClock {
    /// `elapsed` is the reader's monotonic clock in seconds.
    pub fn stamp(&mut self, detector: Option<f64>, elapsed: f64) -> f64 {
        match detector {
            Some(t) => {
                self.saw_stamped = true;
                self.offset = Some(t - elapsed);
                t
            }
            None => {
                self.saw_unstamped = true;
                elapsed + self.offset.unwrap_or(0.0)
            }
        }
    }

    pub fn is_mixed(&self) -> bool {
        self.saw_stamped && self.saw_unstamped
    }
}

/// Parses one line; blank lines yield `Ok(None)`.
pub fn parse_line<F>(line: &str, stamp: F) -> Result<Option<Observation>, SourceError>
where
    F: FnOnce(Option<f64>) -> f64,
{
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let raw: RawLine = serde_json::from_str(line)?;
    let timestamp = stamp(raw.timestamp);

    let Some(points) = raw.landmarks else {
        return Ok(Some(Observation::NoHand { timestamp }));
    };
    if points.len() < LANDMARK_COUNT {
        return Err(SourceError::TooFewPoints(points.len()));
    }

    let mut out = [NormalizedPoint::default(); LANDMARK_COUNT];
    for (i, p) in points.into_iter().take(LANDMARK_COUNT).enumerate() {
        out[i] = match p {
            RawPoint::Seq(v) if v.len() >= 2 => NormalizedPoint::new(v[0], v[1]),
            RawPoint::Seq(_) => return Err(SourceError::BadPoint(i)),
            RawPoint::Object { x, y } => NormalizedPoint::new(x, y),
        };
    }
    Ok(Some(Observation::Hand(LandmarkFrame::new(timestamp, out))))
}

/// Reads observations on a background thread; the channel closes at end of input.
pub fn spawn_reader<R>(reader: R) -> mpsc::Receiver<Observation>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let started = Instant::now();
        let mut clock = FeedClock::default();
        let mut warned = false;
        for (n, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    error!("detector feed read failed: {e}");
                    break;
                }
            };
            let parsed = parse_line(&line, |t| clock.stamp(t, started.elapsed().as_secs_f64()));
            if clock.is_mixed() && !warned {
                warned = true;
                warn!("feed mixes stamped and unstamped lines; filling gaps from the reader clock");
            }
            match parsed {
                Ok(Some(obs)) => {
                    trace!("line {} @ {:.3}s: {:?}", n + 1, obs.timestamp(), obs);
                    if tx.send(obs).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("skipping line {}: {e}", n + 1),
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Landmark;
    use std::io::Cursor;

    fn parse(line: &str) -> Result<Option<Observation>, SourceError> {
        parse_line(line, |t| t.unwrap_or(0.0))
    }

    fn hand_line(t: f64) -> String {
        let pts: Vec<[f32; 2]> = (0..LANDMARK_COUNT).map(|i| [i as f32 / 100.0, 0.5]).collect();
        serde_json::json!({ "timestamp": t, "landmarks": pts }).to_string()
    }

    #[test]
    fn parses_hand_frame() {
        let obs = parse(&hand_line(1.5)).unwrap().unwrap();
        let Observation::Hand(frame) = obs else {
            panic!("expected a hand");
        };
        assert_eq!(frame.timestamp, 1.5);
        assert_eq!(frame.index_tip(), NormalizedPoint::new(0.08, 0.5));
        assert_eq!(frame.get(Landmark::ThumbTip), NormalizedPoint::new(0.04, 0.5));
    }

    #[test]
    fn object_points_and_z_are_accepted() {
        let pts: Vec<_> = (0..LANDMARK_COUNT)
            .map(|_| serde_json::json!({"x": 0.2, "y": 0.3, "z": -0.1}))
            .collect();
        let line = serde_json::json!({ "timestamp": 2.0, "landmarks": pts }).to_string();
        let obs = parse(&line).unwrap().unwrap();
        let Observation::Hand(frame) = obs else {
            panic!("expected a hand");
        };
        assert_eq!(frame.index_tip(), NormalizedPoint::new(0.2, 0.3));
    }

    #[test]
    fn null_landmarks_is_no_hand() {
        let obs = parse(r#"{"timestamp": 3.0, "landmarks": null}"#).unwrap();
        assert_eq!(obs, Some(Observation::NoHand { timestamp: 3.0 }));
        let obs = parse(r#"{"timestamp": 4.0}"#).unwrap();
        assert_eq!(obs, Some(Observation::NoHand { timestamp: 4.0 }));
    }

    #[test]
    fn missing_timestamp_uses_clock() {
        let obs = parse_line(r#"{"landmarks": null}"#, |t| t.unwrap_or(9.0)).unwrap();
        assert_eq!(obs.map(|o| o.timestamp()), Some(9.0));
    }

    #[test]
    fn unstamped_lines_follow_detector_timeline() {
        let mut clock = FeedClock::default();
        // detector clock runs far ahead of the reader's
        assert_eq!(clock.stamp(Some(1000.0), 0.5), 1000.0);
        assert!(!clock.is_mixed());
        let t = clock.stamp(None, 1.25);
        assert!((t - 1000.75).abs() < 1e-9);
        assert!(clock.is_mixed());
        assert_eq!(clock.stamp(Some(1001.0), 1.5), 1001.0);
        assert!((clock.stamp(None, 2.0) - 1001.5).abs() < 1e-9);
    }

    #[test]
    fn unstamped_feed_uses_reader_clock() {
        let mut clock = FeedClock::default();
        assert_eq!(clock.stamp(None, 0.25), 0.25);
        assert_eq!(clock.stamp(None, 0.5), 0.5);
        assert!(!clock.is_mixed());
    }

    #[test]
    fn rejects_short_frames_and_garbage() {
        let line = r#"{"timestamp": 1.0, "landmarks": [[0.1, 0.2]]}"#;
        assert!(matches!(parse(line), Err(SourceError::TooFewPoints(1))));
        assert!(matches!(parse("not json"), Err(SourceError::Json(_))));
        assert!(parse("   ").unwrap().is_none());
    }

    #[test]
    fn reader_skips_bad_lines_and_closes() {
        let input = format!("{}\ngarbage\n\n{{\"timestamp\": 2.0}}\n", hand_line(1.0));
        let rx = spawn_reader(Cursor::new(input.into_bytes()));
        let got: Vec<_> = rx.iter().collect();
        assert_eq!(got.len(), 2);
        assert!(matches!(got[0], Observation::Hand(_)));
        assert_eq!(got[1], Observation::NoHand { timestamp: 2.0 });
    }
}
