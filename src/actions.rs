use log::{info, warn};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::filter::ScreenSize;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("uinput: {0}")]
    Device(String),
    #[error("unknown mouse button: {0}")]
    UnknownButton(String),
    #[error("unsupported key token: {0}")]
    UnsupportedKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl FromStr for MouseButton {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            other => Err(SinkError::UnknownButton(other.to_string())),
        }
    }
}

/// OS input-injection primitives the engine drives.
pub trait InputSink: Send {
    fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), SinkError>;
    fn click(&mut self, button: MouseButton) -> Result<(), SinkError>;
    /// Send a chord like "CTRL+EQUAL" or a single key like "RIGHT".
    fn key_chord(&mut self, chord: &str) -> Result<(), SinkError>;
    /// Vertical wheel notches; positive scrolls up.
    fn scroll_vertical(&mut self, steps: i32) -> Result<(), SinkError>;

    fn press_key(&mut self, name: &str) -> Result<(), SinkError> {
        self.key_chord(name)
    }
}

pub type SharedSink = Arc<Mutex<dyn InputSink>>;

fn parse_chord(chord: &str) -> Vec<String> {
    chord
        .split('+')
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub struct UinputSink {
    #[allow(dead_code)]
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    pub fn new(screen: ScreenSize) -> Result<Self, SinkError> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create(screen)?;
            return Ok(Self {
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            let _ = screen;
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self::noop())
        }
    }

    pub fn noop() -> Self {
        Self { linux: None }
    }
}

impl InputSink for UinputSink {
    fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), SinkError> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.move_absolute(x, y)?;
        }
        let _ = (x, y);
        Ok(())
    }

    fn click(&mut self, button: MouseButton) -> Result<(), SinkError> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.click(button)?;
        }
        let _ = button;
        Ok(())
    }

    fn key_chord(&mut self, chord: &str) -> Result<(), SinkError> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            let mut keys = Vec::new();
            for p in parse_chord(chord) {
                keys.push(map_key(&p)?);
            }
            // press in order
            for k in &keys {
                dev.key_send(*k, 1)?;
            }
            dev.sync()?;
            // release in reverse
            for k in keys.iter().rev() {
                dev.key_send(*k, 0)?;
            }
            dev.sync()?;
        }
        let _ = chord;
        Ok(())
    }

    fn scroll_vertical(&mut self, steps: i32) -> Result<(), SinkError> {
        if steps == 0 {
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.scroll_vertical(steps)?;
        }
        Ok(())
    }
}

/// Logs every call instead of touching the OS; used for dry runs.
#[derive(Debug, Default)]
pub struct LogSink;

impl InputSink for LogSink {
    fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), SinkError> {
        info!("[dry-run] move {x},{y}");
        Ok(())
    }

    fn click(&mut self, button: MouseButton) -> Result<(), SinkError> {
        info!("[dry-run] click {button:?}");
        Ok(())
    }

    fn key_chord(&mut self, chord: &str) -> Result<(), SinkError> {
        info!("[dry-run] key {}", parse_chord(chord).join("+"));
        Ok(())
    }

    fn scroll_vertical(&mut self, steps: i32) -> Result<(), SinkError> {
        info!("[dry-run] scroll {steps}");
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl From<uinput::Error> for SinkError {
    fn from(e: uinput::Error) -> Self {
        SinkError::Device(e.to_string())
    }
}

#[cfg(target_os = "linux")]
fn map_key(tok: &str) -> Result<uinput::event::keyboard::Key, SinkError> {
    use uinput::event::keyboard::Key as K;
    let k = match tok {
        "CTRL" | "CONTROL" => K::LeftControl,
        "ALT" => K::LeftAlt,
        "SHIFT" => K::LeftShift,
        "SUPER" | "META" | "WIN" => K::LeftMeta,
        "TAB" => K::Tab,
        "MINUS" | "-" => K::Minus,
        "EQUAL" | "=" => K::Equal,
        "LEFT" => K::Left,
        "RIGHT" => K::Right,
        "UP" => K::Up,
        "DOWN" => K::Down,
        other => return Err(SinkError::UnsupportedKey(other.to_string())),
    };
    Ok(k)
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create(screen: ScreenSize) -> Result<Self, SinkError> {
        use uinput::event::{absolute, controller::Mouse, keyboard, relative};

        let max_x = screen.width.saturating_sub(1) as i32;
        let max_y = screen.height.saturating_sub(1) as i32;

        let dev = uinput::default()?
            .name("gesturectl virtual pointer")?
            // absolute pointer ranged to the screen
            .event(absolute::Position::X)?
            .min(0)
            .max(max_x)
            .event(absolute::Position::Y)?
            .min(0)
            .max(max_y)
            .event(relative::Wheel::Vertical)?
            // mouse buttons
            .event(Mouse::Left)?
            .event(Mouse::Right)?
            .event(Mouse::Middle)?
            // keys for chords and page navigation
            .event(keyboard::Key::LeftControl)?
            .event(keyboard::Key::LeftAlt)?
            .event(keyboard::Key::LeftShift)?
            .event(keyboard::Key::LeftMeta)?
            .event(keyboard::Key::Tab)?
            .event(keyboard::Key::Minus)?
            .event(keyboard::Key::Equal)?
            .event(keyboard::Key::Left)?
            .event(keyboard::Key::Right)?
            .event(keyboard::Key::Up)?
            .event(keyboard::Key::Down)?
            .create()?;

        info!("uinput: created virtual device ({max_x}x{max_y} abs range)");
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<(), SinkError> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn key_send(&mut self, key: uinput::event::keyboard::Key, val: i32) -> Result<(), SinkError> {
        self.dev.send(key, val)?;
        Ok(())
    }

    fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), SinkError> {
        use uinput::event::absolute::Position;
        self.dev.send(Position::X, x)?;
        self.dev.send(Position::Y, y)?;
        self.sync()
    }

    fn click(&mut self, button: MouseButton) -> Result<(), SinkError> {
        use uinput::event::controller::Mouse;
        let m = || match button {
            MouseButton::Left => Mouse::Left,
            MouseButton::Right => Mouse::Right,
            MouseButton::Middle => Mouse::Middle,
        };
        self.dev.send(m(), 1)?;
        self.sync()?;
        self.dev.send(m(), 0)?;
        self.sync()
    }

    fn scroll_vertical(&mut self, steps: i32) -> Result<(), SinkError> {
        use uinput::event::relative::Wheel;
        self.dev.send(Wheel::Vertical, steps)?;
        self.sync()
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SinkCall {
        Move(i32, i32),
        Click(MouseButton),
        Key(String),
        Scroll(i32),
    }

    /// Records calls into a shared log; can be told to fail specific primitives.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSink {
        pub calls: Arc<Mutex<Vec<SinkCall>>>,
        pub fail_clicks: bool,
        pub fail_scrolls: bool,
    }

    impl RecordingSink {
        pub fn calls(&self) -> Vec<SinkCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn scrolls(&self) -> Vec<i32> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    SinkCall::Scroll(s) => Some(s),
                    _ => None,
                })
                .collect()
        }
    }

    impl InputSink for RecordingSink {
        fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push(SinkCall::Move(x, y));
            Ok(())
        }

        fn click(&mut self, button: MouseButton) -> Result<(), SinkError> {
            if self.fail_clicks {
                return Err(SinkError::Device("click rejected".into()));
            }
            self.calls.lock().unwrap().push(SinkCall::Click(button));
            Ok(())
        }

        fn key_chord(&mut self, chord: &str) -> Result<(), SinkError> {
            self.calls
                .lock()
                .unwrap()
                .push(SinkCall::Key(parse_chord(chord).join("+")));
            Ok(())
        }

        fn scroll_vertical(&mut self, steps: i32) -> Result<(), SinkError> {
            if self.fail_scrolls {
                return Err(SinkError::Device("scroll rejected".into()));
            }
            self.calls.lock().unwrap().push(SinkCall::Scroll(steps));
            Ok(())
        }
    }
}
