use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::filter::ScreenSize;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GestureConfig {
    // manhattan distances between fingertips
    pub pinch_threshold: f32,
    pub click_cooldown: f64,
    pub swipe_threshold: f32,
    pub swipe_velocity_threshold: f32,
    pub swipe_rearm: bool,
    pub scroll_gesture_threshold: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            pinch_threshold: 0.05,
            click_cooldown: 0.3,
            swipe_threshold: 0.2,
            swipe_velocity_threshold: 1.0,
            swipe_rearm: true,
            scroll_gesture_threshold: 0.08,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub direction_threshold: f32,
    pub up_threshold_multiplier: f32,
    pub min_velocity: f32,
    pub max_velocity_threshold: f32,
    pub up_velocity_boost: f32,
    pub up_zone: f32,
    pub up_base_velocity: f32,
    pub down_zone: f32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            direction_threshold: 0.02,
            up_threshold_multiplier: 0.6,
            min_velocity: 0.2,
            max_velocity_threshold: 0.5,
            up_velocity_boost: 1.3,
            up_zone: 0.4,
            up_base_velocity: 0.4,
            down_zone: 0.6,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub base_amount: f32,
    pub max_amount: f32,
    pub base_interval: f64,
    pub min_interval: f64,
    pub up_amount_boost: f32,
    pub up_interval_multiplier: f64,
    pub stop_timeout: f64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            base_amount: 1.0,
            max_amount: 5.0,
            base_interval: 0.1,
            min_interval: 0.02,
            up_amount_boost: 1.2,
            up_interval_multiplier: 0.8,
            stop_timeout: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CursorConfig {
    pub ema_alpha: f32,
    pub dead_zone: f32,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.3,
            dead_zone: 0.003,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub no_hand_timeout: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            no_hand_timeout: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl ScreenConfig {
    pub fn size(&self) -> ScreenSize {
        ScreenSize {
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Profile {
    pub meta: Meta,
    pub gesture: GestureConfig,
    pub scroll: ScrollConfig,
    pub actuator: ActuatorConfig,
    pub cursor: CursorConfig,
    pub session: SessionConfig,
    pub screen: ScreenConfig,
}

impl Profile {
    pub fn from_toml(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(dirs.home_dir().join(".config").join("gesturectl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::load_or_install_in(&config_dir()?)
    }

    pub fn load_or_install_in(cfgdir: &Path) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn profile_path(&self) -> PathBuf {
        self.profiles_dir.join(format!("{}.toml", self.active_name))
    }

    /// Re-reads the active profile; on error the last good profile is kept.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    /// Switches to `name` for this run only, leaving the active pointer untouched.
    pub fn select(&mut self, name: &str) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, name)?;
        self.active_name = name.to_string();
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "screen": format!("{}x{}", self.profile.screen.width, self.profile.screen.height),
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
            }
        })
    }
}

fn load_profile(profdir: &Path, name: &str) -> Result<Profile> {
    let path = profdir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::from_toml(&txt).map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
}

const MAX_STOP_TIMEOUT: f64 = 10.0;

fn ensure_finite(p: &Profile) -> Result<()> {
    let (g, s, a, c) = (&p.gesture, &p.scroll, &p.actuator, &p.cursor);
    let fields = [
        ("gesture.pinch_threshold", g.pinch_threshold as f64),
        ("gesture.click_cooldown", g.click_cooldown),
        ("gesture.swipe_threshold", g.swipe_threshold as f64),
        ("gesture.swipe_velocity_threshold", g.swipe_velocity_threshold as f64),
        ("gesture.scroll_gesture_threshold", g.scroll_gesture_threshold as f64),
        ("scroll.direction_threshold", s.direction_threshold as f64),
        ("scroll.up_threshold_multiplier", s.up_threshold_multiplier as f64),
        ("scroll.min_velocity", s.min_velocity as f64),
        ("scroll.max_velocity_threshold", s.max_velocity_threshold as f64),
        ("scroll.up_velocity_boost", s.up_velocity_boost as f64),
        ("scroll.up_zone", s.up_zone as f64),
        ("scroll.up_base_velocity", s.up_base_velocity as f64),
        ("scroll.down_zone", s.down_zone as f64),
        ("actuator.base_amount", a.base_amount as f64),
        ("actuator.max_amount", a.max_amount as f64),
        ("actuator.base_interval", a.base_interval),
        ("actuator.min_interval", a.min_interval),
        ("actuator.up_amount_boost", a.up_amount_boost as f64),
        ("actuator.up_interval_multiplier", a.up_interval_multiplier),
        ("actuator.stop_timeout", a.stop_timeout),
        ("cursor.ema_alpha", c.ema_alpha as f64),
        ("cursor.dead_zone", c.dead_zone as f64),
        ("session.no_hand_timeout", p.session.no_hand_timeout),
    ];
    match fields.iter().find(|(_, v)| !v.is_finite()) {
        Some((name, v)) => Err(anyhow!("{name} must be a finite number, got {v}")),
        None => Ok(()),
    }
}

fn validate_profile(p: &Profile) -> Result<()> {
    ensure_finite(p)?;

    let g = &p.gesture;
    if g.pinch_threshold <= 0.0 || g.scroll_gesture_threshold <= 0.0 {
        return Err(anyhow!("gesture proximity thresholds must be positive"));
    }
    if g.click_cooldown < 0.0 || g.swipe_threshold < 0.0 || g.swipe_velocity_threshold < 0.0 {
        return Err(anyhow!("gesture thresholds must not be negative"));
    }

    let s = &p.scroll;
    if !(s.min_velocity > 0.0 && s.min_velocity <= 1.0) {
        return Err(anyhow!("scroll.min_velocity must be in (0,1]"));
    }
    if !(s.min_velocity..=1.0).contains(&s.up_base_velocity) {
        return Err(anyhow!("scroll.up_base_velocity must be in [min_velocity, 1]"));
    }
    if s.max_velocity_threshold <= 0.0 {
        return Err(anyhow!("scroll.max_velocity_threshold must be positive"));
    }
    if s.direction_threshold < 0.0 || s.up_threshold_multiplier <= 0.0 || s.up_velocity_boost <= 0.0
    {
        return Err(anyhow!("scroll direction thresholds must be positive"));
    }
    if s.up_zone > s.down_zone {
        return Err(anyhow!("scroll.up_zone must not exceed scroll.down_zone"));
    }

    let a = &p.actuator;
    if a.base_amount < 0.0 || a.max_amount < a.base_amount {
        return Err(anyhow!("actuator amounts must satisfy 0 <= base_amount <= max_amount"));
    }
    if a.min_interval <= 0.0 || a.base_interval < a.min_interval {
        return Err(anyhow!("actuator intervals must satisfy 0 < min_interval <= base_interval"));
    }
    if a.up_amount_boost <= 0.0 || a.up_interval_multiplier <= 0.0 {
        return Err(anyhow!("actuator multipliers must be positive"));
    }
    if !(a.stop_timeout > 0.0 && a.stop_timeout <= MAX_STOP_TIMEOUT) {
        return Err(anyhow!("actuator.stop_timeout must be in (0,{MAX_STOP_TIMEOUT}]"));
    }

    let c = &p.cursor;
    if !(c.ema_alpha > 0.0 && c.ema_alpha <= 1.0) {
        return Err(anyhow!("cursor.ema_alpha must be in (0,1]"));
    }
    if c.dead_zone < 0.0 {
        return Err(anyhow!("cursor.dead_zone must not be negative"));
    }

    if p.session.no_hand_timeout < 0.0 {
        return Err(anyhow!("session.no_hand_timeout must not be negative"));
    }
    if p.screen.width == 0 || p.screen.height == 0 {
        return Err(anyhow!("screen dimensions must be positive"));
    }
    Ok(())
}

fn check_in_input_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("input:")
                && line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
            {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_profile_uses_defaults() {
        let p = Profile::from_toml("").unwrap();
        assert_eq!(p.gesture.click_cooldown, 0.3);
        assert_eq!(p.scroll.down_zone, 0.6);
        assert_eq!(p.screen.width, 1920);
    }

    #[test]
    fn bundled_default_profile_is_valid() {
        let p = Profile::from_toml(default_profile_text()).unwrap();
        assert_eq!(p.meta.name.as_deref(), Some("default"));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let p = Profile::from_toml("[gesture]\npinch_threshold = 0.1\n").unwrap();
        assert_eq!(p.gesture.pinch_threshold, 0.1);
        assert_eq!(p.gesture.swipe_threshold, 0.2);
    }

    #[test]
    fn rejects_bad_alpha() {
        assert!(Profile::from_toml("[cursor]\nema_alpha = 0.0\n").is_err());
        assert!(Profile::from_toml("[cursor]\nema_alpha = 1.5\n").is_err());
    }

    #[test]
    fn rejects_inverted_intervals() {
        let txt = "[actuator]\nbase_interval = 0.01\nmin_interval = 0.05\n";
        assert!(Profile::from_toml(txt).is_err());
    }

    #[test]
    fn rejects_up_base_velocity_below_min() {
        let txt = "[scroll]\nmin_velocity = 0.5\nup_base_velocity = 0.3\n";
        assert!(Profile::from_toml(txt).is_err());
    }

    #[test]
    fn rejects_non_finite_numbers() {
        for txt in [
            "[actuator]\nstop_timeout = inf\n",
            "[actuator]\nbase_interval = nan\n",
            "[actuator]\nmax_amount = inf\n",
            "[session]\nno_hand_timeout = nan\n",
            "[scroll]\ndown_zone = nan\n",
            "[gesture]\nclick_cooldown = -inf\n",
        ] {
            let err = Profile::from_toml(txt).unwrap_err();
            assert!(err.to_string().contains("finite"), "{txt}: {err}");
        }
    }

    #[test]
    fn rejects_unbounded_stop_timeout() {
        assert!(Profile::from_toml("[actuator]\nstop_timeout = 60.0\n").is_err());
        assert!(Profile::from_toml("[actuator]\nstop_timeout = 0.0\n").is_err());
        assert!(Profile::from_toml("[actuator]\nstop_timeout = 2.0\n").is_ok());
    }

    #[test]
    fn installs_and_switches_profiles() {
        let dir = TempDir::new().unwrap();
        let mut st = ConfigState::load_or_install_in(dir.path()).unwrap();
        assert_eq!(st.active_name, "default");
        assert!(st.profile_path().exists());

        fs::write(
            st.profiles_dir.join("fast.toml"),
            "[actuator]\nmax_amount = 9.0\n",
        )
        .unwrap();
        assert_eq!(st.list_profiles(), vec!["default", "fast"]);

        st.set_active("fast").unwrap();
        assert_eq!(st.profile.actuator.max_amount, 9.0);
        let ptr = fs::read_to_string(&st.active_ptr).unwrap();
        assert_eq!(ptr, "fast");

        assert!(st.set_active("missing").is_err());
        assert_eq!(st.active_name, "fast");
    }

    #[test]
    fn reload_keeps_last_good_profile_on_error() {
        let dir = TempDir::new().unwrap();
        let mut st = ConfigState::load_or_install_in(dir.path()).unwrap();
        fs::write(st.profile_path(), "[cursor]\nema_alpha = 7.0\n").unwrap();
        assert!(st.reload().is_err());
        assert_eq!(st.profile.cursor.ema_alpha, 0.3);
    }

    #[test]
    fn select_does_not_touch_active_pointer() {
        let dir = TempDir::new().unwrap();
        let mut st = ConfigState::load_or_install_in(dir.path()).unwrap();
        fs::write(st.profiles_dir.join("alt.toml"), "").unwrap();
        st.select("alt").unwrap();
        assert_eq!(st.active_name, "alt");
        assert_eq!(fs::read_to_string(&st.active_ptr).unwrap(), "default");
    }
}
