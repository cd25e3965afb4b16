use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{
    env,
    fs::File,
    io::{self, BufReader},
    sync::{Arc, Mutex},
};

use crate::actions::{InputSink, LogSink, MouseButton, SharedSink, UinputSink};
use crate::config::ConfigState;
use crate::landmarks::NormalizedPoint;
use crate::{pipeline, source};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("run") => {
            let input: Option<String> = pargs.opt_value_from_str("--input")?;
            let profile: Option<String> = pargs.opt_value_from_str("--profile")?;
            let dry_run = pargs.contains("--dry-run");
            let watch = pargs.contains("--watch");

            let mut cfg = ConfigState::load_or_install_default()?;
            if let Some(name) = profile {
                cfg.select(&name)?;
            }

            let sink: SharedSink = if dry_run {
                Arc::new(Mutex::new(LogSink))
            } else {
                Arc::new(Mutex::new(UinputSink::new(cfg.profile.screen.size())?))
            };

            let feed = match input {
                Some(path) => {
                    let f = File::open(&path).map_err(|e| anyhow!("failed to open {path}: {e}"))?;
                    source::spawn_reader(BufReader::new(f))
                }
                None => source::spawn_reader(BufReader::new(io::stdin())),
            };

            let stats = pipeline::run(cfg, feed, sink, watch)?;
            print_response(&serde_json::json!({
                "ok": true,
                "data": {
                    "frames": stats.frames,
                    "no_hand": stats.no_hand,
                    "actions": stats.actions,
                    "clicks": stats.clicks,
                    "swipes": stats.swipes,
                    "failures": stats.failures,
                    "pauses": stats.pauses,
                    "reloads": stats.reloads,
                }
            }));
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl use <profile_name>"))?;
            let mut cfg = ConfigState::load_or_install_default()?;
            let r = match cfg.set_active(&name) {
                Ok(()) => serde_json::json!({"ok": true, "data": {"active_profile": cfg.active_name}}),
                Err(e) => serde_json::json!({"ok": false, "error": e.to_string()}),
            };
            print_response(&r);
            Ok(())
        }

        Some("list") => {
            let cfg = ConfigState::load_or_install_default()?;
            let list = cfg.list_profiles();
            print_response(
                &serde_json::json!({"ok": true, "data": {"profiles": list, "active": cfg.active_name}}),
            );
            Ok(())
        }

        Some("show") => {
            let profile: Option<String> = pargs.opt_value_from_str("--profile")?;
            let mut cfg = ConfigState::load_or_install_default()?;
            if let Some(name) = profile {
                cfg.select(&name)?;
            }
            print_response(&serde_json::json!({"ok": true, "data": cfg.profile}));
            Ok(())
        }

        Some("doctor") => {
            let cfg = ConfigState::load_or_install_default()?;
            print_response(&serde_json::json!({"ok": true, "data": cfg.doctor_report()}));
            Ok(())
        }

        Some("emit") => {
            // usage:
            //   gesturectl emit click right
            //   gesturectl emit scroll 3
            //   gesturectl emit key CTRL+EQUAL
            //   gesturectl emit move 0.5 0.5
            let what: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl emit <click|scroll|key|move> ..."))?;
            let cfg = ConfigState::load_or_install_default()?;
            let screen = cfg.profile.screen.size();
            let mut sink = UinputSink::new(screen)?;
            match what.as_str() {
                "click" => {
                    let btn: String = pargs.free_from_str().map_err(|_| {
                        anyhow!("usage: gesturectl emit click <left|right|middle>")
                    })?;
                    let button: MouseButton = btn.parse()?;
                    sink.click(button)?;
                    println!("ok: clicked {btn}");
                }
                "scroll" => {
                    let steps: i32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: gesturectl emit scroll <steps>"))?;
                    sink.scroll_vertical(steps)?;
                    println!("ok: scrolled vertical {steps}");
                }
                "key" => {
                    let chord: String = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: gesturectl emit key CTRL+EQUAL"))?;
                    sink.key_chord(&chord)?;
                    println!("ok: sent key chord {chord}");
                }
                "move" => {
                    let usage = || anyhow!("usage: gesturectl emit move <x> <y>  (0..1)");
                    let x: f32 = pargs.free_from_str().map_err(|_| usage())?;
                    let y: f32 = pargs.free_from_str().map_err(|_| usage())?;
                    let (px, py) = screen.to_pixels(NormalizedPoint::new(x, y));
                    sink.move_absolute(px, py)?;
                    println!("ok: moved pointer to {px},{py}");
                }
                other => return Err(anyhow!("unknown emit kind: {other}")),
            }
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!(
        r#"gesturectl: hand-gesture pointer and scroll control

USAGE:
  gesturectl help [command]                 Show general or command-specific help
  gesturectl run [--input FILE] [--profile NAME] [--dry-run] [--watch]
                                            Drive the pointer from a landmark feed
  gesturectl list                           List profiles
  gesturectl use <name>                     Switch active profile
  gesturectl show [--profile NAME]          Print the effective profile
  gesturectl doctor                         Diagnose permissions and paths
  gesturectl emit click <left|right|middle> Emit a mouse click
  gesturectl emit scroll <steps>            Emit vertical scroll (+/- steps)
  gesturectl emit key CTRL+EQUAL            Emit a key or chord
  gesturectl emit move <x> <y>              Move the pointer (normalised 0..1)

FEED FORMAT (one JSON object per line, stdin by default):
  {{"timestamp": 1.25, "landmarks": [[x, y], ... 21 points]}}
  {{"timestamp": 1.28, "landmarks": null}}    no hand in this frame

TIPS:
  - Profiles: ~/.config/gesturectl/profiles
  - Active profile pointer: ~/.config/gesturectl/active
  - Log level: RUST_LOG=debug gesturectl run ...
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: gesturectl run [--input FILE] [--profile NAME] [--dry-run] [--watch]\n\
             Reads landmark frames (stdin unless --input) and drives pointer, clicks, swipes and scrolling.\n\
             --dry-run logs actions instead of injecting them; --watch reloads the profile when it changes."
        ),
        "use" => {
            println!("usage: gesturectl use <name>\nMakes <name> the active profile.")
        }
        "list" => {
            println!("usage: gesturectl list\nLists available profiles and the active one.")
        }
        "show" => println!(
            "usage: gesturectl show [--profile NAME]\nPrints the effective profile with defaults filled in."
        ),
        "doctor" => println!(
            "usage: gesturectl doctor\nChecks /dev/uinput, input group membership and profile paths."
        ),
        "emit" => println!(
            "usage:\n  gesturectl emit click <left|right|middle>\n  gesturectl emit scroll <steps>\n  gesturectl emit key CTRL+EQUAL\n  gesturectl emit move <x> <y>"
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
