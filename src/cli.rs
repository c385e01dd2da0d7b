use anyhow::Result;
use log::warn;
use pico_args::Arguments;
use std::env;

use tapsense::config::EngineConfig;

use crate::{input, pipeline};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
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

        Some("watch") => {
            let json = pargs.contains("--json");
            let defer_taps = pargs.contains("--defer-taps");
            let mut cfg = EngineConfig::load_or_install_default()?;
            if defer_taps {
                cfg.emit_every_tap = false;
            }
            if cfg.thresholds.double_tap_link_ms < cfg.thresholds.double_tap_ms {
                warn!(
                    "double_tap_link_ms ({}) below double_tap_ms ({}); the recognizer \
                     will link fewer taps than the tracker flags",
                    cfg.thresholds.double_tap_link_ms, cfg.thresholds.double_tap_ms
                );
            }
            pipeline::run(&cfg, json)
        }

        Some("devices") => {
            let devices = input::discover_multitouch();
            if devices.is_empty() {
                println!("no multitouch devices detected");
                return Ok(());
            }
            for d in devices {
                let range = |r: Option<(i32, i32)>| {
                    r.map(|(lo, hi)| format!("{lo}..{hi}"))
                        .unwrap_or_else(|| "?".into())
                };
                println!(
                    "{} ({})  x={} y={}",
                    d.name,
                    d.path,
                    range(d.x_range),
                    range(d.y_range)
                );
            }
            Ok(())
        }

        Some("config") => {
            let cfg = EngineConfig::load_or_install_default()?;
            println!("{}", serde_json::to_string_pretty(&cfg)?);
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
        r#"tapsense — touch gesture classification

USAGE:
  tapsense help [command]        Show general or command-specific help
  tapsense watch [--json]       Watch touch devices and print gestures
           [--defer-taps]       Withhold taps so a second tap can upgrade
                                them to a double-tap
  tapsense devices              List detected multitouch devices
  tapsense config               Print the effective configuration

TIPS:
  - Config: ~/.config/tapsense/config.toml (installed on first run)
  - RUST_LOG=debug shows per-event classification decisions
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "watch" => println!(
            "usage: tapsense watch [--json] [--defer-taps]\nRuns the classification \
             pipeline on all detected multitouch devices.\n--json prints one JSON object \
             per gesture on stdout.\n--defer-taps suppresses intermediate taps inside the \
             double-tap window."
        ),
        "devices" => {
            println!("usage: tapsense devices\nLists multitouch devices and their axis ranges.")
        }
        "config" => {
            println!("usage: tapsense config\nPrints the effective configuration as JSON.")
        }
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}
