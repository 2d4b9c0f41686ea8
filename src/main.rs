pub mod models {
    pub mod device;
    pub mod pins;
}

pub mod config;
pub mod db {
    pub mod models;
    pub mod store;
}
pub mod devices {
    pub mod actuator;
    pub mod analog;
    pub mod context;
    pub mod humidity;
    pub mod manager;
    pub mod sensor;
    pub mod temperature;
    pub mod ultrasonic;
}
pub mod hal;
pub mod schema;
pub mod services {
    pub mod collect;
    pub mod control;
    pub mod report;
}
#[cfg(test)]
mod testing;

use crate::config::Config;
use crate::db::store;
use crate::devices::context::DeviceContext;
use crate::devices::manager::DeviceManager;
use crate::models::pins::PinConfig;
use crate::services::control::{self, ActivateCommand, ControlResponse, TestRequest};
use crate::services::{collect, report};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const USAGE: &str = "usage: growlab [--env-file PATH] [collect | test DEVICE [PIN...] | activate DEVICE SECONDS | \
pulse DEVICE ON_SECS OFF_SECS CYCLES | readings [PAGE] [PER_PAGE] | logs [PAGE] [PER_PAGE] | events]";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Collect,
    Test { device: String, pins: Vec<u8> },
    Activate { device: String, seconds: u64 },
    Pulse { device: String, on_seconds: u64, off_seconds: u64, cycles: u32 },
    Readings { page: i64, per_page: i64 },
    Logs { page: i64, per_page: i64 },
    Events,
}

#[derive(Debug)]
struct Cli {
    env_file: Option<PathBuf>,
    command: Command,
}

fn number<T: std::str::FromStr>(what: &str, value: Option<&String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("missing {}\n{}", what, USAGE))?;
    value.parse().map_err(|_| format!("invalid {}: {}", what, value))
}

fn page_args(args: &[String]) -> Result<(i64, i64), String> {
    let page = match args.first() {
        Some(_) => number("PAGE", args.first())?,
        None => 1,
    };
    let per_page = match args.get(1) {
        Some(_) => number("PER_PAGE", args.get(1))?,
        None => store::DEFAULT_PER_PAGE,
    };
    Ok((page, per_page))
}

fn parse_cli(args: Vec<String>) -> Result<Cli, String> {
    let mut env_file = None;
    let mut rest = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--env-file" || arg.starts_with("--env-file=") {
            if env_file.is_some() {
                return Err("`--env-file` provided more than once".to_string());
            }
            let path = match arg.strip_prefix("--env-file=") {
                Some(p) => p.to_string(),
                None => iter.next().unwrap_or_default(),
            };
            if path.is_empty() {
                return Err("`--env-file` requires a path argument".to_string());
            }
            env_file = Some(PathBuf::from(path));
        } else {
            rest.push(arg);
        }
    }

    let (name, args) = match rest.split_first() {
        Some((name, args)) => (name.as_str(), args),
        None => ("collect", &[][..]),
    };
    let device = || args.first().cloned().ok_or_else(|| format!("missing DEVICE\n{}", USAGE));
    let command = match name {
        "collect" => Command::Collect,
        "test" => Command::Test {
            device: device()?,
            pins: args
                .iter()
                .skip(1)
                .map(|p| number("PIN", Some(p)))
                .collect::<Result<_, _>>()?,
        },
        "activate" => Command::Activate {
            device: device()?,
            seconds: number("SECONDS", args.get(1))?,
        },
        "pulse" => Command::Pulse {
            device: device()?,
            on_seconds: number("ON_SECS", args.get(1))?,
            off_seconds: number("OFF_SECS", args.get(2))?,
            cycles: number("CYCLES", args.get(3))?,
        },
        "readings" => {
            let (page, per_page) = page_args(args)?;
            Command::Readings { page, per_page }
        }
        "logs" => {
            let (page, per_page) = page_args(args)?;
            Command::Logs { page, per_page }
        }
        "events" => Command::Events,
        other => return Err(format!("unrecognised command: {}\n{}", other, USAGE)),
    };

    Ok(Cli { env_file, command })
}

fn respond(response: ControlResponse) -> Result<(), String> {
    println!("{}", response.to_json());
    if response.is_success() {
        Ok(())
    } else {
        Err("request failed".to_string())
    }
}

/// Flip `stop` on Ctrl-C. The loop itself stays synchronous.
fn spawn_stop_watcher(stop: Arc<AtomicBool>) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("signal runtime init failed: {}", e))?;
    thread::Builder::new()
        .name("stop-signal".to_string())
        .spawn(move || match runtime.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                info!("Ctrl-C received; stopping after the current cycle");
                stop.store(true, Ordering::SeqCst);
            }
            Err(e) => error!("listening for Ctrl-C failed: {}", e),
        })
        .map_err(|e| format!("spawning signal thread failed: {}", e))?;
    Ok(())
}

fn run(command: Command) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (database={}, simulation={}, interval={}s, relay_active_low={}, adc_vref={}V, adc_cs=gpio{})",
        cfg.database_url,
        cfg.simulation,
        cfg.collection_interval.as_secs(),
        cfg.relay_active_low,
        cfg.adc_vref,
        cfg.adc_cs_pin
    );

    // 2) Connect DB and apply migrations
    let mut conn = store::connect(&cfg.database_url)?;
    info!("Connected to database");

    // 3) Read-only listings need no hardware
    match command {
        Command::Readings { page, per_page } => {
            print!("{}", report::render_readings(&store::paginate_readings(&mut conn, page, per_page)?));
            return Ok(());
        }
        Command::Logs { page, per_page } => {
            print!("{}", report::render_logs(&store::paginate_logs(&mut conn, page, per_page)?));
            return Ok(());
        }
        Command::Events => {
            print!("{}", report::render_events(&store::event_catalog(&mut conn)?));
            return Ok(());
        }
        _ => {}
    }

    // 4) Hardware backend (or simulation)
    let ctx = DeviceContext::from_config(&cfg).map_err(|e| format!("hardware unavailable: {}", e))?;

    // 5) Dispatch
    match command {
        Command::Collect => {
            let stop = Arc::new(AtomicBool::new(false));
            spawn_stop_watcher(Arc::clone(&stop))?;
            collect::run_loop(&mut conn, &ctx, cfg.collection_interval, &stop)
        }
        Command::Test { device, pins } => {
            // explicit pins get their own manager; leave the stored wiring unclaimed
            let wiring = if pins.is_empty() {
                store::load_pin_config(&mut conn)?.pins
            } else {
                PinConfig::default()
            };
            let mut devices = DeviceManager::new(&wiring, &ctx).map_err(|e| format!("device setup failed: {}", e))?;
            let req = TestRequest {
                device,
                pin: None,
                pins: (!pins.is_empty()).then_some(pins),
            };
            respond(control::handle_test(&mut devices, &ctx, &mut conn, &req))
        }
        Command::Activate { device, seconds } => {
            let stored = store::load_pin_config(&mut conn)?;
            let mut devices =
                DeviceManager::new(&stored.pins, &ctx).map_err(|e| format!("device setup failed: {}", e))?;
            let cmd = ActivateCommand {
                device,
                seconds,
                off_seconds: None,
                cycles: None,
            };
            respond(control::handle_activate(&mut devices, &mut conn, &cmd))
        }
        Command::Pulse {
            device,
            on_seconds,
            off_seconds,
            cycles,
        } => {
            let stored = store::load_pin_config(&mut conn)?;
            let mut devices =
                DeviceManager::new(&stored.pins, &ctx).map_err(|e| format!("device setup failed: {}", e))?;
            let cmd = ActivateCommand {
                device,
                seconds: on_seconds,
                off_seconds: Some(off_seconds),
                cycles: Some(cycles),
            };
            respond(control::handle_activate(&mut devices, &mut conn, &cmd))
        }
        Command::Readings { .. } | Command::Logs { .. } | Command::Events => Ok(()),
    }
}

fn cli_args() -> Result<Vec<String>, String> {
    std::env::args_os()
        .skip(1)
        .map(|a| a.into_string().map_err(|_| "argument contains invalid UTF-8".to_string()))
        .collect()
}

/// Load the explicit env file, or `.env` from the working directory when present.
fn load_env(explicit: Option<&Path>) -> Result<Option<PathBuf>, String> {
    let path = match explicit {
        Some(path) if !path.is_file() => return Err(format!("env file not found: {}", path.display())),
        Some(path) => path.to_path_buf(),
        None => {
            let default_path = PathBuf::from(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            default_path
        }
    };
    config::load_env_file(&path)?;
    Ok(Some(path))
}

fn main() {
    let cli = match cli_args().and_then(parse_cli) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    let loaded_env = match load_env(cli.env_file.as_deref()) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // RUST_LOG may come from the env file.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(path) = &loaded_env {
        info!("Environment loaded from {}", path.display());
    }
    info!(
        "growlab {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
