//! VMHud - headless routing matrix console
//!
//! Runs the synchronization backend against the Voicemeeter engine (or the
//! simulated one), prints every published matrix and takes commands on stdin.
//!
//! ## Command line flags
//!
//! - `--simulate`: use the built-in simulated engine
//! - `--config <path>`: config file (default `<config dir>/vmhud/config.yaml`)
//! - `--json`: print snapshots as JSON lines
//!
//! Set `RUST_LOG=debug` for per-parameter and diff logging.

mod console;
mod render;

use std::io::{self, BufRead, Write};
use std::thread;

use anyhow::Context;
use console::{Command, CommandParseError, Options, Target};
use vmhud_backend::{Backend, Subscription};
use vmhud_core::config::{self, EngineMode, HudConfig};

fn main() -> anyhow::Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = Options::parse(&args)?;

    log::info!("vmhud starting up");

    // An explicit --config path is only read; the default location gets a
    // file with defaults on first run
    let mut config: HudConfig = match &options.config_path {
        Some(path) => config::load_config(path),
        None => config::load_or_create_config(&config::default_config_path()),
    };
    if options.simulate {
        log::info!("Simulated engine requested via --simulate");
        config.engine.mode = EngineMode::Simulated;
    }

    let backend = Backend::from_config(&config);
    let printer = spawn_printer(backend.subscribe(), options.json)?;
    backend.start();

    println!("vmhud: {} (type 'help' for commands)", backend.status().label());

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read command from stdin")?;
        match console::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => execute(&backend, command),
            Err(CommandParseError::Empty) => {}
            Err(e) => eprintln!("{}", e),
        }
    }

    backend.stop();
    // Dropping the backend closes every subscription, ending the printer
    drop(backend);
    if printer.join().is_err() {
        log::warn!("Snapshot printer panicked");
    }

    log::info!("vmhud stopped");
    Ok(())
}

fn spawn_printer(updates: Subscription, json: bool) -> anyhow::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("vmhud-printer".to_string())
        .spawn(move || {
            log::debug!("Printer attached as subscriber {}", updates.id());
            while let Ok(snapshot) = updates.recv() {
                let mut stdout = io::stdout().lock();
                let written = if json {
                    match serde_json::to_string(&*snapshot) {
                        Ok(line) => writeln!(stdout, "{}", line),
                        Err(e) => {
                            log::warn!("Failed to encode snapshot: {}", e);
                            Ok(())
                        }
                    }
                } else {
                    write!(stdout, "{}", render::render_matrix(&snapshot))
                };
                if written.and_then(|()| stdout.flush()).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn snapshot printer thread")
}

fn execute(backend: &Backend, command: Command) {
    let accepted = match command {
        Command::Route { strip, bus, enabled } => backend.set_route(strip, bus.index(), enabled),
        Command::Gain { target: Target::Strip(strip), db } => backend.set_strip_gain(strip, db),
        Command::Gain { target: Target::Bus(bus), db } => backend.set_bus_gain(bus.index(), db),
        Command::Drag { target: Target::Strip(strip), db } => {
            backend.queue_strip_gain(strip, db);
            true
        }
        Command::Drag { target: Target::Bus(bus), db } => {
            backend.queue_bus_gain(bus.index(), db);
            true
        }
        Command::Release { target: Target::Strip(strip), db } => {
            backend.commit_strip_gain(strip, db)
        }
        Command::Release { target: Target::Bus(bus), db } => {
            backend.commit_bus_gain(bus.index(), db)
        }
        Command::Status => {
            println!("status: {}", backend.status().label());
            true
        }
        Command::Help => {
            println!("{}", console::HELP);
            true
        }
        Command::Quit => true,
    };

    if !accepted {
        eprintln!("write not accepted (status: {})", backend.status().label());
    }
}
