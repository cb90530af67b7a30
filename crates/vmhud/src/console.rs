//! Command-line options and stdin command parsing

use std::path::PathBuf;
use thiserror::Error;
use vmhud_core::Bus;

pub const HELP: &str = "\
Commands:
  route <strip> <bus> on|off      enable/disable a routing cell (bus: 0-7 or A1..B3)
  strip-gain <strip> <db>         set a strip gain now
  bus-gain <bus> <db>             set a bus gain now
  drag strip|bus <index> <db>     gain update while dragging (coalesced)
  release strip|bus <index> <db>  final gain at the end of a drag
  status                          connection status
  help                            this text
  quit                            stop and exit";

/// Process flags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    /// Force the simulated engine regardless of config
    pub simulate: bool,
    /// Print snapshots as JSON lines instead of a text matrix
    pub json: bool,
    pub config_path: Option<PathBuf>,
}

impl Options {
    /// Parse flags (without the program name). Unknown flags are ignored.
    pub fn parse(args: &[String]) -> Result<Self, CommandParseError> {
        let mut options = Options::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--simulate" => options.simulate = true,
                "--json" => options.json = true,
                "--config" => {
                    let path = iter.next().ok_or(CommandParseError::Usage("--config <path>"))?;
                    options.config_path = Some(PathBuf::from(path));
                }
                other => log::warn!("Ignoring unknown argument {:?}", other),
            }
        }
        Ok(options)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Unknown bus '{0}' (use 0-7 or A1..A5, B1..B3)")]
    InvalidBus(String),

    #[error("Expected on/off, got '{0}'")]
    InvalidSwitch(String),

    #[error("Expected 'strip' or 'bus', got '{0}'")]
    InvalidTarget(String),
}

/// Gain command target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Strip(usize),
    Bus(Bus),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Route { strip: usize, bus: Bus, enabled: bool },
    /// Immediate gain write
    Gain { target: Target, db: f32 },
    /// In-progress drag value
    Drag { target: Target, db: f32 },
    /// Drag finished
    Release { target: Target, db: f32 },
    Status,
    Help,
    Quit,
}

fn index(token: &str) -> Result<usize, CommandParseError> {
    token
        .parse()
        .map_err(|_| CommandParseError::InvalidNumber(token.to_string()))
}

fn decibels(token: &str) -> Result<f32, CommandParseError> {
    token
        .parse::<f32>()
        .ok()
        .filter(|db| db.is_finite())
        .ok_or_else(|| CommandParseError::InvalidNumber(token.to_string()))
}

/// Bus by position (`0`..`7`) or name (`A1`, `b2`, ...)
fn bus(token: &str) -> Result<Bus, CommandParseError> {
    token
        .parse::<usize>()
        .ok()
        .and_then(Bus::from_index)
        .or_else(|| Bus::from_name(token))
        .ok_or_else(|| CommandParseError::InvalidBus(token.to_string()))
}

fn switch(token: &str) -> Result<bool, CommandParseError> {
    match token.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        _ => Err(CommandParseError::InvalidSwitch(token.to_string())),
    }
}

fn target(kind: &str, idx: &str) -> Result<Target, CommandParseError> {
    match kind {
        "strip" => Ok(Target::Strip(index(idx)?)),
        "bus" => Ok(Target::Bus(bus(idx)?)),
        other => Err(CommandParseError::InvalidTarget(other.to_string())),
    }
}

/// Parse one input line
pub fn parse(line: &str) -> Result<Command, CommandParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&name, rest)) = tokens.split_first() else {
        return Err(CommandParseError::Empty);
    };

    match (name.to_ascii_lowercase().as_str(), rest) {
        ("route", [strip, b, state]) => Ok(Command::Route {
            strip: index(strip)?,
            bus: bus(b)?,
            enabled: switch(state)?,
        }),
        ("route", _) => Err(CommandParseError::Usage("route <strip> <bus> on|off")),

        ("strip-gain", [strip, db]) => Ok(Command::Gain {
            target: Target::Strip(index(strip)?),
            db: decibels(db)?,
        }),
        ("strip-gain", _) => Err(CommandParseError::Usage("strip-gain <strip> <db>")),

        ("bus-gain", [b, db]) => Ok(Command::Gain {
            target: Target::Bus(bus(b)?),
            db: decibels(db)?,
        }),
        ("bus-gain", _) => Err(CommandParseError::Usage("bus-gain <bus> <db>")),

        ("drag", [kind, idx, db]) => Ok(Command::Drag {
            target: target(kind, idx)?,
            db: decibels(db)?,
        }),
        ("drag", _) => Err(CommandParseError::Usage("drag strip|bus <index> <db>")),

        ("release", [kind, idx, db]) => Ok(Command::Release {
            target: target(kind, idx)?,
            db: decibels(db)?,
        }),
        ("release", _) => Err(CommandParseError::Usage("release strip|bus <index> <db>")),

        ("status", []) => Ok(Command::Status),
        ("help" | "?", _) => Ok(Command::Help),
        ("quit" | "exit", []) => Ok(Command::Quit),
        (other, _) => Err(CommandParseError::Unknown(other.to_string())),
    }
}
