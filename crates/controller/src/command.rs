//! Console command parsing.
//!
//! Lines are whitespace-separated and case-insensitive. Parsing never
//! touches controller state; a `set` is only applied after it has parsed
//! and range-checked cleanly.

use std::fmt;

use crate::config::{RoomConfig, HUMIDITY_RANGE, SOIL_RANGE, TEMP_RANGE};
use crate::room::RoomId;

pub const HELP: &str = "\
========== GROW CONTROLLER CONSOLE ==========
help                       - Show this menu
status                     - Print sensor + relay data
set <room> <param> <value> - Change config value
   room: veg | flower | mother
   param: temp | humidity | soil
save                       - Save current configs
reboot                     - Stop the controller (relays keep their state)
---------------------------------------------";

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Status,
    Save,
    Reboot,
    Set(SetCommand),
}

/// Room names the console accepts. `mother` edits the veg room, where the
/// mother plants live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomTarget {
    Veg,
    Flower,
    Mother,
}

impl RoomTarget {
    pub fn room(self) -> RoomId {
        match self {
            RoomTarget::Veg | RoomTarget::Mother => RoomId::Veg,
            RoomTarget::Flower => RoomId::Flower,
        }
    }
}

impl fmt::Display for RoomTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoomTarget::Veg => "veg",
            RoomTarget::Flower => "flower",
            RoomTarget::Mother => "mother",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Temp,
    Humidity,
    Soil,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Param::Temp => "temp",
            Param::Humidity => "humidity",
            Param::Soil => "soil",
        })
    }
}

/// A validated new setpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting {
    Temp(f32),
    Humidity(f32),
    Soil(i32),
}

impl Setting {
    pub fn param(self) -> Param {
        match self {
            Setting::Temp(_) => Param::Temp,
            Setting::Humidity(_) => Param::Humidity,
            Setting::Soil(_) => Param::Soil,
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Temp(v) | Setting::Humidity(v) => write!(f, "{v:.2}"),
            Setting::Soil(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetCommand {
    pub target: RoomTarget,
    pub setting: Setting,
}

impl SetCommand {
    /// `cfg` with this command's setpoint applied.
    pub fn apply(&self, cfg: &RoomConfig) -> RoomConfig {
        let mut next = cfg.clone();
        apply_set(&mut next, self.setting);
        next
    }
}

pub fn apply_set(cfg: &mut RoomConfig, setting: Setting) {
    match setting {
        Setting::Temp(v) => cfg.ideal_temp = v,
        Setting::Humidity(v) => cfg.ideal_humidity = v,
        Setting::Soil(v) => cfg.ideal_soil = v,
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a console line was refused. `Display` is the message shown to the
/// operator.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    Unknown,
    Format,
    MissingValue,
    BadRoom,
    BadParam,
    NotANumber { param: Param, raw: String },
    NotAnInteger { param: Param, raw: String },
    OutOfRange { param: Param, min: f32, max: f32 },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown command. Type 'help' for list."),
            Self::Format => write!(f, "Format: set <room> <param> <value>"),
            Self::MissingValue => write!(f, "Missing parameter/value"),
            Self::BadRoom => write!(f, "Room must be veg, flower or mother"),
            Self::BadParam => write!(f, "Param must be temp, humidity, or soil"),
            Self::NotANumber { param, raw } => write!(f, "{param} value '{raw}' is not a number"),
            Self::NotAnInteger { param, raw } => {
                write!(f, "{param} value '{raw}' must be a whole number")
            }
            Self::OutOfRange { param, min, max } => {
                write!(f, "{param} must be between {min} and {max}")
            }
        }
    }
}

impl std::error::Error for CommandError {}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or(CommandError::Unknown)?.to_ascii_lowercase();
    let rest: Vec<&str> = words.collect();

    let bare = |cmd: Command| {
        if rest.is_empty() {
            Ok(cmd)
        } else {
            Err(CommandError::Unknown)
        }
    };

    match verb.as_str() {
        "help" => bare(Command::Help),
        "status" => bare(Command::Status),
        "save" => bare(Command::Save),
        "reboot" => bare(Command::Reboot),
        "set" => parse_set(&rest).map(Command::Set),
        _ => Err(CommandError::Unknown),
    }
}

fn parse_set(args: &[&str]) -> Result<SetCommand, CommandError> {
    match args.len() {
        0 | 1 => return Err(CommandError::Format),
        2 => return Err(CommandError::MissingValue),
        3 => {}
        _ => return Err(CommandError::Format),
    }

    let target = match args[0].to_ascii_lowercase().as_str() {
        "veg" => RoomTarget::Veg,
        "flower" => RoomTarget::Flower,
        "mother" => RoomTarget::Mother,
        _ => return Err(CommandError::BadRoom),
    };

    let param = match args[1].to_ascii_lowercase().as_str() {
        "temp" => Param::Temp,
        "humidity" => Param::Humidity,
        "soil" => Param::Soil,
        _ => return Err(CommandError::BadParam),
    };

    let raw = args[2];
    let setting = match param {
        Param::Temp => Setting::Temp(parse_real(param, raw, TEMP_RANGE.start(), TEMP_RANGE.end())?),
        Param::Humidity => Setting::Humidity(parse_real(
            param,
            raw,
            HUMIDITY_RANGE.start(),
            HUMIDITY_RANGE.end(),
        )?),
        Param::Soil => {
            let v: i32 = raw.parse().map_err(|_| {
                if raw.parse::<f32>().is_ok() {
                    CommandError::NotAnInteger {
                        param,
                        raw: raw.to_string(),
                    }
                } else {
                    CommandError::NotANumber {
                        param,
                        raw: raw.to_string(),
                    }
                }
            })?;
            if !SOIL_RANGE.contains(&v) {
                return Err(CommandError::OutOfRange {
                    param,
                    min: *SOIL_RANGE.start() as f32,
                    max: *SOIL_RANGE.end() as f32,
                });
            }
            Setting::Soil(v)
        }
    };

    Ok(SetCommand { target, setting })
}

fn parse_real(param: Param, raw: &str, min: &f32, max: &f32) -> Result<f32, CommandError> {
    let v: f32 = raw.parse().map_err(|_| CommandError::NotANumber {
        param,
        raw: raw.to_string(),
    })?;
    if !v.is_finite() || v < *min || v > *max {
        return Err(CommandError::OutOfRange {
            param,
            min: *min,
            max: *max,
        });
    }
    Ok(v)
}

// ===========================================================================
// Tests
// ===========================================================================
