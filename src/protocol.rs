use crate::ports::Channel;
use crate::shutter::ShutterStatus;
use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_COMMAND_SIZE: usize = 512;
pub const MAX_RESPONSE_SIZE: usize = 4096;

pub type CommandBuffer = ArrayString<MAX_COMMAND_SIZE>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: u32,
    pub command_type: CommandType,
}

/// Structured commands. An omitted `index` targets the only configured
/// shutter and is rejected when there is not exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandType {
    Ping,
    Configure { index: usize, open_channel: Channel, close_channel: Channel },
    Open { index: Option<usize> },
    Close { index: Option<usize> },
    Stop { index: Option<usize> },
    SetPosition { index: Option<usize>, position: f32 },
    SetState { index: Option<usize>, action: CoverAction },
    SetInterlockDelay { index: Option<usize>, delay_ms: u32 },
    SetTravelTime { index: Option<usize>, travel_time_ms: u32 },
    Status { index: Option<usize> },
    Discovery,
}

/// Home-automation cover action; the wire codes are 0 close, 1 open, 2 stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverAction {
    Close,
    Open,
    Stop,
}

impl CoverAction {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(CoverAction::Close),
            1 => Some(CoverAction::Open),
            2 => Some(CoverAction::Stop),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            CoverAction::Close => 0,
            CoverAction::Open => 1,
            CoverAction::Stop => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: u32,
    pub status: ResponseStatus,
    pub message: Option<alloc::string::String>,
    #[serde(default)]
    pub shutters: alloc::vec::Vec<ShutterStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Success,
    /// Well-formed but refused, e.g. an unknown index or a bad channel pair.
    Rejected,
    InvalidCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid JSON format")]
    InvalidJson,
    #[error("message exceeds buffer size")]
    MessageTooLarge,
    #[error("serialization failed")]
    SerializationError,
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    UnknownCommand(alloc::string::String),
    #[error("{command}: expected {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("{command}: invalid argument '{value}'")]
    InvalidArgument {
        command: &'static str,
        value: alloc::string::String,
    },
}

/// Parses JSON commands and the classic console command lines, and
/// frames responses.
#[derive(Debug)]
pub struct ProtocolHandler {
    command_counter: u32,
    command_buffer: CommandBuffer,
}

impl ProtocolHandler {
    pub fn new() -> Self {
        Self {
            command_counter: 0,
            command_buffer: ArrayString::new(),
        }
    }

    pub fn parse_command(&mut self, json_str: &str) -> Result<Command, ProtocolError> {
        self.command_buffer.clear();
        if json_str.len() > MAX_COMMAND_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        self.command_buffer.push_str(json_str);

        serde_json::from_str::<Command>(&self.command_buffer).map_err(|_| ProtocolError::InvalidJson)
    }

    /// Accepts either a JSON command object or a console line such as
    /// `ShutterPosition1 40`. Console commands get a fresh id.
    pub fn parse_line(&mut self, line: &str) -> Result<Command, ProtocolError> {
        let line = line.trim();
        if line.starts_with('{') {
            return self.parse_command(line);
        }

        let command_type = parse_console(line)?;
        Ok(Command {
            id: self.next_command_id(),
            command_type,
        })
    }

    pub fn serialize_response(&self, response: &CommandResponse) -> Result<alloc::string::String, ProtocolError> {
        let json_str = serde_json::to_string(response).map_err(|_| ProtocolError::SerializationError)?;

        if json_str.len() > MAX_RESPONSE_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        Ok(json_str)
    }

    pub fn create_response(&self, command_id: u32, status: ResponseStatus, message: Option<&str>) -> CommandResponse {
        CommandResponse {
            id: command_id,
            status,
            message: message.map(alloc::string::ToString::to_string),
            shutters: alloc::vec::Vec::new(),
        }
    }

    pub fn create_parse_error_response(&self, command_id: u32, error: &ProtocolError) -> CommandResponse {
        let reason = alloc::string::ToString::to_string(error);
        self.create_response(command_id, ResponseStatus::InvalidCommand, Some(&reason))
    }

    pub fn next_command_id(&mut self) -> u32 {
        self.command_counter = self.command_counter.wrapping_add(1);
        self.command_counter
    }
}

impl Default for ProtocolHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `ShutterPosition3` style names. Returns `None` when `name` is not
/// `base`, `Some(None)` for the bare name and `Some(Some(n))` for a suffix.
fn split_indexed(name: &str, base: &str) -> Option<Option<usize>> {
    if name.len() < base.len() || !name.is_char_boundary(base.len()) {
        return None;
    }
    let (head, tail) = name.split_at(base.len());
    if !head.eq_ignore_ascii_case(base) {
        return None;
    }
    if tail.is_empty() {
        return Some(None);
    }
    if tail.bytes().all(|b| b.is_ascii_digit()) {
        return tail.parse().ok().map(Some);
    }
    None
}

fn arg<T: core::str::FromStr>(command: &'static str, value: &str) -> Result<T, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidArgument {
        command,
        value: value.into(),
    })
}

fn position_arg(command: &'static str, value: &str) -> Result<f32, ProtocolError> {
    let position: f32 = arg(command, value)?;
    if !position.is_finite() {
        return Err(ProtocolError::InvalidArgument {
            command,
            value: value.into(),
        });
    }
    Ok(position)
}

fn action_arg(command: &'static str, value: &str) -> Result<CoverAction, ProtocolError> {
    let code: i64 = arg(command, value)?;
    CoverAction::from_code(code).ok_or_else(|| ProtocolError::InvalidArgument {
        command,
        value: value.into(),
    })
}

/// `[index] value` form shared by the delay and travel-time commands.
fn optional_index_and_value<'a>(
    command: &'static str,
    args: &[&'a str],
    expected: &'static str,
) -> Result<(Option<usize>, &'a str), ProtocolError> {
    match args {
        [] => Err(ProtocolError::MissingArgument { command, expected }),
        [value] => Ok((None, *value)),
        [index, value, ..] => Ok((Some(arg(command, index)?), *value)),
    }
}

fn optional_index(command: &'static str, args: &[&str]) -> Result<Option<usize>, ProtocolError> {
    args.first().map(|index| arg(command, index)).transpose()
}

/// Parses one console command line. Command names are case-insensitive;
/// `ShutterPosition` and `shutterstate` also accept an index suffix.
pub fn parse_console(line: &str) -> Result<CommandType, ProtocolError> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next().ok_or(ProtocolError::Empty)?;
    let args: heapless::Vec<&str, 8> = tokens.take(8).collect();
    let args = args.as_slice();

    if name.eq_ignore_ascii_case("Ping") {
        return Ok(CommandType::Ping);
    }

    if name.eq_ignore_ascii_case("SetShutter") {
        const CMD: &str = "SetShutter";
        return match args {
            [index, open, close, ..] => Ok(CommandType::Configure {
                index: arg(CMD, index)?,
                open_channel: arg(CMD, open)?,
                close_channel: arg(CMD, close)?,
            }),
            _ => Err(ProtocolError::MissingArgument {
                command: CMD,
                expected: "<index> <open channel> <close channel>",
            }),
        };
    }

    if name.eq_ignore_ascii_case("ShutterOpen") {
        return Ok(CommandType::Open { index: optional_index("ShutterOpen", args)? });
    }
    if name.eq_ignore_ascii_case("ShutterClose") {
        return Ok(CommandType::Close { index: optional_index("ShutterClose", args)? });
    }
    if name.eq_ignore_ascii_case("ShutterStop") {
        return Ok(CommandType::Stop { index: optional_index("ShutterStop", args)? });
    }
    if name.eq_ignore_ascii_case("ShutterStatus") {
        return Ok(CommandType::Status { index: optional_index("ShutterStatus", args)? });
    }
    if name.eq_ignore_ascii_case("ShutterDiscovery") {
        return Ok(CommandType::Discovery);
    }

    if name.eq_ignore_ascii_case("ShutterSetInterlockDelay") {
        const CMD: &str = "ShutterSetInterlockDelay";
        let (index, value) = optional_index_and_value(CMD, args, "[index] <delay ms>")?;
        return Ok(CommandType::SetInterlockDelay {
            index,
            delay_ms: arg(CMD, value)?,
        });
    }

    if name.eq_ignore_ascii_case("ShutterSetTravelTime") {
        const CMD: &str = "ShutterSetTravelTime";
        let (index, value) = optional_index_and_value(CMD, args, "[index] <travel time ms>")?;
        return Ok(CommandType::SetTravelTime {
            index,
            travel_time_ms: arg(CMD, value)?,
        });
    }

    if let Some(suffix) = split_indexed(name, "ShutterPosition") {
        const CMD: &str = "ShutterPosition";
        return match (suffix, args) {
            (Some(index), [position, ..]) => Ok(CommandType::SetPosition {
                index: Some(index),
                position: position_arg(CMD, position)?,
            }),
            (None, [position]) => Ok(CommandType::SetPosition {
                index: None,
                position: position_arg(CMD, position)?,
            }),
            (None, [index, position, ..]) => Ok(CommandType::SetPosition {
                index: Some(arg(CMD, index)?),
                position: position_arg(CMD, position)?,
            }),
            _ => Err(ProtocolError::MissingArgument {
                command: CMD,
                expected: "[index] <position>",
            }),
        };
    }

    if let Some(suffix) = split_indexed(name, "shutterstate") {
        const CMD: &str = "shutterstate";
        return match (suffix, args) {
            (Some(index), [action, ..]) => Ok(CommandType::SetState {
                index: Some(index),
                action: action_arg(CMD, action)?,
            }),
            (None, [index, action, ..]) => Ok(CommandType::SetState {
                index: Some(arg(CMD, index)?),
                action: action_arg(CMD, action)?,
            }),
            _ => Err(ProtocolError::MissingArgument {
                command: CMD,
                expected: "<index> <0|1|2>",
            }),
        };
    }

    Err(ProtocolError::UnknownCommand(name.into()))
}
