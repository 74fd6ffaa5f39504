//! # Structured command surface
//!
//! Command codes follow the Linux `_IOW` / `_IOR` encoding with magic byte
//! `0x10` and a pointer-sized argument, so the numbers match what an
//! `ioctl(2)` caller would pass.

use prioq_core::{PqError, QueueInfo};

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

pub const COMMAND_MAGIC: u32 = 0x10;

const ARG_PTR_LEN: u32 = core::mem::size_of::<*const i32>() as u32;

const fn ioc(dir: u32, ty: u32, nr: u32, size: u32) -> u32 {
    (dir << 30) | (size << 16) | (ty << 8) | nr
}

pub const SET_CAPACITY: u32 = ioc(IOC_WRITE, COMMAND_MAGIC, 0x31, ARG_PTR_LEN);
pub const INSERT_INT: u32 = ioc(IOC_WRITE, COMMAND_MAGIC, 0x32, ARG_PTR_LEN);
pub const INSERT_PRIO: u32 = ioc(IOC_WRITE, COMMAND_MAGIC, 0x33, ARG_PTR_LEN);
pub const GET_INFO: u32 = ioc(IOC_READ, COMMAND_MAGIC, 0x34, ARG_PTR_LEN);
pub const GET_MIN: u32 = ioc(IOC_READ, COMMAND_MAGIC, 0x35, ARG_PTR_LEN);
pub const GET_MAX: u32 = ioc(IOC_READ, COMMAND_MAGIC, 0x36, ARG_PTR_LEN);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The argument is copied from the client.
    In,
    /// The argument is copied back to the client.
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    SetCapacity,
    InsertInt,
    InsertPrio,
    GetInfo,
    GetMin,
    GetMax,
}

impl CommandCode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        let code = match raw {
            SET_CAPACITY => CommandCode::SetCapacity,
            INSERT_INT => CommandCode::InsertInt,
            INSERT_PRIO => CommandCode::InsertPrio,
            GET_INFO => CommandCode::GetInfo,
            GET_MIN => CommandCode::GetMin,
            GET_MAX => CommandCode::GetMax,
            _ => return None,
        };
        Some(code)
    }

    pub fn raw(self) -> u32 {
        match self {
            CommandCode::SetCapacity => SET_CAPACITY,
            CommandCode::InsertInt => INSERT_INT,
            CommandCode::InsertPrio => INSERT_PRIO,
            CommandCode::GetInfo => GET_INFO,
            CommandCode::GetMin => GET_MIN,
            CommandCode::GetMax => GET_MAX,
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            CommandCode::SetCapacity | CommandCode::InsertInt | CommandCode::InsertPrio => {
                Direction::In
            }
            CommandCode::GetInfo | CommandCode::GetMin | CommandCode::GetMax => Direction::Out,
        }
    }

    /// Size of the argument the command reads or writes.
    pub fn arg_len(self) -> usize {
        match self {
            CommandCode::GetInfo => QueueInfo::WIRE_LEN,
            _ => 4,
        }
    }
}

/// A decoded structured command with its typed in-argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetCapacity(i32),
    InsertInt(i32),
    InsertPrio(i32),
    GetInfo,
    GetMin,
    GetMax,
}

impl Command {
    pub fn code(&self) -> CommandCode {
        match self {
            Command::SetCapacity(_) => CommandCode::SetCapacity,
            Command::InsertInt(_) => CommandCode::InsertInt,
            Command::InsertPrio(_) => CommandCode::InsertPrio,
            Command::GetInfo => CommandCode::GetInfo,
            Command::GetMin => CommandCode::GetMin,
            Command::GetMax => CommandCode::GetMax,
        }
    }

    /// Copies the in-argument (native byte order) out of the client buffer.
    pub fn decode(code: CommandCode, arg: &[u8]) -> Result<Self, PqError> {
        if arg.len() < code.arg_len() {
            return Err(PqError::TransferFailed);
        }
        let cmd = match code {
            CommandCode::SetCapacity => Command::SetCapacity(read_i32(arg)),
            CommandCode::InsertInt => Command::InsertInt(read_i32(arg)),
            CommandCode::InsertPrio => Command::InsertPrio(read_i32(arg)),
            CommandCode::GetInfo => Command::GetInfo,
            CommandCode::GetMin => Command::GetMin,
            CommandCode::GetMax => Command::GetMax,
        };
        Ok(cmd)
    }

    /// The client-side argument buffer for this command.
    pub fn encode_arg(&self) -> Vec<u8> {
        match self {
            Command::SetCapacity(v) | Command::InsertInt(v) | Command::InsertPrio(v) => {
                v.to_ne_bytes().to_vec()
            }
            other => vec![0u8; other.code().arg_len()],
        }
    }
}

/// Result of a successful structured command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandReply {
    Done,
    Info(QueueInfo),
    Value(i32),
}

impl CommandReply {
    /// Copies an out-argument back into the client buffer.
    pub fn encode_into(&self, arg: &mut [u8]) -> Result<(), PqError> {
        match self {
            CommandReply::Done => Ok(()),
            CommandReply::Info(info) => copy_out(arg, &info.to_ne_bytes()),
            CommandReply::Value(v) => copy_out(arg, &v.to_ne_bytes()),
        }
    }
}

fn read_i32(arg: &[u8]) -> i32 {
    i32::from_ne_bytes([arg[0], arg[1], arg[2], arg[3]])
}

fn copy_out(arg: &mut [u8], bytes: &[u8]) -> Result<(), PqError> {
    let dst = arg.get_mut(..bytes.len()).ok_or(PqError::TransferFailed)?;
    dst.copy_from_slice(bytes);
    Ok(())
}
