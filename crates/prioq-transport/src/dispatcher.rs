use std::fmt::Debug;
use std::sync::Arc;

use prioq_core::{ClientId, PqError, QueueService, SessionHandle, WriteMode};
use prioq_dsa::HalfInsert;

use crate::command::{Command, CommandCode, CommandReply, Direction};

/// Routes every inbound call against the SessionTable.
///
/// All operations run to completion without awaiting. Apart from `connect`,
/// each one first resolves the caller to its session and fails with
/// `NotAttached` when there is none. A failed operation never changes
/// session or queue state.
pub struct Dispatcher {
    service: Arc<QueueService>,
}

impl Dispatcher {
    pub fn new(service: Arc<QueueService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<QueueService> {
        &self.service
    }

    pub fn connect(&self, client: ClientId) -> Result<(), PqError> {
        match self.service.sessions().attach(client) {
            Ok(()) => {
                tracing::info!(
                    "Dispatcher: {} connected, {} open session(s)",
                    client,
                    self.service.sessions().len()
                );
                self.service.log_sessions();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Dispatcher: {} tried to connect twice", client);
                Err(e)
            }
        }
    }

    pub fn disconnect(&self, client: ClientId) {
        let existed = self.service.sessions().detach(client);
        tracing::info!(
            "Dispatcher: {} disconnected (session existed: {}), {} open session(s)",
            client,
            existed,
            self.service.sessions().len()
        );
        self.service.log_sessions();
    }

    /// Byte-stream write: sets the capacity while no queue exists, otherwise
    /// feeds an insertion. Returns the number of bytes consumed.
    pub fn write(&self, client: ClientId, payload: &[u8]) -> Result<usize, PqError> {
        let result = self.write_inner(client, payload);
        report("write", client, &result);
        result
    }

    fn write_inner(&self, client: ClientId, payload: &[u8]) -> Result<usize, PqError> {
        if payload.is_empty() {
            return Err(PqError::invalid("empty write"));
        }
        let handle = self.lookup(client)?;
        let mode = self.service.config().write_mode;

        handle.with(|session| {
            if !session.has_queue() {
                if payload.len() != 1 {
                    return Err(PqError::invalid(format!(
                        "capacity write must be 1 byte, got {}",
                        payload.len()
                    )));
                }
                // The byte is a signed capacity.
                let capacity = payload[0] as i8 as i32;
                session.set_capacity(capacity)?;
                tracing::debug!("Dispatcher: {} set capacity {}", client, capacity);
                return Ok(1);
            }

            match mode {
                WriteMode::Split => {
                    let num = ne_i32(payload, 0, 4)?;
                    match session.insert_half(num)? {
                        HalfInsert::ValueAccepted => {
                            tracing::debug!("Dispatcher: {} received value={}", client, num)
                        }
                        HalfInsert::Admitted { epoch } => tracing::debug!(
                            "Dispatcher: {} received priority={}, admitted at epoch {}",
                            client,
                            num,
                            epoch
                        ),
                    }
                    Ok(4)
                }
                WriteMode::Paired => {
                    let value = ne_i32(payload, 0, 8)?;
                    let priority = ne_i32(payload, 4, 8)?;
                    session.insert_pair(value, priority)?;
                    Ok(8)
                }
            }
        })
    }

    /// Byte-stream read: extracts the top value into a 4-byte buffer.
    pub fn read(&self, client: ClientId, buf: &mut [u8]) -> Result<usize, PqError> {
        let result = self.read_inner(client, buf);
        report("read", client, &result);
        result
    }

    fn read_inner(&self, client: ClientId, buf: &mut [u8]) -> Result<usize, PqError> {
        let handle = self.lookup(client)?;
        handle.with(|session| {
            if !session.has_queue() {
                return Err(PqError::QueueUninitialized);
            }
            // Checked before extracting so a bad read never loses an entry.
            if buf.len() != 4 {
                return Err(PqError::invalid(format!(
                    "read buffer must be 4 bytes, got {}",
                    buf.len()
                )));
            }
            let value = session.extract()?;
            buf.copy_from_slice(&value.to_ne_bytes());
            Ok(4)
        })
    }

    /// Typed structured command.
    pub fn command(&self, client: ClientId, cmd: Command) -> Result<CommandReply, PqError> {
        let result = self.command_inner(client, cmd);
        report(command_name(cmd.code()), client, &result);
        result
    }

    fn command_inner(&self, client: ClientId, cmd: Command) -> Result<CommandReply, PqError> {
        let handle = self.lookup(client)?;
        handle.with(|session| match cmd {
            Command::SetCapacity(capacity) => {
                session.set_capacity(capacity)?;
                Ok(CommandReply::Done)
            }
            Command::InsertInt(value) => {
                session.insert_value(value)?;
                Ok(CommandReply::Done)
            }
            Command::InsertPrio(priority) => {
                session.insert_priority(priority)?;
                Ok(CommandReply::Done)
            }
            Command::GetInfo => Ok(CommandReply::Info(session.info()?)),
            Command::GetMin => Ok(CommandReply::Value(session.extract()?)),
            Command::GetMax => Err(PqError::Unsupported),
        })
    }

    /// Raw structured command: `code` is the numeric command code and `arg` the
    /// caller's argument buffer, read for in-commands and filled for out-commands.
    /// The caller is resolved first, so a client with no session gets
    /// `NotAttached` whatever the code and buffer.
    pub fn ioctl(&self, client: ClientId, code: u32, arg: &mut [u8]) -> Result<i32, PqError> {
        let result = self.ioctl_inner(client, code, arg);
        let op = CommandCode::from_raw(code).map(command_name).unwrap_or("ioctl");
        report(op, client, &result);
        result
    }

    fn ioctl_inner(&self, client: ClientId, code: u32, arg: &mut [u8]) -> Result<i32, PqError> {
        self.lookup(client)?;
        let code = CommandCode::from_raw(code)
            .ok_or_else(|| PqError::invalid(format!("unknown command {:#x}", code)))?;

        // An out-argument that cannot be copied back must fail before the queue changes.
        if code.direction() == Direction::Out && arg.len() < code.arg_len() {
            return Err(PqError::TransferFailed);
        }
        let cmd = Command::decode(code, arg)?;
        let reply = self.command_inner(client, cmd)?;
        reply.encode_into(arg)?;
        Ok(0)
    }

    fn lookup(&self, client: ClientId) -> Result<SessionHandle, PqError> {
        self.service.sessions().lookup(client)
    }
}

fn ne_i32(payload: &[u8], offset: usize, expected: usize) -> Result<i32, PqError> {
    if payload.len() != expected {
        return Err(PqError::invalid(format!(
            "insert write must be {} bytes, got {}",
            expected,
            payload.len()
        )));
    }
    let raw = &payload[offset..offset + 4];
    Ok(i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn command_name(code: CommandCode) -> &'static str {
    match code {
        CommandCode::SetCapacity => "SET_CAPACITY",
        CommandCode::InsertInt => "INSERT_INT",
        CommandCode::InsertPrio => "INSERT_PRIO",
        CommandCode::GetInfo => "GET_INFO",
        CommandCode::GetMin => "GET_MIN",
        CommandCode::GetMax => "GET_MAX",
    }
}

fn report<T: Debug>(op: &str, client: ClientId, result: &Result<T, PqError>) {
    match result {
        Ok(out) => tracing::debug!("Dispatcher: {} {} -> {:?}", client, op, out),
        Err(e) => tracing::warn!("Dispatcher: {} {} failed: {}", client, op, e),
    }
}
