use std::io;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use prioq_core::{PqError, QueueInfo};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::command::Command;
use crate::wire::{FrameError, Request, Response};

/// Largest response payload the client accepts.
const MAX_RESPONSE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("endpoint i/o: {0}")]
    Io(#[from] io::Error),
    #[error("service rejected the call: {0}")]
    Service(PqError),
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// A single client connection to the endpoint.
///
/// Opening the connection is the `connect` operation and dropping it is
/// `disconnect`. A refused connect surfaces as the error of the first call.
/// [`EndpointClient::close`] disconnects and waits until the service has
/// released the session.
pub struct EndpointClient {
    stream: UnixStream,
    inbound: BytesMut,
    outbound: BytesMut,
}

impl EndpointClient {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            stream,
            inbound: BytesMut::with_capacity(256),
            outbound: BytesMut::with_capacity(256),
        })
    }

    /// Byte-stream write. Returns the count of bytes the service consumed.
    pub async fn write(&mut self, payload: &[u8]) -> Result<usize, ClientError> {
        let (status, _) = self.call(Request::Write(Bytes::copy_from_slice(payload))).await?;
        Ok(status as usize)
    }

    /// Byte-stream read with a buffer of `len` bytes.
    pub async fn read(&mut self, len: usize) -> Result<Bytes, ClientError> {
        let (_, payload) = self.call(Request::Read { len: len as u32 }).await?;
        Ok(payload)
    }

    /// Raw structured command. Returns the argument buffer after copy-out.
    pub async fn ioctl(&mut self, code: u32, arg: &[u8]) -> Result<Bytes, ClientError> {
        let (_, payload) = self
            .call(Request::Ioctl {
                code,
                arg: Bytes::copy_from_slice(arg),
            })
            .await?;
        Ok(payload)
    }

    pub async fn command(&mut self, cmd: Command) -> Result<Bytes, ClientError> {
        self.ioctl(cmd.code().raw(), &cmd.encode_arg()).await
    }

    /// Sets the capacity with a one-byte write.
    pub async fn write_capacity(&mut self, capacity: i8) -> Result<(), ClientError> {
        self.write(&capacity.to_ne_bytes()).await.map(|_| ())
    }

    /// Inserts a pair with two 4-byte writes.
    pub async fn write_pair(&mut self, value: i32, priority: i32) -> Result<(), ClientError> {
        self.write(&value.to_ne_bytes()).await?;
        self.write(&priority.to_ne_bytes()).await?;
        Ok(())
    }

    /// Extracts the top value with a 4-byte read.
    pub async fn pop(&mut self) -> Result<i32, ClientError> {
        let payload = self.read(4).await?;
        ne_i32(&payload)
    }

    pub async fn set_capacity(&mut self, capacity: i32) -> Result<(), ClientError> {
        self.command(Command::SetCapacity(capacity)).await.map(|_| ())
    }

    /// Inserts a pair with INSERT_INT followed by INSERT_PRIO.
    pub async fn insert(&mut self, value: i32, priority: i32) -> Result<(), ClientError> {
        self.command(Command::InsertInt(value)).await?;
        self.command(Command::InsertPrio(priority)).await?;
        Ok(())
    }

    pub async fn get_info(&mut self) -> Result<QueueInfo, ClientError> {
        let payload = self.command(Command::GetInfo).await?;
        let raw: [u8; QueueInfo::WIRE_LEN] = payload
            .get(..QueueInfo::WIRE_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ClientError::Protocol("short GET_INFO reply".to_string()))?;
        Ok(QueueInfo::from_ne_bytes(raw))
    }

    pub async fn get_min(&mut self) -> Result<i32, ClientError> {
        let payload = self.command(Command::GetMin).await?;
        ne_i32(&payload)
    }

    /// Disconnects and returns once the service has released the session.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.shutdown().await?;
        // The server hangs up only after it has detached the session.
        loop {
            self.inbound.clear();
            if self.stream.read_buf(&mut self.inbound).await? == 0 {
                return Ok(());
            }
        }
    }

    async fn call(&mut self, req: Request) -> Result<(i32, Bytes), ClientError> {
        req.encode(&mut self.outbound);
        self.stream.write_all_buf(&mut self.outbound).await?;

        let resp = self.next_response().await?;
        resp.into_result().map_err(|e| match e {
            Some(e) => ClientError::Service(e),
            None => ClientError::Protocol("unknown error selector".to_string()),
        })
    }

    async fn next_response(&mut self) -> Result<Response, ClientError> {
        loop {
            match Response::decode(&mut self.inbound, MAX_RESPONSE) {
                Ok(Some(resp)) => return Ok(resp),
                Ok(None) => {}
                Err(FrameError::Oversized { len, .. }) => {
                    return Err(ClientError::Protocol(format!("response of {} bytes", len)));
                }
            }
            if self.stream.read_buf(&mut self.inbound).await? == 0 {
                return Err(ClientError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "endpoint closed the connection",
                )));
            }
        }
    }
}

fn ne_i32(payload: &[u8]) -> Result<i32, ClientError> {
    let raw: [u8; 4] = payload
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| ClientError::Protocol("short value reply".to_string()))?;
    Ok(i32::from_ne_bytes(raw))
}
