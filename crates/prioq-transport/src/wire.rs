//! # Endpoint frames
//!
//! Request:  `op: u8 | arg: u32 | len: u32 | payload[len]`
//! Response: `status: i32 | len: u32 | payload[len]`
//!
//! Header integers are big-endian. Payload bytes are passed through as the
//! client laid them out (native byte order for values and priorities).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prioq_core::PqError;

pub const OP_WRITE: u8 = 1;
pub const OP_READ: u8 = 2;
pub const OP_IOCTL: u8 = 3;

pub const REQUEST_HEADER_LEN: usize = 9;
pub const RESPONSE_HEADER_LEN: usize = 8;

const EMPTY: &[u8] = &[];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Declared payload exceeds the configured limit; the stream cannot be resynchronised.
    Oversized { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Write(Bytes),
    /// `len` is the size of the caller's read buffer.
    Read { len: u32 },
    Ioctl { code: u32, arg: Bytes },
    Unknown { op: u8 },
}

impl Request {
    pub fn encode(&self, dst: &mut BytesMut) {
        let (op, arg, payload): (u8, u32, &[u8]) = match self {
            Request::Write(payload) => (OP_WRITE, 0, &payload[..]),
            Request::Read { len } => (OP_READ, *len, EMPTY),
            Request::Ioctl { code, arg } => (OP_IOCTL, *code, &arg[..]),
            Request::Unknown { op } => (*op, 0, EMPTY),
        };
        dst.reserve(REQUEST_HEADER_LEN + payload.len());
        dst.put_u8(op);
        dst.put_u32(arg);
        dst.put_u32(payload.len() as u32);
        dst.put_slice(payload);
    }

    /// Splits one complete request off `src`. `Ok(None)` means more bytes are needed.
    pub fn decode(src: &mut BytesMut, max_payload: usize) -> Result<Option<Self>, FrameError> {
        if src.len() < REQUEST_HEADER_LEN {
            return Ok(None);
        }
        let mut header = &src[..REQUEST_HEADER_LEN];
        let op = header.get_u8();
        let arg = header.get_u32();
        let len = header.get_u32() as usize;

        if len > max_payload {
            return Err(FrameError::Oversized { len, max: max_payload });
        }
        if src.len() < REQUEST_HEADER_LEN + len {
            src.reserve(REQUEST_HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(REQUEST_HEADER_LEN);
        let payload = src.split_to(len).freeze();
        let req = match op {
            OP_WRITE => Request::Write(payload),
            OP_READ => Request::Read { len: arg },
            OP_IOCTL => Request::Ioctl { code: arg, arg: payload },
            other => Request::Unknown { op: other },
        };
        Ok(Some(req))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Success count when non-negative, negated errno otherwise.
    pub status: i32,
    pub payload: Bytes,
}

impl Response {
    pub fn ok(count: usize, payload: impl Into<Bytes>) -> Self {
        Self {
            status: count as i32,
            payload: payload.into(),
        }
    }

    pub fn err(e: &PqError) -> Self {
        Self {
            status: e.selector(),
            payload: Bytes::new(),
        }
    }

    pub fn into_result(self) -> Result<(i32, Bytes), Option<PqError>> {
        if self.status >= 0 {
            Ok((self.status, self.payload))
        } else {
            Err(PqError::from_selector(self.status))
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(RESPONSE_HEADER_LEN + self.payload.len());
        dst.put_i32(self.status);
        dst.put_u32(self.payload.len() as u32);
        dst.put_slice(&self.payload);
    }

    pub fn decode(src: &mut BytesMut, max_payload: usize) -> Result<Option<Self>, FrameError> {
        if src.len() < RESPONSE_HEADER_LEN {
            return Ok(None);
        }
        let mut header = &src[..RESPONSE_HEADER_LEN];
        let status = header.get_i32();
        let len = header.get_u32() as usize;

        if len > max_payload {
            return Err(FrameError::Oversized { len, max: max_payload });
        }
        if src.len() < RESPONSE_HEADER_LEN + len {
            return Ok(None);
        }

        src.advance(RESPONSE_HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(Self { status, payload }))
    }
}
