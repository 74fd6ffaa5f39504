use core::fmt;
use prioq_dsa::{HalfInsert, PriorityQueue, MAX_CAPACITY};

use crate::error::PqError;

const SYNTHETIC_BIT: u64 = 1 << 63;

/// Stable identity of a connected client process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Identity taken from the peer's process id.
    pub fn from_pid(pid: i32) -> Self {
        Self(pid as u32 as u64)
    }

    /// Identity for a peer whose process id is unknown. Never equal to a pid identity.
    pub fn synthetic(seq: u64) -> Self {
        Self(seq | SYNTHETIC_BIT)
    }

    pub fn is_synthetic(&self) -> bool {
        self.0 & SYNTHETIC_BIT != 0
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_synthetic() {
            write!(f, "conn:{}", self.0 & !SYNTHETIC_BIT)
        } else {
            write!(f, "pid:{}", self.0)
        }
    }
}

/// Out-argument of GET_INFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct QueueInfo {
    pub count: i32,
    pub capacity: i32,
}

static_assertions::assert_eq_size!(QueueInfo, [u8; 8]);

impl QueueInfo {
    pub const WIRE_LEN: usize = 8;

    pub fn to_ne_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.count.to_ne_bytes());
        out[4..].copy_from_slice(&self.capacity.to_ne_bytes());
        out
    }

    pub fn from_ne_bytes(raw: [u8; 8]) -> Self {
        Self {
            count: i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]),
            capacity: i32::from_ne_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }
}

/// One client's binding to its optional queue.
///
/// The methods here are the shared primitives behind both the byte-stream
/// and the structured-command surfaces.
#[derive(Debug)]
pub struct Session {
    client_id: ClientId,
    queue: Option<PriorityQueue>,
}

impl Session {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            queue: None,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn has_queue(&self) -> bool {
        self.queue.is_some()
    }

    pub fn queue(&self) -> Option<&PriorityQueue> {
        self.queue.as_ref()
    }

    /// Replaces the queue with a fresh empty one of the given capacity.
    ///
    /// Any previous queue, including a half-submitted pair, is discarded.
    pub fn set_capacity(&mut self, capacity: i32) -> Result<(), PqError> {
        if capacity < 1 || capacity as usize > MAX_CAPACITY {
            return Err(PqError::invalid(format!(
                "capacity must be in [1, {}], got {}",
                MAX_CAPACITY, capacity
            )));
        }

        // Allocate first so a failed allocation leaves the old queue in place.
        let fresh = PriorityQueue::init(capacity as usize)?;
        if let Some(mut old) = self.queue.replace(fresh) {
            tracing::debug!(
                "Session {}: discarding queue with {} entries",
                self.client_id,
                old.len()
            );
            old.destroy();
        }
        Ok(())
    }

    pub fn insert_half(&mut self, num: i32) -> Result<HalfInsert, PqError> {
        Ok(self.queue_mut()?.insert_half(num)?)
    }

    pub fn insert_value(&mut self, value: i32) -> Result<(), PqError> {
        Ok(self.queue_mut()?.insert_value(value)?)
    }

    pub fn insert_priority(&mut self, priority: i32) -> Result<i32, PqError> {
        Ok(self.queue_mut()?.insert_priority(priority)?)
    }

    /// Single-step insertion used by the paired write layout.
    pub fn insert_pair(&mut self, value: i32, priority: i32) -> Result<i32, PqError> {
        Ok(self.queue_mut()?.insert_full(value, priority)?)
    }

    pub fn extract(&mut self) -> Result<i32, PqError> {
        Ok(self.queue_mut()?.extract_top()?)
    }

    pub fn info(&self) -> Result<QueueInfo, PqError> {
        let queue = self.queue.as_ref().ok_or(PqError::QueueUninitialized)?;
        Ok(QueueInfo {
            count: queue.len() as i32,
            capacity: queue.capacity() as i32,
        })
    }

    fn queue_mut(&mut self) -> Result<&mut PriorityQueue, PqError> {
        self.queue.as_mut().ok_or(PqError::QueueUninitialized)
    }
}
