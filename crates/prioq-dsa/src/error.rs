use core::fmt;

/// Failures reported by a single [`PriorityQueue`](crate::PriorityQueue).
///
/// Every failing operation leaves the queue exactly as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    CapacityExceeded,
    Empty,
    InvalidPriority(i32),
    /// A value half is waiting for its priority.
    InsertionPending,
    /// A priority half arrived with no value half before it.
    NoPendingValue,
    ResourceExhausted,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::CapacityExceeded => write!(f, "priority queue is full"),
            QueueError::Empty => write!(f, "priority queue is empty"),
            QueueError::InvalidPriority(p) => write!(f, "priority must be non-negative, got {}", p),
            QueueError::InsertionPending => write!(f, "a value is still waiting for its priority"),
            QueueError::NoPendingValue => write!(f, "priority received before any value"),
            QueueError::ResourceExhausted => write!(f, "could not allocate heap storage"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for QueueError {}
