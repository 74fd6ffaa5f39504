extern crate alloc;
use alloc::vec::Vec;

use crate::entry::Entry;
use crate::error::QueueError;

/// Largest capacity a client may request.
pub const MAX_CAPACITY: usize = 100;

/// Progress of the two-step (value, then priority) insertion protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertState {
    #[default]
    Ready,
    AwaitingPriority { value: i32 },
}

/// Outcome of a successful [`PriorityQueue::insert_half`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfInsert {
    /// The value half was stored; the queue now waits for its priority.
    ValueAccepted,
    /// The pair was admitted with the given epoch.
    Admitted { epoch: i32 },
}

/// A bounded binary min-heap keyed on `(priority, epoch)`.
///
/// ## Invariants
/// - `len() <= capacity()` at all times.
/// - For every slot `i` with a child `c`, `heap[i].order(&heap[c])` is not `Greater`.
/// - `next_epoch()` is the epoch the next admitted entry receives; epochs increase
///   strictly in admission order, so equal priorities leave in FIFO order.
/// - Epochs stay non-negative. When the counter reaches `i32::MAX` the live
///   entries are renumbered `0..len()` in admission order, so FIFO order
///   survives any number of admissions.
///
/// Storage for exactly `capacity` entries is reserved up front, so admission
/// never reallocates.
#[derive(Debug)]
pub struct PriorityQueue {
    heap: Vec<Entry>,
    capacity: usize,
    timer: i32,
    state: InsertState,
}

impl PriorityQueue {
    /// Allocates an empty queue with room for exactly `capacity` entries.
    ///
    /// The capacity is trusted; callers validate it against [`MAX_CAPACITY`].
    pub fn init(capacity: usize) -> Result<Self, QueueError> {
        let mut heap = Vec::new();
        heap.try_reserve_exact(capacity)
            .map_err(|_| QueueError::ResourceExhausted)?;

        tracing::trace!("PriorityQueue: reserved {} slots", capacity);
        Ok(Self {
            heap,
            capacity,
            timer: 0,
            state: InsertState::Ready,
        })
    }

    /// Starts epoch numbering at `epoch` instead of 0. Negative values are clamped to 0.
    pub fn with_next_epoch(mut self, epoch: i32) -> Self {
        self.timer = epoch.max(0);
        self
    }

    /// Releases the heap storage. Calling it again is a no-op.
    pub fn destroy(&mut self) {
        if self.capacity == 0 && self.heap.capacity() == 0 {
            return;
        }
        tracing::trace!("PriorityQueue: releasing {} slots", self.capacity);
        self.heap = Vec::new();
        self.capacity = 0;
        self.state = InsertState::Ready;
    }

    /// Admits `(value, priority)` in a single step.
    pub fn insert_full(&mut self, value: i32, priority: i32) -> Result<i32, QueueError> {
        if priority < 0 {
            return Err(QueueError::InvalidPriority(priority));
        }
        if let InsertState::AwaitingPriority { .. } = self.state {
            return Err(QueueError::InsertionPending);
        }
        self.admit(value, priority)
    }

    /// Feeds one half of a value/priority pair.
    ///
    /// In `Ready` the number is stored as the pending value. In
    /// `AwaitingPriority` it is taken as the priority and the pair is admitted.
    /// A rejected priority keeps the pending value so the client can retry
    /// with a valid one.
    ///
    /// A full queue refuses the value half with `CapacityExceeded` instead of
    /// storing it. A stored value blocks extraction until its priority
    /// arrives, and on a full queue that priority could never be admitted, so
    /// the queue would be stuck.
    pub fn insert_half(&mut self, num: i32) -> Result<HalfInsert, QueueError> {
        match self.state {
            InsertState::Ready => {
                if self.is_full() {
                    return Err(QueueError::CapacityExceeded);
                }
                self.state = InsertState::AwaitingPriority { value: num };
                Ok(HalfInsert::ValueAccepted)
            }
            InsertState::AwaitingPriority { value } => {
                if num < 0 {
                    return Err(QueueError::InvalidPriority(num));
                }
                let epoch = self.admit(value, num)?;
                self.state = InsertState::Ready;
                Ok(HalfInsert::Admitted { epoch })
            }
        }
    }

    /// Value half that must start a new pair.
    pub fn insert_value(&mut self, value: i32) -> Result<(), QueueError> {
        if let InsertState::AwaitingPriority { .. } = self.state {
            return Err(QueueError::InsertionPending);
        }
        self.insert_half(value).map(|_| ())
    }

    /// Priority half that must complete a pending pair.
    pub fn insert_priority(&mut self, priority: i32) -> Result<i32, QueueError> {
        if self.state == InsertState::Ready {
            return Err(QueueError::NoPendingValue);
        }
        match self.insert_half(priority)? {
            HalfInsert::Admitted { epoch } => Ok(epoch),
            HalfInsert::ValueAccepted => Err(QueueError::NoPendingValue),
        }
    }

    /// Removes the root and returns its value.
    pub fn extract_top(&mut self) -> Result<i32, QueueError> {
        if let InsertState::AwaitingPriority { .. } = self.state {
            return Err(QueueError::InsertionPending);
        }
        if self.heap.is_empty() {
            return Err(QueueError::Empty);
        }

        // swap_remove moves the last slot into the root.
        let top = self.heap.swap_remove(0);
        self.sift_down(0);

        tracing::trace!(
            "PriorityQueue: extracted value={} priority={} epoch={}",
            top.value,
            top.priority,
            top.epoch
        );
        Ok(top.value)
    }

    pub fn peek_top(&self) -> Option<&Entry> {
        self.heap.first()
    }

    /// Current number of admitted entries.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The epoch the next admitted entry will receive.
    pub fn next_epoch(&self) -> i32 {
        self.timer
    }

    pub fn insert_state(&self) -> InsertState {
        self.state
    }

    pub fn pending(&self) -> Option<i32> {
        match self.state {
            InsertState::Ready => None,
            InsertState::AwaitingPriority { value } => Some(value),
        }
    }

    /// Heap slots in storage order.
    pub fn entries(&self) -> &[Entry] {
        &self.heap
    }

    fn admit(&mut self, value: i32, priority: i32) -> Result<i32, QueueError> {
        if self.is_full() {
            return Err(QueueError::CapacityExceeded);
        }

        if self.timer == i32::MAX {
            self.rebase_epochs();
        }
        let epoch = self.timer;
        self.heap.push(Entry::new(value, priority, epoch));
        self.sift_up(self.heap.len() - 1);
        self.timer += 1;

        tracing::trace!(
            "PriorityQueue: admitted value={} priority={} epoch={} ({}/{})",
            value,
            priority,
            epoch,
            self.heap.len(),
            self.capacity
        );
        Ok(epoch)
    }

    /// Renumbers live epochs to `0..len()` keeping their relative order.
    fn rebase_epochs(&mut self) {
        self.heap.sort_unstable_by_key(|e| e.epoch);
        for (rank, entry) in self.heap.iter_mut().enumerate() {
            entry.epoch = rank as i32;
        }
        // A sorted slice is a valid heap.
        self.heap.sort_unstable_by(Entry::order);
        self.timer = self.heap.len() as i32;
        tracing::debug!("PriorityQueue: epochs rebased, next epoch {}", self.timer);
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.heap[idx].precedes(&self.heap[parent]) {
                self.heap.swap(idx, parent);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.heap.len();
        loop {
            let left = idx * 2 + 1;
            let right = left + 1;
            let mut smallest = idx;

            if left < len && self.heap[left].precedes(&self.heap[smallest]) {
                smallest = left;
            }
            if right < len && self.heap[right].precedes(&self.heap[smallest]) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.heap.swap(idx, smallest);
            idx = smallest;
        }
    }
}

impl Drop for PriorityQueue {
    fn drop(&mut self) {
        self.destroy();
    }
}
