use core::cmp::Ordering;

/// A single queue element.
///
/// `priority` is non-negative and a lower value is extracted first.
/// `epoch` is the insertion sequence number assigned by the owning queue
/// and breaks ties between equal priorities in FIFO order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Entry {
    pub value: i32,
    pub priority: i32,
    pub epoch: i32,
}

static_assertions::assert_eq_size!(Entry, [u8; 12]);

impl Entry {
    pub const fn new(value: i32, priority: i32, epoch: i32) -> Self {
        Self { value, priority, epoch }
    }

    /// Lexicographic `(priority, epoch)` order. `Less` means `self` leaves the queue first.
    #[inline(always)]
    pub fn order(&self, other: &Entry) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.epoch.cmp(&other.epoch))
    }

    #[inline(always)]
    pub fn precedes(&self, other: &Entry) -> bool {
        self.order(other) == Ordering::Less
    }
}
