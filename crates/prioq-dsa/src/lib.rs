#![no_std]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod entry;
pub mod error;
pub mod heap;

pub use entry::Entry;
pub use error::QueueError;
pub use heap::{HalfInsert, InsertState, PriorityQueue, MAX_CAPACITY};
