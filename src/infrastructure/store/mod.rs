//! In-memory store implementations behind the store ports.

mod memory;

pub use memory::{MemoryEventLog, MemoryReadModelStore};
