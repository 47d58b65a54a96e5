//! Building blocks shared by the L3 orchestration managers.
//!
//! - [`SyncMap`]: ordered map that never creates entries implicitly
//! - [`ObjectTable`]: liveness and reference-count ledger for hardware objects
//! - [`EventQueue`]: per-key coalescing queue for asynchronous events

mod event_queue;
mod object_table;
mod sync_map;

pub use event_queue::{Coalesce, EventQueue};
pub use object_table::{ObjectTable, ObjectTableError};
pub use sync_map::{HasRefCount, SyncMap, SyncMapError};
