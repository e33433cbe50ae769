//! Table subsystem
//!
//! A `Table` is one named collection backed by `<dir>/<name>.log` and
//! `<dir>/<name>.meta.json`. It owns the record buffers, the LRU cache and
//! the secondary indices, and decides when to append and when to compact.
//!
//! Tables are single-threaded: every operation takes `&mut self`. Debounced
//! saves are driven by the host through `Table::tick()`.

mod clock;
mod events;
mod scheduler;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::TableEvent;
pub use scheduler::SaveScheduler;
pub use store::{Table, TableState};
