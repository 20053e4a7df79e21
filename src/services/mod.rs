//! Business logic services.
//!
//! Services orchestrate the storage backends and provide the operations the
//! review flow, statistics, and backup jobs call.

mod backup;
mod clock;
mod id_generator;
mod scheduler;
mod selection;

pub use backup::{BackupManager, FileSystem, OsFileSystem};
pub use clock::{Clock, FixedClock, SystemClock};
pub use id_generator::{IdGenerator, RANDOM_BITS, TIME_BITS, id_timestamp};
pub use scheduler::{DoublingPolicy, IntervalPolicy, Scheduler};
pub use selection::{
    EarliestDueFirst, RandomSelection, SelectionPolicy, SelectionStrategy, SmallestIntervalFirst,
};
