//! The reload pipeline: scheduler bridge, coordinator and worker pool.
//!
//! Change notifications arrive on a watcher thread and cross into tokio
//! through the [`SchedulerBridge`]. The [`ReloadCoordinator`] debounces and
//! deduplicates them per unit, then runs the blocking loader on the
//! [`WorkerPool`].

mod bridge;
mod coordinator;
mod pool;

pub use bridge::{BridgeRunner, BridgeTask, SchedulerBridge};
pub use coordinator::{ReloadCoordinator, ReloadOutcome, ScheduleOutcome, UnitStatus};
pub use pool::WorkerPool;
