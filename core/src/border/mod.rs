//! Zone border maintenance: debounced rebuilds and visual rotation.

pub mod rotation;
pub mod scheduler;


pub use rotation::{RotationClock, variant_index, zone_seed};
pub use scheduler::{
    BorderRebuildScheduler, Readiness, RebuildContext, RebuildFns, RebuildStatus, RebuildTarget,
    RequestOutcome, SchedulerStats, TickOutcome,
};
