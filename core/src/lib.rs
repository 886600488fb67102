//! Zone residency tracking and side-effect lifecycle for a shared world.
//!
//! - [`detection`]: hysteresis + cooldown state machine per actor
//! - [`lifecycle`]: ordered, fault-isolated enter/exit actions
//! - [`registry`]: capacity-bounded ledger of spawned entities
//! - [`border`]: debounced, readiness-gated border rebuilds
//! - [`driver`]: ties them together once per tick

pub mod border;
pub mod config;
pub mod deferred;
pub mod detection;
pub mod driver;
pub mod events;
pub mod ids;
pub mod isolation;
pub mod lifecycle;
pub mod registry;
pub mod spatial;

#[cfg(test)]
mod driver_tests;
#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use border::{BorderRebuildScheduler, Readiness, RebuildFns, RebuildStatus, RebuildTarget};
pub use config::{ConfigError, ConfigStore, default_config_path, load_config, save_config};
pub use deferred::{Attempt, DeferredQueue};
pub use detection::{TransitionDetector, TransitionOutcome};
pub use driver::{ActorSample, TickReport, ZoneTickDriver};
pub use events::{ExitCause, SignalHandler, ZoneSignal};
pub use ids::{ActorId, EntityHandle};
pub use lifecycle::{
    ActionContext, ActionError, ActionHandler, Direction, LifecycleAction, LifecyclePipeline,
};
pub use registry::{EntityRegistry, RegistryError, RegistryLimits};
pub use spatial::{Position, ReturnPositionStore, ZoneResolver};
pub use zonekeeper_types::ZoneKeeperConfig;
