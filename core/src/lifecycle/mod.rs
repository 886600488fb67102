//! Zone enter/exit side effects.
//!
//! ```text
//! LifecycleConfig ──► resolve_actions(zone, direction) ──► [LifecycleAction]
//!                                                               │
//!                  ActionHandler registry ◄── dispatch each ────┘
//!                  (errors and panics isolated per step)
//! ```

pub mod action;
pub mod pipeline;
pub mod resolver;


pub use action::{
    DEFAULT_ENTER_ACTIONS, DEFAULT_EXIT_ACTIONS, Direction, LifecycleAction, default_actions,
    normalize_token,
};
pub use pipeline::{
    ActionContext, ActionError, ActionHandler, ExecutionReport, IntegrationHook,
    LifecyclePipeline, PipelineRun, StepOutcome, StepReport,
};
pub use resolver::{
    DependencyWarning, ResolutionSource, ResolvedActions, check_dependencies, resolve_actions,
};
