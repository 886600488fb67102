//! Zone residency detection
//!
//! Turns noisy per-tick zone samples into committed Enter/Exit transitions.
//!
//! ```text
//!   sample(actor, zone) ──► same as current? ──yes──► NoChange
//!                                 │ no
//!                                 ▼
//!                     pending for this pair? ──no──► start timer (PendingUnconfirmed)
//!                                 │ yes
//!                                 ▼
//!                  held for confirm window? ──no──► PendingUnconfirmed
//!                                 │ yes
//!                                 ▼
//!                   actor cooldown elapsed? ──no──► PendingUnconfirmed (retry next sample)
//!                                 │ yes
//!                                 ▼
//!                       Committed { exited, entered }
//! ```

pub mod detector;


pub use detector::{
    ActorZoneState, CommittedTransition, DetectionTimings, PendingTransition, StaleExit,
    TransitionDetector, TransitionOutcome,
};
