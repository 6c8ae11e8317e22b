//! Simulation runner.
//!
//! Drives the orchestrator with an in-process worker pool so the whole
//! admit/dispatch/retry cycle can be exercised from the CLI:
//! - `Simulation` builds an orchestrator and runs the pool to completion
//! - `load_targets` / `synthetic_targets` supply the directories

mod simulation;
mod targets;

pub use simulation::{Simulation, SimulationReport};
pub use targets::{BusinessProfile, DirectoryEntry, load_targets, synthetic_targets};
