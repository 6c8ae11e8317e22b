//! The orchestration core.
//!
//! - **Orchestrator**: admission, dispatch, heartbeat, outcome handling, cancel and recovery.
//! - **OrchestratorBuilder**: assembles an orchestrator from config and collaborators.
//! - **Sweeper**: periodic promotion of delayed jobs and reclaim of expired leases.
//! - **LeaseLedger**: which worker holds each dispatched job.
//! - **RetiredJobs**: final status of recently finished jobs.

mod builder;
mod engine;
mod lease;
mod retired;
mod sweeper;

pub use builder::OrchestratorBuilder;
pub use engine::{Orchestrator, RecoveryReport};
pub use lease::{Lease, LeaseLedger};
pub use retired::RetiredJobs;
pub use sweeper::{SweepReport, Sweeper, sweep};
