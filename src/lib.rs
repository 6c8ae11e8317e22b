//! Submitr - orchestration engine for directory listing submissions
//!
//! Submitr admits submission requests, enriches each one through advisory
//! providers guarded by circuit breakers, and hands jobs to external automation
//! workers by priority. Failed submissions are classified and retried with
//! backoff until they succeed or run out of attempts.

pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod resilience;
pub mod runner;
pub mod scheduler;
pub mod storage;

pub use error::{Result, SubmitrError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
