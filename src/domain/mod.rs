//! Domain types for submitr
//!
//! This module contains all core domain types:
//! - SubmissionJob: the unit of work handed to automation workers
//! - Advice payloads: what each capability provider returns
//! - Outcome: worker reports and how the engine disposed of them

pub mod advice;
pub mod job;
pub mod outcome;

pub use advice::{
    Capability, ContentRequirements, CustomizedContent, ExperimentAssignments, FailureCategory, FailureClassification,
    FailureContext, ModelType, Prediction, SuccessScore, TimeWindow, TimingAdvice,
};
pub use job::{InvalidTransition, JobStatus, SubmissionJob, SubmissionRequest, SubmissionTarget, normalize_domain};
pub use outcome::{CancelResult, Disposition, HeartbeatAck, Outcome};
