//! Database models.

pub mod job;

pub use job::{JobCounts, JobDbModel, JobKey, JobStatus};
