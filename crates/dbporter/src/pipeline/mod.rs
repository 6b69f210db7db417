//! Table jobs resolved from the migration plan.
//!
//! - [`TableJob`]: Command pattern encapsulating the extraction of one table
//! - [`JobResult`]: Typed outcome driving the continue-on-error policy

mod job;

pub use job::{JobResult, JobStatus, TableJob};
