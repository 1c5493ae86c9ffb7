//! Defines the [`Job`] unit of work and the [`JobError`] it may produce.

use crate::context::Context;
use std::fmt;

/// Any error a job may return. Boxed so the pool stays independent of the
/// renderers' error types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a job reports when it finishes: `Ok(true)` if it did its work,
/// `Ok(false)` if it decided its inputs were unchanged and skipped.
pub type Outcome = Result<bool, BoxError>;

type Work = Box<dyn FnOnce(&Context) -> Outcome + Send + 'static>;

/// A deferred, possibly skippable unit of build work. A job has no identity
/// beyond its `name`, which is only used for reporting.
pub struct Job {
    pub name: String,
    work: Work,
}

impl Job {
    pub fn new<F, E>(name: impl Into<String>, work: F) -> Job
    where
        F: FnOnce(&Context) -> Result<bool, E> + Send + 'static,
        E: Into<BoxError>,
    {
        Job {
            name: name.into(),
            work: Box::new(move |ctx| work(ctx).map_err(Into::into)),
        }
    }

    /// Runs the job, consuming it. Anything the job captured is dropped by the
    /// time this returns.
    pub fn run(self, ctx: &Context) -> Outcome {
        (self.work)(ctx)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish()
    }
}

/// An error returned (or a panic raised) by a named job.
#[derive(Debug)]
pub struct JobError {
    pub job: String,
    pub err: BoxError,
}

impl fmt::Display for JobError {
    /// Displays a [`JobError`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "job '{}': {}", self.job, self.err)
    }
}

impl std::error::Error for JobError {
    /// Implements the [`std::error::Error`] trait for [`JobError`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.err)
    }
}
