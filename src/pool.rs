//! A fixed-size pool of worker threads that drains a queue of [`Job`]s one
//! phase at a time. The driver submits a phase's jobs, then calls
//! [`Pool::wait`], which blocks until every submitted job has finished and
//! readies the pool for the next phase.

use crate::context::Context;
use crate::job::{BoxError, Job, JobError, Outcome};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Summarizes one phase (the jobs submitted between two calls to
/// [`Pool::wait`]).
#[derive(Debug, Default)]
pub struct PhaseReport {
    /// The 1-based number of the phase.
    pub phase: usize,

    /// How many jobs were submitted during the phase.
    pub jobs: usize,

    /// Names of the jobs that did their work rather than skipping.
    pub executed: Vec<String>,

    /// Every error returned by a job in the phase.
    pub errors: Vec<JobError>,

    pub elapsed: Duration,
}

impl PhaseReport {
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

struct Finished {
    name: String,
    outcome: Outcome,
}

pub struct Pool {
    jobs: Option<Sender<Job>>,
    finished: Receiver<Finished>,
    workers: Vec<JoinHandle<()>>,
    pending: usize,
    rejected: Vec<JobError>,
    started: Instant,
    reports: Vec<PhaseReport>,
}

impl Pool {
    /// Starts `concurrency` workers (at least one). Each job runs with a
    /// context derived from `ctx` via [`Context::for_job`]; the fingerprints it
    /// observed are accepted for commit only if it returns `Ok`.
    pub fn new(concurrency: usize, ctx: &Context) -> Pool {
        let (jobs_tx, jobs_rx) = unbounded::<Job>();
        let (finished_tx, finished_rx) = unbounded::<Finished>();

        let workers = (0..concurrency.max(1))
            .map(|_| {
                let jobs = jobs_rx.clone();
                let finished = finished_tx.clone();
                let ctx = ctx.clone();
                thread::spawn(move || {
                    for job in jobs {
                        if finished.send(execute(&ctx, job)).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        Pool {
            jobs: Some(jobs_tx),
            finished: finished_rx,
            workers,
            pending: 0,
            rejected: Vec::new(),
            started: Instant::now(),
            reports: Vec::new(),
        }
    }

    /// Enqueues a job for the current phase.
    pub fn submit(&mut self, job: Job) {
        if self.pending == 0 && self.rejected.is_empty() {
            self.started = Instant::now();
        }
        let name = job.name.clone();
        match self.jobs.as_ref().map(|jobs| jobs.send(job)) {
            Some(Ok(())) => self.pending += 1,
            _ => self.rejected.push(JobError {
                job: name,
                err: "worker pool is shut down".into(),
            }),
        }
    }

    /// Builds a [`Job`] from a closure and enqueues it.
    pub fn add_job<F, E>(&mut self, name: impl Into<String>, work: F)
    where
        F: FnOnce(&Context) -> Result<bool, E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.submit(Job::new(name, work))
    }

    /// Blocks until every job submitted since the last call has finished.
    /// Returns false if any of them failed. Failures never cancel sibling
    /// jobs: the whole phase always runs to completion.
    pub fn wait(&mut self) -> bool {
        let mut report = PhaseReport {
            phase: self.reports.len() + 1,
            jobs: self.pending + self.rejected.len(),
            errors: std::mem::take(&mut self.rejected),
            ..PhaseReport::default()
        };

        while self.pending > 0 {
            let finished = match self.finished.recv() {
                Ok(finished) => finished,
                // every worker is gone; nothing more will arrive
                Err(_) => break,
            };
            self.pending -= 1;
            match finished.outcome {
                Ok(true) => report.executed.push(finished.name),
                Ok(false) => debug!("Skipped job (unchanged): {}", finished.name),
                Err(err) => {
                    let err = JobError {
                        job: finished.name,
                        err,
                    };
                    error!("{}", err);
                    report.errors.push(err);
                }
            }
        }
        if self.pending > 0 {
            report.errors.push(JobError {
                job: format!("phase {}", report.phase),
                err: format!("{} job(s) lost by exited workers", self.pending).into(),
            });
            self.pending = 0;
        }

        report.elapsed = self.started.elapsed();
        info!(
            "Phase {}: {} job(s), {} executed, {} error(s) in {:?}",
            report.phase,
            report.jobs,
            report.executed.len(),
            report.errors.len(),
            report.elapsed,
        );

        let succeeded = report.succeeded();
        self.reports.push(report);
        self.started = Instant::now();
        succeeded
    }

    /// The reports of every phase completed so far.
    pub fn reports(&self) -> &[PhaseReport] {
        &self.reports
    }

    /// Stops the workers and returns the phase reports.
    pub fn finish(mut self) -> Vec<PhaseReport> {
        std::mem::take(&mut self.reports)
    }
}

impl Drop for Pool {
    /// Closes the queue and joins the workers, letting any queued jobs finish.
    fn drop(&mut self) {
        drop(self.jobs.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn execute(ctx: &Context, job: Job) -> Finished {
    let name = job.name.clone();
    let ctx = ctx.for_job();
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job.run(&ctx))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(format!("panicked: {}", panic_message(&*payload)).into()),
    };
    if outcome.is_ok() {
        ctx.accept();
    } else {
        ctx.discard();
    }
    Finished { name, outcome }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tracker::ChangeTracker;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn context(dir: &Path) -> Context {
        Context::new(
            dir.to_owned(),
            dir.join("public"),
            Arc::new(ChangeTracker::new()),
            1,
        )
    }

    #[test]
    fn test_wait_drains_every_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = Pool::new(4, &context(dir.path()));
        let counter = Arc::new(AtomicUsize::new(0));
        for i in 0..50 {
            let counter = counter.clone();
            pool.add_job(format!("job {}", i), move |_| -> Result<bool, BoxError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(i % 2 == 0)
            });
        }
        assert!(pool.wait());
        assert_eq!(50, counter.load(Ordering::SeqCst));
        assert_eq!(50, pool.reports()[0].jobs);
        assert_eq!(25, pool.reports()[0].executed.len());
    }

    #[test]
    fn test_error_does_not_cancel_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = Pool::new(2, &context(dir.path()));
        let counter = Arc::new(AtomicUsize::new(0));
        pool.add_job("broken", |_| -> Result<bool, BoxError> {
            Err("no title".into())
        });
        for i in 0..10 {
            let counter = counter.clone();
            pool.add_job(format!("job {}", i), move |_| -> Result<bool, BoxError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            });
        }
        assert!(!pool.wait());
        assert_eq!(10, counter.load(Ordering::SeqCst));
        let report = &pool.reports()[0];
        assert_eq!(1, report.errors.len());
        assert_eq!("broken", report.errors[0].job);
    }

    #[test]
    fn test_panic_becomes_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = Pool::new(1, &context(dir.path()));
        pool.add_job("panics", |_| -> Result<bool, BoxError> { panic!("boom") });
        pool.add_job("fine", |_| -> Result<bool, BoxError> { Ok(true) });
        assert!(!pool.wait());
        let report = &pool.reports()[0];
        assert_eq!(vec!["fine".to_owned()], report.executed);
        assert!(report.errors[0].to_string().contains("boom"));
    }

    #[test]
    fn test_pool_is_reusable_across_phases() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = Pool::new(3, &context(dir.path()));
        pool.add_job("one", |_| -> Result<bool, BoxError> { Err("bad".into()) });
        assert!(!pool.wait());
        pool.add_job("two", |_| -> Result<bool, BoxError> { Ok(true) });
        assert!(pool.wait());

        let reports = pool.finish();
        assert_eq!(2, reports.len());
        assert_eq!(2, reports[1].phase);
        assert!(reports[1].succeeded());
    }

    #[test]
    fn test_only_successful_jobs_commit() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.md");
        let bad = dir.path().join("bad.md");
        fs::write(&good, "good").unwrap();
        fs::write(&bad, "bad").unwrap();

        let ctx = context(dir.path());
        let mut pool = Pool::new(2, &ctx);
        let path = good.clone();
        pool.add_job("good", move |ctx| ctx.changed(&path));
        let path = bad.clone();
        pool.add_job("bad", move |ctx| -> Result<bool, BoxError> {
            ctx.changed(&path)?;
            Err("render failed".into())
        });
        assert!(!pool.wait());
        ctx.commit();

        assert!(!ctx.tracker().changed(&good).unwrap());
        assert!(ctx.tracker().changed(&bad).unwrap());
    }
}
