//! Defines the [`Context`] threaded through every job of a build run.

use crate::tracker::{ChangeTracker, Fingerprint, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A per-run snapshot of build state: where sources live, where output goes,
/// whether skip-if-unchanged checks are disabled, and the shared
/// [`ChangeTracker`].
///
/// Contexts are cheap to clone and are never mutated after construction;
/// deriving a forced context ([`Context::forced_context`]) produces a new
/// value and leaves the parent untouched.
#[derive(Clone, Debug)]
pub struct Context {
    /// The root of the site's sources (`content/`, `layouts/`, `pages/`,
    /// `views/` live beneath it).
    pub source_dir: PathBuf,

    /// The root of the rendered output.
    pub target_dir: PathBuf,

    /// The 1-based sequence number of this run within the process.
    pub run: usize,

    /// Whether this is the first run of the process.
    pub first_run: bool,

    forced: bool,
    tracker: Arc<ChangeTracker>,

    /// Fingerprints read through this context by the current job.
    observed: Observations,

    /// Fingerprints read by jobs that succeeded during this run. Shared by
    /// every context derived from the root, and written to the tracker by
    /// [`Context::commit`] once the run is over, so that every job of the
    /// run compares against the records as they stood when the run started.
    accepted: Observations,

    /// Keys read by jobs that failed during this run. Their records are
    /// dropped on commit, even if a successful job read the same key.
    forgotten: Arc<Mutex<Vec<PathBuf>>>,
}

type Observations = Arc<Mutex<Vec<(PathBuf, Fingerprint)>>>;

impl Context {
    pub fn new(
        source_dir: PathBuf,
        target_dir: PathBuf,
        tracker: Arc<ChangeTracker>,
        run: usize,
    ) -> Context {
        Context {
            source_dir,
            target_dir,
            run,
            first_run: run <= 1,
            forced: false,
            tracker,
            observed: Arc::default(),
            accepted: Arc::default(),
            forgotten: Arc::default(),
        }
    }

    /// Returns true if `path` differs from its last successfully recorded
    /// fingerprint. The observed fingerprint is remembered so it can be
    /// committed if the current job succeeds. The tracker itself is not
    /// modified.
    pub fn changed(&self, path: &Path) -> Result<bool> {
        let (key, fingerprint) = self.tracker.observe(path)?;
        let changed = self.tracker.differs(&key, &fingerprint);
        lock(&self.observed).push((key, fingerprint));
        Ok(changed)
    }

    /// Returns true if any of `paths` changed. Every path is observed (there
    /// is no early exit) so that a successful job commits all of its inputs.
    pub fn changed_any<P: AsRef<Path>>(&self, paths: &[P]) -> Result<bool> {
        let mut changed = false;
        for path in paths {
            changed |= self.changed(path.as_ref())?;
        }
        Ok(changed)
    }

    /// Returns true if the set of `members` listed under `key` differs from
    /// the set last recorded for it. `key` names a logical resource, such as
    /// a source directory, rather than a file; `members` must be in a stable
    /// order.
    pub fn changed_members(&self, key: &Path, members: &[String]) -> Result<bool> {
        let key = self.tracker.key(key);
        let fingerprint = Fingerprint::of_bytes(members.join("\n").as_bytes());
        let changed = self.tracker.differs(&key, &fingerprint);
        lock(&self.observed).push((key, fingerprint));
        Ok(changed)
    }

    /// Whether skip-if-unchanged checks should be bypassed.
    pub fn forced(&self) -> bool {
        self.forced
    }

    /// Returns a copy of this context with forcing turned on. Shares roots,
    /// tracker and observation buffer with `self`.
    pub fn forced_context(&self) -> Context {
        Context {
            forced: true,
            ..self.clone()
        }
    }

    /// Returns a copy of this context with a fresh observation buffer, for
    /// running one job.
    pub(crate) fn for_job(&self) -> Context {
        Context {
            observed: Arc::default(),
            ..self.clone()
        }
    }

    /// Accepts every fingerprint observed through this job's context (and
    /// contexts derived from it). Called by the pool when the job succeeds.
    pub(crate) fn accept(&self) {
        let observed = take(&self.observed);
        lock(&self.accepted).extend(observed);
    }

    /// Drops the observations of a failed job and marks every key it read to
    /// be forgotten on commit, so that the next run sees them as changed.
    pub(crate) fn discard(&self) {
        let keys = take(&self.observed).into_iter().map(|(key, _)| key);
        self.forgotten
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(keys);
    }

    /// Marks `path` to be forgotten on commit.
    pub fn forget(&self, path: &Path) {
        let key = self.tracker.key(path);
        self.forgotten
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key);
    }

    /// Writes the fingerprints accepted from successful jobs to the tracker,
    /// then drops the records of every forgotten key. The driver calls this
    /// once the run's last phase has finished, whether or not the run as a
    /// whole succeeded.
    pub fn commit(&self) {
        for (key, fingerprint) in take(&self.accepted) {
            self.tracker.record(key, fingerprint);
        }
        let forgotten = std::mem::take(
            &mut *self
                .forgotten
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for key in forgotten {
            self.tracker.forget(&key);
        }
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Joins `rel` onto the source root.
    pub fn source(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.source_dir.join(rel)
    }

    /// Joins `rel` onto the target root.
    pub fn target(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.target_dir.join(rel)
    }
}

fn lock(observations: &Observations) -> MutexGuard<'_, Vec<(PathBuf, Fingerprint)>> {
    observations.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take(observations: &Observations) -> Vec<(PathBuf, Fingerprint)> {
    std::mem::take(&mut *lock(observations))
}
