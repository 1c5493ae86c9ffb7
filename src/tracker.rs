//! Defines the [`ChangeTracker`], which remembers a [`Fingerprint`] for every
//! file a successful job has read, and answers whether a file has changed
//! since. Records are keyed by canonical absolute path and survive between
//! process runs via [`ChangeTracker::load`] and [`ChangeTracker::save`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// The content-derived identity of a file. Two fingerprints are equal iff the
/// file has the same length and the same SHA-256 digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub len: u64,
    pub digest: String,
}

impl Fingerprint {
    /// Reads `path` and computes its fingerprint.
    pub fn of(path: &Path) -> Result<Fingerprint> {
        let bytes = fs::read(path).map_err(|err| Error::Io {
            path: path.to_owned(),
            op: "fingerprinting",
            err,
        })?;
        Ok(Fingerprint::of_bytes(&bytes))
    }

    pub fn of_bytes(bytes: &[u8]) -> Fingerprint {
        Fingerprint {
            len: bytes.len() as u64,
            digest: format!("{:x}", Sha256::digest(bytes)),
        }
    }
}

/// Maps resource keys to the fingerprint recorded after the last successful
/// job that read them. Safe to share between workers: reads take a shared
/// lock and [`ChangeTracker::record`] takes an exclusive one.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    records: RwLock<HashMap<PathBuf, Fingerprint>>,
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    records: BTreeMap<String, Fingerprint>,
}

impl ChangeTracker {
    pub fn new() -> ChangeTracker {
        ChangeTracker::default()
    }

    /// Loads a tracker previously written by [`ChangeTracker::save`]. A
    /// missing file yields an empty tracker, so the first build of a site
    /// treats every resource as changed.
    pub fn load(path: &Path) -> Result<ChangeTracker> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(ChangeTracker::new())
            }
            Err(err) => {
                return Err(Error::Io {
                    path: path.to_owned(),
                    op: "loading change records",
                    err,
                })
            }
        };
        let snapshot: Snapshot = serde_yaml::from_str(&contents)?;
        Ok(ChangeTracker {
            records: RwLock::new(
                snapshot
                    .records
                    .into_iter()
                    .map(|(key, fingerprint)| (PathBuf::from(key), fingerprint))
                    .collect(),
            ),
        })
    }

    /// Writes every record to `path` as YAML, sorted by key.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            records: self
                .read()
                .iter()
                .map(|(key, fingerprint)| {
                    (key.to_string_lossy().into_owned(), fingerprint.clone())
                })
                .collect(),
        };
        let contents = serde_yaml::to_string(&snapshot)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::Io {
                path: parent.to_owned(),
                op: "creating directory for change records",
                err,
            })?;
        }
        fs::write(path, contents).map_err(|err| Error::Io {
            path: path.to_owned(),
            op: "saving change records",
            err,
        })
    }

    /// Normalizes `path` to its record key and computes its current
    /// fingerprint without touching the stored records.
    pub fn observe(&self, path: &Path) -> Result<(PathBuf, Fingerprint)> {
        let key = fs::canonicalize(path).map_err(|err| Error::Io {
            path: path.to_owned(),
            op: "resolving",
            err,
        })?;
        let fingerprint = Fingerprint::of(&key)?;
        Ok((key, fingerprint))
    }

    /// The record key for `path`: its canonical form if it exists, otherwise
    /// `path` as given. Used for resources that aren't plain files, like a
    /// directory's listing.
    pub fn key(&self, path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_owned())
    }

    /// Returns whether `fingerprint` differs from the record for `key`. An
    /// absent record counts as a difference.
    pub fn differs(&self, key: &Path, fingerprint: &Fingerprint) -> bool {
        self.read().get(key) != Some(fingerprint)
    }

    /// Returns true if the file at `path` differs from its last recorded
    /// fingerprint (or has never been recorded).
    pub fn changed(&self, path: &Path) -> Result<bool> {
        let (key, fingerprint) = self.observe(path)?;
        Ok(self.differs(&key, &fingerprint))
    }

    /// Returns true if any of `paths` changed. Stops at the first change.
    pub fn changed_any<P: AsRef<Path>>(&self, paths: &[P]) -> Result<bool> {
        for path in paths {
            if self.changed(path.as_ref())? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Commits the current fingerprint of `path`. Only call this after the job
    /// that read `path` succeeded.
    pub fn record_success(&self, path: &Path) -> Result<()> {
        let (key, fingerprint) = self.observe(path)?;
        self.record(key, fingerprint);
        Ok(())
    }

    /// Stores a fingerprint captured earlier by [`ChangeTracker::observe`].
    pub fn record(&self, key: PathBuf, fingerprint: Fingerprint) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, fingerprint);
    }

    /// Drops the record for `key`, so it reads as changed until the next job
    /// that observes it succeeds.
    pub fn forget(&self, key: &Path) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PathBuf, Fingerprint>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The result of a fallible change-tracking operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem reading a resource or the persisted records.
#[derive(Debug)]
pub enum Error {
    /// Returned when a resource or the records file can't be read or written.
    Io {
        path: PathBuf,
        op: &'static str,
        err: io::Error,
    },

    /// Returned when the persisted records aren't valid YAML.
    Yaml(serde_yaml::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, op, err } => {
                write!(f, "{} '{}': {}", op, path.display(), err)
            }
            Error::Yaml(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { err, .. } => Some(err),
            Error::Yaml(err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator when (de)serializing the records.
    fn from(err: serde_yaml::Error) -> Error {
        Error::Yaml(err)
    }
}
