//! Photographs and sequences: YAML manifests of photos whose originals are
//! fetched over HTTP and resized into several widths by an external command.
//!
//! Fetching and resizing is expensive and its outputs may not be kept
//! locally, so completion is recorded with an empty marker file
//! (`{slug}.marker`) next to where the resized images go. A photo with a
//! marker is never fetched again.

use crate::content::{self, read_manifest, required};
use crate::frontmatter::deserialize_timestamp;
use chrono::{DateTime, Utc};
use log::debug;
use rand::seq::IndexedRandom;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How many of the most recent photos are always in the home page rotation.
pub const RECENT_IN_ROTATION: usize = 20;

/// Suffix and width of every resized copy of a photo.
pub const RESIZE_TARGETS: [(&str, u32); 4] = [
    ("", 333),
    ("@2x", 667),
    ("_large", 1500),
    ("_large@2x", 3000),
];

#[derive(Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    photographs: Vec<PhotoMeta>,
}

#[derive(Deserialize)]
struct PhotoMeta {
    #[serde(default)]
    description: String,

    #[serde(default)]
    keep_in_home_rotation: bool,

    #[serde(default, deserialize_with = "deserialize_timestamp")]
    occurred_at: Option<DateTime<Utc>>,

    #[serde(default)]
    original_image_url: Option<String>,

    #[serde(default)]
    slug: Option<String>,

    #[serde(default)]
    title: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Photo {
    /// Markdown.
    pub description: String,

    /// Keeps an older photo in the home page's random rotation.
    pub keep_in_home_rotation: bool,
    pub occurred_at: DateTime<Utc>,

    /// Where the full-size original is downloaded from.
    pub original_image_url: String,
    pub slug: String,
    pub title: String,
}

/// Reads a photo manifest (a `photographs:` list) and validates every entry.
/// A missing manifest holds no photos.
pub fn read_photos(path: &Path) -> content::Result<Vec<Photo>> {
    let manifest: Manifest = read_manifest(path)?;
    manifest
        .photographs
        .into_iter()
        .map(|meta| {
            Ok(Photo {
                slug: required(path, "photo slug", meta.slug)?,
                title: required(path, "photo title", meta.title)?,
                occurred_at: required(path, "photo occurred_at", meta.occurred_at)?,
                original_image_url: required(
                    path,
                    "photo original_image_url",
                    meta.original_image_url,
                )?,
                description: meta.description,
                keep_in_home_rotation: meta.keep_in_home_rotation,
            })
        })
        .collect()
}

/// A named series of photos from `content/sequences/{slug}/_meta.yaml`.
#[derive(Clone, Debug)]
pub struct Sequence {
    pub slug: String,
    pub photos: Vec<Photo>,

    /// Whether the manifest changed since it was last built.
    pub changed: bool,
}

/// Picks a photo for the home page: any of the [`RECENT_IN_ROTATION`] most
/// recent, or an older one marked `keep_in_home_rotation`. `photos` must be
/// sorted newest first.
pub fn select_random_photo(photos: &[Photo]) -> Option<&Photo> {
    let recent = photos.len().min(RECENT_IN_ROTATION);
    let mut candidates: Vec<&Photo> = photos[..recent].iter().collect();
    candidates.extend(
        photos[recent..]
            .iter()
            .filter(|photo| photo.keep_in_home_rotation),
    );
    candidates.choose(&mut rand::rng()).copied()
}

/// Downloads a URL to a local file.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, target: &Path) -> Result<()>;
}

/// Writes a copy of an image scaled to a width.
pub trait Resizer: Send + Sync {
    fn resize(&self, source: &Path, target: &Path, width: u32) -> Result<()>;
}

/// Fetches over HTTP with a blocking [`reqwest`] client.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> HttpFetcher {
        HttpFetcher {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        HttpFetcher::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, target: &Path) -> Result<()> {
        debug!("Fetching file: {}", url);
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| Error::Fetch {
                url: url.to_owned(),
                err,
            })?;
        if !response.status().is_success() {
            return Err(Error::Status {
                url: url.to_owned(),
                status: response.status().as_u16(),
            });
        }
        let mut file = File::create(target).map_err(|err| Error::io(target, "creating", err))?;
        response.copy_to(&mut file).map_err(|err| Error::Fetch {
            url: url.to_owned(),
            err,
        })?;
        Ok(())
    }
}

/// Resizes with GraphicsMagick:
/// `gm convert {source} -auto-orient -resize {width}x -quality 85 {target}`.
/// A conversion still running after `timeout` is killed.
pub struct GraphicsMagick {
    pub timeout: Duration,
}

impl Resizer for GraphicsMagick {
    fn resize(&self, source: &Path, target: &Path, width: u32) -> Result<()> {
        let mut command = Command::new("gm");
        command
            .arg("convert")
            .arg(source)
            .arg("-auto-orient")
            .arg("-resize")
            .arg(format!("{}x", width))
            .arg("-quality")
            .arg("85")
            .arg(target);
        run_with_timeout(&mut command, source, self.timeout)
    }
}

/// Runs `command` for the photo at `source`, killing it after `timeout`.
/// Stderr is read on its own thread so a chatty command can't fill the pipe
/// and stall until it times out.
fn run_with_timeout(command: &mut Command, source: &Path, timeout: Duration) -> Result<()> {
    let mut child = command
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| Error::io(source, "spawning resize for", err))?;

    let pipe = child.stderr.take();
    let stderr = thread::spawn(move || {
        let mut output = String::new();
        if let Some(mut pipe) = pipe {
            let _ = io::Read::read_to_string(&mut pipe, &mut output);
        }
        output
    });

    let started = Instant::now();
    let status = loop {
        match child
            .try_wait()
            .map_err(|err| Error::io(source, "waiting on resize for", err))?
        {
            Some(status) => break status,
            None if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stderr.join();
                return Err(Error::Timeout {
                    path: source.to_owned(),
                    timeout,
                });
            }
            None => thread::sleep(Duration::from_millis(50)),
        }
    };

    let stderr = stderr.join().unwrap_or_default();
    if !status.success() {
        return Err(Error::Resize {
            path: source.to_owned(),
            status: status.to_string(),
            stderr,
        });
    }
    Ok(())
}

/// The marker recording that `slug` was already fetched and resized into
/// `dir`.
pub fn marker_path(dir: &Path, slug: &str) -> PathBuf {
    dir.join(format!("{}.marker", slug))
}

/// Fetches `photo`'s original into `temp_dir` and writes every
/// [`RESIZE_TARGETS`] size into `dir`, then drops a marker. Returns
/// `Ok(false)` without touching the network if the marker already exists.
pub fn fetch_and_resize(
    fetcher: &dyn Fetcher,
    resizer: &dyn Resizer,
    temp_dir: &Path,
    dir: &Path,
    photo: &Photo,
) -> Result<bool> {
    let marker = marker_path(dir, &photo.slug);
    if marker.exists() {
        debug!(
            "Skipping photo fetch + resize because marker exists: {}",
            marker.display()
        );
        return Ok(false);
    }

    fs::create_dir_all(temp_dir).map_err(|err| Error::io(temp_dir, "creating", err))?;
    fs::create_dir_all(dir).map_err(|err| Error::io(dir, "creating", err))?;

    let original = original_path(temp_dir, dir, &photo.slug);
    fetcher.fetch(&photo.original_image_url, &original)?;

    for (suffix, width) in RESIZE_TARGETS.iter() {
        let target = dir.join(format!("{}{}.jpg", photo.slug, suffix));
        resizer.resize(&original, &target, *width)?;
    }

    File::create(&marker).map_err(|err| Error::io(&marker, "creating marker", err))?;
    Ok(true)
}

/// Where the original of `slug` is downloaded before being resized into
/// `dir`. A photo can be fetched into more than one directory in the same
/// phase, so the name includes a digest of `dir`.
pub fn original_path(temp_dir: &Path, dir: &Path, slug: &str) -> PathBuf {
    let digest = format!("{:x}", Sha256::digest(dir.to_string_lossy().as_bytes()));
    temp_dir.join(format!("{}_{}_original.jpg", slug, &digest[..12]))
}

/// The result of a fallible fetch or resize.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem fetching or resizing a photo.
#[derive(Debug)]
pub enum Error {
    /// Returned for local file and process errors.
    Io {
        path: PathBuf,
        op: &'static str,
        err: io::Error,
    },

    /// Returned when the HTTP request fails.
    Fetch { url: String, err: reqwest::Error },

    /// Returned when the server answers with a non-success status.
    Status { url: String, status: u16 },

    /// Returned when the resize command exits unsuccessfully.
    Resize {
        path: PathBuf,
        status: String,
        stderr: String,
    },

    /// Returned when the resize command outlives its timeout.
    Timeout { path: PathBuf, timeout: Duration },
}

impl Error {
    fn io(path: &Path, op: &'static str, err: io::Error) -> Error {
        Error::Io {
            path: path.to_owned(),
            op,
            err,
        }
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, op, err } => write!(f, "{} '{}': {}", op, path.display(), err),
            Error::Fetch { url, err } => write!(f, "fetching '{}': {}", url, err),
            Error::Status { url, status } => {
                write!(f, "unexpected status code fetching '{}': {}", url, status)
            }
            Error::Resize {
                path,
                status,
                stderr,
            } => write!(
                f,
                "resizing '{}': {} (stderr: {})",
                path.display(),
                status,
                stderr.trim()
            ),
            Error::Timeout { path, timeout } => {
                write!(f, "resizing '{}' timed out after {:?}", path.display(), timeout)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { err, .. } => Some(err),
            Error::Fetch { err, .. } => Some(err),
            Error::Status { .. } => None,
            Error::Resize { .. } => None,
            Error::Timeout { .. } => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Records every URL it's asked for and writes a placeholder file.
    #[derive(Default)]
    pub struct RecordingFetcher {
        pub urls: Mutex<Vec<String>>,
    }

    impl Fetcher for RecordingFetcher {
        fn fetch(&self, url: &str, target: &Path) -> Result<()> {
            self.urls.lock().unwrap().push(url.to_owned());
            fs::write(target, "original").map_err(|err| Error::io(target, "writing", err))
        }
    }

    /// Copies the source to the target and records the width.
    #[derive(Default)]
    pub struct CopyResizer {
        pub widths: Mutex<Vec<u32>>,
    }

    impl Resizer for CopyResizer {
        fn resize(&self, source: &Path, target: &Path, width: u32) -> Result<()> {
            self.widths.lock().unwrap().push(width);
            fs::copy(source, target)
                .map(|_| ())
                .map_err(|err| Error::io(target, "copying", err))
        }
    }

    fn photo(slug: &str, day: u32, keep: bool) -> Photo {
        Photo {
            description: String::new(),
            keep_in_home_rotation: keep,
            occurred_at: Utc.with_ymd_and_hms(2020, 1, day, 0, 0, 0).unwrap(),
            original_image_url: format!("https://photos.example.org/{}.jpg", slug),
            slug: slug.to_owned(),
            title: slug.to_owned(),
        }
    }

    #[test]
    fn test_fetch_and_resize_writes_marker() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let fetcher = RecordingFetcher::default();
        let resizer = CopyResizer::default();
        let out = dir.path().join("photographs");
        let photo = photo("harbor", 1, false);

        assert!(fetch_and_resize(&fetcher, &resizer, &dir.path().join("tmp"), &out, &photo)?);
        assert_eq!(vec![333, 667, 1500, 3000], *resizer.widths.lock().unwrap());
        for name in ["harbor.jpg", "harbor@2x.jpg", "harbor_large.jpg", "harbor_large@2x.jpg"] {
            assert!(out.join(name).is_file(), "missing {}", name);
        }
        assert!(marker_path(&out, "harbor").is_file());
        Ok(())
    }

    #[test]
    fn test_same_photo_into_two_directories() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let temp = dir.path().join("tmp");
        let photos = dir.path().join("photographs");
        let sequence = photos.join("sequences").join("coast");
        let harbor = photo("harbor", 1, false);

        let fetcher = RecordingFetcher::default();
        let resizer = CopyResizer::default();
        fetch_and_resize(&fetcher, &resizer, &temp, &photos, &harbor)?;
        fetch_and_resize(&fetcher, &resizer, &temp, &sequence, &harbor)?;

        let originals = (
            original_path(&temp, &photos, "harbor"),
            original_path(&temp, &sequence, "harbor"),
        );
        assert_ne!(originals.0, originals.1);
        assert!(originals.0.is_file());
        assert!(originals.1.is_file());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_chatty_failure_is_not_a_timeout() {
        // more stderr than a pipe buffer holds
        let mut command = Command::new("sh");
        command.arg("-c").arg("head -c 262144 /dev/zero >&2; exit 3");
        match run_with_timeout(&mut command, Path::new("harbor.jpg"), Duration::from_secs(30)) {
            Err(Error::Resize { stderr, .. }) => assert_eq!(262144, stderr.len()),
            other => panic!("wanted a resize error, got {:?}", other),
        }
    }

    #[test]
    fn test_marker_short_circuits() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("photographs");
        fs::create_dir_all(&out)?;
        File::create(marker_path(&out, "harbor"))?;

        let fetcher = RecordingFetcher::default();
        let resizer = CopyResizer::default();
        let executed = fetch_and_resize(
            &fetcher,
            &resizer,
            &dir.path().join("tmp"),
            &out,
            &photo("harbor", 1, false),
        )?;
        assert!(!executed);
        assert!(fetcher.urls.lock().unwrap().is_empty());
        assert!(!out.join("harbor.jpg").exists());
        Ok(())
    }

    #[test]
    fn test_select_random_photo_candidates() {
        assert!(select_random_photo(&[]).is_none());

        // 20 recent ones, then two old ones of which only one is kept
        let mut photos: Vec<Photo> = (0..20).map(|i| photo(&format!("recent{}", i), 28, false)).collect();
        photos.push(photo("old-kept", 2, true));
        photos.push(photo("old-dropped", 1, false));
        for _ in 0..200 {
            let chosen = select_random_photo(&photos).unwrap();
            assert_ne!("old-dropped", chosen.slug);
        }
    }

    #[test]
    fn test_read_photos_validates() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("_meta.yaml");
        fs::write(
            &path,
            "photographs:\n  - slug: harbor\n    title: Harbor\n    occurred_at: 2020-01-02T10:00:00Z\n    original_image_url: https://photos.example.org/harbor.jpg\n",
        )?;
        let photos = read_photos(&path)?;
        assert_eq!(1, photos.len());
        assert_eq!("harbor", photos[0].slug);

        fs::write(&path, "photographs:\n  - slug: harbor\n    title: Harbor\n")?;
        assert!(read_photos(&path).is_err());
        assert!(read_photos(&dir.path().join("missing.yaml"))?.is_empty());
        Ok(())
    }
}
