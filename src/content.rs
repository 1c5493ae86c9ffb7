//! Plumbing shared by the per-type content renderers ([`crate::article`],
//! [`crate::passage`], [`crate::talk`], [`crate::page`], [`crate::photo`]).
//!
//! Every renderer follows the same contract: it always parses and validates
//! its source (the item is needed for aggregation whether or not its page is
//! rebuilt), then returns early with `executed = false` if none of its inputs
//! changed and the context isn't forced. Otherwise it does the expensive
//! work and writes its output.

use crate::config::Config;
use crate::context::Context;
use crate::frontmatter;
use crate::templates;
use crate::tracker;
use crate::util::path_as_image;
use serde::de::DeserializeOwned;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The date format used in publishing info and indices.
pub const DISPLAY_DATE: &str = "%B %-d, %Y";

/// The directories under `content/` that hold items of one type, e.g.
/// `fragments` and `fragments-drafts`. Drafts directories are only listed
/// when drafts are enabled.
pub fn source_dirs(config: &Config, published: &str, drafts: &str) -> Vec<PathBuf> {
    let content = config.source_directory.join("content");
    let mut dirs = vec![content.join(published)];
    if config.drafts {
        dirs.push(content.join(drafts));
    }
    dirs
}

/// Reads `source` and splits it into typed frontmatter and a Markdown body.
pub fn read_frontmatter<T: DeserializeOwned>(source: &Path) -> Result<(T, String)> {
    let contents = fs::read_to_string(source).map_err(|err| Error::Io {
        path: source.to_owned(),
        op: "reading",
        err,
    })?;
    let (meta, body) = frontmatter::split::<T>(&contents).map_err(|err| Error::Frontmatter {
        path: source.to_owned(),
        err,
    })?;
    Ok((meta, body.to_owned()))
}

/// Reads a YAML manifest (`_meta.yaml`) into `T`. A manifest that doesn't
/// exist reads as `T::default()`.
pub fn read_manifest<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(err) => {
            return Err(Error::Io {
                path: path.to_owned(),
                op: "reading",
                err,
            })
        }
    };
    serde_yaml::from_str(&contents).map_err(|err| Error::Yaml {
        path: path.to_owned(),
        err,
    })
}

/// Unwraps a required field, treating an empty string the same as a missing
/// one.
pub fn required<T: Present>(source: &Path, field: &'static str, value: Option<T>) -> Result<T> {
    match value {
        Some(value) if value.is_present() => Ok(value),
        _ => Err(Error::Missing {
            path: source.to_owned(),
            field,
        }),
    }
}

/// Whether a deserialized value counts as filled in.
pub trait Present {
    fn is_present(&self) -> bool;
}

impl Present for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl<Tz: chrono::TimeZone> Present for chrono::DateTime<Tz> {
    fn is_present(&self) -> bool {
        true
    }
}

/// Looks for an optional image attachment `content/images/{dir}/{name}.jpg`
/// (or `.png`) and returns the root-relative URL it's served from.
pub fn attachment_url(ctx: &Context, dir: &str, name: &str) -> Option<String> {
    let extensionless = ctx.source("content/images").join(dir).join(name);
    path_as_image(&extensionless).map(|ext| format!("/images/{}/{}.{}", dir, name, ext))
}

/// The result of a fallible content render.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem parsing, validating or rendering a content item.
#[derive(Debug)]
pub enum Error {
    /// Returned when a source can't be read or an output can't be written.
    Io {
        path: PathBuf,
        op: &'static str,
        err: std::io::Error,
    },

    /// Returned when a source's frontmatter is malformed.
    Frontmatter {
        path: PathBuf,
        err: frontmatter::Error,
    },

    /// Returned when a YAML manifest is malformed.
    Yaml {
        path: PathBuf,
        err: serde_yaml::Error,
    },

    /// Returned when a required field is missing or empty.
    Missing { path: PathBuf, field: &'static str },

    /// Returned when a field is present but unusable.
    Invalid { path: PathBuf, reason: String },

    /// Returned when checking an input for changes fails.
    Tracker(tracker::Error),

    /// Returned when rendering the item's page fails.
    Template(templates::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, op, err } => write!(f, "{} '{}': {}", op, path.display(), err),
            Error::Frontmatter { path, err } => {
                write!(f, "frontmatter of '{}': {}", path.display(), err)
            }
            Error::Yaml { path, err } => write!(f, "parsing '{}': {}", path.display(), err),
            Error::Missing { path, field } => {
                write!(f, "no {} for '{}'", field, path.display())
            }
            Error::Invalid { path, reason } => write!(f, "'{}': {}", path.display(), reason),
            Error::Tracker(err) => err.fmt(f),
            Error::Template(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { err, .. } => Some(err),
            Error::Frontmatter { err, .. } => Some(err),
            Error::Yaml { err, .. } => Some(err),
            Error::Missing { .. } => None,
            Error::Invalid { .. } => None,
            Error::Tracker(err) => Some(err),
            Error::Template(err) => Some(err),
        }
    }
}

impl From<tracker::Error> for Error {
    /// Converts a [`tracker::Error`] into an [`Error`]. This allows us to use
    /// the `?` operator on change checks.
    fn from(err: tracker::Error) -> Error {
        Error::Tracker(err)
    }
}

impl From<templates::Error> for Error {
    /// Converts a [`templates::Error`] into an [`Error`]. This allows us to
    /// use the `?` operator on template renders.
    fn from(err: templates::Error) -> Error {
        Error::Template(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use url::Url;

    #[test]
    fn test_required_rejects_blank() {
        let path = Path::new("content/articles/a.md");
        assert!(required(path, "title", Some("Hi".to_owned())).is_ok());
        let err = required(path, "title", Some("  ".to_owned())).unwrap_err();
        assert_eq!("no title for 'content/articles/a.md'", err.to_string());
        assert!(required::<String>(path, "location", None).is_err());
    }

    #[test]
    fn test_source_dirs_include_drafts_only_when_enabled() -> std::result::Result<(), url::ParseError> {
        let mut config = Config::new(
            Path::new("/site"),
            Path::new("/site/public"),
            Url::parse("https://example.org")?,
        );
        assert_eq!(
            vec![PathBuf::from("/site/content/articles")],
            source_dirs(&config, "articles", "drafts")
        );
        config.drafts = true;
        assert_eq!(
            vec![
                PathBuf::from("/site/content/articles"),
                PathBuf::from("/site/content/drafts")
            ],
            source_dirs(&config, "articles", "drafts")
        );
        Ok(())
    }

    #[test]
    fn test_missing_manifest_is_default() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|err| Error::Io {
            path: PathBuf::new(),
            op: "creating temp dir",
            err,
        })?;
        let meta: std::collections::HashMap<String, String> =
            read_manifest(&dir.path().join("_meta.yaml"))?;
        assert!(meta.is_empty());
        Ok(())
    }
}
