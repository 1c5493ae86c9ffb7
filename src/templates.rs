//! Renders views into layouts with [`gtmpl`] (Go `text/template` syntax).
//!
//! A render executes the view template against the page's locals, then
//! executes the layout against the same locals plus `Content`, the view's
//! output. Both templates are change-tracked inputs of the job doing the
//! rendering.

use crate::context::Context;
use crate::tracker;
use gtmpl::{Template, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The layout wrapping every page except passages.
pub const MAIN_LAYOUT: &str = "layouts/main.tmpl";

/// The narrower, newsletter-style layout used by passages.
pub const PASSAGE_LAYOUT: &str = "layouts/passages.tmpl";

/// The source path of the layout `name` (e.g. [`MAIN_LAYOUT`]).
pub fn layout(ctx: &Context, name: &str) -> PathBuf {
    ctx.source(name)
}

/// The source path of the view `name`, e.g. `views/articles/show.tmpl` for
/// `articles/show`.
pub fn view(ctx: &Context, name: &str) -> PathBuf {
    ctx.source(format!("views/{}.tmpl", name))
}

/// Renders `view` into `layout` and writes the result to `target`, creating
/// its parent directory as needed. Returns `Ok(false)` without writing
/// anything when neither template changed and `ctx` isn't forced; callers
/// whose own inputs changed pass a forced context.
pub fn render(
    ctx: &Context,
    layout: &Path,
    view: &Path,
    target: &Path,
    locals: Value,
) -> Result<bool> {
    let changed = ctx.changed_any(&[layout, view])?;
    if !changed && !ctx.forced() {
        return Ok(false);
    }

    let content = execute(view, &locals)?;
    let locals = with_content(locals, content);
    let page = execute(layout, &locals)?;

    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir).map_err(|err| Error::Io {
            path: dir.to_owned(),
            op: "creating directory",
            err,
        })?;
    }
    fs::write(target, page).map_err(|err| Error::Io {
        path: target.to_owned(),
        op: "writing",
        err,
    })?;
    Ok(true)
}

fn execute(path: &Path, locals: &Value) -> Result<String> {
    let source = fs::read_to_string(path).map_err(|err| Error::Io {
        path: path.to_owned(),
        op: "reading template",
        err,
    })?;

    let mut template = Template::default();
    template.parse(&source).map_err(|err| Error::Parse {
        path: path.to_owned(),
        err,
    })?;

    let context = gtmpl::Context::from(locals.clone()).map_err(|err| Error::Execute {
        path: path.to_owned(),
        err,
    })?;
    let mut out: Vec<u8> = Vec::new();
    template
        .execute(&mut out, &context)
        .map_err(|err| Error::Execute {
            path: path.to_owned(),
            err,
        })?;
    String::from_utf8(out).map_err(|err| Error::Execute {
        path: path.to_owned(),
        err: err.to_string(),
    })
}

fn with_content(locals: Value, content: String) -> Value {
    match locals {
        Value::Object(mut fields) => {
            fields.insert("Content".to_owned(), Value::String(content));
            Value::Object(fields)
        }
        other => other,
    }
}

/// The result of a fallible template render.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem rendering a template.
#[derive(Debug)]
pub enum Error {
    /// Returned when checking a template for changes fails.
    Tracker(tracker::Error),

    /// Returned when a template can't be read or the output can't be
    /// written.
    Io {
        path: PathBuf,
        op: &'static str,
        err: std::io::Error,
    },

    /// Returned when a template has a syntax error.
    Parse { path: PathBuf, err: String },

    /// Returned when a template fails while executing.
    Execute { path: PathBuf, err: String },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Tracker(err) => err.fmt(f),
            Error::Io { path, op, err } => write!(f, "{} '{}': {}", op, path.display(), err),
            Error::Parse { path, err } => {
                write!(f, "parsing template '{}': {}", path.display(), err)
            }
            Error::Execute { path, err } => {
                write!(f, "executing template '{}': {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Tracker(err) => Some(err),
            Error::Io { err, .. } => Some(err),
            Error::Parse { .. } => None,
            Error::Execute { .. } => None,
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
