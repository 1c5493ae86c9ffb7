//! Small filesystem helpers shared by the driver and the renderers.

use anyhow::{anyhow, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

pub fn open(path: &Path, kind: &str) -> Result<File> {
    match File::open(path) {
        Err(e) => Err(anyhow!("Opening {} file `{}`: {}", kind, path.display(), e)),
        Ok(file) => Ok(file),
    }
}

/// Creates `dir` and any missing parents.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

/// Makes `link` a symlink to `source`, replacing whatever symlink was there.
/// Does nothing if `source` doesn't exist.
pub fn ensure_symlink(source: &Path, link: &Path) -> io::Result<()> {
    if !source.exists() {
        return Ok(());
    }
    let source = fs::canonicalize(source)?;
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            if fs::read_link(link)? == source {
                return Ok(());
            }
            fs::remove_file(link)?;
        }
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("'{}' exists and is not a symlink", link.display()),
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    symlink(&source, link)
}

#[cfg(unix)]
fn symlink(source: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(windows)]
fn symlink(source: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(source, link)
}

/// Lists the regular files directly inside `dir`, sorted by name. Hidden
/// files are ignored and a missing directory is treated as empty.
pub fn read_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
    list(dir, |file_type| file_type.is_file())
}

/// Lists the directories directly inside `dir`, sorted by name.
pub fn read_subdirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    list(dir, |file_type| file_type.is_dir())
}

fn list(dir: &Path, keep: impl Fn(&fs::FileType) -> bool) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut paths = Vec::new();
    for result in entries {
        let entry = result?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if keep(&entry.file_type()?) {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// The file name of `path` without its extension, e.g. `hello` for
/// `content/articles/hello.md`.
pub fn slug(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Whether `path` sits in a drafts directory (`drafts`, `fragments-drafts`,
/// ...).
pub fn is_draft(path: &Path) -> bool {
    path.parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().contains("drafts"))
        .unwrap_or(false)
}

/// Checks whether `extensionless` exists as a `.jpg` or `.png` and returns
/// the extension that was found.
pub fn path_as_image(extensionless: &Path) -> Option<&'static str> {
    ["jpg", "png"].iter().copied().find(|format| {
        let mut candidate = extensionless.as_os_str().to_owned();
        candidate.push(".");
        candidate.push(format);
        Path::new(&candidate).is_file()
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_read_dir_sorted_and_filtered() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("b.md"), "")?;
        fs::write(dir.path().join("a.md"), "")?;
        fs::write(dir.path().join(".hidden"), "")?;
        fs::create_dir(dir.path().join("sub"))?;

        let files = read_dir(dir.path())?;
        assert_eq!(
            vec![dir.path().join("a.md"), dir.path().join("b.md")],
            files
        );
        assert_eq!(vec![dir.path().join("sub")], read_subdirs(dir.path())?);
        assert!(read_dir(&dir.path().join("missing"))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_slug_and_draft() {
        assert_eq!("hello", slug(Path::new("content/articles/hello.md")));
        assert!(is_draft(Path::new("content/fragments-drafts/a.md")));
        assert!(!is_draft(Path::new("content/fragments/a.md")));
    }

    #[test]
    fn test_path_as_image() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("hook.png"), "")?;
        assert_eq!(Some("png"), path_as_image(&dir.path().join("hook")));
        assert_eq!(None, path_as_image(&dir.path().join("twitter@2x")));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_symlink_is_idempotent() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("images");
        let link = dir.path().join("public-images");
        fs::create_dir(&source)?;
        ensure_symlink(&source, &link)?;
        ensure_symlink(&source, &link)?;
        assert!(fs::symlink_metadata(&link)?.file_type().is_symlink());

        ensure_symlink(&dir.path().join("missing"), &dir.path().join("x"))?;
        assert!(!dir.path().join("x").exists());
        Ok(())
    }
}
