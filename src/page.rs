//! Standalone pages: templates under `pages/` rendered straight into the
//! main layout, with titles and body classes from `pages/_meta.yaml`.

use crate::config::Config;
use crate::content::{read_manifest, Error, Result};
use crate::context::Context;
use crate::templates::{self, MAIN_LAYOUT};
use crate::view::{locals, Base, View};
use log::warn;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The extension of page templates.
pub const PAGE_EXTENSION: &str = "tmpl";

/// Metadata for one page, keyed in `pages/_meta.yaml` by the page's path
/// relative to `pages/` without its extension (e.g. `about`, `talks/index`).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub body_class: String,

    #[serde(default)]
    pub title: String,
}

pub type PagesMeta = HashMap<String, PageMeta>;

/// The path of the shared pages manifest.
pub fn meta_path(ctx: &Context) -> PathBuf {
    ctx.source("pages").join("_meta.yaml")
}

/// Loads `pages/_meta.yaml`. A missing manifest means no page has metadata.
pub fn load_meta(ctx: &Context) -> Result<PagesMeta> {
    read_manifest(&meta_path(ctx))
}

/// Lists every page template under `pages/`, recursively, in path order.
pub fn sources(ctx: &Context) -> Result<Vec<PathBuf>> {
    let root = ctx.source("pages");
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut sources = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(|err| Error::Io {
            path: root.clone(),
            op: "listing pages",
            err: err.into(),
        })?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().map_or(false, |ext| ext == PAGE_EXTENSION)
        {
            sources.push(path.to_owned());
        }
    }
    Ok(sources)
}

/// The key of `source` in the pages manifest: its path relative to `pages/`,
/// without extension, always `/`-separated.
pub fn page_path(ctx: &Context, source: &Path) -> Result<String> {
    let root = ctx.source("pages");
    let relative = source.strip_prefix(&root).map_err(|_| Error::Invalid {
        path: source.to_owned(),
        reason: format!("page is outside '{}'", root.display()),
    })?;
    let parts: Vec<String> = relative
        .with_extension("")
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Renders the page template at `source` into the main layout. Pages named
/// `index` get an `.html` suffix so they can be served at their directory's
/// path. Returns whether the page was written: a page is rewritten when it
/// or the layout changed, when the pages manifest changed, or when `ctx` is
/// forced.
///
/// `meta` is the manifest as loaded by the caller; every page observes the
/// manifest file itself so a page that fails is rebuilt once it's fixed.
pub fn render_page(ctx: &Context, config: &Config, meta: &PagesMeta, source: &Path) -> Result<bool> {
    let page_path = page_path(ctx, source)?;

    let manifest = meta_path(ctx);
    let ctx = if manifest.is_file() && ctx.changed(&manifest)? {
        ctx.forced_context()
    } else {
        ctx.clone()
    };

    let mut target = ctx.target(&page_path);
    if target.file_name().map_or(false, |name| name == "index") {
        target.set_extension("html");
    }

    let base = match meta.get(&page_path) {
        Some(page) => Base::new(&page.title).with_body_class(&page.body_class),
        None => {
            warn!("No page meta information: {}", page_path);
            Base::new("Untitled Page")
        }
    };
    let locals = locals(config, base, View::Page);

    let layout = templates::layout(&ctx, MAIN_LAYOUT);
    Ok(templates::render(&ctx, &layout, source, &target, locals)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tracker::ChangeTracker;
    use std::fs;
    use std::sync::Arc;

    #[test]
    fn test_sources_and_paths() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let pages = dir.path().join("pages");
        fs::create_dir_all(pages.join("talks"))?;
        fs::write(pages.join("about.tmpl"), "")?;
        fs::write(pages.join("talks/index.tmpl"), "")?;
        fs::write(pages.join("_meta.yaml"), "about:\n  title: About\n")?;

        let ctx = Context::new(
            dir.path().to_owned(),
            dir.path().join("public"),
            Arc::new(ChangeTracker::new()),
            1,
        );
        let sources = sources(&ctx)?;
        assert_eq!(vec![pages.join("about.tmpl"), pages.join("talks/index.tmpl")], sources);
        assert_eq!("about", page_path(&ctx, &sources[0])?);
        assert_eq!("talks/index", page_path(&ctx, &sources[1])?);

        let meta = load_meta(&ctx)?;
        assert_eq!("About", meta["about"].title);
        Ok(())
    }
}
