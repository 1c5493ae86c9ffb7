//! Versioned JavaScript and CSS bundles, and `robots.txt`.

use crate::config::Config;
use crate::content::{Error, Result};
use crate::context::Context;
use crate::util::read_dir;
use std::fs;
use std::path::Path;

/// Concatenates every file in `content/javascripts` into
/// `{target}/assets/{release}/app.js`.
pub fn compile_javascripts(ctx: &Context, config: &Config) -> Result<bool> {
    concatenate(
        ctx,
        &ctx.source("content/javascripts"),
        &config.versioned_assets_directory().join("app.js"),
    )
}

/// Concatenates every file in `content/stylesheets` into
/// `{target}/assets/{release}/app.css`.
pub fn compile_stylesheets(ctx: &Context, config: &Config) -> Result<bool> {
    concatenate(
        ctx,
        &ctx.source("content/stylesheets"),
        &config.versioned_assets_directory().join("app.css"),
    )
}

/// Rebuilds `target` from the files of `source_dir`, in name order, if any
/// of them changed.
fn concatenate(ctx: &Context, source_dir: &Path, target: &Path) -> Result<bool> {
    let sources = read_dir(source_dir).map_err(|err| Error::Io {
        path: source_dir.to_owned(),
        op: "listing",
        err,
    })?;
    if sources.is_empty() || (!ctx.changed_any(&sources)? && !ctx.forced()) {
        return Ok(false);
    }

    let mut out = String::new();
    for source in &sources {
        let contents = fs::read_to_string(source).map_err(|err| Error::Io {
            path: source.clone(),
            op: "reading",
            err,
        })?;
        let name = source.file_name().unwrap_or_default().to_string_lossy();
        out.push_str(&format!("/* {} */\n", name));
        out.push_str(&contents);
        if !contents.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }

    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir).map_err(|err| Error::Io {
            path: dir.to_owned(),
            op: "creating directory",
            err,
        })?;
    }
    fs::write(target, out).map_err(|err| Error::Io {
        path: target.to_owned(),
        op: "writing",
        err,
    })?;
    Ok(true)
}

const ROBOTS_DRAFTS: &str = "User-agent: Twitterbot
Disallow:

User-agent: *
Disallow: /
";

const ROBOTS: &str = "User-agent: *
Disallow: /photographs/
Disallow: /photos
";

/// Writes `robots.txt`. It has no inputs to track, so it's only written on
/// the first run of the process or when forced. Drafts builds keep every
/// crawler but Twitterbot out.
pub fn render_robots_txt(ctx: &Context, config: &Config) -> Result<bool> {
    if !ctx.first_run && !ctx.forced() {
        return Ok(false);
    }
    let contents = if config.drafts { ROBOTS_DRAFTS } else { ROBOTS };
    let target = ctx.target("robots.txt");
    fs::write(&target, contents).map_err(|err| Error::Io {
        path: target,
        op: "writing",
        err,
    })?;
    Ok(true)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tracker::ChangeTracker;
    use std::sync::Arc;
    use url::Url;

    fn setup(dir: &Path, run: usize) -> (Context, Config) {
        let target = dir.join("public");
        let config = Config::new(dir, &target, Url::parse("https://example.org").unwrap());
        let ctx = Context::new(dir.to_owned(), target, Arc::new(ChangeTracker::new()), run);
        (ctx, config)
    }

    #[test]
    fn test_concatenates_in_name_order() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let (ctx, config) = setup(dir.path(), 1);
        let js = dir.path().join("content/javascripts");
        fs::create_dir_all(&js)?;
        fs::write(js.join("b.js"), "b();")?;
        fs::write(js.join("a.js"), "a();\n")?;

        let job = ctx.for_job();
        assert!(compile_javascripts(&job, &config)?);
        job.accept();
        ctx.commit();

        let out = fs::read_to_string(config.versioned_assets_directory().join("app.js"))?;
        assert_eq!("/* a.js */\na();\n\n/* b.js */\nb();\n\n", out);

        assert!(!compile_javascripts(&ctx.for_job(), &config)?);
        assert!(!compile_stylesheets(&ctx.for_job(), &config)?);
        Ok(())
    }

    #[test]
    fn test_robots_only_on_first_run() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let (ctx, mut config) = setup(dir.path(), 1);
        fs::create_dir_all(&ctx.target_dir)?;
        config.drafts = true;
        assert!(render_robots_txt(&ctx, &config)?);
        assert!(fs::read_to_string(ctx.target("robots.txt"))?.contains("Twitterbot"));

        let (second, config) = setup(dir.path(), 2);
        assert!(!render_robots_txt(&second, &config)?);
        assert!(render_robots_txt(&second.forced_context(), &config)?);
        assert!(fs::read_to_string(second.target("robots.txt"))?.contains("/photographs/"));
        Ok(())
    }
}
