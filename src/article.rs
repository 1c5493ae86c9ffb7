//! Articles and fragments: Markdown files with YAML frontmatter, rendered to
//! one page each and aggregated into indices and Atom feeds.

use crate::config::Config;
use crate::content::{attachment_url, read_frontmatter, required, Result, DISPLAY_DATE};
use crate::context::Context;
use crate::frontmatter::deserialize_timestamp;
use crate::markdown::{self, RenderOptions};
use crate::templates::{self, MAIN_LAYOUT};
use crate::util::{is_draft, slug};
use crate::view::{locals, Base, TwitterCard, View};
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct Meta {
    #[serde(default)]
    attributions: String,

    #[serde(default)]
    hn_link: String,

    #[serde(default)]
    hook: String,

    #[serde(default)]
    image: String,

    #[serde(default)]
    location: Option<String>,

    #[serde(default, deserialize_with = "deserialize_timestamp")]
    published_at: Option<DateTime<Utc>>,

    #[serde(default)]
    tags: Vec<String>,

    #[serde(default)]
    title: Option<String>,
}

/// A long-form article, published at `/{slug}`.
#[derive(Clone, Debug)]
pub struct Article {
    /// Credits for content included in the article, like a header image.
    pub attributions: String,

    /// The Markdown body.
    pub body: String,

    /// The rendered body. Only set when the article's page was rebuilt during
    /// this run; see [`Article::content_html`].
    pub content: Option<String>,

    pub draft: bool,
    pub hn_link: String,

    /// A sentence or two introducing the article.
    pub hook: String,

    /// The URL of `content/images/{slug}/hook.{jpg,png}`, if present.
    pub hook_image_url: Option<String>,
    pub image: String,

    /// Where the article was written.
    pub location: String,
    pub published_at: DateTime<Utc>,
    pub slug: String,
    pub tags: Vec<String>,
    pub title: String,

    /// The rendered table of contents. Empty unless `content` is set.
    pub toc: String,
}

impl Article {
    /// Reads and validates the article at `source`. Requires `title`,
    /// `published_at` and `location`.
    pub fn parse(ctx: &Context, source: &Path) -> Result<Article> {
        let (meta, body) = read_frontmatter::<Meta>(source)?;
        let slug = slug(source);
        Ok(Article {
            location: required(source, "location", meta.location)?,
            title: required(source, "title", meta.title)?,
            published_at: required(source, "publish date", meta.published_at)?,
            hook_image_url: attachment_url(ctx, &slug, "hook"),
            attributions: meta.attributions,
            body,
            content: None,
            draft: is_draft(source),
            hn_link: meta.hn_link,
            hook: meta.hook,
            image: meta.image,
            slug,
            tags: meta.tags,
            toc: String::new(),
        })
    }

    pub fn tagged_with(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn year(&self) -> i32 {
        self.published_at.year()
    }

    /// A short summary for the sidebar of the article's page.
    pub fn publishing_info(&self) -> String {
        format!(
            "<p><strong>Article</strong><br>{}</p><p><strong>Published</strong><br>{}</p> <p><strong>Location</strong><br>{}</p>",
            self.title,
            self.published_at.format(DISPLAY_DATE),
            self.location
        )
    }

    /// The rendered body, rendering it now if the page was skipped this run.
    pub fn content_html(&self) -> String {
        match &self.content {
            Some(content) => content.clone(),
            None => markdown::render(&self.body, &RenderOptions::default()).html,
        }
    }
}

/// Parses the article at `source` and, if it (or its templates) changed or
/// `ctx` is forced, renders it to `{target}/{slug}`. Returns the article and
/// whether the page was rendered.
pub fn render_article(ctx: &Context, config: &Config, source: &Path) -> Result<(Article, bool)> {
    let mut article = Article::parse(ctx, source)?;

    let layout = templates::layout(ctx, MAIN_LAYOUT);
    let view = templates::view(ctx, "articles/show");
    if !ctx.changed_any(&[source, layout.as_path(), view.as_path()])? && !ctx.forced() {
        return Ok((article, false));
    }

    let rendered = markdown::render(&article.body, &RenderOptions::default());
    article.content = Some(rendered.html);
    article.toc = rendered.toc;

    let card = TwitterCard {
        title: article.title.clone(),
        description: article.hook.clone(),
        image_url: attachment_url(ctx, &article.slug, "twitter@2x").map(|url| config.url(&url)),
    };
    let base = Base::new(&article.title).with_twitter_card(card);
    let locals = locals(
        config,
        base,
        View::Article {
            article: &article,
        },
    );
    templates::render(
        &ctx.forced_context(),
        &layout,
        &view,
        &ctx.target(&article.slug),
        locals,
    )?;
    Ok((article, true))
}

#[derive(Deserialize)]
struct FragmentMeta {
    #[serde(default)]
    attributions: String,

    #[serde(default)]
    hn_link: String,

    #[serde(default)]
    hook: String,

    #[serde(default)]
    image: String,

    #[serde(default)]
    location: String,

    #[serde(default, deserialize_with = "deserialize_timestamp")]
    published_at: Option<DateTime<Utc>>,

    #[serde(default)]
    title: Option<String>,
}

/// A short, informal post, published at `/fragments/{slug}`.
#[derive(Clone, Debug)]
pub struct Fragment {
    pub attributions: String,
    pub body: String,

    /// The rendered body, if the page was rebuilt during this run.
    pub content: Option<String>,
    pub draft: bool,
    pub hn_link: String,
    pub hook: String,
    pub image: String,

    /// Where the fragment was written. Optional.
    pub location: String,
    pub published_at: DateTime<Utc>,
    pub slug: String,
    pub title: String,
}

impl Fragment {
    /// Reads and validates the fragment at `source`. Requires `title` and
    /// `published_at`.
    pub fn parse(source: &Path) -> Result<Fragment> {
        let (meta, body) = read_frontmatter::<FragmentMeta>(source)?;
        Ok(Fragment {
            title: required(source, "title", meta.title)?,
            published_at: required(source, "publish date", meta.published_at)?,
            attributions: meta.attributions,
            body,
            content: None,
            draft: is_draft(source),
            hn_link: meta.hn_link,
            hook: meta.hook,
            image: meta.image,
            location: meta.location,
            slug: slug(source),
        })
    }

    pub fn year(&self) -> i32 {
        self.published_at.year()
    }

    pub fn publishing_info(&self) -> String {
        let mut info = format!(
            "<p><strong>Fragment</strong><br>{}</p><p><strong>Published</strong><br>{}</p> ",
            self.title,
            self.published_at.format(DISPLAY_DATE)
        );
        if !self.location.is_empty() {
            info.push_str(&format!(
                "<p><strong>Location</strong><br>{}</p>",
                self.location
            ));
        }
        info
    }

    /// The rendered body, rendering it now if the page was skipped this run.
    pub fn content_html(&self) -> String {
        match &self.content {
            Some(content) => content.clone(),
            None => markdown::render(&self.body, &RenderOptions::default()).html,
        }
    }
}

/// Parses the fragment at `source` and renders it to
/// `{target}/fragments/{slug}` when it changed or `ctx` is forced.
pub fn render_fragment(
    ctx: &Context,
    config: &Config,
    source: &Path,
) -> Result<(Fragment, bool)> {
    let mut fragment = Fragment::parse(source)?;

    let layout = templates::layout(ctx, MAIN_LAYOUT);
    let view = templates::view(ctx, "fragments/show");
    if !ctx.changed_any(&[source, layout.as_path(), view.as_path()])? && !ctx.forced() {
        return Ok((fragment, false));
    }

    fragment.content = Some(markdown::render(&fragment.body, &RenderOptions::default()).html);

    let card_dir = format!("fragments/{}", fragment.slug);
    let card = TwitterCard {
        title: fragment.title.clone(),
        description: fragment.hook.clone(),
        image_url: attachment_url(ctx, &card_dir, "twitter@2x").map(|url| config.url(&url)),
    };
    let base = Base::new(&fragment.title).with_twitter_card(card);
    let locals = locals(
        config,
        base,
        View::Fragment {
            fragment: &fragment,
        },
    );
    templates::render(
        &ctx.forced_context(),
        &layout,
        &view,
        &ctx.target("fragments").join(&fragment.slug),
        locals,
    )?;
    Ok((fragment, true))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::content::Error;
    use crate::tracker::ChangeTracker;
    use std::fs;
    use std::sync::Arc;
    use url::Url;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn write(root: &Path, rel: &str, contents: &str) -> std::io::Result<()> {
        let path = root.join(rel);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, contents)
    }

    fn setup(root: &Path) -> std::result::Result<(Context, Config), Box<dyn std::error::Error>> {
        write(root, "layouts/main.tmpl", "<main>{{.Content}}</main>")?;
        write(
            root,
            "views/articles/show.tmpl",
            "<h1>{{.Article.Title}}</h1>{{.Article.Content}}",
        )?;
        let target = root.join("public");
        let config = Config::new(root, &target, Url::parse("https://example.org")?);
        let ctx = Context::new(root.to_owned(), target, Arc::new(ChangeTracker::new()), 1);
        Ok((ctx, config))
    }

    #[test]
    fn test_parse_requires_location() -> TestResult {
        let dir = tempfile::tempdir()?;
        let (ctx, _) = setup(dir.path())?;
        let source = dir.path().join("content/articles/a.md");
        write(dir.path(), "content/articles/a.md", "---\ntitle: A\npublished_at: 2020-01-01\n---\n")?;
        match Article::parse(&ctx, &source) {
            Err(Error::Missing { field, .. }) => assert_eq!("location", field),
            other => panic!("expected a missing field, got {:?}", other.map(|a| a.slug)),
        }
        Ok(())
    }

    #[test]
    fn test_hook_image_and_tags() -> TestResult {
        let dir = tempfile::tempdir()?;
        let (ctx, _) = setup(dir.path())?;
        write(dir.path(), "content/images/a/hook.png", "")?;
        write(
            dir.path(),
            "content/drafts/a.md",
            "---\ntitle: A\nlocation: Calgary\npublished_at: 2020-01-01\ntags: [postgres]\n---\n",
        )?;
        let article = Article::parse(&ctx, &dir.path().join("content/drafts/a.md"))?;
        assert_eq!(Some("/images/a/hook.png"), article.hook_image_url.as_deref());
        assert!(article.draft);
        assert!(article.tagged_with("postgres"));
        assert!(!article.tagged_with("rust"));
        Ok(())
    }

    #[test]
    fn test_render_skips_unchanged() -> TestResult {
        let dir = tempfile::tempdir()?;
        let (ctx, config) = setup(dir.path())?;
        let source = dir.path().join("content/articles/a.md");
        write(
            dir.path(),
            "content/articles/a.md",
            "---\ntitle: A\nlocation: Calgary\npublished_at: 2020-01-01\n---\n## Hello\n",
        )?;

        let job = ctx.for_job();
        let (article, executed) = render_article(&job, &config, &source)?;
        assert!(executed);
        assert!(article.toc.contains("#hello"));
        job.accept();
        ctx.commit();

        let page = fs::read_to_string(ctx.target("a"))?;
        assert!(page.starts_with("<main><h1>A</h1><h2 id=\"hello\">"));

        let (article, executed) = render_article(&ctx.for_job(), &config, &source)?;
        assert!(!executed);
        assert!(article.content.is_none());
        assert!(article.content_html().contains("Hello"));

        let (_, executed) = render_article(&ctx.forced_context().for_job(), &config, &source)?;
        assert!(executed);
        Ok(())
    }

    #[test]
    fn test_fragment_location_is_optional() -> TestResult {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("hello.md");
        fs::write(&source, "---\ntitle: Hello\npublished_at: 2021-02-03\n---\nShort.\n")?;
        let fragment = Fragment::parse(&source)?;
        assert_eq!("hello", fragment.slug);
        assert_eq!(2021, fragment.year());
        assert!(!fragment.publishing_info().contains("Location"));
        Ok(())
    }
}
