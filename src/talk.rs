//! Talks: conference talks written up as a page each, plus an index.

use crate::config::Config;
use crate::content::{read_frontmatter, required, Result, DISPLAY_DATE};
use crate::context::Context;
use crate::frontmatter::deserialize_timestamp;
use crate::markdown::{self, RenderOptions};
use crate::templates::{self, MAIN_LAYOUT};
use crate::util::{is_draft, slug};
use crate::view::{locals, Base, View};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct Meta {
    #[serde(default)]
    event: String,

    #[serde(default)]
    location: Option<String>,

    #[serde(default, deserialize_with = "deserialize_timestamp")]
    published_at: Option<DateTime<Utc>>,

    #[serde(default)]
    title: Option<String>,
}

/// A talk, published at `/{slug}`.
#[derive(Clone, Debug)]
pub struct Talk {
    pub body: String,
    pub content: Option<String>,
    pub draft: bool,

    /// The conference or meetup the talk was given at. Optional.
    pub event: String,
    pub location: String,
    pub published_at: DateTime<Utc>,
    pub slug: String,
    pub title: String,
}

impl Talk {
    /// Reads and validates the talk at `source`. Requires `title`,
    /// `published_at` and `location`.
    pub fn parse(source: &Path) -> Result<Talk> {
        let (meta, body) = read_frontmatter::<Meta>(source)?;
        Ok(Talk {
            title: required(source, "title", meta.title)?,
            published_at: required(source, "publish date", meta.published_at)?,
            location: required(source, "location", meta.location)?,
            body,
            content: None,
            draft: is_draft(source),
            event: meta.event,
            slug: slug(source),
        })
    }

    pub fn publishing_info(&self) -> String {
        let mut info = format!(
            "<p><strong>Talk</strong><br>{}</p><p><strong>Published</strong><br>{}</p> <p><strong>Location</strong><br>{}</p>",
            self.title,
            self.published_at.format(DISPLAY_DATE),
            self.location
        );
        if !self.event.is_empty() {
            info.push_str(&format!("<p><strong>Event</strong><br>{}</p>", self.event));
        }
        info
    }
}

/// Parses the talk at `source` and renders it to `{target}/{slug}` when it
/// changed or `ctx` is forced.
pub fn render_talk(ctx: &Context, config: &Config, source: &Path) -> Result<(Talk, bool)> {
    let mut talk = Talk::parse(source)?;

    let layout = templates::layout(ctx, MAIN_LAYOUT);
    let view = templates::view(ctx, "talks/show");
    if !ctx.changed_any(&[source, layout.as_path(), view.as_path()])? && !ctx.forced() {
        return Ok((talk, false));
    }

    talk.content = Some(markdown::render(&talk.body, &RenderOptions::default()).html);
    let locals = locals(
        config,
        Base::new(&talk.title).with_body_class("talk"),
        View::Talk { talk: &talk },
    );
    templates::render(
        &ctx.forced_context(),
        &layout,
        &view,
        &ctx.target(&talk.slug),
        locals,
    )?;
    Ok((talk, true))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn test_event_is_optional() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("paradise-lost.md");
        fs::write(
            &source,
            "---\ntitle: Paradise Lost\nlocation: Berlin\npublished_at: 2019-05-01\n---\nSlides.\n",
        )?;
        let talk = Talk::parse(&source)?;
        assert_eq!("paradise-lost", talk.slug);
        assert!(!talk.publishing_info().contains("Event"));

        fs::write(
            &source,
            "---\ntitle: Paradise Lost\nlocation: Berlin\nevent: PGConf\npublished_at: 2019-05-01\n---\n",
        )?;
        assert!(Talk::parse(&source)?.publishing_info().contains("PGConf"));

        fs::write(&source, "---\ntitle: Paradise Lost\npublished_at: 2019-05-01\n---\n")?;
        assert!(Talk::parse(&source).is_err());
        Ok(())
    }
}
