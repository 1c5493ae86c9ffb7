//! Passages: newsletter issues, rendered with their own layout.

use crate::config::Config;
use crate::content::{read_frontmatter, required, Error, Result};
use crate::context::Context;
use crate::frontmatter::deserialize_timestamp;
use crate::markdown::{self, RenderOptions};
use crate::templates::{self, PASSAGE_LAYOUT};
use crate::util::{is_draft, slug};
use crate::view::{locals, Base, View};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct Meta {
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    published_at: Option<DateTime<Utc>>,

    #[serde(default)]
    title: Option<String>,
}

/// One issue of the newsletter, published at `/passages/{slug}`.
#[derive(Clone, Debug)]
pub struct Passage {
    /// The rendered body, if the page was rebuilt during this run.
    pub content: Option<String>,

    /// The Markdown body.
    pub content_raw: String,
    pub draft: bool,

    /// The zero-padded issue number, like `001`.
    pub issue: String,
    pub published_at: DateTime<Utc>,

    /// `{issue}-{name}`, taken from the file name.
    pub slug: String,
    pub title: String,
}

impl Passage {
    pub fn parse(source: &Path) -> Result<Passage> {
        let (meta, body) = read_frontmatter::<Meta>(source)?;
        let title = required(source, "title", meta.title)?;
        let published_at = required(source, "publish date", meta.published_at)?;

        let slug = slug(source);
        let issue = match slug.split_once('-') {
            Some((issue, name)) if !issue.is_empty() && !name.is_empty() => issue.to_owned(),
            _ => {
                return Err(Error::Invalid {
                    path: source.to_owned(),
                    reason: format!("expected passage slug to contain issue number: {}", slug),
                })
            }
        };

        Ok(Passage {
            content: None,
            content_raw: body,
            draft: is_draft(source),
            issue,
            published_at,
            slug,
            title,
        })
    }
}

/// Parses the passage at `source` and renders it to
/// `{target}/passages/{slug}` when it changed or `ctx` is forced.
pub fn render_passage(ctx: &Context, config: &Config, source: &Path) -> Result<(Passage, bool)> {
    let mut passage = Passage::parse(source)?;

    let layout = templates::layout(ctx, PASSAGE_LAYOUT);
    let view = templates::view(ctx, "passages/show");
    if !ctx.changed_any(&[source, layout.as_path(), view.as_path()])? && !ctx.forced() {
        return Ok((passage, false));
    }

    let options = RenderOptions {
        retina: false,
        ..RenderOptions::default()
    };
    passage.content = Some(markdown::render(&passage.content_raw, &options).html);

    let locals = locals(
        config,
        Base::new(&passage.title),
        View::Passage {
            passage: &passage,
            in_email: false,
        },
    );
    templates::render(
        &ctx.forced_context(),
        &layout,
        &view,
        &ctx.target("passages").join(&passage.slug),
        locals,
    )?;
    Ok((passage, true))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn test_issue_from_slug() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let good = dir.path().join("003-mountains.md");
        fs::write(&good, "---\ntitle: Mountains\npublished_at: 2020-03-01\n---\nHi\n")?;
        let passage = Passage::parse(&good)?;
        assert_eq!("003", passage.issue);
        assert_eq!("003-mountains", passage.slug);
        assert_eq!("Hi\n", passage.content_raw);

        let bad = dir.path().join("mountains.md");
        fs::write(&bad, "---\ntitle: Mountains\npublished_at: 2020-03-01\n---\nHi\n")?;
        assert!(matches!(Passage::parse(&bad), Err(Error::Invalid { .. })));
        Ok(())
    }

    #[test]
    fn test_requires_publish_date() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("001-first.md");
        fs::write(&source, "---\ntitle: First\n---\n")?;
        match Passage::parse(&source) {
            Err(Error::Missing { field, .. }) => assert_eq!("publish date", field),
            other => panic!("expected a missing field, got {:?}", other.map(|p| p.slug)),
        }
        Ok(())
    }
}
