//! Pages built from whole collections: the per-type indices, the home page
//! and sequence photo pages. These only run after every item of their
//! collection has been parsed.
//!
//! Each takes the `changed` flag of the collection(s) it reads. A changed
//! collection forces a rewrite; otherwise the page is only rewritten if its
//! templates changed.

use crate::aggregate::group_by_year;
use crate::article::{Article, Fragment};
use crate::config::Config;
use crate::content::Result;
use crate::context::Context;
use crate::markdown::{self, RenderOptions};
use crate::passage::Passage;
use crate::photo::{select_random_photo, Photo};
use crate::talk::Talk;
use crate::templates::{self, MAIN_LAYOUT, PASSAGE_LAYOUT};
use crate::view::{locals, Base, View};

/// How many of the latest articles the home page lists.
pub const HOME_ARTICLES: usize = 3;

/// How many of the latest fragments the home page lists.
pub const HOME_FRAGMENTS: usize = 1;

struct Target<'a> {
    layout: &'a str,
    view: &'a str,
    path: &'a str,
}

fn render(
    ctx: &Context,
    config: &Config,
    changed: bool,
    target: Target,
    base: Base,
    view: View,
) -> Result<bool> {
    let ctx = if changed {
        ctx.forced_context()
    } else {
        ctx.clone()
    };
    let locals = locals(config, base, view);
    Ok(templates::render(
        &ctx,
        &templates::layout(&ctx, target.layout),
        &templates::view(&ctx, target.view),
        &ctx.target(target.path),
        locals,
    )?)
}

/// `articles/index.html`: every article, grouped by year.
pub fn render_articles_index(
    ctx: &Context,
    config: &Config,
    articles: &[Article],
    changed: bool,
) -> Result<bool> {
    render(
        ctx,
        config,
        changed,
        Target {
            layout: MAIN_LAYOUT,
            view: "articles/index",
            path: "articles/index.html",
        },
        Base::new("Articles"),
        View::ArticlesIndex {
            by_year: group_by_year(articles, Article::year),
        },
    )
}

/// `fragments/index.html`: every fragment, grouped by year.
pub fn render_fragments_index(
    ctx: &Context,
    config: &Config,
    fragments: &[Fragment],
    changed: bool,
) -> Result<bool> {
    render(
        ctx,
        config,
        changed,
        Target {
            layout: MAIN_LAYOUT,
            view: "fragments/index",
            path: "fragments/index.html",
        },
        Base::new("Fragments"),
        View::FragmentsIndex {
            by_year: group_by_year(fragments, Fragment::year),
        },
    )
}

pub fn render_passages_index(
    ctx: &Context,
    config: &Config,
    passages: &[Passage],
    changed: bool,
) -> Result<bool> {
    render(
        ctx,
        config,
        changed,
        Target {
            layout: PASSAGE_LAYOUT,
            view: "passages/index",
            path: "passages/index.html",
        },
        Base::new("Passages"),
        View::PassagesIndex { passages },
    )
}

pub fn render_talks_index(
    ctx: &Context,
    config: &Config,
    talks: &[Talk],
    changed: bool,
) -> Result<bool> {
    render(
        ctx,
        config,
        changed,
        Target {
            layout: MAIN_LAYOUT,
            view: "talks/index",
            path: "talks/index.html",
        },
        Base::new("Talks"),
        View::TalksIndex { talks },
    )
}

pub fn render_photos_index(
    ctx: &Context,
    config: &Config,
    photos: &[Photo],
    changed: bool,
) -> Result<bool> {
    render(
        ctx,
        config,
        changed,
        Target {
            layout: MAIN_LAYOUT,
            view: "photos/index",
            path: "photos/index.html",
        },
        Base::new("Photos")
            .with_body_class("photos")
            .with_viewport_width("600"),
        View::PhotosIndex { photos },
    )
}

/// `index.html`: the latest articles and fragment, and a random photo.
pub fn render_home(
    ctx: &Context,
    config: &Config,
    articles: &[Article],
    fragments: &[Fragment],
    photos: &[Photo],
    changed: bool,
) -> Result<bool> {
    render(
        ctx,
        config,
        changed,
        Target {
            layout: MAIN_LAYOUT,
            view: "index",
            path: "index.html",
        },
        Base::new(config.title.as_str()).with_body_class("index"),
        View::Home {
            articles: &articles[..articles.len().min(HOME_ARTICLES)],
            fragments: &fragments[..fragments.len().min(HOME_FRAGMENTS)],
            photo: select_random_photo(photos),
        },
    )
}

/// `sequences/{sequence}/{slug}`: one photo of a sequence.
pub fn render_sequence_photo(
    ctx: &Context,
    config: &Config,
    sequence: &str,
    photo: &Photo,
    changed: bool,
) -> Result<bool> {
    let path = format!("sequences/{}/{}", sequence, photo.slug);
    render(
        ctx,
        config,
        changed,
        Target {
            layout: MAIN_LAYOUT,
            view: "sequences/photo",
            path: &path,
        },
        Base::new(format!("{} - {}", photo.title, sequence))
            .with_body_class("sequences-photo")
            .with_viewport_width("600"),
        View::SequencePhoto {
            sequence,
            photo,
            description: markdown::render(&photo.description, &RenderOptions::default()).html,
        },
    )
}
