//! Support for creating Atom feeds from articles and fragments.

use crate::article::{Article, Fragment};
use crate::config::{Author, Config};
use crate::context::Context;
use atom_syndication::{Content, Entry, Error as AtomError, Feed, Link, Person};
use chrono::{DateTime, FixedOffset, Utc};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Bundled configuration for creating a feed.
pub struct FeedConfig {
    pub title: String,

    /// The feed's file name without `.atom`, e.g. `articles-postgres`.
    pub name: String,
    pub author: Author,
    pub site_url: String,
}

impl FeedConfig {
    /// The feed's permanent id, `tag:{host},2013:/{name}`.
    pub fn id(&self) -> String {
        format!("tag:{},2013:/{}", host(&self.site_url), self.name)
    }
}

/// One entry, independent of the kind of item it came from.
#[derive(Clone, Debug)]
pub struct FeedEntry {
    pub title: String,

    /// The entry's path relative to the site root, e.g. `fragments/hello`.
    pub path: String,
    pub published: DateTime<Utc>,

    /// Rendered HTML.
    pub content: String,
}

impl FeedEntry {
    pub fn from_article(article: &Article) -> FeedEntry {
        FeedEntry {
            title: article.title.clone(),
            path: article.slug.clone(),
            published: article.published_at,
            content: article.content_html(),
        }
    }

    pub fn from_fragment(fragment: &Fragment) -> FeedEntry {
        FeedEntry {
            title: fragment.title.clone(),
            path: format!("fragments/{}", fragment.slug),
            published: fragment.published_at,
            content: fragment.content_html(),
        }
    }
}

/// The entries of the articles feed, or of the feed for `tag` if given:
/// newest first, at most `num_atom_entries`.
pub fn article_entries(config: &Config, articles: &[Article], tag: Option<&str>) -> Vec<FeedEntry> {
    articles
        .iter()
        .filter(|article| tag.map_or(true, |tag| article.tagged_with(tag)))
        .take(config.num_atom_entries)
        .map(FeedEntry::from_article)
        .collect()
}

pub fn fragment_entries(config: &Config, fragments: &[Fragment]) -> Vec<FeedEntry> {
    fragments
        .iter()
        .take(config.num_atom_entries)
        .map(FeedEntry::from_fragment)
        .collect()
}

/// Writes `articles.atom`, or `articles-{tag}.atom` holding only articles
/// tagged `tag`. Skipped unless the articles changed or `ctx` is forced.
pub fn render_articles_feed(
    ctx: &Context,
    config: &Config,
    articles: &[Article],
    changed: bool,
    tag: Option<&str>,
) -> Result<bool> {
    if !changed && !ctx.forced() {
        return Ok(false);
    }
    let (name, title) = match tag {
        Some(tag) => (
            format!("articles-{}", tag),
            format!("Articles ({}) - {}", tag, config.title),
        ),
        None => ("articles".to_owned(), format!("Articles - {}", config.title)),
    };
    let feed_config = FeedConfig {
        title,
        name,
        author: config.author.clone(),
        site_url: config.site_url.to_string(),
    };
    write_feed(
        &feed_config,
        &article_entries(config, articles, tag),
        &ctx.target_dir,
    )?;
    Ok(true)
}

/// Writes `fragments.atom`. Skipped unless the fragments changed or `ctx` is
/// forced.
pub fn render_fragments_feed(
    ctx: &Context,
    config: &Config,
    fragments: &[Fragment],
    changed: bool,
) -> Result<bool> {
    if !changed && !ctx.forced() {
        return Ok(false);
    }
    let feed_config = FeedConfig {
        title: format!("Fragments - {}", config.title),
        name: "fragments".to_owned(),
        author: config.author.clone(),
        site_url: config.site_url.to_string(),
    };
    write_feed(
        &feed_config,
        &fragment_entries(config, fragments),
        &ctx.target_dir,
    )?;
    Ok(true)
}

/// Creates a feed from some configuration ([`FeedConfig`]) and a list of
/// entries and writes it to `{target_dir}/{name}.atom`. Returns the path
/// written.
pub fn write_feed(config: &FeedConfig, entries: &[FeedEntry], target_dir: &Path) -> Result<PathBuf> {
    let path = target_dir.join(format!("{}.atom", config.name));
    fs::create_dir_all(target_dir)?;
    let mut w = BufWriter::new(File::create(&path)?);
    feed(config, entries).write_to(&mut w)?;
    w.flush()?;
    Ok(path)
}

fn feed(config: &FeedConfig, entries: &[FeedEntry]) -> Feed {
    let updated = entries
        .first()
        .map(|entry| entry.published)
        .unwrap_or_else(Utc::now);
    Feed {
        entries: entries.iter().map(|entry| feed_entry(config, entry)).collect(),
        title: config.title.clone().into(),
        id: config.id(),
        updated: fixed(updated),
        authors: author_to_people(&config.author),
        links: vec![
            link(
                format!("{}/{}.atom", config.site_url.trim_end_matches('/'), config.name),
                "self",
                Some("application/atom+xml"),
            ),
            link(config.site_url.clone(), "alternate", Some("text/html")),
        ],
        ..Default::default()
    }
}

fn feed_entry(config: &FeedConfig, entry: &FeedEntry) -> Entry {
    let url = format!("{}/{}", config.site_url.trim_end_matches('/'), entry.path);
    let date = fixed(entry.published);

    let mut content = Content::default();
    content.set_content_type("html".to_owned());
    content.set_value(entry.content.clone());

    Entry {
        id: format!(
            "tag:{},{}:{}",
            host(&config.site_url),
            entry.published.format("%Y-%m-%d"),
            entry.path
        ),
        title: entry.title.clone().into(),
        updated: date,
        authors: author_to_people(&config.author),
        links: vec![link(url, "alternate", None)],
        published: Some(date),
        content: Some(content),
        ..Default::default()
    }
}

fn link(href: String, rel: &str, mime_type: Option<&str>) -> Link {
    Link {
        href,
        rel: rel.to_owned(),
        mime_type: mime_type.map(str::to_owned),
        ..Default::default()
    }
}

fn fixed(date: DateTime<Utc>) -> DateTime<FixedOffset> {
    date.into()
}

fn host(site_url: &str) -> String {
    url::Url::parse(site_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
        .unwrap_or_else(|| site_url.to_owned())
}

fn author_to_people(author: &Author) -> Vec<Person> {
    if author.name.is_empty() {
        return Vec::new();
    }
    vec![Person {
        name: author.name.clone(),
        email: None,
        uri: author.uri.clone(),
    }]
}

/// The result of a fallible feed operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed. Variants include I/O and Atom
/// issues.
#[derive(Debug)]
pub enum Error {
    /// Returned when there is a generic I/O error.
    Io(std::io::Error),

    /// Returned when there is an Atom-related error.
    Atom(AtomError),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Atom(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Atom(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator in fallible feed operations.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<AtomError> for Error {
    /// Converts [`AtomError`]s into [`Error`]. This allows us to use the `?`
    /// operator in fallible feed operations.
    fn from(err: AtomError) -> Error {
        Error::Atom(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn entry(title: &str, year: i32) -> FeedEntry {
        FeedEntry {
            title: title.to_owned(),
            path: title.to_lowercase(),
            published: Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).unwrap(),
            content: format!("<p>{}</p>", title),
        }
    }

    #[test]
    fn test_write_feed() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let config = FeedConfig {
            title: "Articles - example.org".to_owned(),
            name: "articles".to_owned(),
            author: Author {
                name: "Ann Author".to_owned(),
                uri: Some("https://example.org".to_owned()),
            },
            site_url: "https://example.org".to_owned(),
        };
        let path = write_feed(&config, &[entry("Newer", 2021), entry("Older", 2020)], dir.path())?;
        assert_eq!(dir.path().join("articles.atom"), path);

        let xml = fs::read_to_string(&path)?;
        assert!(xml.contains("<id>tag:example.org,2013:/articles</id>"));
        assert!(xml.contains("<id>tag:example.org,2021-06-01:newer</id>"));
        assert!(xml.find("Newer").unwrap() < xml.find("Older").unwrap());
        assert!(xml.contains("https://example.org/articles.atom"));
        Ok(())
    }
}
