//! Converts Markdown to HTML and derives a table of contents from its
//! headings.

use pulldown_cmark::escape::{escape_href, escape_html};
use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag};
use std::collections::HashMap;
use url::Url;

/// Tweaks to the rendered output.
#[derive(Clone, Debug)]
pub struct RenderOptions<'a> {
    /// When set, root-relative link and image URLs (`/foo`) are made absolute
    /// against this URL. Used for content that leaves the site (e.g. email).
    pub absolute_urls: Option<&'a Url>,

    /// Wraps each heading's contents in a link to its own anchor.
    pub header_links: bool,

    /// Adds a `2x` `srcset` candidate (`foo@2x.jpg`) to JPEG and PNG images.
    pub retina: bool,
}

impl Default for RenderOptions<'_> {
    fn default() -> Self {
        RenderOptions {
            absolute_urls: None,
            header_links: true,
            retina: true,
        }
    }
}

/// The output of [`render`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rendered {
    pub html: String,

    /// A nested `<ol>` linking to every heading, or empty if there are none.
    pub toc: String,
}

struct Heading {
    level: u32,
    id: String,
    title: String,
}

struct Image<'a> {
    url: CowStr<'a>,
    title: CowStr<'a>,
    alt: String,
}

/// Renders `markdown` to HTML. Every heading gets a unique, slugified `id`
/// which the table of contents links to.
pub fn render(markdown: &str, render_options: &RenderOptions) -> Rendered {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut events: Vec<Event> = Vec::new();
    let mut headings: Vec<Heading> = Vec::new();
    let mut seen_ids: HashMap<String, usize> = HashMap::new();
    let mut heading: Option<(u32, Vec<Event>)> = None;
    let mut image: Option<Image> = None;

    for event in Parser::new_ext(markdown, options) {
        let event = convert(event, render_options);
        match event {
            Event::Start(Tag::Heading(level)) => heading = Some((level, Vec::new())),
            Event::End(Tag::Heading(_)) => {
                if let Some((level, inner)) = heading.take() {
                    let title = plain_text(&inner);
                    let id = unique_id(&mut seen_ids, &title);
                    events.push(Event::Html(
                        format!(r#"<h{} id="{}">"#, level, id).into(),
                    ));
                    if render_options.header_links {
                        events.push(Event::Html(format!(r##"<a href="#{}">"##, id).into()));
                    }
                    events.extend(inner);
                    if render_options.header_links {
                        events.push(Event::Html("</a>".into()));
                    }
                    events.push(Event::Html(format!("</h{}>\n", level).into()));
                    headings.push(Heading { level, id, title });
                }
            }
            Event::Start(Tag::Image(_, url, title))
                if render_options.retina && has_retina_variant(&url) =>
            {
                image = Some(Image {
                    url,
                    title,
                    alt: String::new(),
                })
            }
            Event::End(Tag::Image(..)) if image.is_some() => {
                if let Some(image) = image.take() {
                    push(&mut events, &mut heading, Event::Html(retina_img(&image).into()));
                }
            }
            Event::Text(text) if image.is_some() => {
                if let Some(image) = image.as_mut() {
                    image.alt.push_str(&text);
                }
            }
            event => push(&mut events, &mut heading, event),
        }
    }

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    Rendered {
        html: out,
        toc: toc_html(&headings),
    }
}

fn push<'a>(events: &mut Vec<Event<'a>>, heading: &mut Option<(u32, Vec<Event<'a>>)>, event: Event<'a>) {
    match heading {
        Some((_, inner)) => inner.push(event),
        None => events.push(event),
    }
}

/// Rewrites link and image destinations as configured.
fn convert<'a>(event: Event<'a>, options: &RenderOptions) -> Event<'a> {
    let base = match options.absolute_urls {
        Some(base) => base,
        None => return event,
    };
    let absolutize = |url: CowStr<'a>| -> CowStr<'a> {
        if !url.starts_with('/') || url.starts_with("//") {
            return url;
        }
        match base.join(&url) {
            Ok(absolute) => CowStr::Boxed(absolute.to_string().into_boxed_str()),
            Err(_) => url,
        }
    };
    match event {
        Event::Start(Tag::Link(
            link @ (LinkType::Inline
            | LinkType::Reference
            | LinkType::ReferenceUnknown
            | LinkType::Shortcut
            | LinkType::Collapsed
            | LinkType::CollapsedUnknown),
            url,
            title,
        )) => Event::Start(Tag::Link(link, absolutize(url), title)),
        Event::Start(Tag::Image(link, url, title)) => {
            Event::Start(Tag::Image(link, absolutize(url), title))
        }
        _ => event,
    }
}

fn has_retina_variant(url: &str) -> bool {
    url.ends_with(".jpg") || url.ends_with(".png")
}

fn retina_img(image: &Image) -> String {
    let url: &str = &image.url;
    let (stem, ext) = url.split_at(url.rfind('.').unwrap_or(url.len()));
    let mut out = String::from(r#"<img src=""#);
    let _ = escape_href(&mut out, url);
    out.push_str(r#"" srcset=""#);
    let _ = escape_href(&mut out, &format!("{}@2x{}", stem, ext));
    out.push_str(" 2x, ");
    let _ = escape_href(&mut out, url);
    out.push_str(r#" 1x" alt=""#);
    let _ = escape_html(&mut out, &image.alt);
    if !image.title.is_empty() {
        out.push_str(r#"" title=""#);
        let _ = escape_html(&mut out, &image.title);
    }
    out.push_str(r#"" />"#);
    out
}

fn plain_text(events: &[Event]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Text(text) | Event::Code(text) => Some(text.as_ref()),
            _ => None,
        })
        .collect()
}

fn unique_id(seen: &mut HashMap<String, usize>, title: &str) -> String {
    let mut id = slug::slugify(title);
    if id.is_empty() {
        id = String::from("section");
    }
    let count = seen.entry(id.clone()).or_insert(0);
    *count += 1;
    match *count {
        1 => id,
        n => format!("{}-{}", id, n),
    }
}

/// Builds nested ordered lists from a flat run of headings, opening a list
/// whenever the level deepens and closing lists when it rises again.
fn toc_html(headings: &[Heading]) -> String {
    let mut out = String::new();
    let mut open: Vec<u32> = Vec::new();
    for heading in headings {
        while let Some(&level) = open.last() {
            if level <= heading.level {
                break;
            }
            out.push_str("</li></ol>");
            open.pop();
        }
        match open.last() {
            Some(&level) if level == heading.level => out.push_str("</li>"),
            _ => {
                out.push_str("<ol>");
                open.push(heading.level);
            }
        }
        out.push_str(r##"<li><a href="#"##);
        out.push_str(&heading.id);
        out.push_str(r#"">"#);
        let _ = escape_html(&mut out, &heading.title);
        out.push_str("</a>");
    }
    for _ in open {
        out.push_str("</li></ol>");
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_headings_get_ids_and_toc() {
        let rendered = render(
            "## Intro\n\ntext\n\n### Detail\n\n## Intro\n",
            &RenderOptions::default(),
        );
        assert!(rendered
            .html
            .contains(r##"<h2 id="intro"><a href="#intro">Intro</a></h2>"##));
        assert!(rendered.html.contains(r#"<h2 id="intro-2">"#));
        assert_eq!(
            concat!(
                r##"<ol><li><a href="#intro">Intro</a>"##,
                r##"<ol><li><a href="#detail">Detail</a></li></ol></li>"##,
                r##"<li><a href="#intro-2">Intro</a></li></ol>"##,
            ),
            rendered.toc
        );
    }

    #[test]
    fn test_no_headings_no_toc() {
        let rendered = render("just *text*", &RenderOptions::default());
        assert_eq!("<p>just <em>text</em></p>\n", rendered.html);
        assert!(rendered.toc.is_empty());
    }

    #[test]
    fn test_header_links_off() {
        let options = RenderOptions {
            header_links: false,
            ..RenderOptions::default()
        };
        let rendered = render("# Title", &options);
        assert_eq!("<h1 id=\"title\">Title</h1>\n", rendered.html);
    }

    #[test]
    fn test_absolute_urls() -> Result<(), url::ParseError> {
        let base = Url::parse("https://example.org")?;
        let options = RenderOptions {
            absolute_urls: Some(&base),
            retina: false,
            ..RenderOptions::default()
        };
        let rendered = render("[a](/articles/a) [b](https://other.org/b)", &options);
        assert!(rendered.html.contains(r#"href="https://example.org/articles/a""#));
        assert!(rendered.html.contains(r#"href="https://other.org/b""#));
        Ok(())
    }

    #[test]
    fn test_retina_images() {
        let rendered = render("![A cat](/images/cat.jpg)", &RenderOptions::default());
        assert!(rendered.html.contains(
            r#"<img src="/images/cat.jpg" srcset="/images/cat@2x.jpg 2x, /images/cat.jpg 1x" alt="A cat" />"#
        ));

        let options = RenderOptions {
            retina: false,
            ..RenderOptions::default()
        };
        let rendered = render("![A cat](/images/cat.jpg)", &options);
        assert!(!rendered.html.contains("srcset"));
    }
}
