//! Typed template locals. Every page gets the [`Base`] fields plus the fields
//! of exactly one [`View`] variant.

use crate::aggregate::YearGroup;
use crate::article::{Article, Fragment};
use crate::config::Config;
use crate::passage::Passage;
use crate::photo::Photo;
use crate::talk::Talk;
use crate::value::{list, object, optional, string, year_groups};
use gtmpl_value::Value;

/// Fields every layout can rely on.
#[derive(Clone, Debug)]
pub struct Base {
    pub title: String,
    pub body_class: String,

    /// The `<meta name="viewport">` width.
    pub viewport_width: String,
    pub twitter_card: Option<TwitterCard>,
}

impl Base {
    pub fn new(title: impl Into<String>) -> Base {
        Base {
            title: title.into(),
            body_class: String::new(),
            viewport_width: String::from("device-width"),
            twitter_card: None,
        }
    }

    pub fn with_body_class(mut self, body_class: impl Into<String>) -> Base {
        self.body_class = body_class.into();
        self
    }

    pub fn with_viewport_width(mut self, viewport_width: impl Into<String>) -> Base {
        self.viewport_width = viewport_width.into();
        self
    }

    pub fn with_twitter_card(mut self, card: TwitterCard) -> Base {
        self.twitter_card = Some(card);
        self
    }
}

/// The rich preview shown when a page is shared.
#[derive(Clone, Debug)]
pub struct TwitterCard {
    pub title: String,
    pub description: String,

    /// Must be absolute since it's fetched by a third party.
    pub image_url: Option<String>,
}

/// The page-specific part of the locals.
pub enum View<'a> {
    Article {
        article: &'a Article,
    },
    ArticlesIndex {
        by_year: Vec<YearGroup<'a, Article>>,
    },
    Fragment {
        fragment: &'a Fragment,
    },
    FragmentsIndex {
        by_year: Vec<YearGroup<'a, Fragment>>,
    },
    Home {
        articles: &'a [Article],
        fragments: &'a [Fragment],
        photo: Option<&'a Photo>,
    },
    Page,
    Passage {
        passage: &'a Passage,
        in_email: bool,
    },
    PassagesIndex {
        passages: &'a [Passage],
    },
    PhotosIndex {
        photos: &'a [Photo],
    },
    SequencePhoto {
        sequence: &'a str,
        photo: &'a Photo,

        /// The photo's description rendered to HTML.
        description: String,
    },
    Talk {
        talk: &'a Talk,
    },
    TalksIndex {
        talks: &'a [Talk],
    },
}

impl View<'_> {
    fn fields(&self) -> Vec<(&'static str, Value)> {
        match self {
            View::Article { article } => vec![
                ("Article", Value::from(*article)),
                ("PublishingInfo", string(&article.publishing_info())),
            ],
            View::ArticlesIndex { by_year } => vec![("ArticlesByYear", year_groups(by_year))],
            View::Fragment { fragment } => vec![
                ("Fragment", Value::from(*fragment)),
                ("PublishingInfo", string(&fragment.publishing_info())),
            ],
            View::FragmentsIndex { by_year } => vec![("FragmentsByYear", year_groups(by_year))],
            View::Home {
                articles,
                fragments,
                photo,
            } => vec![
                ("Articles", list(articles.iter())),
                ("Fragments", list(fragments.iter())),
                (
                    "Photo",
                    match photo {
                        Some(photo) => Value::from(*photo),
                        None => Value::Nil,
                    },
                ),
            ],
            View::Page => Vec::new(),
            View::Passage { passage, in_email } => vec![
                ("Passage", Value::from(*passage)),
                ("InEmail", Value::Bool(*in_email)),
            ],
            View::PassagesIndex { passages } => vec![("Passages", list(passages.iter()))],
            View::PhotosIndex { photos } => vec![("Photos", list(photos.iter()))],
            View::SequencePhoto {
                sequence,
                photo,
                description,
            } => vec![
                ("SequenceName", string(sequence)),
                ("Photo", Value::from(*photo)),
                ("Description", string(description)),
            ],
            View::Talk { talk } => vec![
                ("Talk", Value::from(*talk)),
                ("PublishingInfo", string(&talk.publishing_info())),
            ],
            View::TalksIndex { talks } => vec![("Talks", list(talks.iter()))],
        }
    }
}

/// Merges site-wide settings, `base` and `view` into one template value.
/// View fields win over base fields of the same name.
pub fn locals(config: &Config, base: Base, view: View) -> Value {
    let mut fields = vec![
        ("BodyClass", string(&base.body_class)),
        (
            "GoogleAnalyticsID",
            optional(config.google_analytics_id.as_deref()),
        ),
        ("Release", string(&config.release)),
        ("SiteURL", string(config.site_url.as_str())),
        ("Title", string(&base.title)),
        (
            "TwitterCard",
            base.twitter_card
                .as_ref()
                .map(Value::from)
                .unwrap_or(Value::Nil),
        ),
        ("ViewportWidth", string(&base.viewport_width)),
    ];
    fields.extend(view.fields());
    object(fields)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;
    use url::Url;

    fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
        match value {
            Value::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    fn is_string(value: Option<&Value>, expected: &str) -> bool {
        matches!(value, Some(Value::String(s)) if s == expected)
    }

    #[test]
    fn test_locals_merge_base_and_view() -> Result<(), url::ParseError> {
        let config = Config::new(
            Path::new("/site"),
            Path::new("/site/public"),
            Url::parse("https://example.org")?,
        );
        let value = locals(
            &config,
            Base::new("Photos")
                .with_body_class("photos")
                .with_viewport_width("600"),
            View::PhotosIndex { photos: &[] },
        );
        assert!(is_string(field(&value, "Title"), "Photos"));
        assert!(is_string(field(&value, "BodyClass"), "photos"));
        assert!(is_string(field(&value, "ViewportWidth"), "600"));
        assert!(is_string(field(&value, "Release"), "1"));
        assert!(matches!(field(&value, "TwitterCard"), Some(Value::Nil)));
        assert!(matches!(field(&value, "Photos"), Some(Value::Array(photos)) if photos.is_empty()));
        Ok(())
    }
}
