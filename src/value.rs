//! Conversions from content items into template values. Field names follow
//! Go template conventions (`{{.Title}}`, `{{.PublishedAt}}`).

use crate::aggregate::YearGroup;
use crate::article::{Article, Fragment};
use crate::content::DISPLAY_DATE;
use crate::passage::Passage;
use crate::photo::Photo;
use crate::talk::Talk;
use crate::view::TwitterCard;
use chrono::{DateTime, Utc};
use gtmpl_value::Value;
use std::collections::HashMap;

/// Builds an object value from `(key, value)` pairs.
pub fn object<I>(fields: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value))
            .collect::<HashMap<String, Value>>(),
    )
}

pub fn string(s: &str) -> Value {
    Value::String(s.to_owned())
}

/// `Some(s)` as a string, `None` as nil so `{{if}}` sees it as false.
pub fn optional(s: Option<&str>) -> Value {
    match s {
        Some(s) => string(s),
        None => Value::Nil,
    }
}

pub fn list<'a, T: 'a, I>(items: I) -> Value
where
    I: IntoIterator<Item = &'a T>,
    &'a T: Into<Value>,
{
    Value::Array(items.into_iter().map(Into::into).collect())
}

/// Groups as `[{Year, Items}]`.
pub fn year_groups<'a, T: 'a>(groups: &[YearGroup<'a, T>]) -> Value
where
    &'a T: Into<Value>,
{
    Value::Array(
        groups
            .iter()
            .map(|group| {
                object(vec![
                    ("Year", Value::String(group.year.to_string())),
                    ("Items", list(group.items.iter().copied())),
                ])
            })
            .collect(),
    )
}

fn date(t: &DateTime<Utc>) -> Value {
    Value::String(t.format(DISPLAY_DATE).to_string())
}

fn iso(t: &DateTime<Utc>) -> Value {
    Value::String(t.to_rfc3339())
}

impl From<&Article> for Value {
    fn from(a: &Article) -> Value {
        object(vec![
            ("Attributions", string(&a.attributions)),
            ("Content", optional(a.content.as_deref())),
            ("Draft", Value::Bool(a.draft)),
            ("HNLink", string(&a.hn_link)),
            ("Hook", string(&a.hook)),
            ("HookImageURL", optional(a.hook_image_url.as_deref())),
            ("Image", string(&a.image)),
            ("Location", string(&a.location)),
            ("PublishedAt", date(&a.published_at)),
            ("PublishedAtISO", iso(&a.published_at)),
            ("Slug", string(&a.slug)),
            ("Tags", Value::Array(a.tags.iter().map(|t| string(t)).collect())),
            ("Title", string(&a.title)),
            ("TOC", string(&a.toc)),
        ])
    }
}

impl From<&Fragment> for Value {
    fn from(f: &Fragment) -> Value {
        object(vec![
            ("Attributions", string(&f.attributions)),
            ("Content", optional(f.content.as_deref())),
            ("Draft", Value::Bool(f.draft)),
            ("HNLink", string(&f.hn_link)),
            ("Hook", string(&f.hook)),
            ("Image", string(&f.image)),
            ("Location", string(&f.location)),
            ("PublishedAt", date(&f.published_at)),
            ("PublishedAtISO", iso(&f.published_at)),
            ("Slug", string(&f.slug)),
            ("Title", string(&f.title)),
        ])
    }
}

impl From<&Passage> for Value {
    fn from(p: &Passage) -> Value {
        object(vec![
            ("Content", optional(p.content.as_deref())),
            ("Draft", Value::Bool(p.draft)),
            ("Issue", string(&p.issue)),
            ("PublishedAt", date(&p.published_at)),
            ("PublishedAtISO", iso(&p.published_at)),
            ("Slug", string(&p.slug)),
            ("Title", string(&p.title)),
        ])
    }
}

impl From<&Talk> for Value {
    fn from(t: &Talk) -> Value {
        object(vec![
            ("Content", optional(t.content.as_deref())),
            ("Draft", Value::Bool(t.draft)),
            ("Event", string(&t.event)),
            ("Location", string(&t.location)),
            ("PublishedAt", date(&t.published_at)),
            ("PublishedAtISO", iso(&t.published_at)),
            ("Slug", string(&t.slug)),
            ("Title", string(&t.title)),
        ])
    }
}

impl From<&Photo> for Value {
    fn from(p: &Photo) -> Value {
        object(vec![
            ("Description", string(&p.description)),
            ("KeepInHomeRotation", Value::Bool(p.keep_in_home_rotation)),
            ("OccurredAt", date(&p.occurred_at)),
            ("OccurredAtISO", iso(&p.occurred_at)),
            ("OriginalImageURL", string(&p.original_image_url)),
            ("Slug", string(&p.slug)),
            ("Title", string(&p.title)),
        ])
    }
}

impl From<&TwitterCard> for Value {
    fn from(card: &TwitterCard) -> Value {
        object(vec![
            ("Title", string(&card.title)),
            ("Description", string(&card.description)),
            ("ImageURL", optional(card.image_url.as_deref())),
        ])
    }
}
