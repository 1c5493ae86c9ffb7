//! Splits source files into YAML frontmatter and body, and parses the
//! timestamps that frontmatter carries.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use std::fmt;

const FENCE: &str = "---";

/// Parses the frontmatter of `input` into `T` and returns it along with the
/// body that follows the closing fence.
pub fn split<T: DeserializeOwned>(input: &str) -> Result<(T, &str)> {
    let (yaml_start, yaml_stop, body_start) = indices(input)?;
    let frontmatter: T = serde_yaml::from_str(&input[yaml_start..yaml_stop])?;
    Ok((frontmatter, input[body_start..].trim_start_matches(['\r', '\n'])))
}

fn indices(input: &str) -> Result<(usize, usize, usize)> {
    if !input.starts_with(FENCE) {
        return Err(Error::MissingStartFence);
    }
    match input[FENCE.len()..].find("\n---") {
        None => Err(Error::MissingEndFence),
        Some(offset) => {
            let yaml_stop = FENCE.len() + offset + 1;
            Ok((
                FENCE.len(),             // yaml_start
                yaml_stop,               // yaml_stop
                yaml_stop + FENCE.len(), // body_start
            ))
        }
    }
}

/// Parses either an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (taken as
/// midnight UTC).
pub fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(date_time) => Ok(date_time.with_timezone(&Utc)),
        Err(rfc_err) => match NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            Some(midnight) => Ok(Utc.from_utc_datetime(&midnight)),
            None => Err(rfc_err),
        },
    }
}

/// For `#[serde(deserialize_with)]` on optional timestamp fields. A missing
/// field is `None` so validation can report it by name.
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) => parse_timestamp(s.trim())
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid timestamp `{}`: {}", s, e))),
    }
}

/// Represents the result of a frontmatter parse.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error splitting or parsing frontmatter.
#[derive(Debug)]
pub enum Error {
    /// Returned when a source file doesn't begin with `---`.
    MissingStartFence,

    /// Returned when the starting fence was found but the closing one wasn't.
    MissingEndFence,

    /// Returned when the frontmatter isn't valid YAML for the target type.
    Yaml(serde_yaml::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingStartFence => write!(f, "Source must begin with `---`"),
            Error::MissingEndFence => write!(f, "Missing closing `---`"),
            Error::Yaml(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MissingStartFence => None,
            Error::MissingEndFence => None,
            Error::Yaml(err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::Yaml(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Datelike;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Meta {
        title: Option<String>,
        #[serde(default, deserialize_with = "deserialize_timestamp")]
        published_at: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_split() -> Result<()> {
        let input = "---\ntitle: Hello\npublished_at: 2021-06-01\n---\n\n# Hi\n\nBody with --- dashes.\n";
        let (meta, body): (Meta, &str) = split(input)?;
        assert_eq!(Some("Hello".to_owned()), meta.title);
        assert_eq!(2021, meta.published_at.unwrap().year());
        assert_eq!("# Hi\n\nBody with --- dashes.\n", body);
        Ok(())
    }

    #[test]
    fn test_missing_fields_are_none() -> Result<()> {
        let (meta, _): (Meta, &str) = split("---\nlocation: Berlin\n---\nbody")?;
        assert!(meta.title.is_none());
        assert!(meta.published_at.is_none());
        Ok(())
    }

    #[test]
    fn test_fences() {
        assert!(matches!(
            split::<Meta>("title: x\n"),
            Err(Error::MissingStartFence)
        ));
        assert!(matches!(
            split::<Meta>("---\ntitle: x\n"),
            Err(Error::MissingEndFence)
        ));
    }

    #[test]
    fn test_parse_timestamp() {
        let t = parse_timestamp("2020-01-01T10:30:00-08:00").unwrap();
        assert_eq!("2020-01-01T18:30:00+00:00", t.to_rfc3339());
        let d = parse_timestamp("2020-01-01").unwrap();
        assert_eq!("2020-01-01T00:00:00+00:00", d.to_rfc3339());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
