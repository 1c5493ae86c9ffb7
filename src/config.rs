use crate::util::open;
use anyhow::{anyhow, Context as _, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// The name of the project file that marks a site's root directory.
pub const PROJECT_FILE: &str = "kenaz.yaml";

/// The file, relative to the target directory, that change records persist
/// to between runs.
pub const TRACKER_FILE: &str = ".kenaz-changes.yaml";

fn default_title() -> String {
    String::from("Untitled Site")
}

fn default_release() -> String {
    String::from("1")
}

fn default_concurrency() -> usize {
    30
}

fn default_num_atom_entries() -> usize {
    20
}

fn default_target_directory() -> PathBuf {
    PathBuf::from("public")
}

fn default_temp_directory() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_resize_timeout_secs() -> u64 {
    120
}

#[derive(Deserialize)]
struct Project {
    site_url: Url,

    #[serde(default = "default_title")]
    title: String,

    #[serde(default)]
    author: Author,

    #[serde(default = "default_release")]
    release: String,

    #[serde(default = "default_concurrency")]
    concurrency: usize,

    #[serde(default)]
    drafts: bool,

    #[serde(default = "default_num_atom_entries")]
    num_atom_entries: usize,

    #[serde(default)]
    feed_tags: Vec<String>,

    #[serde(default)]
    google_analytics_id: Option<String>,

    #[serde(default = "default_target_directory")]
    target_directory: PathBuf,

    #[serde(default = "default_temp_directory")]
    temp_directory: PathBuf,

    #[serde(default = "default_resize_timeout_secs")]
    resize_timeout_secs: u64,
}

/// The author credited in Atom feeds.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub uri: Option<String>,
}

/// Settings from the command line that take precedence over the project
/// file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub target_directory: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub drafts: bool,
    pub force: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// The project root: the directory containing `kenaz.yaml`, and beneath
    /// it `content/`, `layouts/`, `pages/` and `views/`.
    pub source_directory: PathBuf,
    pub target_directory: PathBuf,

    /// Where originals are downloaded before resizing.
    pub temp_directory: PathBuf,

    /// Where change records persist between runs.
    pub tracker_path: PathBuf,

    /// The absolute URL the built site is served from.
    pub site_url: Url,
    pub title: String,
    pub author: Author,

    /// The asset version. Versioned assets are written to
    /// `{target}/assets/{release}/`.
    pub release: String,

    /// The number of build workers.
    pub concurrency: usize,

    /// Whether drafts are built alongside published content.
    pub drafts: bool,

    /// Whether every job should run regardless of change records.
    pub force: bool,
    pub num_atom_entries: usize,

    /// Tags that get their own articles feed (`articles-{tag}.atom`).
    pub feed_tags: Vec<String>,
    pub google_analytics_id: Option<String>,

    /// How long an image resize may run before it's killed.
    pub resize_timeout: Duration,
}

impl Config {
    /// Searches `dir` and its ancestors for `kenaz.yaml` and loads the first
    /// one found.
    pub fn from_directory(dir: &Path, overrides: Overrides) -> Result<Config> {
        let dir = dir
            .canonicalize()
            .with_context(|| format!("Resolving source directory `{}`", dir.display()))?;
        for ancestor in dir.ancestors() {
            let path = ancestor.join(PROJECT_FILE);
            if path.is_file() {
                return Config::from_project_file(&path, overrides)
                    .with_context(|| format!("Loading configuration `{}`", path.display()));
            }
        }
        Err(anyhow!(
            "Could not find `{}` in any parent directory of `{}`",
            PROJECT_FILE,
            dir.display()
        ))
    }

    pub fn from_project_file(path: &Path, overrides: Overrides) -> Result<Config> {
        let project: Project = serde_yaml::from_reader(open(path, "project")?)?;
        let root = path.parent().ok_or_else(|| {
            anyhow!(
                "Can't get parent directory for provided project file path '{:?}'",
                path
            )
        })?;

        let target_directory = match overrides.target_directory {
            Some(dir) => dir,
            None => root.join(&project.target_directory),
        };
        Ok(Config {
            source_directory: root.to_owned(),
            tracker_path: target_directory.join(TRACKER_FILE),
            temp_directory: root.join(&project.temp_directory),
            target_directory,
            site_url: project.site_url,
            title: project.title,
            author: project.author,
            release: project.release,
            concurrency: overrides.concurrency.unwrap_or(project.concurrency).max(1),
            drafts: overrides.drafts || project.drafts,
            force: overrides.force,
            num_atom_entries: project.num_atom_entries,
            feed_tags: project.feed_tags,
            google_analytics_id: project.google_analytics_id,
            resize_timeout: Duration::from_secs(project.resize_timeout_secs),
        })
    }

    /// A configuration with every default filled in, for a site rooted at
    /// `source_directory` and built into `target_directory`.
    pub fn new(source_directory: &Path, target_directory: &Path, site_url: Url) -> Config {
        Config {
            source_directory: source_directory.to_owned(),
            target_directory: target_directory.to_owned(),
            temp_directory: source_directory.join(default_temp_directory()),
            tracker_path: target_directory.join(TRACKER_FILE),
            site_url,
            title: default_title(),
            author: Author::default(),
            release: default_release(),
            concurrency: default_concurrency(),
            drafts: false,
            force: false,
            num_atom_entries: default_num_atom_entries(),
            feed_tags: Vec::new(),
            google_analytics_id: None,
            resize_timeout: Duration::from_secs(default_resize_timeout_secs()),
        }
    }

    /// The directory versioned assets are written to.
    pub fn versioned_assets_directory(&self) -> PathBuf {
        self.target_directory.join("assets").join(&self.release)
    }

    /// The absolute URL of `path` on the site.
    pub fn url(&self, path: &str) -> String {
        match self.site_url.join(path) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}/{}", self.site_url.as_str().trim_end_matches('/'), path),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn test_from_directory_walks_up() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join(PROJECT_FILE),
            "site_url: https://example.org\ntitle: Example\nconcurrency: 4\nfeed_tags: [postgres]\n",
        )?;
        let nested = dir.path().join("content").join("articles");
        fs::create_dir_all(&nested)?;

        let config = Config::from_directory(&nested, Overrides::default())?;
        assert_eq!(dir.path().canonicalize()?, config.source_directory);
        assert_eq!("Example", config.title);
        assert_eq!(4, config.concurrency);
        assert_eq!(20, config.num_atom_entries);
        assert_eq!(vec!["postgres".to_owned()], config.feed_tags);
        assert_eq!(config.source_directory.join("public"), config.target_directory);
        assert_eq!(
            config.target_directory.join(TRACKER_FILE),
            config.tracker_path
        );
        Ok(())
    }

    #[test]
    fn test_overrides_win() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(PROJECT_FILE);
        fs::write(&path, "site_url: https://example.org\n")?;

        let config = Config::from_project_file(
            &path,
            Overrides {
                target_directory: Some(PathBuf::from("/tmp/out")),
                concurrency: Some(0),
                drafts: true,
                force: true,
            },
        )?;
        assert_eq!(PathBuf::from("/tmp/out"), config.target_directory);
        assert_eq!(1, config.concurrency);
        assert!(config.drafts);
        assert!(config.force);
        Ok(())
    }

    #[test]
    fn test_missing_site_url_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(PROJECT_FILE);
        fs::write(&path, "title: No URL\n")?;
        assert!(Config::from_project_file(&path, Overrides::default()).is_err());
        Ok(())
    }

    #[test]
    fn test_url() -> Result<()> {
        let config = Config::new(
            Path::new("."),
            Path::new("public"),
            Url::parse("https://example.org")?,
        );
        assert_eq!("https://example.org/fragments/a", config.url("fragments/a"));
        Ok(())
    }
}
