//! Exports [`build`], which runs one build of a site in phases, and
//! [`BuildLoop`], which owns the change records across runs.
//!
//! A build has three phases:
//!
//! 0. Preparing the target directory. Failures here abort the build before
//!    any job runs.
//! 1. One job per content item (articles, fragments, passages, talks,
//!    pages, photo and sequence manifests) plus the asset bundles. Items are
//!    appended to shared [`Collection`]s as their jobs finish.
//! 2. Jobs that read whole collections: indices, feeds, the home page,
//!    sequence pages and photo downloads. Phase 2 is only submitted once
//!    every phase-1 job has finished without error.
//!
//! Whatever the outcome, the fingerprints observed by successful jobs are
//! committed to the tracker after the last phase. Anything read by a failed
//! job is forgotten instead, so it is rebuilt by the next run. When phase 2
//! doesn't run, the inputs that mark collections changed are forgotten too.

use crate::aggregate::{Aggregate, Collection, StillShared};
use crate::article::{render_article, render_fragment, Article, Fragment};
use crate::assets::{compile_javascripts, compile_stylesheets, render_robots_txt};
use crate::config::Config;
use crate::content::{self, source_dirs};
use crate::context::Context;
use crate::feed::{render_articles_feed, render_fragments_feed};
use crate::index::{
    render_articles_index, render_fragments_index, render_home, render_passages_index,
    render_photos_index, render_sequence_photo, render_talks_index,
};
use crate::job::{BoxError, Job, JobError};
use crate::page;
use crate::passage::{render_passage, Passage};
use crate::photo::{
    fetch_and_resize, read_photos, Fetcher, GraphicsMagick, HttpFetcher, Photo, Resizer, Sequence,
};
use crate::pool::{PhaseReport, Pool};
use crate::talk::{render_talk, Talk};
use crate::tracker::{self, ChangeTracker};
use crate::util::{ensure_dir, ensure_symlink, read_dir, read_subdirs};
use log::{error, info, warn};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Directories created under the target before phase 1.
const OUTPUT_DIRECTORIES: [&str; 6] = [
    "articles",
    "fragments",
    "passages",
    "photos",
    "sequences",
    "talks",
];

/// Directories under `content/` that are served as-is, via a symlink from
/// the target.
const LINKED_DIRECTORIES: [&str; 3] = ["fonts", "images", "photographs"];

/// Where photos are fetched and resized into, relative to the source root.
const PHOTOGRAPHS: &str = "content/photographs";

/// Everything a build needs besides the per-run [`Context`].
#[derive(Clone)]
pub struct Site {
    pub config: Arc<Config>,
    pub fetcher: Arc<dyn Fetcher>,
    pub resizer: Arc<dyn Resizer>,
}

impl Site {
    /// A site that fetches over HTTP and resizes with GraphicsMagick.
    pub fn new(config: Config) -> Site {
        let resizer = GraphicsMagick {
            timeout: config.resize_timeout,
        };
        Site {
            config: Arc::new(config),
            fetcher: Arc::new(HttpFetcher::new()),
            resizer: Arc::new(resizer),
        }
    }
}

/// The outcome of every phase that ran. A phase that failed is the last
/// one in the report.
#[derive(Debug, Default)]
pub struct Report {
    pub phases: Vec<PhaseReport>,
}

impl Report {
    /// True if no job of any phase failed.
    pub fn succeeded(&self) -> bool {
        self.phases.iter().all(PhaseReport::succeeded)
    }

    pub fn errors(&self) -> impl Iterator<Item = &JobError> {
        self.phases.iter().flat_map(|phase| phase.errors.iter())
    }

    /// The names of the jobs that did their work rather than skipping.
    pub fn executed(&self) -> impl Iterator<Item = &str> {
        self.phases
            .iter()
            .flat_map(|phase| phase.executed.iter().map(String::as_str))
    }
}

/// Builds the site once. Returns `Err` only for failures before phase 1 or
/// between phases; job failures are in the [`Report`].
pub fn build(site: &Site, ctx: &Context) -> Result<Report> {
    prepare_target(ctx, &site.config)?;

    let mut pool = Pool::new(site.config.concurrency, ctx);
    let result = run_phases(site, ctx, &mut pool);
    ctx.commit();
    result?;
    Ok(Report {
        phases: pool.finish(),
    })
}

fn run_phases(site: &Site, ctx: &Context, pool: &mut Pool) -> Result<()> {
    let collections = Collections::default();
    let plan = phase_one(site, ctx, &collections)?;
    for job in plan.jobs {
        pool.submit(job);
    }
    if !pool.wait() {
        warn!("Phase 1 failed; skipping the jobs that depend on it");
        for input in &plan.collection_inputs {
            ctx.forget(input);
        }
        return Ok(());
    }

    let aggregates = collections.settle()?;
    for job in phase_two(site, aggregates) {
        pool.submit(job);
    }
    pool.wait();
    Ok(())
}

fn prepare_target(ctx: &Context, config: &Config) -> Result<()> {
    let mut dirs: Vec<PathBuf> = OUTPUT_DIRECTORIES
        .iter()
        .map(|dir| ctx.target(dir))
        .collect();
    dirs.push(config.versioned_assets_directory());
    dirs.push(config.temp_directory.clone());
    for dir in dirs {
        ensure_dir(&dir).map_err(|err| Error::Io {
            path: dir.clone(),
            op: "creating directory",
            err,
        })?;
    }

    for name in LINKED_DIRECTORIES.iter() {
        let link = ctx.target(name);
        ensure_symlink(&ctx.source("content").join(name), &link).map_err(|err| Error::Io {
            path: link.clone(),
            op: "linking",
            err,
        })?;
    }
    Ok(())
}

#[derive(Default)]
struct Collections {
    articles: Collection<Article>,
    fragments: Collection<Fragment>,
    passages: Collection<Passage>,
    talks: Collection<Talk>,
    photos: Collection<Photo>,
    sequences: Collection<Sequence>,
}

/// The phase-1 collections, sorted, as phase 2 reads them.
struct Aggregates {
    articles: Aggregate<Article>,
    fragments: Aggregate<Fragment>,
    passages: Aggregate<Passage>,
    talks: Aggregate<Talk>,
    photos: Aggregate<Photo>,
    sequences: Aggregate<Sequence>,
}

impl Collections {
    fn settle(self) -> std::result::Result<Aggregates, StillShared> {
        Ok(Aggregates {
            articles: self.articles.into_sorted_by(|a| a.published_at)?,
            fragments: self.fragments.into_sorted_by(|f| f.published_at)?,
            passages: self.passages.into_sorted_by(|p| p.published_at)?,
            talks: self.talks.into_sorted_by(|t| t.published_at)?,
            photos: self.photos.into_sorted_by(|p| p.occurred_at)?,
            sequences: self.sequences.into_aggregate()?,
        })
    }
}

/// The phase-1 jobs, and the inputs whose changes mark the collections
/// changed: directory listings and photo manifests.
struct Plan {
    jobs: Vec<Job>,
    collection_inputs: Vec<PathBuf>,
}

fn phase_one(site: &Site, ctx: &Context, collections: &Collections) -> Result<Plan> {
    let config = &site.config;
    let mut plan = Plan {
        jobs: Vec::new(),
        collection_inputs: Vec::new(),
    };

    item_jobs(
        &mut plan,
        config,
        source_dirs(config, "articles", "drafts"),
        &collections.articles,
        render_article,
    )?;
    item_jobs(
        &mut plan,
        config,
        source_dirs(config, "fragments", "fragments-drafts"),
        &collections.fragments,
        render_fragment,
    )?;
    item_jobs(
        &mut plan,
        config,
        source_dirs(config, "passages", "passages-drafts"),
        &collections.passages,
        render_passage,
    )?;
    item_jobs(
        &mut plan,
        config,
        source_dirs(config, "talks", "talks-drafts"),
        &collections.talks,
        render_talk,
    )?;
    plan.jobs.extend(page_jobs(config, ctx)?);
    photos_job(&mut plan, ctx, &collections.photos);
    sequence_jobs(&mut plan, config, &collections.sequences)?;

    let cfg = config.clone();
    plan.jobs.push(Job::new("app.js", move |ctx| compile_javascripts(ctx, &cfg)));
    let cfg = config.clone();
    plan.jobs.push(Job::new("app.css", move |ctx| compile_stylesheets(ctx, &cfg)));
    let cfg = config.clone();
    plan.jobs.push(Job::new("robots.txt", move |ctx| render_robots_txt(ctx, &cfg)));

    Ok(plan)
}

/// One job per file in `dirs`, each rendering its item with `render` and
/// appending it to `collection`. An item whose job fails is never appended.
///
/// One more job records which files were listed, keyed by the first of
/// `dirs`, and marks the collection changed when that set differs from the
/// last build's, so removing a file rebuilds the pages that listed it.
fn item_jobs<T, R>(
    plan: &mut Plan,
    config: &Arc<Config>,
    dirs: Vec<PathBuf>,
    collection: &Collection<T>,
    render: R,
) -> Result<()>
where
    T: Send + 'static,
    R: Fn(&Context, &Config, &Path) -> content::Result<(T, bool)> + Copy + Send + 'static,
{
    let key = match dirs.first() {
        Some(dir) => dir.clone(),
        None => return Ok(()),
    };
    let mut members = Vec::new();
    for dir in dirs {
        for source in list(&dir, read_dir)? {
            let order = members.len();
            members.push(job_name(config, &source));
            let config = config.clone();
            let collection = collection.clone();
            plan.jobs.push(Job::new(
                job_name(&config, &source),
                move |ctx| -> content::Result<bool> {
                    let (item, executed) = render(ctx, &config, &source)?;
                    collection.push(order, item, executed);
                    Ok(executed)
                },
            ));
        }
    }

    let collection = collection.clone();
    plan.collection_inputs.push(key.clone());
    plan.jobs.push(Job::new(
        job_name(config, &key),
        move |ctx| -> tracker::Result<bool> {
            let changed = ctx.changed_members(&key, &members)?;
            if changed {
                collection.mark_changed();
            }
            Ok(changed)
        },
    ));
    Ok(())
}

/// One job per page. Pages read `pages/_meta.yaml` as loaded here, and are
/// forced when it changed since their last successful build.
fn page_jobs(config: &Arc<Config>, ctx: &Context) -> Result<Vec<Job>> {
    let meta = Arc::new(page::load_meta(ctx)?);

    let mut jobs = Vec::new();
    for source in page::sources(ctx)? {
        let config = config.clone();
        let meta = meta.clone();
        jobs.push(Job::new(job_name(&config, &source), move |ctx| {
            page::render_page(ctx, &config, &meta, &source)
        }));
    }
    Ok(jobs)
}

/// Reads a photo manifest and observes it. A missing manifest has no photos
/// and never counts as changed.
fn read_tracked_photos(ctx: &Context, path: &Path) -> content::Result<(Vec<Photo>, bool)> {
    let photos = read_photos(path)?;
    let changed = path.is_file() && ctx.changed(path)?;
    Ok((photos, changed))
}

fn photos_job(plan: &mut Plan, ctx: &Context, collection: &Collection<Photo>) {
    let path = ctx.source(PHOTOGRAPHS).join("_meta.yaml");
    let collection = collection.clone();
    plan.collection_inputs.push(path.clone());
    plan.jobs.push(Job::new(
        format!("{}/_meta.yaml", PHOTOGRAPHS),
        move |ctx| -> content::Result<bool> {
            let (photos, changed) = read_tracked_photos(ctx, &path)?;
            for (order, photo) in photos.into_iter().enumerate() {
                collection.push(order, photo, false);
            }
            if changed {
                collection.mark_changed();
            }
            Ok(changed)
        },
    ));
}

fn sequence_jobs(
    plan: &mut Plan,
    config: &Arc<Config>,
    collection: &Collection<Sequence>,
) -> Result<()> {
    for dir in source_dirs(config, "sequences", "sequences-drafts") {
        for sequence_dir in list(&dir, read_subdirs)? {
            let order = plan.jobs.len();
            let slug = sequence_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let path = sequence_dir.join("_meta.yaml");
            let collection = collection.clone();
            plan.collection_inputs.push(path.clone());
            plan.jobs.push(Job::new(
                job_name(config, &path),
                move |ctx| -> content::Result<bool> {
                    let (photos, changed) = read_tracked_photos(ctx, &path)?;
                    collection.push(
                        order,
                        Sequence {
                            slug,
                            photos,
                            changed,
                        },
                        changed,
                    );
                    Ok(changed)
                },
            ));
        }
    }
    Ok(())
}

fn phase_two(site: &Site, aggregates: Aggregates) -> Vec<Job> {
    let config = &site.config;
    let all = Arc::new(aggregates);
    let mut jobs = Vec::new();

    jobs.push(aggregate_job("articles/index.html", config, &all, |ctx, config, all| {
        render_articles_index(ctx, config, &all.articles.items, all.articles.changed)
    }));
    jobs.push(aggregate_job("articles.atom", config, &all, |ctx, config, all| {
        render_articles_feed(ctx, config, &all.articles.items, all.articles.changed, None)
    }));
    for tag in &config.feed_tags {
        let tag = tag.clone();
        jobs.push(aggregate_job(
            format!("articles-{}.atom", tag),
            config,
            &all,
            move |ctx, config, all| {
                render_articles_feed(
                    ctx,
                    config,
                    &all.articles.items,
                    all.articles.changed,
                    Some(&tag),
                )
            },
        ));
    }

    jobs.push(aggregate_job("fragments/index.html", config, &all, |ctx, config, all| {
        render_fragments_index(ctx, config, &all.fragments.items, all.fragments.changed)
    }));
    jobs.push(aggregate_job("fragments.atom", config, &all, |ctx, config, all| {
        render_fragments_feed(ctx, config, &all.fragments.items, all.fragments.changed)
    }));
    jobs.push(aggregate_job("passages/index.html", config, &all, |ctx, config, all| {
        render_passages_index(ctx, config, &all.passages.items, all.passages.changed)
    }));
    jobs.push(aggregate_job("talks/index.html", config, &all, |ctx, config, all| {
        render_talks_index(ctx, config, &all.talks.items, all.talks.changed)
    }));
    jobs.push(aggregate_job("index.html", config, &all, |ctx, config, all| {
        render_home(
            ctx,
            config,
            &all.articles.items,
            &all.fragments.items,
            &all.photos.items,
            all.articles.changed || all.fragments.changed || all.photos.changed,
        )
    }));

    jobs.push(aggregate_job("photos/index.html", config, &all, |ctx, config, all| {
        render_photos_index(ctx, config, &all.photos.items, all.photos.changed)
    }));
    for photo in &all.photos.items {
        jobs.push(fetch_job(site, PathBuf::from(PHOTOGRAPHS), photo.clone()));
    }

    for sequence in &all.sequences.items {
        let dir = Path::new(PHOTOGRAPHS).join("sequences").join(&sequence.slug);
        for photo in &sequence.photos {
            let slug = sequence.slug.clone();
            let changed = sequence.changed;
            let page_photo = photo.clone();
            jobs.push(aggregate_job(
                format!("sequences/{}/{}", slug, photo.slug),
                config,
                &all,
                move |ctx, config, _| {
                    render_sequence_photo(ctx, config, &slug, &page_photo, changed)
                },
            ));
            jobs.push(fetch_job(site, dir.clone(), photo.clone()));
        }
    }

    jobs
}

fn aggregate_job<F, E>(
    name: impl Into<String>,
    config: &Arc<Config>,
    all: &Arc<Aggregates>,
    render: F,
) -> Job
where
    F: FnOnce(&Context, &Config, &Aggregates) -> std::result::Result<bool, E> + Send + 'static,
    E: Into<BoxError>,
{
    let config = config.clone();
    let all = all.clone();
    Job::new(name, move |ctx| render(ctx, &config, &all))
}

/// Fetches and resizes `photo` into `dir` (relative to the source root).
fn fetch_job(site: &Site, dir: PathBuf, photo: Photo) -> Job {
    let fetcher = site.fetcher.clone();
    let resizer = site.resizer.clone();
    let temp_dir = site.config.temp_directory.clone();
    Job::new(
        format!("{}/{}", dir.display(), photo.slug),
        move |ctx| {
            fetch_and_resize(
                fetcher.as_ref(),
                resizer.as_ref(),
                &temp_dir,
                &ctx.source(&dir),
                &photo,
            )
        },
    )
}

fn list(dir: &Path, read: fn(&Path) -> io::Result<Vec<PathBuf>>) -> Result<Vec<PathBuf>> {
    read(dir).map_err(|err| Error::Io {
        path: dir.to_owned(),
        op: "listing",
        err,
    })
}

/// Names a job after its source, relative to the source root.
fn job_name(config: &Config, source: &Path) -> String {
    source
        .strip_prefix(&config.source_directory)
        .unwrap_or(source)
        .display()
        .to_string()
}

/// Runs builds against one [`ChangeTracker`], either once or on an interval.
pub struct BuildLoop {
    site: Site,
    tracker: Arc<ChangeTracker>,
    run: usize,
}

impl BuildLoop {
    /// Loads the change records saved by a previous process, if any.
    pub fn new(site: Site) -> Result<BuildLoop> {
        let tracker = ChangeTracker::load(&site.config.tracker_path)?;
        Ok(BuildLoop {
            site,
            tracker: Arc::new(tracker),
            run: 0,
        })
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Runs the next build and saves the change records.
    pub fn run_once(&mut self) -> Result<Report> {
        self.run += 1;
        let config = &self.site.config;
        let mut ctx = Context::new(
            config.source_directory.clone(),
            config.target_directory.clone(),
            self.tracker.clone(),
            self.run,
        );
        if config.force {
            ctx = ctx.forced_context();
        }

        info!("Starting build run {}", self.run);
        let result = build(&self.site, &ctx);
        self.tracker.save(&config.tracker_path)?;

        let report = result?;
        info!(
            "Build run {} finished: {} job(s) executed, {} error(s)",
            self.run,
            report.executed().count(),
            report.errors().count(),
        );
        Ok(report)
    }

    /// Rebuilds every `interval`, forever. Failures are logged and the loop
    /// carries on.
    pub fn watch(&mut self, interval: Duration) -> ! {
        loop {
            match self.run_once() {
                Ok(report) if report.succeeded() => {}
                Ok(report) => {
                    for err in report.errors() {
                        error!("{}", err);
                    }
                }
                Err(err) => error!("Build failed: {}", err),
            }
            thread::sleep(interval);
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site: anything that stops a build outside
/// of a job. Job errors are reported in the [`Report`] instead.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems preparing the target or listing sources.
    Io {
        path: PathBuf,
        op: &'static str,
        err: io::Error,
    },

    /// Returned for problems loading, reading or saving change records.
    Tracker(tracker::Error),

    /// Returned when shared metadata (`pages/_meta.yaml`) can't be read.
    Content(content::Error),

    /// Returned when a collection is taken while a job still holds it.
    Collection(StillShared),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, op, err } => write!(f, "{} '{}': {}", op, path.display(), err),
            Error::Tracker(err) => err.fmt(f),
            Error::Content(err) => err.fmt(f),
            Error::Collection(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { err, .. } => Some(err),
            Error::Tracker(err) => Some(err),
            Error::Content(err) => Some(err),
            Error::Collection(err) => Some(err),
        }
    }
}

impl From<tracker::Error> for Error {
    /// Converts [`tracker::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: tracker::Error) -> Error {
        Error::Tracker(err)
    }
}

impl From<content::Error> for Error {
    /// Converts [`content::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: content::Error) -> Error {
        Error::Content(err)
    }
}

impl From<StillShared> for Error {
    /// Converts [`StillShared`] into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: StillShared) -> Error {
        Error::Collection(err)
    }
}
