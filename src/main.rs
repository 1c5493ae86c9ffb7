use anyhow::{Context as _, Result};
use clap::{App, Arg, ArgMatches};
use kenaz::build::{BuildLoop, Site};
use kenaz::config::{Config, Overrides};
use log::error;
use std::path::PathBuf;
use std::time::Duration;

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    }
}

/// Returns whether the build succeeded. Never returns in watch mode.
fn run() -> Result<bool> {
    let matches = app().get_matches();
    init_logger(matches.is_present("verbose") || env_flag("VERBOSE"));

    let config = Config::from_directory(
        &PathBuf::from(matches.value_of("source").unwrap_or(".")),
        overrides(&matches)?,
    )?;
    let mut build = BuildLoop::new(Site::new(config))?;

    if matches.is_present("watch") {
        let interval: u64 = matches
            .value_of("interval")
            .unwrap_or("2")
            .parse()
            .context("Parsing --interval")?;
        build.watch(Duration::from_secs(interval));
    }

    let report = build.run_once()?;
    for err in report.errors() {
        error!("{}", err);
    }
    Ok(report.succeeded())
}

fn app() -> App<'static, 'static> {
    App::new("kenaz")
        .about("Builds a static site incrementally, rebuilding only what changed")
        .arg(
            Arg::with_name("source")
                .help("The site directory, or any directory beneath it")
                .index(1),
        )
        .arg(
            Arg::with_name("target")
                .long("target")
                .short("t")
                .takes_value(true)
                .env("TARGET_DIR")
                .help("Where to write the built site"),
        )
        .arg(
            Arg::with_name("concurrency")
                .long("concurrency")
                .short("c")
                .takes_value(true)
                .env("CONCURRENCY")
                .help("The number of build workers"),
        )
        .arg(
            Arg::with_name("drafts")
                .long("drafts")
                .help("Build drafts alongside published content (or set DRAFTS=true)"),
        )
        .arg(
            Arg::with_name("force")
                .long("force")
                .short("f")
                .help("Rebuild everything, ignoring change records"),
        )
        .arg(
            Arg::with_name("watch")
                .long("watch")
                .short("w")
                .help("Keep rebuilding on an interval"),
        )
        .arg(
            Arg::with_name("interval")
                .long("interval")
                .takes_value(true)
                .requires("watch")
                .help("Seconds between rebuilds in watch mode (default 2)"),
        )
        .arg(
            Arg::with_name("verbose")
                .long("verbose")
                .short("v")
                .help("Log skipped jobs and other details (or set VERBOSE=true)"),
        )
}

fn overrides(matches: &ArgMatches) -> Result<Overrides> {
    Ok(Overrides {
        target_directory: matches.value_of("target").map(PathBuf::from),
        concurrency: matches
            .value_of("concurrency")
            .map(str::parse::<usize>)
            .transpose()
            .context("Parsing --concurrency")?,
        drafts: matches.is_present("drafts") || env_flag("DRAFTS"),
        force: matches.is_present("force"),
    })
}

/// `RUST_LOG` wins over the default level.
fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes")
    )
}
