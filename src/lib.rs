//! The library code for the `kenaz` static site builder. A build is broken
//! into phases of independent jobs run on a worker pool:
//!
//! 1. Rendering every content item to its own page ([`crate::article`],
//!    [`crate::passage`], [`crate::talk`], [`crate::page`]) while collecting
//!    the items into shared collections ([`crate::aggregate`])
//! 2. Rendering what needs whole collections: indices ([`crate::index`]),
//!    Atom feeds ([`crate::feed`]) and photos ([`crate::photo`])
//!
//! Phase 2 never starts before every phase-1 job has finished
//! ([`crate::pool::Pool::wait`]).
//!
//! Builds are incremental. Every job reads its inputs through a
//! [`crate::context::Context`], which asks the [`crate::tracker`] whether
//! they changed since they were last built. A job whose inputs didn't change
//! skips its work; a job that succeeds records what it read so the next run
//! can skip it.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod aggregate;
pub mod article;
pub mod assets;
pub mod build;
pub mod config;
pub mod content;
pub mod context;
pub mod feed;
pub mod frontmatter;
pub mod index;
pub mod job;
pub mod markdown;
pub mod page;
pub mod passage;
pub mod photo;
pub mod pool;
pub mod talk;
pub mod templates;
pub mod tracker;
pub mod util;
pub mod value;
pub mod view;
