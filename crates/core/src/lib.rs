#![warn(clippy::all, missing_docs)]

//! Core logic for the saga campaign browser.
//!
//! This crate hosts the paginated loader used to browse large lists
//! (achievements, leaderboards, statistics) without materializing them,
//! plus the configuration, record models, and data-directory plumbing
//! used by the terminal UI and any future frontends.

pub mod catalog;
pub mod config;
pub mod models;
pub mod paging;
pub mod watch;

pub use catalog::{Catalog, Collection};
pub use config::AppConfig;
pub use models::Record;
pub use paging::{
    CountProvider, DataSource, LoaderOptions, LoaderStatus, Page, PaginatedLoader, PagingError,
    PagingResult,
};
pub use watch::{SourceWatcher, WatchEvent};
