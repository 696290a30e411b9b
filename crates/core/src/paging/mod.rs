//! Paginated loading with a bounded page cache and background prefetch.
//!
//! Large lists (achievements, leaderboards, statistics) are browsed one page
//! at a time through a [`PaginatedLoader`]. Pages are fetched on demand from
//! an injected [`DataSource`], kept in a small [`PageCache`], and can be
//! warmed ahead of the cursor with [`PaginatedLoader::prefetch`].

use std::sync::Arc;

/// Bounded page cache and eviction policies.
pub mod cache;
/// Memoized total count.
pub mod count;
/// Error taxonomy.
pub mod error;
/// Page orchestration, navigation, and prefetch.
pub mod loader;
/// Injected fetch and count capabilities.
pub mod source;

pub use cache::{EvictionPolicy, PageCache};
pub use count::{page_count, TotalCount};
pub use error::{PagingError, PagingResult};
pub use loader::{LoaderOptions, LoaderStatus, PaginatedLoader, PrefetchTask};
pub use source::{CountProvider, DataSource, JsonFileSource, VecSource};

/// One materialized page. Shared so cache hits hand out the same allocation.
pub type Page<T> = Arc<[T]>;
