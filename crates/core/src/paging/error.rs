//! Error taxonomy for paginated loading.

use thiserror::Error;

/// Errors raised by [`PaginatedLoader`](super::PaginatedLoader) operations.
#[derive(Debug, Error)]
pub enum PagingError {
    /// A negative page or item index was passed to a lookup.
    #[error("invalid {what} index {index}")]
    InvalidArgument {
        /// Which kind of index was rejected.
        what: &'static str,
        /// The rejected value.
        index: i64,
    },

    /// The injected fetch capability failed.
    #[error("data source failed to fetch page {page}")]
    DataSource {
        /// Page whose fetch failed.
        page: usize,
        /// Underlying failure reported by the source.
        #[source]
        source: anyhow::Error,
    },

    /// The injected count provider failed.
    #[error("count provider failed")]
    Count(#[source] anyhow::Error),

    /// The background prefetch task panicked or was cancelled.
    #[error("prefetch of page {page} did not complete")]
    Prefetch {
        /// Page the task was prefetching.
        page: usize,
        /// Join failure reported by the runtime.
        #[source]
        source: tokio::task::JoinError,
    },

    /// `prefetch` was called outside of a tokio runtime.
    #[error("prefetch requires a tokio runtime")]
    NoRuntime,
}

impl PagingError {
    pub(crate) fn invalid_page(index: i64) -> Self {
        Self::InvalidArgument {
            what: "page",
            index,
        }
    }

    /// Whether this error was raised by a caller-supplied capability.
    pub fn is_source_failure(&self) -> bool {
        matches!(self, Self::DataSource { .. } | Self::Count(_))
    }
}

/// Result alias for paging operations.
pub type PagingResult<T> = Result<T, PagingError>;
