use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use parking_lot::Mutex;
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{
    cache::{EvictionPolicy, PageCache},
    count::{page_count, TotalCount},
    error::{PagingError, PagingResult},
    source::{CountProvider, DataSource},
    Page,
};

/// Items per page when the configured value is not positive.
pub const DEFAULT_PAGE_SIZE: usize = 20;
/// Resident pages when the configured value is not positive.
pub const DEFAULT_CACHE_CAPACITY: usize = 3;

/// Validated sizing for a [`PaginatedLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    page_size: usize,
    cache_capacity: usize,
    eviction: EvictionPolicy,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            eviction: EvictionPolicy::Fifo,
        }
    }
}

impl LoaderOptions {
    /// Build options, replacing non-positive values with the defaults.
    pub fn new(page_size: i64, cache_capacity: i64) -> Self {
        Self {
            page_size: positive_or(page_size, DEFAULT_PAGE_SIZE),
            cache_capacity: positive_or(cache_capacity, DEFAULT_CACHE_CAPACITY),
            eviction: EvictionPolicy::Fifo,
        }
    }

    /// Use `policy` when the cache is full.
    pub fn with_eviction(mut self, policy: EvictionPolicy) -> Self {
        self.eviction = policy;
        self
    }

    /// Items per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Maximum resident pages.
    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    /// Eviction policy.
    pub fn eviction(&self) -> EvictionPolicy {
        self.eviction
    }
}

fn positive_or(value: i64, default: usize) -> usize {
    match usize::try_from(value) {
        Ok(value) if value > 0 => value,
        _ => default,
    }
}

struct State<T> {
    cache: PageCache<T>,
    total: TotalCount,
    cursor: usize,
    epoch: u64,
}

struct Shared<T> {
    page_size: usize,
    source: Box<dyn DataSource<T>>,
    counter: Option<Box<dyn CountProvider>>,
    state: Mutex<State<T>>,
}

impl<T: Send + Sync + 'static> Shared<T> {
    fn counter(&self) -> Option<&dyn CountProvider> {
        self.counter.as_deref()
    }

    fn fetch(&self, page: usize) -> PagingResult<Page<T>> {
        let skip = page.saturating_mul(self.page_size);
        let mut items = self
            .source
            .fetch(skip, self.page_size)
            .map_err(|source| PagingError::DataSource { page, source })?;
        if items.len() > self.page_size {
            warn!(
                page,
                returned = items.len(),
                page_size = self.page_size,
                "data source returned an oversized page; truncating"
            );
            items.truncate(self.page_size);
        }
        Ok(items.into())
    }

    fn total_count(&self, state: &mut State<T>) -> PagingResult<usize> {
        state.total.get(self.counter())
    }

    fn total_pages(&self, state: &mut State<T>) -> PagingResult<usize> {
        Ok(page_count(self.total_count(state)?, self.page_size))
    }

    /// Cache lookup, fetch on miss, and cursor update under one lock hold.
    fn load(&self, state: &mut State<T>, page: usize) -> PagingResult<Page<T>> {
        if let Some(hit) = state.cache.get(page) {
            debug!(page, "page cache hit");
            state.cache.touch(page);
            state.cursor = page;
            return Ok(hit);
        }

        debug!(page, "page cache miss");
        let items = self.fetch(page)?;
        if let Some(victim) = state.cache.put(page, Arc::clone(&items)) {
            debug!(page, victim, "evicted page to make room");
        }
        state.cursor = page;
        Ok(items)
    }
}

/// Point-in-time view of a loader, taken under one lock hold.
#[derive(Debug)]
pub struct LoaderStatus {
    /// Page of the most recent foreground load.
    pub cursor: usize,
    /// Pages implied by the total count.
    pub total_pages: PagingResult<usize>,
    /// Resident page indices in ascending order.
    pub resident: Vec<usize>,
    /// Maximum resident pages.
    pub capacity: usize,
    /// Invalidations so far.
    pub epoch: u64,
}

/// Pages through a [`DataSource`], keeping a bounded set of pages resident.
///
/// Foreground operations (`load_page`, navigation, `get_item`) block the
/// caller and hold the loader's lock for the whole lookup, fetch, and insert,
/// so they are serialized with each other. [`prefetch`](Self::prefetch) runs
/// its fetch on tokio's blocking pool without the lock and only takes it to
/// commit.
///
/// Cloning is cheap; clones share the cache and cursor.
pub struct PaginatedLoader<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PaginatedLoader<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> PaginatedLoader<T> {
    /// Create a loader without a count provider. The total count is then
    /// zero and navigation past the cursor yields nothing.
    pub fn new(source: impl DataSource<T>, options: LoaderOptions) -> Self {
        Self::build(Box::new(source), None, options)
    }

    /// Create a loader whose total count comes from `counter`.
    pub fn with_counter(
        source: impl DataSource<T>,
        counter: impl CountProvider,
        options: LoaderOptions,
    ) -> Self {
        Self::build(Box::new(source), Some(Box::new(counter)), options)
    }

    fn build(
        source: Box<dyn DataSource<T>>,
        counter: Option<Box<dyn CountProvider>>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                page_size: options.page_size,
                source,
                counter,
                state: Mutex::new(State {
                    cache: PageCache::new(options.cache_capacity, options.eviction),
                    total: TotalCount::default(),
                    cursor: 0,
                    epoch: 0,
                }),
            }),
        }
    }

    /// Items per page.
    pub fn page_size(&self) -> usize {
        self.shared.page_size
    }

    /// Maximum resident pages.
    pub fn cache_capacity(&self) -> usize {
        self.shared.state.lock().cache.capacity()
    }

    /// Page of the most recent foreground load. Zero before any load.
    pub fn current_page(&self) -> usize {
        self.shared.state.lock().cursor
    }

    /// Number of [`invalidate_cache`](Self::invalidate_cache) calls so far.
    pub fn epoch(&self) -> u64 {
        self.shared.state.lock().epoch
    }

    /// Whether a count provider was supplied, i.e. whether the total is known.
    pub fn has_counter(&self) -> bool {
        self.shared.counter.is_some()
    }

    /// Whether `page` is resident.
    pub fn is_cached(&self, page: usize) -> bool {
        self.shared.state.lock().cache.contains(page)
    }

    /// Resident page indices in ascending order.
    pub fn cached_pages(&self) -> Vec<usize> {
        self.shared.state.lock().cache.resident()
    }

    /// Total item count, computed once per epoch.
    pub fn total_count(&self) -> PagingResult<usize> {
        let mut state = self.shared.state.lock();
        self.shared.total_count(&mut state)
    }

    /// `ceil(total_count / page_size)`, or zero when there are no items.
    pub fn total_pages(&self) -> PagingResult<usize> {
        let mut state = self.shared.state.lock();
        self.shared.total_pages(&mut state)
    }

    /// Cursor, page total, residency, and epoch read together.
    ///
    /// Takes the lock, so call it off any thread that must stay responsive.
    pub fn status(&self) -> LoaderStatus {
        let mut state = self.shared.state.lock();
        LoaderStatus {
            cursor: state.cursor,
            total_pages: self.shared.total_pages(&mut state),
            resident: state.cache.resident(),
            capacity: state.cache.capacity(),
            epoch: state.epoch,
        }
    }

    /// Load `page_index`, from cache when resident, and make it the cursor.
    ///
    /// On failure neither the cache nor the cursor change.
    pub fn load_page(&self, page_index: i64) -> PagingResult<Page<T>> {
        let page =
            usize::try_from(page_index).map_err(|_| PagingError::invalid_page(page_index))?;
        let mut state = self.shared.state.lock();
        self.shared.load(&mut state, page)
    }

    /// Load the page after the cursor, or nothing when the cursor is on the
    /// last page.
    pub fn load_next_page(&self) -> PagingResult<Page<T>> {
        let mut state = self.shared.state.lock();
        let next = state.cursor + 1;
        if next < self.shared.total_pages(&mut state)? {
            self.shared.load(&mut state, next)
        } else {
            Ok(empty_page())
        }
    }

    /// Load the page before the cursor, or nothing on the first page.
    pub fn load_previous_page(&self) -> PagingResult<Page<T>> {
        let mut state = self.shared.state.lock();
        if state.cursor > 0 {
            let previous = state.cursor - 1;
            self.shared.load(&mut state, previous)
        } else {
            Ok(empty_page())
        }
    }

    /// Item at absolute position `index`, loading its page as the cursor.
    ///
    /// Negative indices, indices past a known total, and indices past the end
    /// of a short final page all yield `None`.
    pub fn get_item(&self, index: i64) -> PagingResult<Option<T>> {
        let Ok(index) = usize::try_from(index) else {
            return Ok(None);
        };
        let mut state = self.shared.state.lock();
        if self.has_counter() && index >= self.shared.total_count(&mut state)? {
            return Ok(None);
        }

        let page_size = self.shared.page_size;
        let items = self.shared.load(&mut state, index / page_size)?;
        Ok(items.get(index % page_size).cloned())
    }

    /// Warm the cache with `page_index` in the background.
    ///
    /// Resolves immediately when the index is negative, past a known total,
    /// or already resident. Otherwise the fetch runs on tokio's blocking pool
    /// and the page is committed only if it is still absent and no
    /// invalidation happened meanwhile. The cursor never moves.
    ///
    /// Fetch failures fault the returned task.
    pub fn prefetch(&self, page_index: i64) -> PrefetchTask {
        let Ok(page) = usize::try_from(page_index) else {
            return PrefetchTask::ready(0, Ok(()));
        };

        let epoch = {
            let mut state = self.shared.state.lock();
            if self.has_counter() {
                match self.shared.total_pages(&mut state) {
                    Ok(pages) if page >= pages => return PrefetchTask::ready(page, Ok(())),
                    Ok(_) => {}
                    Err(err) => return PrefetchTask::ready(page, Err(err)),
                }
            }
            if state.cache.contains(page) {
                return PrefetchTask::ready(page, Ok(()));
            }
            state.epoch
        };

        let Ok(runtime) = Handle::try_current() else {
            return PrefetchTask::ready(page, Err(PagingError::NoRuntime));
        };

        let shared = Arc::clone(&self.shared);
        let handle = runtime.spawn_blocking(move || {
            let items = shared.fetch(page)?;
            let mut state = shared.state.lock();
            if state.epoch != epoch {
                debug!(page, "cache invalidated during prefetch; discarding");
                return Ok(());
            }
            if state.cache.contains(page) {
                debug!(page, "page populated during prefetch; discarding");
                return Ok(());
            }
            if let Some(victim) = state.cache.put(page, items) {
                debug!(page, victim, "evicted page to make room for prefetch");
            }
            debug!(page, "prefetched page");
            Ok(())
        });
        PrefetchTask {
            page,
            state: TaskState::Running(handle),
        }
    }

    /// Drop every cached page and the memoized count. The cursor is kept.
    pub fn invalidate_cache(&self) {
        let mut state = self.shared.state.lock();
        state.cache.clear();
        state.total.reset();
        state.epoch += 1;
        info!(epoch = state.epoch, "page cache invalidated");
    }

    /// Recompute the total count on next use. Cached pages stay valid.
    pub fn refresh_total_count(&self) {
        self.shared.state.lock().total.refresh();
    }
}

fn empty_page<T>() -> Page<T> {
    Vec::new().into()
}

/// Handle to a background prefetch. Resolves once the page is committed,
/// discarded, or the fetch failed.
#[derive(Debug)]
#[must_use = "prefetch failures are only reported through the task"]
pub struct PrefetchTask {
    page: usize,
    state: TaskState,
}

#[derive(Debug)]
enum TaskState {
    Ready(Option<PagingResult<()>>),
    Running(JoinHandle<PagingResult<()>>),
}

impl PrefetchTask {
    fn ready(page: usize, result: PagingResult<()>) -> Self {
        Self {
            page,
            state: TaskState::Ready(Some(result)),
        }
    }

    /// Page this task targets.
    pub fn page(&self) -> usize {
        self.page
    }

    /// Whether a background fetch was actually started.
    pub fn is_spawned(&self) -> bool {
        matches!(self.state, TaskState::Running(_))
    }
}

impl Future for PrefetchTask {
    type Output = PagingResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            TaskState::Ready(result) => Poll::Ready(result.take().unwrap_or(Ok(()))),
            TaskState::Running(handle) => match Pin::new(handle).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(source)) => Poll::Ready(Err(PagingError::Prefetch {
                    page: this.page,
                    source,
                })),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
