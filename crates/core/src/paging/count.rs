//! Memoized total item count.

use tracing::debug;

use super::{
    error::{PagingError, PagingResult},
    source::CountProvider,
};

/// Holds the total count computed at most once per epoch.
///
/// Lives behind the loader's mutex, which is what makes "at most once" hold
/// under concurrent callers.
#[derive(Debug, Default)]
pub struct TotalCount {
    value: Option<usize>,
}

impl TotalCount {
    /// Return the memoized count, invoking `provider` on first use.
    /// Without a provider the count is zero.
    pub fn get(&mut self, provider: Option<&dyn CountProvider>) -> PagingResult<usize> {
        if let Some(value) = self.value {
            return Ok(value);
        }
        let value = match provider {
            Some(provider) => provider.count_total().map_err(PagingError::Count)?,
            None => 0,
        };
        debug!(total = value, "computed total count");
        self.value = Some(value);
        Ok(value)
    }

    /// The memoized count, if computed.
    pub fn peek(&self) -> Option<usize> {
        self.value
    }

    /// Forget the count so the next [`get`](Self::get) recomputes it.
    pub fn refresh(&mut self) {
        self.value = None;
    }

    /// Forget the count as part of a full cache invalidation.
    pub fn reset(&mut self) {
        self.refresh();
    }
}

/// Number of pages needed for `total` items.
pub fn page_count(total: usize, page_size: usize) -> usize {
    if total == 0 {
        0
    } else {
        total.div_ceil(page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn provider_called_once_per_epoch() -> PagingResult<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = move || -> anyhow::Result<usize> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(95)
        };

        let mut total = TotalCount::default();
        for _ in 0..5 {
            assert_eq!(total.get(Some(&provider as &dyn CountProvider))?, 95);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        total.refresh();
        assert_eq!(total.peek(), None);
        total.get(Some(&provider as &dyn CountProvider))?;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn missing_provider_counts_zero() -> PagingResult<()> {
        let mut total = TotalCount::default();
        assert_eq!(total.get(None)?, 0);
        assert_eq!(total.peek(), Some(0));
        Ok(())
    }

    #[test]
    fn failed_count_is_not_memoized() {
        let provider = || -> anyhow::Result<usize> { anyhow::bail!("offline") };
        let mut total = TotalCount::default();
        let result = total.get(Some(&provider as &dyn CountProvider));
        assert!(matches!(result, Err(PagingError::Count(_))));
        assert_eq!(total.peek(), None);
    }

    #[test]
    fn pages_round_up() {
        assert_eq!(page_count(95, 20), 5);
        assert_eq!(page_count(100, 20), 5);
        assert_eq!(page_count(1, 20), 1);
        assert_eq!(page_count(0, 20), 0);
    }
}
