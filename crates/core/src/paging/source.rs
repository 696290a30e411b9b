//! Capabilities the loader pages over.
//!
//! The loader never knows where items live. Callers hand it a [`DataSource`]
//! and, optionally, a [`CountProvider`] at construction time.

use std::{fs, marker::PhantomData, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Fetches a contiguous slice of the logical item sequence.
///
/// Implementations must be safe to call from several threads at once: a
/// background prefetch may run while a foreground load is fetching.
pub trait DataSource<T>: Send + Sync + 'static {
    /// Return at most `take` items starting at `skip`. Fewer items means the
    /// end of the data was reached.
    fn fetch(&self, skip: usize, take: usize) -> Result<Vec<T>>;
}

/// Reports the total number of items behind a [`DataSource`].
pub trait CountProvider: Send + Sync + 'static {
    /// Total item count. Expected to be expensive; the loader memoizes it.
    fn count_total(&self) -> Result<usize>;
}

impl<T, F> DataSource<T> for F
where
    F: Fn(usize, usize) -> Result<Vec<T>> + Send + Sync + 'static,
{
    fn fetch(&self, skip: usize, take: usize) -> Result<Vec<T>> {
        self(skip, take)
    }
}

impl<F> CountProvider for F
where
    F: Fn() -> Result<usize> + Send + Sync + 'static,
{
    fn count_total(&self) -> Result<usize> {
        self()
    }
}

/// In-memory source over a shared slice.
#[derive(Debug)]
pub struct VecSource<T> {
    items: Arc<[T]>,
}

impl<T> Clone for VecSource<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> VecSource<T> {
    /// Wrap an owned list.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> DataSource<T> for VecSource<T> {
    fn fetch(&self, skip: usize, take: usize) -> Result<Vec<T>> {
        Ok(self.items.iter().skip(skip).take(take).cloned().collect())
    }
}

impl<T: Send + Sync + 'static> CountProvider for VecSource<T> {
    fn count_total(&self) -> Result<usize> {
        Ok(self.items.len())
    }
}

/// Source backed by a JSON array on disk.
///
/// The file is re-read on every call so edits show up after the loader's
/// cache is invalidated.
#[derive(Debug)]
pub struct JsonFileSource<T> {
    path: PathBuf,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonFileSource<T> {
    fn clone(&self) -> Self {
        Self::new(self.path.clone())
    }
}

impl<T> JsonFileSource<T> {
    /// Create a source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _item: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> JsonFileSource<T> {
    fn read_all(&self) -> Result<Vec<T>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }
}

impl<T: DeserializeOwned + Send + Sync + 'static> DataSource<T> for JsonFileSource<T> {
    fn fetch(&self, skip: usize, take: usize) -> Result<Vec<T>> {
        Ok(self.read_all()?.into_iter().skip(skip).take(take).collect())
    }
}

impl<T: DeserializeOwned + Send + Sync + 'static> CountProvider for JsonFileSource<T> {
    fn count_total(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }
}
