use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub(crate) type KeyFn<K, N> = Arc<dyn Fn(&K) -> N + Send + Sync>;

/// Tunables for a [`crate::Loader`].
///
/// `N` is the normalized key type: the value keys are deduplicated and cached under. By default
/// keys are their own normalized form.
pub struct LoaderOptions<K, N> {
    pub(crate) key_fn: KeyFn<K, N>,
    pub(crate) max_batch_size: Option<NonZeroUsize>,
    pub(crate) cache: bool,
    pub(crate) cache_errors: bool,
    pub(crate) yield_count: usize,
}

impl<K: Clone + 'static> Default for LoaderOptions<K, K> {
    fn default() -> Self {
        Self {
            key_fn: Arc::new(K::clone),
            max_batch_size: None,
            cache: true,
            cache_errors: false,
            yield_count: 10,
        }
    }
}

impl<K: Clone + 'static> LoaderOptions<K, K> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, N> LoaderOptions<K, N> {
    /// Replaces the key normalizer. Two keys meant to be the same must normalize identically.
    pub fn with_key_fn<M, F>(self, key_fn: F) -> LoaderOptions<K, M>
    where
        F: Fn(&K) -> M + Send + Sync + 'static,
    {
        LoaderOptions {
            key_fn: Arc::new(key_fn),
            max_batch_size: self.max_batch_size,
            cache: self.cache,
            cache_errors: self.cache_errors,
            yield_count: self.yield_count,
        }
    }

    /// Splits batches larger than `size` keys into several batch function calls. Zero means
    /// unbounded.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = NonZeroUsize::new(size);
        self
    }

    /// Enables or disables memoization of settled keys.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Also memoize keys the batch function reported as failed.
    pub fn with_cache_errors(mut self, enabled: bool) -> Self {
        self.cache_errors = enabled;
        self
    }

    /// Number of scheduler yields the worker performs before each check for newly queued ops. The
    /// batch closes after a round of yields finds none. Defaults to 10.
    pub fn with_yield_count(mut self, count: usize) -> Self {
        self.yield_count = count;
        self
    }

    /// The chunk size batches are split at, `None` when unbounded.
    pub fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size.map(NonZeroUsize::get)
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache
    }
}

impl<K, N> fmt::Debug for LoaderOptions<K, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("max_batch_size", &self.max_batch_size)
            .field("cache", &self.cache)
            .field("cache_errors", &self.cache_errors)
            .field("yield_count", &self.yield_count)
            .finish_non_exhaustive()
    }
}
