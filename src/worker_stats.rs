/// Counters kept by a `LoaderWorker` when the `stats` feature is enabled, reported through
/// `tracing` when the worker is dropped.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Human readable name used to identify this worker stats when it is reported.
    tag: &'static str,
    /// Number of `LoaderOp::Load` that were received by the worker.
    load_requests: u32,
    /// The number of loads answered straight from the loader cache.
    cache_hits: u32,
    /// Number of batch function calls started by the worker.
    loads: u32,
    /// The average number of waiters (not-unique keys) served by one batch.
    average_batch_size: f32,
    /// The max number of waiters served by a single batch.
    max_batch_size: u32,
    /// The min number of waiters served by a single batch.
    min_batch_size: u32,

    /// The max number of unique keys fetched during a single batch.
    max_batch_unique: u32,
    /// The min number of unique keys fetched during a single batch.
    min_batch_unique: u32,
    /// The total number of keys the batch function settled successfully.
    items_loaded: u32,
}

impl WorkerStats {
    pub fn new(tag: &'static str) -> Self {
        Self { tag, min_batch_size: u32::MAX, min_batch_unique: u32::MAX, ..Default::default() }
    }

    pub fn record_load_request(&mut self, items_requested: u32) {
        self.load_requests += items_requested;
    }

    pub fn record_cache_hits(&mut self, hits: u32) {
        self.cache_hits += hits;
    }

    pub fn record_load_exec(&mut self, batch_size: u32, unique_batch_size: u32) {
        let new_total_load = self.loads + 1;
        self.average_batch_size = (((self.average_batch_size as f64 * self.loads as f64)
            + batch_size as f64)
            / new_total_load as f64) as f32;
        self.loads = new_total_load;
        self.max_batch_size = self.max_batch_size.max(batch_size);
        self.min_batch_size = self.min_batch_size.min(batch_size);
        self.max_batch_unique = self.max_batch_unique.max(unique_batch_size);
        self.min_batch_unique = self.min_batch_unique.min(unique_batch_size);
    }

    pub fn record_load_exec_completed(&mut self, loaded_item_count: u32) {
        self.items_loaded += loaded_item_count;
    }
}

impl Drop for WorkerStats {
    fn drop(&mut self) {
        tracing::debug!(tag = self.tag, worker_stats = ?self);
    }
}
