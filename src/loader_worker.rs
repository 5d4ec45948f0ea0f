use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::slice;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;

use crate::{
    batch_function::BatchFunction,
    cache::Cache,
    error::LoadError,
    loader_op::{LoadRequest, LoaderOp, Settlement, Waiter},
};
#[cfg(feature = "stats")]
use crate::worker_stats::WorkerStats;

type BatchOutcome<V, E> = Result<Vec<Result<V, E>>, E>;

/// A distinct normalized key that has been requested and not yet settled, with everyone waiting
/// on it.
struct PendingKey<N, V, E> {
    cache_key: N,
    waiters: Vec<Waiter<V, E>>,
}

impl<N, V: Clone, E> PendingKey<N, V, E> {
    fn settle(self, settlement: Settlement<V, E>) {
        for waiter in self.waiters {
            waiter.send_response(settlement.clone());
        }
    }
}

/// Worker-side knobs copied out of [`crate::LoaderOptions`]. Key normalization happens on the
/// `Loader` side, so the worker never sees the key function.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub max_batch_size: Option<NonZeroUsize>,
    pub cache: bool,
    pub cache_errors: bool,
    pub yield_count: usize,
}

/// A `LoaderWorker` is the "single-thread" worker task that actually does the loading work.
///
/// Once started, it runs in a loop until the parent Loader aborts it's `JoinHandle` or drops the
/// request queue tx channel. It is the sole owner of the open batch, the in-flight batches, and
/// the cache, so none of them need locking.
///
/// One pass through the intake side of the loop may be called an "execution frame":
///
/// 1. Wait for the first op on the request queue.
/// 2. Yield to the scheduler `yield_count` times so that tasks woken in the same tick can enqueue
///    their ops, then synchronously pull ops until the queue is empty. Repeat until a round of
///    yields brings in no new op. Prime and Clear requests
///    are applied to the cache immediately. Load requests are answered from the cache when
///    possible, attached to an in-flight key when one exists, and otherwise staged in the open
///    batch (one entry per distinct normalized key, in first-requested order).
/// 3. Close the open batch: split it into chunks of at most `max_batch_size` keys and start one
///    `BatchFunction` call per chunk.
///
/// Started batch calls are polled alongside the request queue, so a frame never waits on an
/// earlier frame's batch. When a batch call finishes, its results are cached (if enabled) and
/// every waiter of each key receives that key's settlement.
pub struct LoaderWorker<K, N, V, E, F, CacheT, ContextT>
where
    K: 'static + Debug + Send + Sync,
    N: 'static + Eq + Hash + Clone + Debug + Send,
    V: 'static + Send + Clone,
    E: 'static + Send + Sync,
    F: 'static + BatchFunction<K, V, Context = ContextT, Error = E> + Send,
    CacheT: Cache<K = N, V = Settlement<V, E>> + Send + 'static,
    ContextT: Send + Sync + 'static,
{
    cache: CacheT,
    config: WorkerConfig,
    request_rx: mpsc::UnboundedReceiver<LoaderOp<K, N, V, E>>,
    /// Raw keys of the open batch, in first-requested order.
    keys_to_load: Vec<K>,
    /// Waiters of the open batch, positionally aligned with `keys_to_load`.
    pending_keys: Vec<PendingKey<N, V, E>>,
    open_index: HashMap<N, usize>,
    /// Waiters of dispatched batches, by batch id.
    loading: HashMap<u64, Vec<PendingKey<N, V, E>>>,
    /// Position of each in-flight key that may still be joined or cached. Only used with caching.
    in_flight_index: HashMap<N, (u64, usize)>,
    in_flight: FuturesUnordered<BoxFuture<'static, (u64, BatchOutcome<V, E>)>>,
    next_batch_id: u64,
    context: Arc<ContextT>,
    phantom_batch_function: PhantomData<F>,
    #[cfg(feature = "stats")]
    stats: WorkerStats,
}

impl<K, N, V, E, F, CacheT, ContextT> LoaderWorker<K, N, V, E, F, CacheT, ContextT>
where
    K: 'static + Debug + Send + Sync,
    N: 'static + Eq + Hash + Clone + Debug + Send,
    V: 'static + Send + Clone,
    E: 'static + Send + Sync,
    F: 'static + BatchFunction<K, V, Context = ContextT, Error = E> + Send,
    CacheT: Cache<K = N, V = Settlement<V, E>> + Send + 'static,
    ContextT: Send + Sync + 'static,
{
    pub fn new(
        cache: CacheT,
        config: WorkerConfig,
        request_rx: mpsc::UnboundedReceiver<LoaderOp<K, N, V, E>>,
        context: ContextT,
    ) -> Self {
        Self {
            cache,
            config,
            request_rx,
            keys_to_load: Vec::new(),
            pending_keys: Vec::new(),
            open_index: HashMap::new(),
            loading: HashMap::new(),
            in_flight_index: HashMap::new(),
            in_flight: FuturesUnordered::new(),
            next_batch_id: 0,
            context: Arc::new(context),
            phantom_batch_function: PhantomData,
            #[cfg(feature = "stats")]
            stats: WorkerStats::new(std::any::type_name::<(K, V)>()),
        }
    }

    pub async fn start(mut self) {
        loop {
            tokio::select! {
                op = self.request_rx.recv() => match op {
                    None => {
                        tracing::info!("Tx channel closed. Terminating LoaderWorker.");
                        return;
                    }
                    Some(op) => {
                        self.mux_op(op);
                        self.drain_until_quiet().await;
                        self.dispatch();
                    }
                },
                Some((batch_id, outcome)) = self.in_flight.next(),
                    if !self.in_flight.is_empty() =>
                {
                    self.settle(batch_id, outcome);
                }
            }
        }
    }

    /// Keeps the open batch accepting ops until a full round of yields brings in nothing new.
    /// Callers on other runtime threads may still be sending when one drain empties the queue.
    async fn drain_until_quiet(&mut self) {
        loop {
            for _ in 0..self.config.yield_count {
                tokio::task::yield_now().await;
            }
            let mut drained = false;
            while let Some(Some(op)) = self.request_rx.recv().now_or_never() {
                self.mux_op(op);
                drained = true;
            }
            if !drained {
                return;
            }
        }
    }

    fn mux_op(&mut self, op: LoaderOp<K, N, V, E>) {
        match op {
            LoaderOp::Load(request) => self.enqueue(request),
            LoaderOp::Prime(key, value) => self.prime(key, value),
            LoaderOp::PrimeMany(key_vals) => {
                for (key, value) in key_vals {
                    self.prime(key, value);
                }
            }
            LoaderOp::Clear(key) => self.forget(slice::from_ref(&key)),
            LoaderOp::ClearMany(keys) => self.forget(&keys),
            LoaderOp::ClearAll => {
                self.cache.flush();
                self.in_flight_index.clear();
            }
        }
    }

    fn enqueue(&mut self, request: LoadRequest<K, N, V, E>) {
        let (key, cache_key, waiter) = request.into_parts();
        #[cfg(feature = "stats")]
        self.stats.record_load_request(1);

        if self.config.cache {
            if let Some(settlement) = self.cache.get(&cache_key) {
                #[cfg(feature = "stats")]
                self.stats.record_cache_hits(1);
                waiter.send_response(settlement.clone());
                return;
            }
            if let Some(&(batch_id, pos)) = self.in_flight_index.get(&cache_key) {
                let batch = self.loading.get_mut(&batch_id);
                if let Some(pending) = batch.and_then(|b| b.get_mut(pos)) {
                    pending.waiters.push(waiter);
                    return;
                }
            }
        }

        match self.open_index.get(&cache_key) {
            Some(&pos) => self.pending_keys[pos].waiters.push(waiter),
            None => {
                tracing::debug!(?key, "staging key");
                self.open_index.insert(cache_key.clone(), self.pending_keys.len());
                self.keys_to_load.push(key);
                self.pending_keys.push(PendingKey { cache_key, waiters: vec![waiter] });
            }
        }
    }

    /// Seeds the cache unless the key is already cached, staged, or in flight.
    fn prime(&mut self, key: N, value: V) {
        if !self.config.cache
            || self.open_index.contains_key(&key)
            || self.in_flight_index.contains_key(&key)
        {
            return;
        }
        self.cache.insert_absent(key, Ok(value));
    }

    fn forget(&mut self, keys: &[N]) {
        self.cache.remove(keys);
        for key in keys {
            self.in_flight_index.remove(key);
        }
    }

    #[tracing::instrument(skip(self))]
    fn dispatch(&mut self) {
        if self.keys_to_load.is_empty() {
            return;
        }
        self.open_index.clear();
        let mut keys = std::mem::take(&mut self.keys_to_load);
        let mut pending = std::mem::take(&mut self.pending_keys);
        let chunk_size = self.config.max_batch_size.map_or(keys.len(), NonZeroUsize::get);

        while !keys.is_empty() {
            let at = chunk_size.min(keys.len());
            let rest_keys = keys.split_off(at);
            let rest_pending = pending.split_off(at);
            self.dispatch_chunk(
                std::mem::replace(&mut keys, rest_keys),
                std::mem::replace(&mut pending, rest_pending),
            );
        }
    }

    fn dispatch_chunk(&mut self, keys: Vec<K>, pending: Vec<PendingKey<N, V, E>>) {
        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;
        tracing::debug!(batch_id, ?keys, "dispatching batch");
        #[cfg(feature = "stats")]
        self.stats.record_load_exec(
            pending.iter().map(|p| p.waiters.len() as u32).sum(),
            keys.len() as u32,
        );

        if self.config.cache {
            for (pos, p) in pending.iter().enumerate() {
                self.in_flight_index.insert(p.cache_key.clone(), (batch_id, pos));
            }
        }
        self.loading.insert(batch_id, pending);

        let context = Arc::clone(&self.context);
        self.in_flight.push(
            async move {
                let outcome = F::load(&keys, &context).await;
                (batch_id, outcome)
            }
            .boxed(),
        );
    }

    #[tracing::instrument(skip(self, outcome))]
    fn settle(&mut self, batch_id: u64, outcome: BatchOutcome<V, E>) {
        let pending = match self.loading.remove(&batch_id) {
            Some(pending) => pending,
            None => return,
        };
        let expected = pending.len();

        let values = match outcome {
            Ok(values) if values.len() == expected => values,
            Ok(values) => {
                tracing::warn!(expected, actual = values.len(), "malformed batch result");
                let error = LoadError::MalformedBatchResult { expected, actual: values.len() };
                self.fail_all(batch_id, pending, error);
                return;
            }
            Err(e) => {
                tracing::debug!("batch function failed");
                self.fail_all(batch_id, pending, LoadError::BatchFetch(Arc::new(e)));
                return;
            }
        };

        #[cfg(feature = "stats")]
        self.stats.record_load_exec_completed(values.iter().filter(|v| v.is_ok()).count() as u32);

        for (pos, (p, value)) in pending.into_iter().zip(values).enumerate() {
            let settlement = value.map_err(|e| LoadError::PerKey(Arc::new(e)));
            let tracked = self.untrack(&p.cache_key, batch_id, pos);
            if tracked && (settlement.is_ok() || self.config.cache_errors) {
                self.cache.insert(p.cache_key.clone(), settlement.clone());
            }
            p.settle(settlement);
        }
    }

    /// Whole-batch failures are never cached, so the next load of these keys refetches.
    fn fail_all(&mut self, batch_id: u64, pending: Vec<PendingKey<N, V, E>>, error: LoadError<E>) {
        for (pos, p) in pending.into_iter().enumerate() {
            self.untrack(&p.cache_key, batch_id, pos);
            p.settle(Err(error.clone()));
        }
    }

    /// Drops the in-flight entry for `cache_key` if it still belongs to this batch position.
    /// A key cleared while in flight no longer belongs to it, and its result must not be cached.
    fn untrack(&mut self, cache_key: &N, batch_id: u64, pos: usize) -> bool {
        if self.in_flight_index.get(cache_key) == Some(&(batch_id, pos)) {
            self.in_flight_index.remove(cache_key);
            true
        } else {
            false
        }
    }
}
