use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Drop;

use futures::future;
use tokio::sync::{mpsc, oneshot};
use tracing_futures::Instrument;

use crate::{
    batch_function::BatchFunction,
    error::LoadError,
    loader_op::{LoadRequest, LoaderOp, Settlement},
    loader_worker::{LoaderWorker, WorkerConfig},
    options::{KeyFn, LoaderOptions},
};

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// Users can call [`Loader::load`] and [`Loader::load_many`] to fetch values from the underlying
/// resource or cache. The cache can be cleared with calls to [`Loader::clear`],
/// [`Loader::clear_many`] and [`Loader::clear_all`], and values can be added to the cache
/// out-of-band through the use of [`Loader::prime`] and [`Loader::prime_many`].
///
/// The `Loader` struct acts as an intermediary between the async domain in which `load` calls are
/// invoked and the pseudo-single-threaded domain of the `LoaderWorker`. Callers can invoke the
/// `Loader` from multiple parallel tasks, and the loader will enqueue the requested operations on
/// the request queue for processing by its `LoaderWorker`. The worker processes the requests
/// sequentially and provides results via response oneshot channels back to the Loader.
///
/// A `Loader` is meant to live for one logical operation (one incoming request). Its cache has no
/// expiry, so sharing one across requests serves stale data.
///
/// `N` is the normalized key type (see [`LoaderOptions::with_key_fn`]).
pub struct Loader<K, V, E, N = K> {
    request_tx: mpsc::UnboundedSender<LoaderOp<K, N, V, E>>,
    key_fn: KeyFn<K, N>,
    load_task_handle: tokio::task::JoinHandle<()>,
}

impl<K, V, E, N> Drop for Loader<K, V, E, N> {
    fn drop(&mut self) {
        self.load_task_handle.abort();
    }
}

impl<K, V, E> Loader<K, V, E, K>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Send + Clone,
    E: 'static + Send + Sync,
{
    /// Creates a new Loader for the provided BatchFunction and Context type, with default
    /// [`LoaderOptions`].
    ///
    /// Note: the batch function is passed in as a marker for type inference. Must be called from
    /// within a tokio runtime.
    pub fn new<F, ContextT>(batch_function: F, context: ContextT) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT, Error = E> + Send,
    {
        Self::with_options(batch_function, context, LoaderOptions::default())
    }
}

impl<K, V, E, N> Loader<K, V, E, N>
where
    K: 'static + Debug + Send + Sync,
    N: 'static + Eq + Hash + Clone + Debug + Send,
    V: 'static + Send + Clone,
    E: 'static + Send + Sync,
{
    /// Creates a new Loader with explicit options.
    pub fn with_options<F, ContextT>(
        _: F,
        context: ContextT,
        options: LoaderOptions<K, N>,
    ) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT, Error = E> + Send,
    {
        let config = WorkerConfig {
            max_batch_size: options.max_batch_size,
            cache: options.cache,
            cache_errors: options.cache_errors,
            yield_count: options.yield_count,
        };
        let span = tracing::trace_span!("LoaderWorker", kv = std::any::type_name::<(K, V)>());
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = LoaderWorker::<K, N, V, E, F, HashMap<N, Settlement<V, E>>, ContextT>::new(
            HashMap::new(),
            config,
            rx,
            context,
        );
        Self {
            request_tx: tx,
            key_fn: options.key_fn,
            load_task_handle: tokio::task::spawn(worker.start().instrument(span)),
        }
    }
}

impl<K, V, E, N> Loader<K, V, E, N> {
    /// Loads a value from the underlying resource.
    ///
    /// If the value is already in the loader cache, it is returned as soon as it is processed.
    /// Otherwise, the requested key is enqueued for batch loading in the next loader execution
    /// frame.
    pub async fn load(&self, key: K) -> Result<V, LoadError<E>> {
        settled(self.enqueue(key)).await
    }

    /// Loads a value for a key that may be null. A `None` key is rejected with
    /// [`LoadError::InvalidKey`] without involving the worker.
    pub async fn load_opt(&self, key: Option<K>) -> Result<V, LoadError<E>> {
        let key = key.ok_or(LoadError::InvalidKey)?;
        self.load(key).await
    }

    /// Loads many values at once.
    ///
    /// Every key is enqueued before any is awaited, so uncached keys share one execution frame.
    /// Each position carries its own result; one failed key does not fail the others.
    pub async fn load_many<I>(&self, keys: I) -> Vec<Result<V, LoadError<E>>>
    where
        I: IntoIterator<Item = K>,
    {
        let pending = keys.into_iter().map(|key| self.enqueue(key)).collect::<Vec<_>>();
        future::join_all(pending.into_iter().map(settled)).await
    }

    /// Adds a value to the cache. A key that is already cached or being loaded keeps its
    /// settlement; [`Loader::clear`] it first to replace it.
    pub fn prime(&self, key: K, value: V) {
        let key = (self.key_fn)(&key);
        self.send(LoaderOp::Prime(key, value));
    }

    /// Adds many values to the cache at once.
    pub fn prime_many(&self, key_vals: Vec<(K, V)>) {
        let key_vals = key_vals.into_iter().map(|(k, v)| ((self.key_fn)(&k), v)).collect();
        self.send(LoaderOp::PrimeMany(key_vals));
    }

    /// Removes a value from the cache.
    ///
    /// This key will be reloaded when it is next requested.
    pub fn clear(&self, key: &K) {
        self.send(LoaderOp::Clear((self.key_fn)(key)));
    }

    /// Removes multiple values from the cache at once.
    ///
    /// These keys will be reloaded when requested.
    pub fn clear_many(&self, keys: &[K]) {
        self.send(LoaderOp::ClearMany(keys.iter().map(|k| (self.key_fn)(k)).collect()));
    }

    /// Empties the cache.
    pub fn clear_all(&self) {
        self.send(LoaderOp::ClearAll);
    }

    fn enqueue(&self, key: K) -> oneshot::Receiver<Settlement<V, E>> {
        let (response_tx, response_rx) = oneshot::channel();
        let cache_key = (self.key_fn)(&key);
        // A dead worker drops the request along with `response_tx`; `settled` reports it.
        self.send(LoaderOp::Load(LoadRequest { key, cache_key, response_tx }));
        response_rx
    }

    fn send(&self, op: LoaderOp<K, N, V, E>) {
        if self.request_tx.send(op).is_err() {
            tracing::warn!("LoaderWorker is gone; dropping request");
        }
    }
}

async fn settled<V, E>(response_rx: oneshot::Receiver<Settlement<V, E>>) -> Settlement<V, E> {
    response_rx.await.unwrap_or(Err(LoadError::Closed))
}
