use tokio::sync::oneshot;

use crate::error::LoadError;

pub type Settlement<V, E> = Result<V, LoadError<E>>;

/// Set of possible requests that can be sent to the [`LoaderWorker`]
///
/// The three categories of commands are Load, Prime, and Clear. Cache-facing commands carry the
/// normalized key `N` only; loads also carry the raw key `K` that is handed to the batch function.
#[derive(Debug)]
pub enum LoaderOp<K, N, V, E> {
    /// Fetch data from the resource wrapped by this data loader (or the cache).
    Load(LoadRequest<K, N, V, E>),
    /// Add values to the cache that were fetched from elsewhere.
    Prime(N, V),
    PrimeMany(Vec<(N, V)>),
    /// Remove values from the cache so that they will be reloaded when they are next requested.
    Clear(N),
    ClearMany(Vec<N>),
    ClearAll,
}

#[derive(Debug)]
pub struct LoadRequest<K, N, V, E> {
    pub key: K,
    pub cache_key: N,
    pub response_tx: oneshot::Sender<Settlement<V, E>>,
}

impl<K, N, V, E> LoadRequest<K, N, V, E> {
    /// Splits off the channel that settles this request.
    pub fn into_parts(self) -> (K, N, Waiter<V, E>) {
        (self.key, self.cache_key, Waiter(self.response_tx))
    }
}

/// One caller awaiting the settlement of a key.
#[derive(Debug)]
pub struct Waiter<V, E>(oneshot::Sender<Settlement<V, E>>);

impl<V, E> Waiter<V, E> {
    pub fn send_response(self, settlement: Settlement<V, E>) {
        if self.0.send(settlement).is_err() {
            tracing::debug!("receiver dropped before settlement");
        }
    }
}
