use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;

/// A `BatchFunction` defines the method through which some `Loader` may fetch
/// batched data from some resource. The `BatchFunction` receives a slice of distinct keys, in
/// the order they were first requested during the `Loader`'s most recent execution frame, and
/// some user defined context struct.
///
/// The returned vector must line up with `keys`: one entry per key, at the same position. An
/// `Err` entry fails only that key. Returning `Err` for the whole call fails every key of the
/// batch, and returning a vector of the wrong length fails every key with
/// [`crate::LoadError::MalformedBatchResult`].
///
/// Backing stores rarely preserve input order; [`align`] rebuilds the expected shape from an
/// unordered result set.
///
/// Multiple `BatchFunctions` (and therefore loaders) can share the same context (likely through an
/// `Arc`).
#[async_trait]
pub trait BatchFunction<K, V> {
    type Context;
    type Error;

    async fn load(
        keys: &[K],
        context: &Self::Context,
    ) -> Result<Vec<Result<V, Self::Error>>, Self::Error>;
}

/// Orders `found` to match `keys`, filling keys without a match with `missing(key)`.
///
/// `key_of` extracts the key a record was stored under. `keys` are expected to be distinct, as
/// they are when handed to a `BatchFunction`.
pub fn align<K, V, E, I>(
    keys: &[K],
    found: I,
    key_of: impl Fn(&V) -> K,
    missing: impl Fn(&K) -> E,
) -> Vec<Result<V, E>>
where
    K: Eq + Hash,
    I: IntoIterator<Item = V>,
{
    let mut by_key = found.into_iter().map(|v| (key_of(&v), v)).collect::<HashMap<_, _>>();
    keys.iter().map(|k| by_key.remove(k).ok_or_else(|| missing(k))).collect()
}
