use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future;
use hn_dataload::{BatchFunction, LoadError, Loader, LoaderOptions};
use tokio::sync::Semaphore;

type Calls = Vec<Vec<&'static str>>;

#[derive(Default)]
struct DummyContext {
    map: HashMap<&'static str, i64>,
    calls: Mutex<Calls>,
    /// A batch containing this key fails as a whole.
    poison: Option<&'static str>,
    /// Drop the last result of every batch.
    truncate: bool,
    /// When set, every batch waits for a permit before answering.
    gate: Option<Semaphore>,
}

impl DummyContext {
    fn with_values(values: &[(&'static str, i64)]) -> Self {
        Self { map: values.iter().copied().collect(), ..Default::default() }
    }

    fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }
}

struct DummyDataLoader;

#[async_trait]
impl BatchFunction<&'static str, i64> for DummyDataLoader {
    type Context = Arc<DummyContext>;
    type Error = String;

    async fn load(
        keys: &[&'static str],
        context: &Arc<DummyContext>,
    ) -> Result<Vec<Result<i64, String>>, String> {
        context.calls.lock().unwrap().push(keys.to_vec());
        if let Some(gate) = &context.gate {
            gate.acquire().await.map_err(|e| e.to_string())?.forget();
        }
        if let Some(poison) = context.poison {
            if keys.contains(&poison) {
                return Err(format!("{} is poison", poison));
            }
        }
        let mut values = keys
            .iter()
            .map(|k| context.map.get(k).copied().ok_or_else(|| format!("no value for {}", k)))
            .collect::<Vec<_>>();
        if context.truncate {
            values.pop();
        }
        Ok(values)
    }
}

fn abc() -> Arc<DummyContext> {
    Arc::new(DummyContext::with_values(&[("a", 1), ("b", 2), ("c", 3)]))
}

type DummyLoader = Loader<&'static str, i64, String>;

fn loader(context: &Arc<DummyContext>) -> DummyLoader {
    Loader::new(DummyDataLoader, Arc::clone(context))
}

fn loader_with(
    context: &Arc<DummyContext>,
    options: LoaderOptions<&'static str, &'static str>,
) -> DummyLoader {
    Loader::with_options(DummyDataLoader, Arc::clone(context), options)
}

#[tokio::test]
async fn basic_load() {
    let context = abc();
    let loader = loader(&context);
    assert_eq!(loader.load("a").await.ok(), Some(1));
    assert_eq!(context.calls(), vec![vec!["a"]]);
}

#[tokio::test]
async fn repeated_load_is_served_from_cache() {
    let context = abc();
    let loader = loader(&context);
    assert_eq!(loader.load("a").await.ok(), Some(1));
    assert_eq!(loader.load("a").await.ok(), Some(1));
    assert_eq!(context.calls(), vec![vec!["a"]]);
}

#[tokio::test]
async fn same_tick_loads_share_one_batch() {
    let context = abc();
    let loader = loader(&context);

    let (a, b, a_again, c) =
        future::join4(loader.load("a"), loader.load("b"), loader.load("a"), loader.load("c")).await;

    assert_eq!(context.calls(), vec![vec!["a", "b", "c"]]);
    assert_eq!(a.ok(), Some(1));
    assert_eq!(b.ok(), Some(2));
    assert_eq!(a_again.ok(), Some(1));
    assert_eq!(c.ok(), Some(3));
}

#[tokio::test]
async fn basic_load_many() {
    let context = abc();
    let loader = loader(&context);
    let values = loader.load_many(vec!["c", "a", "b"]).await;
    assert_eq!(
        values.into_iter().map(Result::ok).collect::<Vec<_>>(),
        vec![Some(3), Some(1), Some(2)]
    );
    assert_eq!(context.calls(), vec![vec!["c", "a", "b"]]);
}

#[tokio::test]
async fn load_async() {
    let context = abc();
    let loader = loader(&context);

    let (one, many, missing, two) = future::join4(
        loader.load("a"),
        loader.load_many(vec!["a", "c"]),
        loader.load("zz"),
        loader.load("b"),
    )
    .await;

    assert_eq!(one.ok(), Some(1));
    assert_eq!(many.into_iter().map(Result::ok).collect::<Vec<_>>(), vec![Some(1), Some(3)]);
    assert!(matches!(missing, Err(LoadError::PerKey(ref e)) if e.as_str() == "no value for zz"));
    assert_eq!(two.ok(), Some(2));
    assert_eq!(context.calls(), vec![vec!["a", "c", "zz", "b"]]);
}

#[tokio::test]
async fn per_key_error_does_not_fail_siblings() {
    let context = abc();
    let loader = loader(&context);
    let values = loader.load_many(vec!["a", "nope", "c"]).await;
    assert_eq!(values[0].as_ref().ok(), Some(&1));
    assert!(matches!(values[1], Err(LoadError::PerKey(_))));
    assert_eq!(values[2].as_ref().ok(), Some(&3));
}

#[tokio::test]
async fn null_key_is_rejected_without_a_batch() {
    let context = abc();
    let loader = loader(&context);
    assert!(matches!(loader.load_opt(None).await, Err(LoadError::InvalidKey)));
    assert_eq!(loader.load_opt(Some("b")).await.ok(), Some(2));
    assert_eq!(context.calls(), vec![vec!["b"]]);
}

#[tokio::test]
async fn malformed_result_fails_every_waiter() {
    let context = Arc::new(DummyContext {
        truncate: true,
        ..DummyContext::with_values(&[("a", 1), ("b", 2)])
    });
    let loader = loader(&context);

    let (a, b, a_again) = future::join3(loader.load("a"), loader.load("b"), loader.load("a")).await;
    for result in [a, b, a_again] {
        assert!(matches!(
            result,
            Err(LoadError::MalformedBatchResult { expected: 2, actual: 1 })
        ));
    }
}

#[tokio::test]
async fn batch_failure_is_confined_to_its_batch() {
    let context = Arc::new(DummyContext {
        poison: Some("b"),
        ..DummyContext::with_values(&[("a", 1), ("b", 2), ("c", 3)])
    });
    let loader = loader(&context);

    let (a, b) = future::join(loader.load("a"), loader.load("b")).await;
    for result in [a, b] {
        match result {
            Err(LoadError::BatchFetch(e)) => assert_eq!(e.as_str(), "b is poison"),
            other => panic!("expected batch failure, got {:?}", other),
        }
    }

    assert_eq!(loader.load("c").await.ok(), Some(3));
    // Whole-batch failures are not memoized.
    assert_eq!(loader.load("a").await.ok(), Some(1));
    assert_eq!(context.calls(), vec![vec!["a", "b"], vec!["c"], vec!["a"]]);
}

#[tokio::test]
async fn prime_skips_the_batch_function() {
    let context = abc();
    let loader = loader(&context);
    loader.prime("x", 42);
    loader.prime_many(vec![("y", 7), ("z", 8)]);
    assert_eq!(loader.load("x").await.ok(), Some(42));
    let primed = loader.load_many(vec!["y", "z"]).await;
    assert_eq!(primed.into_iter().map(Result::ok).collect::<Vec<_>>(), vec![Some(7), Some(8)]);
    assert!(context.calls().is_empty());
}

#[tokio::test]
async fn prime_keeps_existing_settlement() {
    let context = abc();
    let loader = loader(&context);
    assert_eq!(loader.load("a").await.ok(), Some(1));
    loader.prime("a", 100);
    assert_eq!(loader.load("a").await.ok(), Some(1));

    loader.clear(&"a");
    loader.prime("a", 100);
    assert_eq!(loader.load("a").await.ok(), Some(100));
    assert_eq!(context.calls(), vec![vec!["a"]]);
}

#[tokio::test]
async fn clear_forces_a_refetch() {
    let context = abc();
    let loader = loader(&context);
    let _ = loader.load_many(vec!["a", "b", "c"]).await;

    loader.clear(&"a");
    assert_eq!(loader.load("a").await.ok(), Some(1));

    loader.clear_many(&["b", "c"]);
    let _ = loader.load_many(vec!["a", "b", "c"]).await;

    loader.clear_all();
    let _ = loader.load("a").await;

    assert_eq!(
        context.calls(),
        vec![vec!["a", "b", "c"], vec!["a"], vec!["b", "c"], vec!["a"]]
    );
}

#[tokio::test]
async fn max_batch_size_splits_batches() {
    let context = abc();
    let loader = loader_with(&context, LoaderOptions::new().with_max_batch_size(2));

    let values = loader.load_many(vec!["a", "b", "c"]).await;
    assert_eq!(
        values.into_iter().map(Result::ok).collect::<Vec<_>>(),
        vec![Some(1), Some(2), Some(3)]
    );

    // Chunks may run concurrently, so only their contents are fixed.
    let mut calls = context.calls();
    calls.sort();
    assert_eq!(calls, vec![vec!["a", "b"], vec!["c"]]);
}

#[tokio::test]
async fn disabled_cache_refetches_across_frames() {
    let context = abc();
    let loader = loader_with(&context, LoaderOptions::new().with_cache(false));

    let (a, a_again) = future::join(loader.load("a"), loader.load("a")).await;
    assert_eq!((a.ok(), a_again.ok()), (Some(1), Some(1)));
    assert_eq!(loader.load("a").await.ok(), Some(1));

    loader.prime("b", 20);
    assert_eq!(loader.load("b").await.ok(), Some(2));

    assert_eq!(context.calls(), vec![vec!["a"], vec!["a"], vec!["b"]]);
}

#[tokio::test]
async fn per_key_errors_are_cached_only_on_request() {
    let context = abc();
    let loader = loader(&context);
    assert!(loader.load("nope").await.is_err());
    assert!(loader.load("nope").await.is_err());
    assert_eq!(context.calls().len(), 2);

    let context = abc();
    let loader = loader_with(&context, LoaderOptions::new().with_cache_errors(true));
    assert!(loader.load("nope").await.is_err());
    assert!(matches!(loader.load("nope").await, Err(LoadError::PerKey(_))));
    assert_eq!(context.calls().len(), 1);
}

#[tokio::test]
async fn keys_are_deduplicated_by_their_normalized_form() {
    let context = Arc::new(DummyContext::with_values(&[("Alice", 1), ("alice", 2)]));
    let options = LoaderOptions::new().with_key_fn(|k: &&'static str| k.to_lowercase());
    let loader: Loader<&'static str, i64, String, String> =
        Loader::with_options(DummyDataLoader, Arc::clone(&context), options);

    let (first, second) = future::join(loader.load("Alice"), loader.load("alice")).await;
    assert_eq!((first.ok(), second.ok()), (Some(1), Some(1)));
    assert_eq!(loader.load("ALICE").await.ok(), Some(1));
    assert_eq!(context.calls(), vec![vec!["Alice"]]);
}

async fn wait_for_calls(context: &DummyContext, count: usize) {
    while context.calls().len() < count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn loads_during_an_inflight_batch_start_a_new_batch() {
    let context = Arc::new(DummyContext {
        gate: Some(Semaphore::new(0)),
        ..DummyContext::with_values(&[("a", 1), ("b", 2)])
    });
    let loader = Arc::new(loader(&context));

    let first = tokio::spawn({
        let loader = Arc::clone(&loader);
        async move { loader.load("a").await }
    });
    wait_for_calls(&context, 1).await;

    // "a" is in flight: the second request joins it, "b" goes out on its own.
    let second = tokio::spawn({
        let loader = Arc::clone(&loader);
        async move { future::join(loader.load("a"), loader.load("b")).await }
    });
    wait_for_calls(&context, 2).await;

    if let Some(gate) = &context.gate {
        gate.add_permits(2);
    }
    assert_eq!(first.await.unwrap().ok(), Some(1));
    let (a, b) = second.await.unwrap();
    assert_eq!((a.ok(), b.ok()), (Some(1), Some(2)));
    assert_eq!(context.calls(), vec![vec!["a"], vec!["b"]]);
}

/// Returns once every op sent before this call has been processed by the worker.
async fn settle_queue(loader: &DummyLoader) {
    loader.prime("sync", 0);
    let _ = loader.load("sync").await;
}

fn release(context: &DummyContext, permits: usize) {
    if let Some(gate) = &context.gate {
        gate.add_permits(permits);
    }
}

#[tokio::test]
async fn clearing_an_inflight_key_settles_it_without_caching() {
    let context = Arc::new(DummyContext {
        gate: Some(Semaphore::new(0)),
        ..DummyContext::with_values(&[("a", 1)])
    });
    let loader = Arc::new(loader(&context));

    let first = tokio::spawn({
        let loader = Arc::clone(&loader);
        async move { loader.load("a").await }
    });
    wait_for_calls(&context, 1).await;

    loader.clear(&"a");
    settle_queue(&loader).await;
    release(&context, 2);

    assert_eq!(first.await.unwrap().ok(), Some(1));
    assert_eq!(loader.load("a").await.ok(), Some(1));
    assert_eq!(context.calls(), vec![vec!["a"], vec!["a"]]);
}

#[tokio::test]
async fn prime_leaves_an_inflight_key_alone() {
    let context = Arc::new(DummyContext {
        gate: Some(Semaphore::new(0)),
        ..DummyContext::with_values(&[("a", 1)])
    });
    let loader = Arc::new(loader(&context));

    let first = tokio::spawn({
        let loader = Arc::clone(&loader);
        async move { loader.load("a").await }
    });
    wait_for_calls(&context, 1).await;

    loader.prime("a", 100);
    // This load must join the in-flight batch instead of seeing the primed value.
    let (joined, ()) = future::join(loader.load("a"), async {
        settle_queue(&loader).await;
        release(&context, 1);
    })
    .await;

    assert_eq!(joined.ok(), Some(1));
    assert_eq!(first.await.unwrap().ok(), Some(1));
    assert_eq!(context.calls(), vec![vec!["a"]]);
}

#[tokio::test]
async fn prime_leaves_a_staged_key_alone() {
    let context = abc();
    let loader = loader(&context);

    let (staged, (), joined) =
        future::join3(loader.load("b"), async { loader.prime("b", 20) }, loader.load("b")).await;

    assert_eq!((staged.ok(), joined.ok()), (Some(2), Some(2)));
    assert_eq!(loader.load("b").await.ok(), Some(2));
    assert_eq!(context.calls(), vec![vec!["b"]]);
}

/// Records the size of every batch it is called with.
struct Squares;

#[async_trait]
impl BatchFunction<u64, u64> for Squares {
    type Context = Arc<Mutex<Vec<usize>>>;
    type Error = String;

    async fn load(
        keys: &[u64],
        batch_sizes: &Arc<Mutex<Vec<usize>>>,
    ) -> Result<Vec<Result<u64, String>>, String> {
        batch_sizes.lock().unwrap().push(keys.len());
        Ok(keys.iter().map(|k| Ok(k * k)).collect())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn burst_from_another_thread_is_one_batch() {
    for _ in 0..20 {
        let batch_sizes = Arc::new(Mutex::new(Vec::new()));
        let loader: Loader<u64, u64, String> = Loader::new(Squares, Arc::clone(&batch_sizes));

        let values = future::join_all((0..50u64).map(|k| loader.load(k))).await;
        let values = values.into_iter().map(Result::ok).collect::<Vec<_>>();
        assert_eq!(values, (0..50u64).map(|k| Some(k * k)).collect::<Vec<_>>());
        assert_eq!(*batch_sizes.lock().unwrap(), vec![50]);
    }
}

#[test]
fn load_error_messages() {
    let malformed: LoadError<String> = LoadError::MalformedBatchResult { expected: 3, actual: 1 };
    assert_eq!(malformed.to_string(), "batch function returned 1 results for 3 keys");
    let per_key = LoadError::PerKey(Arc::new("gone".to_owned()));
    assert_eq!(per_key.to_string(), "failed to load key: gone");
    assert_eq!(per_key.clone().cause().map(String::as_str), Some("gone"));
    assert!(LoadError::<String>::InvalidKey.cause().is_none());
}
