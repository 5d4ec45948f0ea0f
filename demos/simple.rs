use std::collections::HashMap;

use async_trait::async_trait;
use hn_dataload::{BatchFunction, LoadError, Loader};

// Empty functor that implements the BatchFunction trait. For this example, it
// trivially loads values from some HashMap, reporting misses per key.
struct MyBatchFn;

#[async_trait]
impl BatchFunction<i64, String> for MyBatchFn {
    type Context = HashMap<i64, String>;
    type Error = String;

    async fn load(
        keys: &[i64],
        context: &Self::Context,
    ) -> Result<Vec<Result<String, String>>, String> {
        Ok(keys
            .iter()
            .map(|k| context.get(k).cloned().ok_or_else(|| format!("no film {}", k)))
            .collect())
    }
}

#[tokio::main]
async fn main() {
    let mut context = HashMap::new();
    context.insert(2001, "a space odyssey".to_owned());
    context.insert(7, "samurai".to_owned());
    context.insert(12, "angry men".to_owned());

    let loader = Loader::new(MyBatchFn {}, context);

    assert_eq!(loader.load(7).await.ok().as_deref(), Some("samurai"));
    assert!(matches!(loader.load(15).await, Err(LoadError::PerKey(_))));
    assert!(matches!(loader.load_opt(None).await, Err(LoadError::InvalidKey)));

    let films = loader.load_many(vec![12, 2010, 2001]).await;
    for film in &films {
        match film {
            Ok(title) => println!("found {}", title),
            Err(e) => println!("{}", e),
        }
    }
}
