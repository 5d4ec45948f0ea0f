use std::sync::Arc;

use async_trait::async_trait;

use super::auth::{self, AuthError};
use super::model::{User, UserId};
use super::store::{DocumentStore, StoreError};
use crate::{align, BatchFunction, Loader, LoaderOptions};

/// Fetches every requested user with one store query.
pub struct UserBatch;

#[async_trait]
impl BatchFunction<UserId, User> for UserBatch {
    type Context = Arc<dyn DocumentStore>;
    type Error = StoreError;

    async fn load(
        keys: &[UserId],
        store: &Self::Context,
    ) -> Result<Vec<Result<User, StoreError>>, StoreError> {
        let users = store.find_users(keys).await?;
        Ok(align(keys, users, |user| user.id, |id| StoreError::NotFound {
            collection: "users",
            id: id.to_string(),
        }))
    }
}

/// User loader keyed by the string form of the id.
pub type UserLoader = Loader<UserId, User, StoreError, String>;

/// The loaders of one request.
pub struct Loaders {
    pub users: UserLoader,
}

impl Loaders {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let options = LoaderOptions::<UserId, _>::new().with_key_fn(|id: &UserId| id.to_string());
        Self { users: Loader::with_options(UserBatch, store, options) }
    }
}

/// Everything a resolver may need while serving one request. Built fresh for every request and
/// dropped with it, taking the loader caches along.
pub struct RequestContext {
    pub store: Arc<dyn DocumentStore>,
    pub user: Option<User>,
    pub loaders: Loaders,
}

impl RequestContext {
    pub async fn new(
        store: Arc<dyn DocumentStore>,
        authorization: Option<&str>,
    ) -> Result<Self, AuthError> {
        let user = auth::authenticate(authorization, store.as_ref()).await?;
        Ok(Self { loaders: Loaders::new(Arc::clone(&store)), store, user })
    }
}
