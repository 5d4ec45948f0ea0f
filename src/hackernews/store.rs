use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use super::filter::LinkFilter;
use super::model::{Link, LinkId, NewLink, NewUser, User, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no document in `{collection}` with id {id}")]
    NotFound { collection: &'static str, id: String },
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// The `users` and `links` collections the resolvers read and write.
///
/// `find_users` follows database `$in` semantics: unknown ids are skipped and the result order is
/// the store's, not the order of `ids`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError>;

    async fn insert_link(&self, link: NewLink) -> Result<Link, StoreError>;
    /// Links matching `filter` in insertion order, skipping `skip` and returning at most `first`.
    async fn find_links(
        &self,
        filter: Option<&LinkFilter>,
        skip: usize,
        first: Option<usize>,
    ) -> Result<Vec<Link>, StoreError>;
}

/// In-process [`DocumentStore`] backed by two vectors.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<Vec<User>>,
    links: RwLock<Vec<Link>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let user = User {
            id: UserId(self.next_id()),
            name: user.name,
            email: user.email,
            password: user.password,
        };
        self.users.write().await.push(user.clone());
        tracing::debug!(id = %user.id, "inserted user");
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.iter().find(|u| u.email == email).cloned())
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError> {
        tracing::debug!(?ids, "find users");
        Ok(self.users.read().await.iter().filter(|u| ids.contains(&u.id)).cloned().collect())
    }

    async fn insert_link(&self, link: NewLink) -> Result<Link, StoreError> {
        let link = Link {
            id: LinkId(self.next_id()),
            url: link.url,
            description: link.description,
            posted_by: link.posted_by,
        };
        self.links.write().await.push(link.clone());
        tracing::debug!(id = %link.id, "inserted link");
        Ok(link)
    }

    async fn find_links(
        &self,
        filter: Option<&LinkFilter>,
        skip: usize,
        first: Option<usize>,
    ) -> Result<Vec<Link>, StoreError> {
        let links = self.links.read().await;
        let matching = links.iter().filter(|l| filter.map_or(true, |f| f.matches(l))).skip(skip);
        Ok(match first {
            Some(first) => matching.take(first).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }
}
