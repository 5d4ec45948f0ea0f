use std::sync::Arc;

use futures::stream::BoxStream;

use super::auth::{self, AuthError};
use super::context::RequestContext;
use super::filter::LinkFilter;
use super::model::{EmailCredentials, Link, NewLink, NewUser, SigninPayload, User};
use super::pubsub::{LinkEvent, LinkPubSub, LinkSubscriptionFilter, MutationType};
use super::store::{DocumentStore, StoreError};
use crate::LoadError;

/// Query, mutation and subscription entry points of the Hackernews API, plus the `Link.postedBy`
/// field resolver. Process-wide state is limited to the store handle and the pubsub; anything
/// request scoped travels in the [`RequestContext`].
pub struct Hackernews {
    store: Arc<dyn DocumentStore>,
    pubsub: LinkPubSub,
}

impl Hackernews {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, pubsub: LinkPubSub::default() }
    }

    /// Authenticates the request and builds its context, including fresh loaders.
    pub async fn context(&self, authorization: Option<&str>) -> Result<RequestContext, AuthError> {
        RequestContext::new(Arc::clone(&self.store), authorization).await
    }

    /// `allLinks(filter, skip, first)`. A zero `first` is treated as no limit.
    pub async fn all_links(
        &self,
        filter: Option<&LinkFilter>,
        skip: Option<usize>,
        first: Option<usize>,
    ) -> Result<Vec<Link>, StoreError> {
        let first = first.filter(|&n| n > 0);
        self.store.find_links(filter, skip.unwrap_or(0), first).await
    }

    /// `createLink(url, description)`. The link is attributed to the authenticated user, if any,
    /// and announced to subscribers.
    pub async fn create_link(
        &self,
        ctx: &RequestContext,
        url: String,
        description: String,
    ) -> Result<Link, StoreError> {
        let posted_by = ctx.user.as_ref().map(|user| user.id);
        let link = self.store.insert_link(NewLink { url, description, posted_by }).await?;
        let reached = self
            .pubsub
            .publish(LinkEvent { mutation: MutationType::Created, node: link.clone() });
        tracing::debug!(id = %link.id, reached, "published link");
        Ok(link)
    }

    /// `createUser(name, authProvider: { email: { email, password } })`.
    pub async fn create_user(
        &self,
        ctx: &RequestContext,
        name: String,
        credentials: EmailCredentials,
    ) -> Result<User, StoreError> {
        let user = self
            .store
            .insert_user(NewUser { name, email: credentials.email, password: credentials.password })
            .await?;
        ctx.loaders.users.prime(user.id, user.clone());
        Ok(user)
    }

    /// `signinUser(email: { email, password })`.
    pub async fn signin_user(
        &self,
        ctx: &RequestContext,
        credentials: &EmailCredentials,
    ) -> Result<SigninPayload, AuthError> {
        let payload = auth::signin(credentials, self.store.as_ref()).await?;
        ctx.loaders.users.prime(payload.user.id, payload.user.clone());
        Ok(payload)
    }

    /// `Link(filter: { mutation_in })` subscription.
    pub fn link_events(&self, filter: LinkSubscriptionFilter) -> BoxStream<'static, LinkEvent> {
        self.pubsub.subscribe(filter)
    }

    /// `Link.postedBy`. Anonymous links and authors missing from the store resolve to `None`;
    /// every other failure is passed on for the field's error.
    pub async fn posted_by(
        &self,
        ctx: &RequestContext,
        link: &Link,
    ) -> Result<Option<User>, LoadError<StoreError>> {
        let author = match link.posted_by {
            Some(author) => author,
            None => return Ok(None),
        };
        match ctx.loaders.users.load(author).await {
            Ok(user) => Ok(Some(user)),
            Err(LoadError::PerKey(e)) if matches!(*e, StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
