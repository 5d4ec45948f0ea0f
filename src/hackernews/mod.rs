//! Hackernews backend: links, users, token authentication and live link events, with link
//! authors resolved through a per-request [`crate::Loader`].

pub mod auth;
pub mod context;
pub mod filter;
pub mod model;
pub mod pubsub;
pub mod resolvers;
pub mod store;

pub use auth::AuthError;
pub use context::{Loaders, RequestContext, UserBatch, UserLoader};
pub use filter::LinkFilter;
pub use model::{EmailCredentials, Link, LinkId, SigninPayload, User, UserId};
pub use pubsub::{LinkEvent, LinkPubSub, LinkSubscriptionFilter, MutationType};
pub use resolvers::Hackernews;
pub use store::{DocumentStore, MemoryStore, StoreError};
