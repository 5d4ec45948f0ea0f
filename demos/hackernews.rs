//! Serves a few Hackernews operations against the in-memory store and shows the link authors of
//! one `allLinks` response being fetched in a single batch.

use std::sync::Arc;

use futures::{future, StreamExt};
use hn_dataload::hackernews::{
    EmailCredentials, Hackernews, LinkFilter, LinkSubscriptionFilter, MemoryStore,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    let api = Hackernews::new(Arc::new(MemoryStore::new()));
    let mut events = api.link_events(LinkSubscriptionFilter::default());

    let anonymous = api.context(None).await?;
    for (name, email) in [("Ada", "ada@example.com"), ("Linus", "linus@example.com")] {
        let credentials =
            EmailCredentials { email: email.to_owned(), password: "hunter2".to_owned() };
        api.create_user(&anonymous, name.to_owned(), credentials).await?;
    }

    for (email, url, description) in [
        ("ada@example.com", "https://howtographql.com", "GraphQL tutorial"),
        ("linus@example.com", "https://kernel.org", "Linux kernel"),
        ("ada@example.com", "https://graphql.org", "GraphQL spec"),
    ] {
        let authorization = format!("bearer token-{}", email);
        let ctx = api.context(Some(&authorization)).await?;
        api.create_link(&ctx, url.to_owned(), description.to_owned()).await?;
        if let Some(event) = events.next().await {
            println!("{:?} {}", event.mutation, event.node.url);
        }
    }

    // One request: every `postedBy` of the page shares one loader, so the store sees one query.
    let ctx = api.context(None).await?;
    let filter = LinkFilter::description_contains("GraphQL").or(LinkFilter::url_contains("kernel"));
    let links = api.all_links(Some(&filter), None, None).await?;
    let authors = future::join_all(links.iter().map(|link| api.posted_by(&ctx, link))).await;
    for (link, author) in links.iter().zip(authors) {
        let author = author?.map(|user| user.name).unwrap_or_else(|| "anonymous".to_owned());
        println!("{} by {}", link.description, author);
    }

    Ok(())
}
