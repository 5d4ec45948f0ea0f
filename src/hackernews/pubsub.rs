use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use super::model::Link;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationType {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub mutation: MutationType,
    pub node: Link,
}

/// Argument of the `Link` subscription. `None` or an empty list accepts every mutation.
#[derive(Debug, Clone, Default)]
pub struct LinkSubscriptionFilter {
    pub mutation_in: Option<Vec<MutationType>>,
}

impl LinkSubscriptionFilter {
    pub fn accepts(&self, event: &LinkEvent) -> bool {
        match &self.mutation_in {
            Some(kinds) if !kinds.is_empty() => kinds.contains(&event.mutation),
            _ => true,
        }
    }
}

/// Fan-out of link mutations to live subscribers.
#[derive(Debug, Clone)]
pub struct LinkPubSub {
    tx: broadcast::Sender<LinkEvent>,
}

impl LinkPubSub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns the number of subscribers the event reached.
    pub fn publish(&self, event: LinkEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Events published after this call that pass `filter`. A subscriber that falls more than
    /// `capacity` events behind skips the ones it missed.
    pub fn subscribe(&self, filter: LinkSubscriptionFilter) -> BoxStream<'static, LinkEvent> {
        stream::unfold((self.tx.subscribe(), filter), |(mut rx, filter)| async move {
            loop {
                let received = rx.recv().await;
                match received {
                    Ok(event) if filter.accepts(&event) => return Some((event, (rx, filter))),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "link subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

impl Default for LinkPubSub {
    fn default() -> Self {
        Self::new(64)
    }
}
