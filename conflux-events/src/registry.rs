//! Topic → handler subscriptions.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use conflux_core::traits::Handler;
use conflux_core::types::Topic;

/// Per-topic handler lists with snapshot reads.
///
/// Each list is an immutable `Arc<[Handler]>`. Mutations build a new list and
/// swap it in under the topic's shard lock, so a reader holding a snapshot
/// never sees a partial update:
///
/// - a handler subscribed after a snapshot was taken is not part of it;
/// - a handler removed after a snapshot was taken may still be invoked from it.
///
/// # Thread Safety
///
/// All operations are thread-safe and can be called concurrently, including
/// while events are being published.
#[derive(Default)]
pub struct SubscriptionRegistry {
    topics: DashMap<Topic, Arc<[Handler]>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `topic`.
    ///
    /// The same handler may be subscribed more than once; it is then invoked
    /// once per subscription.
    pub fn subscribe(&self, topic: Topic, handler: Handler) {
        let name = handler.name().to_string();
        let count = match self.topics.entry(topic) {
            Entry::Occupied(mut occupied) => {
                let mut list = occupied.get().to_vec();
                list.push(handler);
                let count = list.len();
                occupied.insert(list.into());
                count
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::from(vec![handler]));
                1
            }
        };
        debug!(%topic, handler = %name, subscribers = count, "Handler subscribed");
    }

    /// Removes the first subscription of this exact handler instance.
    ///
    /// Returns false if it was not subscribed to `topic`.
    pub fn unsubscribe(&self, topic: Topic, handler: &Handler) -> bool {
        let Some(mut list) = self.topics.get_mut(&topic) else {
            return false;
        };
        let Some(position) = list.iter().position(|h| same_handler(h, handler)) else {
            return false;
        };

        let mut updated = list.to_vec();
        updated.remove(position);
        *list = updated.into();
        debug!(%topic, handler = %handler.name(), subscribers = list.len(), "Handler unsubscribed");
        true
    }

    /// Current handlers for `topic`, or `None` if it has no subscribers.
    pub fn snapshot(&self, topic: Topic) -> Option<Arc<[Handler]>> {
        self.topics
            .get(&topic)
            .map(|list| Arc::clone(list.value()))
            .filter(|list| !list.is_empty())
    }

    /// Number of subscriptions for `topic`.
    pub fn handler_count(&self, topic: Topic) -> usize {
        self.topics.get(&topic).map(|list| list.len()).unwrap_or(0)
    }

    /// Topics with at least one subscriber, in declaration order.
    pub fn topics(&self) -> Vec<Topic> {
        Topic::ALL
            .into_iter()
            .filter(|topic| self.handler_count(*topic) > 0)
            .collect()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for topic in Topic::ALL {
            let count = self.handler_count(topic);
            if count > 0 {
                map.entry(&topic, &count);
            }
        }
        map.finish()
    }
}

/// Handlers are identified by the allocation they point to.
fn same_handler(a: &Handler, b: &Handler) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
