//! Per-collection snapshot fan-out.

use super::{Document, OrderBy, SnapshotResult, StoreError, Subscription};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

struct Subscriber {
    order: OrderBy,
    sender: mpsc::UnboundedSender<SnapshotResult>,
}

/// Live subscribers grouped by collection.
#[derive(Default)]
pub struct SubscriberSet {
    by_collection: BTreeMap<String, Vec<Subscriber>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and hands it `initial` as its first snapshot.
    pub fn add(
        &mut self,
        collection: &str,
        order: OrderBy,
        initial: SnapshotResult,
    ) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        // A fresh receiver is open, so the first send cannot fail.
        let _ = sender.send(initial);
        self.by_collection
            .entry(collection.to_string())
            .or_default()
            .push(Subscriber { order, sender });
        Subscription::new(receiver)
    }

    /// Returns the distinct orderings wanted by live subscribers.
    ///
    /// Closed subscribers are pruned first.
    pub fn orders(&mut self, collection: &str) -> Vec<OrderBy> {
        let Some(subscribers) = self.by_collection.get_mut(collection) else {
            return Vec::new();
        };
        subscribers.retain(|subscriber| !subscriber.sender.is_closed());
        let mut orders: Vec<OrderBy> = Vec::new();
        for subscriber in subscribers.iter() {
            if !orders.contains(&subscriber.order) {
                orders.push(subscriber.order.clone());
            }
        }
        orders
    }

    /// Delivers `documents` to every subscriber that asked for `order`.
    pub fn publish(&mut self, collection: &str, order: &OrderBy, documents: &[Document]) {
        if let Some(subscribers) = self.by_collection.get_mut(collection) {
            subscribers.retain(|subscriber| {
                subscriber.order != *order
                    || subscriber.sender.send(Ok(documents.to_vec())).is_ok()
            });
        }
    }

    /// Delivers a subscription error to every subscriber that asked for `order`.
    pub fn publish_error(&mut self, collection: &str, order: &OrderBy, message: &str) {
        if let Some(subscribers) = self.by_collection.get_mut(collection) {
            subscribers.retain(|subscriber| {
                subscriber.order != *order
                    || subscriber
                        .sender
                        .send(Err(StoreError::Backend(message.to_string())))
                        .is_ok()
            });
        }
    }

    /// Collections that still have open subscribers.
    ///
    /// Closed subscribers are pruned first.
    pub fn live_collections(&mut self) -> Vec<String> {
        self.by_collection.retain(|_, subscribers| {
            subscribers.retain(|subscriber| !subscriber.sender.is_closed());
            !subscribers.is_empty()
        });
        self.by_collection.keys().cloned().collect()
    }

    /// Number of open subscribers for `collection`.
    pub fn live_count(&mut self, collection: &str) -> usize {
        match self.by_collection.get_mut(collection) {
            Some(subscribers) => {
                subscribers.retain(|subscriber| !subscriber.sender.is_closed());
                subscribers.len()
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SubscriberSet;
    use crate::store::{Document, Fields, OrderBy};

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            fields: Fields::new(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_initial_then_published_snapshots() {
        let mut set = SubscriberSet::new();
        let order = OrderBy::descending("createdAt");
        let mut sub = set.add("notes", order.clone(), Ok(vec![]));

        set.publish("notes", &order, &[doc("a")]);

        let first = sub.next_snapshot().await.unwrap().unwrap();
        assert!(first.is_empty());
        let second = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(second[0].id, "a");
    }

    #[tokio::test]
    async fn released_subscribers_are_pruned() {
        let mut set = SubscriberSet::new();
        let order = OrderBy::descending("createdAt");
        let sub = set.add("notes", order.clone(), Ok(vec![]));
        assert_eq!(set.live_count("notes"), 1);

        sub.unsubscribe();
        set.publish("notes", &order, &[doc("a")]);
        assert_eq!(set.live_count("notes"), 0);
        assert!(set.orders("notes").is_empty());
    }

    #[tokio::test]
    async fn live_collections_skip_released_feeds() {
        let mut set = SubscriberSet::new();
        let order = OrderBy::descending("createdAt");
        let _notes = set.add("notes", order.clone(), Ok(vec![]));
        let archive = set.add("archive", order, Ok(vec![]));
        assert_eq!(set.live_collections(), vec!["archive", "notes"]);

        archive.unsubscribe();
        assert_eq!(set.live_collections(), vec!["notes"]);
    }
}
