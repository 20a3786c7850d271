//! In-process document store.
//!
//! # Responsibility
//! - Provide a dependency-free backend for tests and throwaway sessions.
//!
//! # Invariants
//! - Commit timestamps are strictly increasing within one store.
//! - Snapshots are published while the state lock is held, so subscribers
//!   observe commits in order.

use super::feed::SubscriberSet;
use super::{
    now_millis, order_documents, resolve_server_timestamps, validate_collection, Document,
    DocumentId, DocumentStore, Fields, OrderBy, StoreError, StoreResult, Subscription,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<String, BTreeMap<DocumentId, Fields>>,
    subscribers: SubscriberSet,
    last_commit_millis: i64,
}

impl MemoryState {
    fn next_commit_millis(&mut self) -> i64 {
        let next = now_millis().max(self.last_commit_millis + 1);
        self.last_commit_millis = next;
        next
    }

    fn ordered(&self, collection: &str, order: &OrderBy) -> Vec<Document> {
        let mut documents: Vec<Document> = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        order_documents(&mut documents, order);
        documents
    }

    fn publish(&mut self, collection: &str) {
        for order in self.subscribers.orders(collection) {
            let documents = self.ordered(collection, &order);
            self.subscribers.publish(collection, &order, &documents);
        }
    }
}

/// Document store kept entirely in memory.
#[derive(Default)]
pub struct MemoryDocumentStore {
    state: Mutex<MemoryState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents currently in `collection`.
    pub fn document_count(&self, collection: &str) -> StoreResult<usize> {
        let state = self.lock()?;
        Ok(state.collections.get(collection).map_or(0, BTreeMap::len))
    }

    /// Returns one stored document, if present.
    pub fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let state = self.lock()?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    /// Number of open subscriptions on `collection`.
    pub fn live_subscriptions(&self, collection: &str) -> StoreResult<usize> {
        let mut state = self.lock()?;
        Ok(state.subscribers.live_count(collection))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, collection: &str, mut fields: Fields) -> StoreResult<DocumentId> {
        validate_collection(collection)?;
        let mut state = self.lock()?;
        let commit = state.next_commit_millis();
        resolve_server_timestamps(&mut fields, commit);

        let id = Uuid::new_v4().to_string();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        state.publish(collection);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, mut fields: Fields) -> StoreResult<()> {
        validate_collection(collection)?;
        let mut state = self.lock()?;
        let commit = state.next_commit_millis();
        resolve_server_timestamps(&mut fields, commit);

        let existing = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        existing.extend(fields);
        state.publish(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        validate_collection(collection)?;
        let mut state = self.lock()?;
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id));
        if removed.is_some() {
            state.publish(collection);
        }
        Ok(())
    }

    async fn subscribe_ordered(
        &self,
        collection: &str,
        order: OrderBy,
    ) -> StoreResult<Subscription> {
        validate_collection(collection)?;
        let mut state = self.lock()?;
        let initial = state.ordered(collection, &order);
        Ok(state.subscribers.add(collection, order, Ok(initial)))
    }
}
