#![allow(dead_code)]

use async_trait::async_trait;
use notefeed_core::store::{DocumentId, SnapshotResult};
use notefeed_core::{
    Document, DocumentStore, FieldValue, Fields, ListState, MemoryDocumentStore,
    NoteListController, NoteService, OrderBy, RecordingNotifier, StoreError, StoreResult,
    Subscription,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub const COLLECTION: &str = "notes";
const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(Fields),
    Update { id: String, fields: Fields },
    Delete(String),
    Subscribe,
}

/// Memory store with switchable write failures and a call log.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryDocumentStore,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_delete_ids: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inner(&self) -> &MemoryDocumentStore {
        &self.inner
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn subscribe_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Subscribe))
            .count()
    }

    pub fn fail_delete(&self, id: &str) {
        self.fail_delete_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Create(_)))
            .count()
    }

    pub fn updates(&self) -> Vec<(String, Fields)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update { id, fields } => Some((id, fields)),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<DocumentId> {
        self.record(Call::Create(fields.clone()));
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("create rejected".to_string()));
        }
        self.inner.create(collection, fields).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.record(Call::Update {
            id: id.to_string(),
            fields: fields.clone(),
        });
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("update rejected".to_string()));
        }
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.record(Call::Delete(id.to_string()));
        if self.fail_delete_ids.lock().unwrap().contains(id) {
            return Err(StoreError::Backend("delete rejected".to_string()));
        }
        self.inner.delete(collection, id).await
    }

    async fn subscribe_ordered(
        &self,
        collection: &str,
        order: OrderBy,
    ) -> StoreResult<Subscription> {
        self.record(Call::Subscribe);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("listen rejected".to_string()));
        }
        self.inner.subscribe_ordered(collection, order).await
    }
}

/// Store whose snapshots are pushed by the test.
#[derive(Default)]
pub struct ManualFeedStore {
    senders: Mutex<Vec<mpsc::UnboundedSender<SnapshotResult>>>,
    subscribe_calls: Mutex<usize>,
}

impl ManualFeedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sends a snapshot to every open subscription; returns how many received it.
    pub fn push_snapshot(&self, documents: Vec<Document>) -> usize {
        self.push_with(|| Ok(documents.clone()))
    }

    /// Sends a stream error to every open subscription.
    pub fn push_error(&self, message: &str) -> usize {
        self.push_with(|| Err(StoreError::Backend(message.to_string())))
    }

    fn push_with(&self, item: impl Fn() -> SnapshotResult) -> usize {
        let senders = self.senders.lock().unwrap();
        senders
            .iter()
            .filter(|sender| sender.send(item()).is_ok())
            .count()
    }

    pub fn subscribe_calls(&self) -> usize {
        *self.subscribe_calls.lock().unwrap()
    }
}

#[async_trait]
impl DocumentStore for ManualFeedStore {
    async fn create(&self, _collection: &str, _fields: Fields) -> StoreResult<DocumentId> {
        Err(StoreError::Backend("manual feed is read-only".to_string()))
    }

    async fn update(&self, _collection: &str, _id: &str, _fields: Fields) -> StoreResult<()> {
        Err(StoreError::Backend("manual feed is read-only".to_string()))
    }

    async fn delete(&self, _collection: &str, _id: &str) -> StoreResult<()> {
        Err(StoreError::Backend("manual feed is read-only".to_string()))
    }

    async fn subscribe_ordered(
        &self,
        _collection: &str,
        _order: OrderBy,
    ) -> StoreResult<Subscription> {
        *self.subscribe_calls.lock().unwrap() += 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(sender);
        Ok(Subscription::new(receiver))
    }
}

pub fn controller_over(
    store: Arc<dyn DocumentStore>,
) -> (NoteListController, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let service = NoteService::new(store, COLLECTION).unwrap();
    (NoteListController::new(service, notifier.clone()), notifier)
}

/// Waits until `predicate` holds for the list state and returns a copy.
pub async fn wait_until(
    updates: &mut watch::Receiver<ListState>,
    predicate: impl FnMut(&ListState) -> bool,
) -> ListState {
    let state = tokio::time::timeout(WAIT, updates.wait_for(predicate))
        .await
        .expect("timed out waiting for list state")
        .expect("list state sender dropped");
    ListState::clone(&state)
}

/// Waits for the first snapshot after activation.
pub async fn wait_loaded(updates: &mut watch::Receiver<ListState>) -> ListState {
    wait_until(updates, |state| !state.loading).await
}

pub fn note_document(id: &str, title: &str, content: &str, created_at: Option<i64>) -> Document {
    let mut fields = Fields::new();
    fields.insert("title".to_string(), FieldValue::Text(title.to_string()));
    fields.insert("content".to_string(), FieldValue::Text(content.to_string()));
    fields.insert(
        "createdAt".to_string(),
        created_at.map_or(FieldValue::ServerTimestamp, FieldValue::Timestamp),
    );
    Document {
        id: id.to_string(),
        fields,
    }
}
