//! Document store boundary and backend implementations.
//!
//! # Responsibility
//! - Define the client contract the note components talk to.
//! - Share ordering and fan-out rules across backends.
//!
//! # Invariants
//! - Every backend resolves `FieldValue::ServerTimestamp` at commit time.
//! - Every committed write is followed by a full ordered snapshot to the
//!   collection's live subscribers.
//! - Subscribers always receive the full record set, never a diff.
//!
//! # See also
//! - `store::memory`, `store::sqlite`

use crate::db::DbError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::sync::mpsc;

pub mod feed;
pub mod memory;
pub mod sqlite;

/// Opaque store-assigned document identifier.
pub type DocumentId = String;

/// Field map of one document.
pub type Fields = BTreeMap<String, FieldValue>;

pub type StoreResult<T> = Result<T, StoreError>;

/// One snapshot item delivered by a live subscription.
pub type SnapshotResult = Result<Vec<Document>, StoreError>;

/// Schema-flexible field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    /// Unix epoch milliseconds.
    Timestamp(i64),
    /// Write-side placeholder, replaced by the commit time.
    ServerTimestamp,
    Null,
}

/// Stored record with its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering requested for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }
}

/// Store-level error for writes, reads and subscriptions.
#[derive(Debug)]
pub enum StoreError {
    InvalidCollection(String),
    NotFound(DocumentId),
    Db(DbError),
    Codec(serde_json::Error),
    /// Backend-reported failure with a human-readable message.
    Backend(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCollection(name) => write!(f, "invalid collection name: `{name}`"),
            Self::NotFound(id) => write!(f, "document not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Codec(err) => write!(f, "document codec error: {err}"),
            Self::Backend(message) => write!(f, "store backend error: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value)
    }
}

/// Client contract of a document store with live subscriptions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document and returns its generated id.
    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<DocumentId>;
    /// Merges `fields` into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;
    /// Removes one document; absent documents are a no-op.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;
    /// Opens a live feed of full ordered snapshots for `collection`.
    async fn subscribe_ordered(
        &self,
        collection: &str,
        order: OrderBy,
    ) -> StoreResult<Subscription>;
}

/// Live feed handle. Dropping it releases the subscription.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<SnapshotResult>,
}

impl Subscription {
    /// Wraps the receiving half of a backend-owned snapshot channel.
    pub fn new(receiver: mpsc::UnboundedReceiver<SnapshotResult>) -> Self {
        Self { receiver }
    }

    /// Waits for the next snapshot. Returns `None` once the store side closes.
    pub async fn next_snapshot(&mut self) -> Option<SnapshotResult> {
        self.receiver.recv().await
    }

    /// Returns an already-delivered snapshot without waiting.
    pub fn try_next_snapshot(&mut self) -> Option<SnapshotResult> {
        self.receiver.try_recv().ok()
    }

    /// Releases the feed. No further snapshots are delivered.
    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}

/// Validates a collection name (`[a-z0-9_-]+`).
pub fn validate_collection(name: &str) -> StoreResult<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

pub(crate) fn is_valid_identifier(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Replaces server timestamp sentinels with `commit_millis`.
pub fn resolve_server_timestamps(fields: &mut Fields, commit_millis: i64) {
    for value in fields.values_mut() {
        if *value == FieldValue::ServerTimestamp {
            *value = FieldValue::Timestamp(commit_millis);
        }
    }
}

/// Sorts documents by `order`.
///
/// Missing or unresolved values order as most recent: first for
/// `Descending`, last for `Ascending`. Ties fall back to id ascending.
pub fn order_documents(documents: &mut [Document], order: &OrderBy) {
    documents.sort_by(|left, right| {
        let a = sort_key(left, &order.field);
        let b = sort_key(right, &order.field);
        let primary = match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        };
        let primary = match order.direction {
            Direction::Ascending => primary,
            Direction::Descending => primary.reverse(),
        };
        primary.then_with(|| left.id.cmp(&right.id))
    });
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey<'a> {
    Integer(i64),
    Text(&'a str),
}

fn sort_key<'a>(document: &'a Document, field: &str) -> Option<SortKey<'a>> {
    match document.fields.get(field)? {
        FieldValue::Integer(value) | FieldValue::Timestamp(value) => Some(SortKey::Integer(*value)),
        FieldValue::Text(value) => Some(SortKey::Text(value.as_str())),
        FieldValue::ServerTimestamp | FieldValue::Null => None,
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
