//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist documents as JSON field maps keyed by `(collection, id)`.
//! - Fan out ordered snapshots to live subscribers after each commit.
//! - Pick up commits made by other connections to the same file.
//!
//! # Invariants
//! - All SQLite work runs on the blocking pool, never on async workers.
//! - Commit time is taken from the persisted `commit_clock` and is strictly
//!   increasing for the lifetime of the database file.
//! - A snapshot read that fails after a successful write is reported to
//!   subscribers as an error; the write itself still succeeds.
//! - At most one change watcher runs per store, and only while it has live
//!   subscribers.

use super::feed::SubscriberSet;
use super::{
    now_millis, order_documents, resolve_server_timestamps, validate_collection, Document,
    DocumentId, DocumentStore, Fields, OrderBy, StoreError, StoreResult, Subscription,
};
use crate::db::{open_db, open_db_in_memory};
use async_trait::async_trait;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// How often the change watcher checks for commits from other connections.
pub const EXTERNAL_POLL_INTERVAL: Duration = Duration::from_millis(200);

struct SqliteInner {
    conn: Connection,
    subscribers: SubscriberSet,
    /// Last `PRAGMA data_version` seen on `conn`.
    data_version: i64,
    watching: bool,
}

impl SqliteInner {
    fn create(&mut self, collection: &str, mut fields: Fields) -> StoreResult<DocumentId> {
        let id = Uuid::new_v4().to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let commit = next_commit_millis(&tx)?;
        resolve_server_timestamps(&mut fields, commit);
        tx.execute(
            "INSERT INTO documents (collection, id, fields, committed_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![collection, id.as_str(), serde_json::to_string(&fields)?, commit],
        )?;
        tx.commit()?;

        self.publish(collection);
        Ok(id)
    }

    fn update(&mut self, collection: &str, id: &str, mut fields: Fields) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored: Option<String> = tx
            .query_row(
                "SELECT fields FROM documents WHERE collection = ?1 AND id = ?2;",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(stored) = stored else {
            return Err(StoreError::NotFound(id.to_string()));
        };

        let commit = next_commit_millis(&tx)?;
        resolve_server_timestamps(&mut fields, commit);
        let mut merged: Fields = serde_json::from_str(&stored)?;
        merged.extend(fields);
        tx.execute(
            "UPDATE documents
             SET fields = ?3, committed_at = ?4
             WHERE collection = ?1 AND id = ?2;",
            params![collection, id, serde_json::to_string(&merged)?, commit],
        )?;
        tx.commit()?;

        self.publish(collection);
        Ok(())
    }

    fn delete(&mut self, collection: &str, id: &str) -> StoreResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2;",
            params![collection, id],
        )?;
        if changed > 0 {
            self.publish(collection);
        }
        Ok(())
    }

    /// Registers a subscriber. The flag is `true` when a change watcher
    /// must be started for it.
    fn subscribe(
        &mut self,
        collection: &str,
        order: OrderBy,
    ) -> StoreResult<(Subscription, bool)> {
        let initial = read_ordered(&self.conn, collection, &order)?;
        let subscription = self.subscribers.add(collection, order, Ok(initial));
        let start_watcher = !self.watching;
        self.watching = true;
        Ok((subscription, start_watcher))
    }

    /// Republishes every watched collection when another connection has
    /// committed since the last check. Returns `false` once nobody listens.
    fn poll_external_commits(&mut self) -> bool {
        let collections = self.subscribers.live_collections();
        if collections.is_empty() {
            self.watching = false;
            return false;
        }

        match data_version(&self.conn) {
            Ok(version) if version != self.data_version => {
                self.data_version = version;
                debug!(
                    "event=external_commit module=store status=ok collections={}",
                    collections.len()
                );
                for collection in &collections {
                    self.publish(collection);
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!("event=external_commit module=store status=error error={err}");
            }
        }
        true
    }

    fn publish(&mut self, collection: &str) {
        for order in self.subscribers.orders(collection) {
            match read_ordered(&self.conn, collection, &order) {
                Ok(documents) => self.subscribers.publish(collection, &order, &documents),
                Err(err) => {
                    warn!(
                        "event=snapshot_publish module=store status=error collection={} error={}",
                        collection, err
                    );
                    self.subscribers.publish_error(collection, &order, &err.to_string());
                }
            }
        }
    }
}

fn next_commit_millis(tx: &Transaction<'_>) -> StoreResult<i64> {
    let commit = tx.query_row(
        "UPDATE commit_clock
         SET last_commit_millis = MAX(last_commit_millis + 1, ?1)
         WHERE singleton = 1
         RETURNING last_commit_millis;",
        [now_millis()],
        |row| row.get(0),
    )?;
    Ok(commit)
}

/// Counter that changes whenever another connection commits to the file.
fn data_version(conn: &Connection) -> StoreResult<i64> {
    let version = conn.query_row("PRAGMA data_version;", [], |row| row.get(0))?;
    Ok(version)
}

fn read_ordered(
    conn: &Connection,
    collection: &str,
    order: &OrderBy,
) -> StoreResult<Vec<Document>> {
    let mut stmt = conn.prepare("SELECT id, fields FROM documents WHERE collection = ?1;")?;
    let mut rows = stmt.query([collection])?;
    let mut documents = Vec::new();
    while let Some(row) = rows.next()? {
        let fields_json: String = row.get("fields")?;
        documents.push(Document {
            id: row.get("id")?,
            fields: serde_json::from_str(&fields_json)?,
        });
    }
    order_documents(&mut documents, order);
    Ok(documents)
}

/// Durable document store on a single SQLite connection.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    inner: Arc<Mutex<SqliteInner>>,
}

impl SqliteDocumentStore {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::from_connection(open_db(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(open_db_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        let data_version = data_version(&conn)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(SqliteInner {
                conn,
                subscribers: SubscriberSet::new(),
                data_version,
                watching: false,
            })),
        })
    }

    async fn run<T, F>(&self, collection: &str, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteInner, &str) -> StoreResult<T> + Send + 'static,
    {
        validate_collection(collection)?;
        let inner = Arc::clone(&self.inner);
        let collection = collection.to_string();
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| StoreError::Backend("sqlite store lock poisoned".to_string()))?;
            op(&mut guard, collection.as_str())
        })
        .await
        .map_err(|err| StoreError::Backend(format!("sqlite task failed: {err}")))?
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<DocumentId> {
        self.run(collection, move |inner, collection| inner.create(collection, fields))
            .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let id = id.to_string();
        self.run(collection, move |inner, collection| {
            inner.update(collection, &id, fields)
        })
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(collection, move |inner, collection| inner.delete(collection, &id))
            .await
    }

    async fn subscribe_ordered(
        &self,
        collection: &str,
        order: OrderBy,
    ) -> StoreResult<Subscription> {
        let (subscription, start_watcher) = self
            .run(collection, move |inner, collection| {
                inner.subscribe(collection, order)
            })
            .await?;
        if start_watcher {
            tokio::spawn(watch_external_commits(Arc::downgrade(&self.inner)));
        }
        Ok(subscription)
    }
}

/// Polls for commits from other connections until the store is dropped or
/// its last subscriber goes away.
async fn watch_external_commits(inner: Weak<Mutex<SqliteInner>>) {
    let mut ticker = tokio::time::interval(EXTERNAL_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let keep_watching = tokio::task::spawn_blocking(move || match inner.lock() {
            Ok(mut guard) => guard.poll_external_commits(),
            Err(_) => false,
        })
        .await
        .unwrap_or(false);
        if !keep_watching {
            debug!("event=external_watch module=store status=stopped");
            return;
        }
    }
}
