//! Note use-case service over a document store.
//!
//! # Responsibility
//! - Translate notes to and from store documents for one collection.
//! - Provide the write calls shared by the list controller and note cards.
//!
//! # Invariants
//! - Creates always carry a server timestamp sentinel for `createdAt`.
//! - Updates only ever touch `title`/`content`; `id` and `createdAt` are
//!   never written after creation.
//! - The service never caches notes; reads happen only via subscriptions.

use crate::model::note::{
    Note, NoteDraft, NoteId, NotePatch, NoteValidationError, FIELD_CONTENT, FIELD_CREATED_AT,
    FIELD_TITLE,
};
use crate::store::{
    validate_collection, Document, DocumentStore, FieldValue, Fields, OrderBy, StoreError,
    StoreResult, Subscription,
};
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Error surfaced by note use-cases.
#[derive(Debug)]
pub enum NoteError {
    /// Input rejected before any store call.
    Validation(NoteValidationError),
    /// Store write or subscription failure.
    Store(StoreError),
    /// At least one delete of a bulk clear failed.
    BulkDelete { attempted: usize, failed: usize },
    /// Save requested while the card is not in edit mode.
    NotEditing,
}

impl Display for NoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::BulkDelete { attempted, failed } => {
                write!(f, "{failed} of {attempted} deletes failed")
            }
            Self::NotEditing => write!(f, "note is not in edit mode"),
        }
    }
}

impl Error for NoteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::BulkDelete { .. } | Self::NotEditing => None,
        }
    }
}

impl From<NoteValidationError> for NoteError {
    fn from(value: NoteValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for NoteError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Typed note operations bound to one collection.
#[derive(Clone)]
pub struct NoteService {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl NoteService {
    /// Binds `store` to `collection`.
    ///
    /// # Errors
    /// - Returns `InvalidCollection` for names outside `[a-z0-9_-]+`.
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> StoreResult<Self> {
        let collection = collection.into();
        validate_collection(&collection)?;
        Ok(Self { store, collection })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Writes a new note and returns its store-assigned id.
    pub async fn create_note(&self, draft: &NoteDraft) -> StoreResult<NoteId> {
        let mut fields = Fields::new();
        fields.insert(
            FIELD_TITLE.to_string(),
            FieldValue::Text(draft.title().to_string()),
        );
        fields.insert(
            FIELD_CONTENT.to_string(),
            FieldValue::Text(draft.content().to_string()),
        );
        fields.insert(FIELD_CREATED_AT.to_string(), FieldValue::ServerTimestamp);
        self.store.create(&self.collection, fields).await
    }

    /// Merges the present fields of `patch` into note `id`.
    pub async fn update_note(&self, id: &str, patch: &NotePatch) -> StoreResult<()> {
        let mut fields = Fields::new();
        if let Some(title) = &patch.title {
            fields.insert(FIELD_TITLE.to_string(), FieldValue::Text(title.clone()));
        }
        if let Some(content) = &patch.content {
            fields.insert(FIELD_CONTENT.to_string(), FieldValue::Text(content.clone()));
        }
        self.store.update(&self.collection, id, fields).await
    }

    pub async fn delete_note(&self, id: &str) -> StoreResult<()> {
        self.store.delete(&self.collection, id).await
    }

    /// Opens the live feed ordered by `createdAt` descending.
    pub async fn subscribe_newest_first(&self) -> StoreResult<Subscription> {
        self.store
            .subscribe_ordered(&self.collection, OrderBy::descending(FIELD_CREATED_AT))
            .await
    }
}

/// Decodes a snapshot, skipping documents that are not notes.
///
/// Store order is preserved.
pub fn decode_snapshot(documents: &[Document]) -> Vec<Note> {
    documents
        .iter()
        .filter_map(|document| match Note::from_document(document) {
            Ok(note) => Some(note),
            Err(err) => {
                warn!("event=snapshot_decode module=service status=skipped error={err}");
                None
            }
        })
        .collect()
}
