//! Core logic for notefeed, a live-synchronized note list.
//! The document store is the single source of truth; everything in this
//! crate mirrors it through subscriptions and writes back through it.

pub mod card;
pub mod config;
pub mod confirm;
pub mod controller;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod search;
pub mod service;
pub mod store;

pub use card::{format_created_at, CardView, EditFields, NoteCard, SaveOutcome, UNKNOWN_DATE};
pub use config::{ConfigError, ConfigOverrides, StoreConfig};
pub use confirm::{AlwaysConfirm, Confirm, NeverConfirm};
pub use controller::{ClearOutcome, ListState, NoteForm, NoteListController};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::note::{Note, NoteDraft, NoteId, NotePatch, NoteValidationError};
pub use notify::{Notification, NotificationLevel, Notifier, RecordingNotifier, ToastQueue};
pub use search::{filter_notes, NoteFilter};
pub use service::{NoteError, NoteService};
pub use store::memory::MemoryDocumentStore;
pub use store::sqlite::SqliteDocumentStore;
pub use store::{
    Document, DocumentStore, FieldValue, Fields, OrderBy, StoreError, StoreResult, Subscription,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
