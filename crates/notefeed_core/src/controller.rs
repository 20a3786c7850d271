//! Note list controller.
//!
//! # Responsibility
//! - Own the single live subscription to the notes collection.
//! - Mirror the latest snapshot and derive the search view from it.
//! - Issue create and bulk-delete requests and report their outcome.
//!
//! # Invariants
//! - At most one subscription is active per controller; re-activation
//!   releases the previous one first.
//! - The list is written only by snapshots. Local writes never touch it;
//!   their effect arrives with the next snapshot.
//! - Once `deactivate` returns, no further snapshot is applied.
//! - Store failures are logged and notified, never panicked on.

use crate::card::NoteCard;
use crate::confirm::Confirm;
use crate::model::note::{Note, NoteDraft, NoteId, NoteValidationError};
use crate::notify::{Notification, Notifier};
use crate::search::filter_notes;
use crate::service::{decode_snapshot, NoteError, NoteService};
use crate::store::Subscription;
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Observable state of the note list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListState {
    /// Latest snapshot, newest first.
    pub notes: Vec<Note>,
    /// `true` from activation until the first snapshot or error.
    pub loading: bool,
    /// Bumped on every applied snapshot or subscription error.
    pub revision: u64,
    /// Epoch of the subscription allowed to write this state.
    feed_epoch: Option<u64>,
}

impl ListState {
    /// Whether a subscription is currently feeding this state.
    pub fn is_live(&self) -> bool {
        self.feed_epoch.is_some()
    }
}

/// Result of a bulk clear that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The list was already empty; no store call was made.
    NothingToClear,
    /// The user declined the confirmation prompt.
    Declined,
    /// Every delete succeeded.
    Cleared(usize),
}

/// Controller-owned input fields of the new-note form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteForm {
    pub title: String,
    pub content: String,
}

impl NoteForm {
    pub fn clear(&mut self) {
        self.title.clear();
        self.content.clear();
    }
}

struct Feed {
    epoch: u64,
    task: JoinHandle<()>,
}

/// Live note list bound to one collection.
pub struct NoteListController {
    service: NoteService,
    notifier: Arc<dyn Notifier>,
    state: Arc<watch::Sender<ListState>>,
    feed: Option<Feed>,
    last_epoch: u64,
    search_term: String,
    form: NoteForm,
}

impl NoteListController {
    pub fn new(service: NoteService, notifier: Arc<dyn Notifier>) -> Self {
        let (state, _) = watch::channel(ListState::default());
        Self {
            service,
            notifier,
            state: Arc::new(state),
            feed: None,
            last_epoch: 0,
            search_term: String::new(),
            form: NoteForm::default(),
        }
    }

    /// Opens the live subscription, releasing any previous one first.
    ///
    /// # Errors
    /// - Returns the store error when the subscription cannot be opened; the
    ///   last-known list stays in place.
    pub async fn activate(&mut self) -> Result<(), NoteError> {
        self.deactivate();

        self.last_epoch += 1;
        let epoch = self.last_epoch;
        self.state.send_modify(|state| {
            state.loading = true;
            state.feed_epoch = Some(epoch);
        });

        match self.service.subscribe_newest_first().await {
            Ok(subscription) => {
                let task = tokio::spawn(pump_snapshots(
                    subscription,
                    epoch,
                    Arc::clone(&self.state),
                    Arc::clone(&self.notifier),
                ));
                self.feed = Some(Feed { epoch, task });
                info!(
                    "event=subscription_open module=controller status=ok collection={} epoch={}",
                    self.service.collection(),
                    epoch
                );
                Ok(())
            }
            Err(err) => {
                self.state.send_modify(|state| {
                    state.loading = false;
                    state.feed_epoch = None;
                });
                error!(
                    "event=subscription_open module=controller status=error collection={} error={}",
                    self.service.collection(),
                    err
                );
                self.notifier.notify(Notification::error("Failed to load notes."));
                Err(err.into())
            }
        }
    }

    /// Releases the live subscription. Safe to call repeatedly.
    pub fn deactivate(&mut self) {
        let Some(feed) = self.feed.take() else {
            return;
        };
        self.state.send_modify(|state| {
            if state.feed_epoch == Some(feed.epoch) {
                state.feed_epoch = None;
                state.loading = false;
            }
        });
        feed.task.abort();
        info!(
            "event=subscription_release module=controller status=ok collection={} epoch={}",
            self.service.collection(),
            feed.epoch
        );
    }

    pub fn is_active(&self) -> bool {
        self.feed.is_some()
    }

    /// Receiver for state changes (new snapshots, loading flips).
    pub fn watch(&self) -> watch::Receiver<ListState> {
        self.state.subscribe()
    }

    /// Copy of the latest snapshot, newest first.
    pub fn notes(&self) -> Vec<Note> {
        self.state.borrow().notes.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Filters the latest snapshot by `term` without touching the store.
    pub fn search(&self, term: &str) -> Vec<Note> {
        filter_notes(&self.state.borrow().notes, term)
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    /// Latest snapshot filtered by the current search term.
    pub fn visible_notes(&self) -> Vec<Note> {
        self.search(&self.search_term)
    }

    pub fn form(&self) -> &NoteForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut NoteForm {
        &mut self.form
    }

    /// Builds a renderer for `note` sharing this controller's store and notifier.
    pub fn card(&self, note: Note) -> NoteCard {
        NoteCard::new(note, self.service.clone(), Arc::clone(&self.notifier))
    }

    /// Updates `card` from the latest snapshot.
    ///
    /// Returns `false` when its note is no longer in the list.
    pub fn refresh_card(&self, card: &mut NoteCard) -> bool {
        let state = self.state.borrow();
        match state.notes.iter().find(|note| &note.id == card.id()) {
            Some(note) => {
                card.refresh(note.clone());
                true
            }
            None => false,
        }
    }

    /// Validates and writes a new note.
    ///
    /// # Errors
    /// - `Validation` when the trimmed title or content is rejected; no store
    ///   call is made.
    /// - `Store` when the write fails; the note may or may not exist.
    pub async fn create_note(&self, title: &str, content: &str) -> Result<NoteId, NoteError> {
        let draft = match NoteDraft::new(title, content) {
            Ok(draft) => draft,
            Err(err) => {
                info!("event=note_create module=controller status=rejected reason={err}");
                self.notifier.notify(Notification::error(validation_message(&err)));
                return Err(err.into());
            }
        };

        match self.service.create_note(&draft).await {
            Ok(id) => {
                info!("event=note_create module=controller status=ok note_id={id}");
                self.notifier.notify(Notification::success("Note added!"));
                Ok(id)
            }
            Err(err) => {
                error!("event=note_create module=controller status=error error={err}");
                self.notifier.notify(Notification::error("Failed to add note."));
                Err(err.into())
            }
        }
    }

    /// Creates a note from the form fields; clears them once the write
    /// is acknowledged.
    pub async fn submit_form(&mut self) -> Result<NoteId, NoteError> {
        let NoteForm { title, content } = self.form.clone();
        let id = self.create_note(&title, &content).await?;
        self.form.clear();
        Ok(id)
    }

    /// Deletes every note in the latest snapshot after confirmation.
    ///
    /// Deletes run concurrently and are joined; success is reported only when
    /// all of them succeed. Which notes remain after a partial failure is left
    /// to the next snapshot.
    ///
    /// # Errors
    /// - `BulkDelete` when at least one delete failed.
    pub async fn clear_all(&self, confirm: &dyn Confirm) -> Result<ClearOutcome, NoteError> {
        let notes = self.notes();
        if notes.is_empty() {
            self.notifier.notify(Notification::info("No notes to clear."));
            return Ok(ClearOutcome::NothingToClear);
        }

        let prompt = format!("Delete all {} notes? This cannot be undone.", notes.len());
        if !confirm.confirm(&prompt) {
            info!("event=notes_clear module=controller status=declined");
            return Ok(ClearOutcome::Declined);
        }

        let attempted = notes.len();
        let results = join_all(notes.iter().map(|note| self.service.delete_note(&note.id))).await;
        let failed = results.iter().filter(|result| result.is_err()).count();

        if failed == 0 {
            info!("event=notes_clear module=controller status=ok deleted={attempted}");
            self.notifier.notify(Notification::success("All notes cleared!"));
            return Ok(ClearOutcome::Cleared(attempted));
        }

        if let Some(Err(err)) = results.iter().find(|result| result.is_err()) {
            error!(
                "event=notes_clear module=controller status=error attempted={} failed={} first_error={}",
                attempted, failed, err
            );
        }
        self.notifier.notify(Notification::error("Failed to clear notes."));
        Err(NoteError::BulkDelete { attempted, failed })
    }
}

impl Drop for NoteListController {
    fn drop(&mut self) {
        self.deactivate();
    }
}

async fn pump_snapshots(
    mut subscription: Subscription,
    epoch: u64,
    state: Arc<watch::Sender<ListState>>,
    notifier: Arc<dyn Notifier>,
) {
    while let Some(item) = subscription.next_snapshot().await {
        match item {
            Ok(documents) => {
                let notes = decode_snapshot(&documents);
                let count = notes.len();
                let applied = state.send_if_modified(|state| {
                    if state.feed_epoch != Some(epoch) {
                        return false;
                    }
                    state.notes = notes;
                    state.loading = false;
                    state.revision += 1;
                    true
                });
                if !applied {
                    debug!(
                        "event=subscription_end module=controller status=released epoch={epoch}"
                    );
                    return;
                }
                debug!(
                    "event=snapshot_apply module=controller status=ok epoch={epoch} notes={count}"
                );
            }
            Err(err) => {
                let current = state.send_if_modified(|state| {
                    if state.feed_epoch != Some(epoch) {
                        return false;
                    }
                    state.loading = false;
                    state.revision += 1;
                    true
                });
                if !current {
                    debug!(
                        "event=subscription_end module=controller status=released epoch={epoch}"
                    );
                    return;
                }
                error!(
                    "event=snapshot_apply module=controller status=error epoch={epoch} error={err}"
                );
                notifier.notify(Notification::error("Failed to load notes."));
            }
        }
    }
    warn!("event=subscription_end module=controller status=closed epoch={epoch}");
}

pub(crate) fn validation_message(err: &NoteValidationError) -> String {
    match err {
        NoteValidationError::EmptyTitle | NoteValidationError::EmptyContent => {
            "Title and content are required.".to_string()
        }
        NoteValidationError::TitleTooLong { max, .. } => {
            format!("Title must be at most {max} characters.")
        }
        NoteValidationError::ContentTooLong { max, .. } => {
            format!("Content must be at most {max} characters.")
        }
    }
}
