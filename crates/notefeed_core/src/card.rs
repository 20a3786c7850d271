//! Note card renderer.
//!
//! # Responsibility
//! - Present one note (title, content, formatted creation time).
//! - Run the inline edit flow and issue update/delete requests.
//!
//! # Invariants
//! - A card is either in view mode or edit mode; nothing else.
//! - Entering edit mode never writes to the store.
//! - A failed save keeps the card in edit mode with the draft intact.
//! - Removing a deleted note from the view is left to the next snapshot.

use crate::controller::validation_message;
use crate::model::note::{Note, NoteDraft, NoteId};
use crate::notify::{Notification, Notifier};
use crate::service::{NoteError, NoteService};
use chrono::{Local, TimeZone};
use log::{error, info};
use std::sync::Arc;

/// Placeholder shown while the server timestamp is unresolved.
pub const UNKNOWN_DATE: &str = "Unknown Date";

const CREATED_AT_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Editable title/content pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditFields {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CardMode {
    View,
    Edit {
        /// Values captured when editing started.
        original: EditFields,
        draft: EditFields,
    },
}

/// Display projection of a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardView {
    pub title: String,
    pub content: String,
    pub created_label: String,
}

/// Non-failing save results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Draft matched the original; nothing was written.
    Unchanged,
}

/// Renderer and edit state for one note, keyed by its id.
pub struct NoteCard {
    note: Note,
    mode: CardMode,
    service: NoteService,
    notifier: Arc<dyn Notifier>,
}

impl NoteCard {
    pub fn new(note: Note, service: NoteService, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            note,
            mode: CardMode::View,
            service,
            notifier,
        }
    }

    pub fn id(&self) -> &NoteId {
        &self.note.id
    }

    pub fn note(&self) -> &Note {
        &self.note
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.mode, CardMode::Edit { .. })
    }

    /// Current draft while in edit mode.
    pub fn draft(&self) -> Option<&EditFields> {
        match &self.mode {
            CardMode::Edit { draft, .. } => Some(draft),
            CardMode::View => None,
        }
    }

    pub fn view(&self) -> CardView {
        CardView {
            title: self.note.title.clone(),
            content: self.note.content.clone(),
            created_label: format_created_at(self.note.created_at),
        }
    }

    /// Adopts a newer snapshot of the same note. An open draft is kept.
    pub fn refresh(&mut self, note: Note) {
        if note.id == self.note.id {
            self.note = note;
        }
    }

    /// Enters edit mode with the current title/content as the draft.
    ///
    /// Calling it while already editing keeps the existing draft.
    pub fn begin_edit(&mut self) {
        if self.is_editing() {
            return;
        }
        let snapshot = EditFields {
            title: self.note.title.clone(),
            content: self.note.content.clone(),
        };
        self.mode = CardMode::Edit {
            original: snapshot.clone(),
            draft: snapshot,
        };
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        if let CardMode::Edit { draft, .. } = &mut self.mode {
            draft.title = title.into();
        }
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        if let CardMode::Edit { draft, .. } = &mut self.mode {
            draft.content = content.into();
        }
    }

    /// Discards the draft and returns the pre-edit values.
    pub fn cancel(&mut self) -> Option<EditFields> {
        match std::mem::replace(&mut self.mode, CardMode::View) {
            CardMode::Edit { original, .. } => Some(original),
            CardMode::View => None,
        }
    }

    /// Validates the draft and writes the fields that changed since editing
    /// started.
    ///
    /// # Errors
    /// - `NotEditing` outside edit mode.
    /// - `Validation` or `Store` failures leave the card in edit mode.
    pub async fn save(&mut self) -> Result<SaveOutcome, NoteError> {
        let CardMode::Edit { original, draft } = &self.mode else {
            return Err(NoteError::NotEditing);
        };

        let validated = match NoteDraft::new(&draft.title, &draft.content) {
            Ok(validated) => validated,
            Err(err) => {
                info!(
                    "event=note_update module=card status=rejected note_id={} reason={err}",
                    self.note.id
                );
                self.notifier.notify(Notification::error(validation_message(&err)));
                return Err(err.into());
            }
        };

        let baseline = Note {
            id: self.note.id.clone(),
            title: original.title.clone(),
            content: original.content.clone(),
            created_at: self.note.created_at,
        };
        let patch = validated.diff(&baseline);
        if patch.is_empty() {
            self.mode = CardMode::View;
            self.notifier.notify(Notification::info("No changes to save."));
            return Ok(SaveOutcome::Unchanged);
        }

        match self.service.update_note(&self.note.id, &patch).await {
            Ok(()) => {
                info!(
                    "event=note_update module=card status=ok note_id={} title_changed={} content_changed={}",
                    self.note.id,
                    patch.title.is_some(),
                    patch.content.is_some()
                );
                self.mode = CardMode::View;
                self.notifier.notify(Notification::success("Note updated!"));
                Ok(SaveOutcome::Saved)
            }
            Err(err) => {
                error!(
                    "event=note_update module=card status=error note_id={} error={err}",
                    self.note.id
                );
                self.notifier.notify(Notification::error("Failed to update note."));
                Err(err.into())
            }
        }
    }

    /// Requests deletion of this note.
    pub async fn delete(&self) -> Result<(), NoteError> {
        match self.service.delete_note(&self.note.id).await {
            Ok(()) => {
                info!("event=note_delete module=card status=ok note_id={}", self.note.id);
                self.notifier.notify(Notification::success("Note deleted!"));
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=note_delete module=card status=error note_id={} error={err}",
                    self.note.id
                );
                self.notifier.notify(Notification::error("Failed to delete note."));
                Err(err.into())
            }
        }
    }
}

/// Formats a creation time in the local time zone.
pub fn format_created_at(created_at: Option<i64>) -> String {
    format_created_at_in(created_at, &Local)
}

/// Formats a creation time in `tz`, or [`UNKNOWN_DATE`] when unresolved.
pub fn format_created_at_in<Tz>(created_at: Option<i64>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    created_at
        .and_then(|millis| tz.timestamp_millis_opt(millis).single())
        .map(|moment| moment.format(CREATED_AT_FORMAT).to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string())
}
