//! Note domain model.
//!
//! # Responsibility
//! - Define the note record mirrored from document snapshots.
//! - Validate and normalize user input into write-ready drafts.
//!
//! # Invariants
//! - `id` is assigned by the store and never reused for another note.
//! - `created_at` is `None` only while the server timestamp is unresolved.
//! - Draft fields are trimmed and bounded before they reach the store.

use crate::store::{Document, DocumentId, FieldValue};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned identifier of one note document.
pub type NoteId = DocumentId;

/// Document field holding the note title.
pub const FIELD_TITLE: &str = "title";
/// Document field holding the note body.
pub const FIELD_CONTENT: &str = "content";
/// Document field holding the server-assigned creation time.
pub const FIELD_CREATED_AT: &str = "createdAt";

/// Maximum title length in characters, after trimming.
pub const TITLE_MAX_CHARS: usize = 100;
/// Maximum content length in characters, after trimming.
pub const CONTENT_MAX_CHARS: usize = 500;

/// Note as reported by the latest subscription snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    /// Unix epoch milliseconds, `None` until the store resolves it.
    pub created_at: Option<i64>,
}

impl Note {
    /// Decodes one store document into a note.
    ///
    /// # Errors
    /// - Returns an error when `title` or `content` is missing or not text.
    pub fn from_document(document: &Document) -> Result<Self, NoteDecodeError> {
        let title = text_field(document, FIELD_TITLE)?;
        let content = text_field(document, FIELD_CONTENT)?;
        let created_at = match document.fields.get(FIELD_CREATED_AT) {
            Some(FieldValue::Timestamp(millis)) => Some(*millis),
            _ => None,
        };

        Ok(Self {
            id: document.id.clone(),
            title,
            content,
            created_at,
        })
    }
}

fn text_field(document: &Document, field: &'static str) -> Result<String, NoteDecodeError> {
    match document.fields.get(field) {
        Some(FieldValue::Text(value)) => Ok(value.clone()),
        Some(_) => Err(NoteDecodeError::WrongType {
            id: document.id.clone(),
            field,
        }),
        None => Err(NoteDecodeError::MissingField {
            id: document.id.clone(),
            field,
        }),
    }
}

/// Validated, trimmed input for a create or full edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    title: String,
    content: String,
}

impl NoteDraft {
    /// Trims and validates raw user input.
    ///
    /// Only leading/trailing whitespace is stripped; interior whitespace is
    /// kept as typed.
    ///
    /// # Errors
    /// - Returns the first failing rule, title before content.
    pub fn new(title: &str, content: &str) -> Result<Self, NoteValidationError> {
        let title = title.trim();
        let content = content.trim();

        if title.is_empty() {
            return Err(NoteValidationError::EmptyTitle);
        }
        if content.is_empty() {
            return Err(NoteValidationError::EmptyContent);
        }

        let title_chars = title.chars().count();
        if title_chars > TITLE_MAX_CHARS {
            return Err(NoteValidationError::TitleTooLong {
                chars: title_chars,
                max: TITLE_MAX_CHARS,
            });
        }
        let content_chars = content.chars().count();
        if content_chars > CONTENT_MAX_CHARS {
            return Err(NoteValidationError::ContentTooLong {
                chars: content_chars,
                max: CONTENT_MAX_CHARS,
            });
        }

        Ok(Self {
            title: title.to_string(),
            content: content.to_string(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Builds a patch holding only the fields that differ from `note`.
    pub fn diff(&self, note: &Note) -> NotePatch {
        NotePatch {
            title: (self.title != note.title).then(|| self.title.clone()),
            content: (self.content != note.content).then(|| self.content.clone()),
        }
    }
}

/// Partial note update; `None` fields are left untouched in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NotePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

/// Client-side validation failure. No store call is made when returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteValidationError {
    EmptyTitle,
    EmptyContent,
    TitleTooLong { chars: usize, max: usize },
    ContentTooLong { chars: usize, max: usize },
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "title cannot be empty"),
            Self::EmptyContent => write!(f, "content cannot be empty"),
            Self::TitleTooLong { chars, max } => {
                write!(f, "title is {chars} characters; at most {max} allowed")
            }
            Self::ContentTooLong { chars, max } => {
                write!(f, "content is {chars} characters; at most {max} allowed")
            }
        }
    }
}

impl Error for NoteValidationError {}

/// Stored document does not have the note shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteDecodeError {
    MissingField { id: NoteId, field: &'static str },
    WrongType { id: NoteId, field: &'static str },
}

impl Display for NoteDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { id, field } => {
                write!(f, "document `{id}` is missing field `{field}`")
            }
            Self::WrongType { id, field } => {
                write!(f, "document `{id}` has a non-text `{field}` field")
            }
        }
    }
}

impl Error for NoteDecodeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn note(id: &str, created_at: Option<i64>) -> Note {
        Note {
            id: id.to_string(),
            title: format!("title {id}"),
            content: format!("content {id}"),
            created_at,
        }
    }

    #[test]
    fn draft_trims_outer_whitespace_only() {
        let draft = NoteDraft::new("  Groceries ", "\n Milk,  eggs \t").unwrap();
        assert_eq!(draft.title(), "Groceries");
        assert_eq!(draft.content(), "Milk,  eggs");
    }

    #[test]
    fn draft_rejects_blank_fields() {
        assert_eq!(
            NoteDraft::new("   ", "something"),
            Err(NoteValidationError::EmptyTitle)
        );
        assert_eq!(
            NoteDraft::new("title", " \n "),
            Err(NoteValidationError::EmptyContent)
        );
        assert_eq!(NoteDraft::new("", ""), Err(NoteValidationError::EmptyTitle));
    }

    #[test]
    fn draft_enforces_length_bounds_in_chars() {
        let title = "é".repeat(TITLE_MAX_CHARS);
        assert!(NoteDraft::new(&title, "body").is_ok());

        let too_long = "x".repeat(TITLE_MAX_CHARS + 1);
        assert!(matches!(
            NoteDraft::new(&too_long, "body"),
            Err(NoteValidationError::TitleTooLong { chars: 101, max: 100 })
        ));

        let content = format!("  {}  ", "y".repeat(CONTENT_MAX_CHARS));
        assert!(NoteDraft::new("t", &content).is_ok());
        let content = "y".repeat(CONTENT_MAX_CHARS + 1);
        assert!(matches!(
            NoteDraft::new("t", &content),
            Err(NoteValidationError::ContentTooLong { .. })
        ));
    }

    #[test]
    fn diff_keeps_only_changed_fields() {
        let current = note("a", Some(1));
        let draft = NoteDraft::new("title a", "new body").unwrap();
        let patch = draft.diff(&current);
        assert_eq!(patch.title, None);
        assert_eq!(patch.content.as_deref(), Some("new body"));

        let unchanged = NoteDraft::new("title a", "content a").unwrap();
        assert!(unchanged.diff(&current).is_empty());
    }

    #[test]
    fn from_document_treats_sentinel_as_unresolved() {
        let mut fields = BTreeMap::new();
        fields.insert(FIELD_TITLE.to_string(), FieldValue::Text("t".into()));
        fields.insert(FIELD_CONTENT.to_string(), FieldValue::Text("c".into()));
        fields.insert(FIELD_CREATED_AT.to_string(), FieldValue::ServerTimestamp);
        let document = Document {
            id: "doc-1".to_string(),
            fields,
        };

        let decoded = Note::from_document(&document).unwrap();
        assert_eq!(decoded.created_at, None);
        assert_eq!(decoded.title, "t");
    }

    #[test]
    fn from_document_rejects_missing_title() {
        let mut fields = BTreeMap::new();
        fields.insert(FIELD_CONTENT.to_string(), FieldValue::Text("c".into()));
        let document = Document {
            id: "doc-2".to_string(),
            fields,
        };

        let err = Note::from_document(&document).unwrap_err();
        assert!(matches!(err, NoteDecodeError::MissingField { field: "title", .. }));
    }
}
