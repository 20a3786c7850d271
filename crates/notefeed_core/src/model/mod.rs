//! Domain model for the notes collection.
//!
//! # Responsibility
//! - Define the note record mirrored from the document store.
//! - Own client-side validation applied before any write.
//!
//! # Invariants
//! - Every note is identified by a store-assigned `NoteId`.
//! - Titles and contents are never written empty or whitespace-only.

pub mod note;
