//! Local note filtering.
//!
//! # Responsibility
//! - Derive the visible view of the list from a search term.
//!
//! # Invariants
//! - Search never touches the store.
//! - Matching is a case-insensitive literal substring over title OR content.
//! - An empty term yields the full list in its original order.

use crate::model::note::Note;
use log::debug;
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
enum Matcher {
    All,
    Pattern(Regex),
    /// Lowercased term, used when the pattern exceeds the regex size limit.
    Folded(String),
}

/// Compiled case-insensitive matcher for one search term.
#[derive(Debug, Clone)]
pub struct NoteFilter {
    matcher: Matcher,
}

impl NoteFilter {
    /// Builds a filter for `term`. Regex metacharacters are matched literally.
    pub fn new(term: &str) -> Self {
        if term.is_empty() {
            return Self {
                matcher: Matcher::All,
            };
        }

        let matcher = match RegexBuilder::new(&regex::escape(term))
            .case_insensitive(true)
            .build()
        {
            Ok(re) => Matcher::Pattern(re),
            Err(err) => {
                debug!("event=search_compile module=search status=fallback error={err}");
                Matcher::Folded(term.to_lowercase())
            }
        };
        Self { matcher }
    }

    /// Returns whether `note` belongs to the filtered view.
    pub fn matches(&self, note: &Note) -> bool {
        match &self.matcher {
            Matcher::All => true,
            Matcher::Pattern(re) => re.is_match(&note.title) || re.is_match(&note.content),
            Matcher::Folded(term) => {
                note.title.to_lowercase().contains(term.as_str())
                    || note.content.to_lowercase().contains(term.as_str())
            }
        }
    }

    /// Applies the filter, preserving list order.
    pub fn apply(&self, notes: &[Note]) -> Vec<Note> {
        notes
            .iter()
            .filter(|note| self.matches(note))
            .cloned()
            .collect()
    }
}

/// Returns notes whose title or content contains `term`, ignoring case.
pub fn filter_notes(notes: &[Note], term: &str) -> Vec<Note> {
    NoteFilter::new(term).apply(notes)
}
