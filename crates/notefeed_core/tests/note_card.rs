mod common;

use common::{controller_over, wait_loaded, wait_until, FlakyStore, COLLECTION};
use notefeed_core::{
    FieldValue, Note, NoteError, NoteListController, NoteValidationError, NotificationLevel,
    RecordingNotifier, SaveOutcome, UNKNOWN_DATE,
};
use std::sync::Arc;

async fn mounted_with_note(
    store: &Arc<FlakyStore>,
) -> (NoteListController, Arc<RecordingNotifier>, Note) {
    let (mut controller, notifier) = controller_over(store.clone());
    controller.activate().await.unwrap();
    let mut updates = controller.watch();
    wait_loaded(&mut updates).await;
    controller.create_note("Groceries", "Milk, eggs").await.unwrap();
    let state = wait_until(&mut updates, |state| state.notes.len() == 1).await;
    notifier.clear();
    (controller, notifier, state.notes[0].clone())
}

#[tokio::test]
async fn cancel_restores_the_original_values_without_writing() {
    let store = FlakyStore::new();
    let (controller, notifier, note) = mounted_with_note(&store).await;

    let mut card = controller.card(note);
    card.begin_edit();
    assert!(card.is_editing());
    card.set_title("Groceries!!");
    card.set_content("Bread");
    assert_eq!(card.draft().unwrap().title, "Groceries!!");

    let original = card.cancel().unwrap();
    assert_eq!(original.title, "Groceries");
    assert_eq!(original.content, "Milk, eggs");
    assert!(!card.is_editing());
    assert!(card.draft().is_none());
    assert_eq!(card.view().title, "Groceries");

    assert!(store.updates().is_empty());
    assert!(notifier.entries().is_empty());
    assert!(card.cancel().is_none());
}

#[tokio::test]
async fn save_writes_only_the_changed_field() {
    let store = FlakyStore::new();
    let (controller, notifier, note) = mounted_with_note(&store).await;
    let mut updates = controller.watch();

    let mut card = controller.card(note.clone());
    card.begin_edit();
    card.set_content("  Milk, eggs, bread ");
    assert_eq!(card.save().await.unwrap(), SaveOutcome::Saved);
    assert!(!card.is_editing());

    let writes = store.updates();
    assert_eq!(writes.len(), 1);
    let (id, fields) = &writes[0];
    assert_eq!(id, &note.id);
    assert_eq!(fields.len(), 1);
    assert_eq!(
        fields["content"],
        FieldValue::Text("Milk, eggs, bread".to_string())
    );
    assert_eq!(notifier.last().unwrap().message, "Note updated!");

    let state = wait_until(&mut updates, |state| {
        state
            .notes
            .first()
            .is_some_and(|note| note.content == "Milk, eggs, bread")
    })
    .await;
    assert_eq!(state.notes[0].title, "Groceries");
    assert_eq!(state.notes[0].created_at, note.created_at);
}

#[tokio::test]
async fn save_without_changes_skips_the_write() {
    let store = FlakyStore::new();
    let (controller, notifier, note) = mounted_with_note(&store).await;

    let mut card = controller.card(note);
    card.begin_edit();
    card.set_title("  Groceries ");
    assert_eq!(card.save().await.unwrap(), SaveOutcome::Unchanged);
    assert!(!card.is_editing());
    assert!(store.updates().is_empty());

    let last = notifier.last().unwrap();
    assert_eq!(last.level, NotificationLevel::Info);
    assert_eq!(last.message, "No changes to save.");
}

#[tokio::test]
async fn invalid_draft_stays_in_edit_mode() {
    let store = FlakyStore::new();
    let (controller, notifier, note) = mounted_with_note(&store).await;

    let mut card = controller.card(note);
    card.begin_edit();
    card.set_title("   ");
    assert!(matches!(
        card.save().await,
        Err(NoteError::Validation(NoteValidationError::EmptyTitle))
    ));
    assert!(card.is_editing());
    assert_eq!(card.draft().unwrap().title, "   ");
    assert!(store.updates().is_empty());
    assert_eq!(
        notifier.last().unwrap().message,
        "Title and content are required."
    );
}

#[tokio::test]
async fn failed_update_keeps_the_draft() {
    let store = FlakyStore::new();
    let (controller, notifier, note) = mounted_with_note(&store).await;
    store.fail_updates(true);

    let mut card = controller.card(note);
    card.begin_edit();
    card.set_title("Shopping");
    assert!(matches!(card.save().await, Err(NoteError::Store(_))));
    assert!(card.is_editing());
    assert_eq!(card.draft().unwrap().title, "Shopping");

    let last = notifier.last().unwrap();
    assert_eq!(last.level, NotificationLevel::Error);
    assert_eq!(last.message, "Failed to update note.");

    store.fail_updates(false);
    assert_eq!(card.save().await.unwrap(), SaveOutcome::Saved);
}

#[tokio::test]
async fn save_outside_edit_mode_is_rejected() {
    let store = FlakyStore::new();
    let (controller, _notifier, note) = mounted_with_note(&store).await;

    let mut card = controller.card(note);
    assert!(matches!(card.save().await, Err(NoteError::NotEditing)));
    assert!(store.updates().is_empty());
}

#[tokio::test]
async fn refresh_while_editing_keeps_the_draft() {
    let store = FlakyStore::new();
    let (controller, _notifier, note) = mounted_with_note(&store).await;

    let mut card = controller.card(note.clone());
    card.begin_edit();
    card.set_title("Mine");

    let mut newer = note.clone();
    newer.content = "changed elsewhere".to_string();
    card.refresh(newer);
    assert_eq!(card.view().content, "changed elsewhere");
    assert_eq!(card.draft().unwrap().title, "Mine");

    let mut other = note;
    other.id = "someone-else".to_string();
    other.title = "Other".to_string();
    card.refresh(other);
    assert_ne!(card.id(), "someone-else");
}

#[tokio::test]
async fn refresh_card_follows_the_live_list() {
    let store = FlakyStore::new();
    let (controller, _notifier, note) = mounted_with_note(&store).await;
    let mut updates = controller.watch();

    let mut editing = controller.card(note.clone());
    editing.begin_edit();
    editing.set_title("Mine");

    let mut elsewhere = controller.card(note);
    elsewhere.begin_edit();
    elsewhere.set_content("Oat milk");
    assert_eq!(elsewhere.save().await.unwrap(), SaveOutcome::Saved);
    wait_until(&mut updates, |state| {
        state
            .notes
            .first()
            .is_some_and(|note| note.content == "Oat milk")
    })
    .await;

    assert!(controller.refresh_card(&mut editing));
    assert_eq!(editing.view().content, "Oat milk");
    assert_eq!(editing.draft().unwrap().title, "Mine");

    elsewhere.delete().await.unwrap();
    wait_until(&mut updates, |state| state.notes.is_empty()).await;
    assert!(!controller.refresh_card(&mut editing));
    assert!(editing.is_editing());
}

#[tokio::test]
async fn failed_delete_notifies_and_keeps_the_note() {
    let store = FlakyStore::new();
    let (controller, notifier, note) = mounted_with_note(&store).await;
    store.fail_delete(&note.id);

    let card = controller.card(note.clone());
    assert!(matches!(card.delete().await, Err(NoteError::Store(_))));
    assert_eq!(notifier.last().unwrap().message, "Failed to delete note.");
    assert!(store.inner().get(COLLECTION, &note.id).unwrap().is_some());
    assert_eq!(controller.notes().len(), 1);
}

#[tokio::test]
async fn pending_timestamp_renders_placeholder() {
    let store = FlakyStore::new();
    let (controller, _notifier) = controller_over(store);
    let note = Note {
        id: "pending".to_string(),
        title: "fresh".to_string(),
        content: "just written".to_string(),
        created_at: None,
    };

    let view = controller.card(note).view();
    assert_eq!(view.created_label, UNKNOWN_DATE);
}
