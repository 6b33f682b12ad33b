//! Tests for edit sessions, locks and stored links

use std::sync::Arc;

use structmeta::application::services::{LinkService, LockGuard, SessionService};
use structmeta::application::ApplicationError;
use structmeta::domain::{editor, DomainError, Workpiece};
use structmeta::infrastructure::memory::{InMemoryLockService, InMemoryWorkpieceStore};
use structmeta::infrastructure::traits::{LockService, WorkpieceStore};
use structmeta::util::testing::{init_test_setup, sample_book};

struct Fixture {
    store: Arc<InMemoryWorkpieceStore>,
    locks: Arc<InMemoryLockService>,
    sessions: SessionService,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryWorkpieceStore::new());
    let locks = Arc::new(InMemoryLockService::new());
    store.save(&sample_book("book", 3, &[1, 2]), "book").unwrap();
    let sessions = SessionService::new(store.clone(), locks.clone(), "editor@host");
    Fixture {
        store,
        locks,
        sessions,
    }
}

fn locked_holder(err: ApplicationError) -> Option<String> {
    match err {
        ApplicationError::Domain(DomainError::ObjectLocked { holder, .. }) => Some(holder),
        _ => None,
    }
}

#[test]
fn given_stored_workpiece_when_opening_then_lock_held_until_close() {
    // Arrange
    init_test_setup();
    let fixture = fixture();

    // Act
    let session = fixture.sessions.open("book").unwrap();

    // Assert
    assert_eq!(fixture.locks.is_locked("book").as_deref(), Some("editor@host"));
    assert_eq!(session.id(), "book");
    session.close().unwrap();
    assert_eq!(fixture.locks.is_locked("book"), None);
}

#[test]
fn given_open_session_when_opening_again_then_object_locked() {
    let fixture = fixture();
    let _session = fixture.sessions.open("book").unwrap();
    let other = SessionService::new(fixture.store.clone(), fixture.locks.clone(), "other@host");

    let err = other.open("book").err().unwrap();

    assert_eq!(locked_holder(err).as_deref(), Some("editor@host"));
}

#[test]
fn given_dropped_session_when_opening_again_then_lock_was_released() {
    let fixture = fixture();
    {
        let _session = fixture.sessions.open("book").unwrap();
    }

    let reopened = fixture.sessions.open("book");

    assert!(reopened.is_ok());
}

#[test]
fn given_unsaved_changes_when_closing_then_store_is_unchanged() {
    let fixture = fixture();
    let before = fixture.store.snapshot("book").unwrap();
    let mut session = fixture.sessions.open("book").unwrap();
    let root = session.workpiece().logical_root();
    let first = session.workpiece().logical().child_at(root, 0).unwrap();

    editor::remove_structure(session.workpiece_mut(), first).unwrap();
    session.close().unwrap();

    assert_eq!(fixture.store.snapshot("book").unwrap(), before);
    assert_eq!(fixture.store.backup_count("book"), 0);
}

#[test]
fn given_saved_changes_when_loading_then_changes_persisted_with_backup() {
    let fixture = fixture();
    let mut session = fixture.sessions.open("book").unwrap();
    let root = session.workpiece().logical_root();
    let first = session.workpiece().logical().child_at(root, 0).unwrap();

    editor::remove_structure(session.workpiece_mut(), first).unwrap();
    session.save().unwrap();
    session.close().unwrap();

    let loaded = fixture.store.load("book").unwrap();
    assert_eq!(loaded.logical().child_count(loaded.logical_root()), 1);
    assert_eq!(fixture.store.backup_count("book"), 1);
}

#[test]
fn given_missing_workpiece_when_opening_then_not_found() {
    let fixture = fixture();

    let err = fixture.sessions.open("missing").err().unwrap();

    assert!(matches!(err, ApplicationError::WorkpieceNotFound(id) if id == "missing"));
    assert_eq!(fixture.locks.is_locked("missing"), None);
}

#[test]
fn given_existing_workpiece_when_creating_then_workpiece_exists() {
    let fixture = fixture();

    let err = fixture.sessions.create("book", "monograph").err().unwrap();

    assert!(matches!(err, ApplicationError::WorkpieceExists(_)));
}

#[test]
fn given_new_id_when_creating_and_saving_then_stored() {
    let fixture = fixture();

    let session = fixture.sessions.create("atlas", "map").unwrap();
    session.save().unwrap();
    session.close().unwrap();

    let loaded: Workpiece = fixture.store.load("atlas").unwrap();
    assert_eq!(
        loaded.logical_division(loaded.logical_root()).map(|d| d.kind.as_str()),
        Some("map")
    );
    assert_eq!(fixture.locks.is_locked("atlas"), None);
}

#[test]
fn given_guard_when_released_explicitly_then_lock_free() {
    let locks: Arc<dyn LockService> = Arc::new(InMemoryLockService::new());

    let guard = LockGuard::acquire(locks.clone(), "book", "me").unwrap();
    assert!(LockGuard::acquire(locks.clone(), "book", "you").is_err());
    guard.release().unwrap();

    assert!(locks.is_locked("book").is_none());
}

// ============================================================
// LinkService
// ============================================================

#[test]
fn given_parent_when_adding_link_at_position_then_inserted_there() {
    let fixture = fixture();
    let links = LinkService::new(fixture.sessions.clone());

    links.add_link("book", "1", "book_appendix").unwrap();

    let parent = fixture.store.load("book").unwrap();
    let root = parent.logical_root();
    let link = parent.logical().child_at(root, 1).unwrap();
    assert_eq!(editor::find_link(&parent, "book_appendix"), Some(link));
    assert_eq!(parent.logical().child_count(root), 3);
    assert_eq!(fixture.locks.is_locked("book"), None);
}

#[test]
fn given_nested_position_when_adding_link_then_placed_below_division() {
    let fixture = fixture();
    let links = LinkService::new(fixture.sessions.clone());

    links.add_link("book", "1,0", "book_plate").unwrap();

    let parent = fixture.store.load("book").unwrap();
    let path = editor::path_to_linked_child(&parent, "book_plate").unwrap();
    assert_eq!(path.len(), 3);
}

#[test]
fn given_index_beyond_children_when_adding_link_then_invalid_position() {
    let fixture = fixture();
    let links = LinkService::new(fixture.sessions.clone());

    let err = links.add_link("book", "5", "book_late").err().unwrap();

    assert!(matches!(err, ApplicationError::InvalidInsertionPosition { .. }));
    assert_eq!(fixture.store.backup_count("book"), 0);
    assert_eq!(fixture.locks.is_locked("book"), None);
}

#[test]
fn given_link_when_removing_then_gone_and_missing_link_fails() {
    let fixture = fixture();
    let links = LinkService::new(fixture.sessions.clone());
    links.add_link("book", "0", "book_cover").unwrap();

    links.remove_link("book", "book_cover").unwrap();
    let err = links.remove_link("book", "book_cover").err().unwrap();

    let parent = fixture.store.load("book").unwrap();
    assert_eq!(editor::find_link(&parent, "book_cover"), None);
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::LinkNotFound(_))
    ));
}

#[test]
fn given_locked_parent_when_adding_link_then_object_locked() {
    let fixture = fixture();
    fixture.locks.acquire("book", "someone@else").unwrap();
    let links = LinkService::new(fixture.sessions.clone());

    let err = links.add_link("book", "0", "book_x").err().unwrap();

    assert_eq!(locked_holder(err).as_deref(), Some("someone@else"));
}
