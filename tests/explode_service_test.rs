//! Tests for exploding stored workpieces

use std::io;
use std::sync::Arc;

use rstest::rstest;

use structmeta::application::services::{ExplodeService, ORIGINAL_SUFFIX};
use structmeta::application::ApplicationError;
use structmeta::domain::{
    editor, DomainError, InsertionPosition, View, Workpiece, WorkpieceSnapshot,
};
use structmeta::infrastructure::memory::{
    InMemoryLockService, InMemoryMediaStore, InMemoryWorkpieceStore,
};
use structmeta::infrastructure::traits::{LockService, MediaStore, WorkpieceStore};
use structmeta::util::testing::{add_pages, init_test_setup, sample_book};

struct Fixture {
    store: Arc<InMemoryWorkpieceStore>,
    locks: Arc<InMemoryLockService>,
    media: Arc<InMemoryMediaStore>,
    service: ExplodeService,
}

/// Stores `id` as a book of four pages in two chapters, with media for every page.
fn fixture(ids: &[&str]) -> Fixture {
    let store = Arc::new(InMemoryWorkpieceStore::new());
    let locks = Arc::new(InMemoryLockService::new());
    let media = Arc::new(InMemoryMediaStore::new());
    for id in ids {
        store.save(&sample_book(id, 4, &[2, 2]), id).unwrap();
        for n in 1..=4 {
            media.add(id, &format!("page_{}.tif", n));
        }
    }
    let service = ExplodeService::new(store.clone(), locks.clone(), media.clone(), "explode@host");
    Fixture {
        store,
        locks,
        media,
        service,
    }
}

#[test]
fn given_two_chapters_when_exploding_then_children_parent_and_original_stored() {
    // Arrange
    init_test_setup();
    let fixture = fixture(&["book"]);
    let before = fixture.store.snapshot("book").unwrap();

    // Act
    let outcome = fixture.service.explode("book").unwrap();

    // Assert
    assert_eq!(outcome.parent_id, "book");
    assert_eq!(outcome.original_id, format!("book{}", ORIGINAL_SUFFIX));
    assert_eq!(outcome.child_ids, vec!["book_chapter-1", "book_chapter-2"]);
    assert_eq!(outcome.media_copied, 4);
    assert_eq!(
        fixture.store.list().unwrap(),
        vec!["book", "book_chapter-1", "book_chapter-2", "book_orig"]
    );
    assert_eq!(fixture.store.snapshot("book_orig").unwrap(), before);

    let parent = fixture.store.load("book").unwrap();
    assert!(editor::find_link(&parent, "book_chapter-1").is_some());
    assert!(editor::find_link(&parent, "book_chapter-2").is_some());
    let child = fixture.store.load("book_chapter-2").unwrap();
    assert_eq!(child.physical().len(), 3);
    assert!(child
        .edit_history()
        .last()
        .is_some_and(|note| note.note.starts_with("Workpiece was exploded from book")));
    assert_eq!(fixture.locks.is_locked("book"), None);
}

#[test]
fn given_exploded_book_when_listing_media_then_each_child_has_its_pages() {
    let fixture = fixture(&["book"]);

    fixture.service.explode("book").unwrap();

    assert_eq!(
        fixture.media.list("book_chapter-1").unwrap(),
        vec!["page_1.tif", "page_2.tif"]
    );
    assert_eq!(
        fixture.media.list("book_chapter-2").unwrap(),
        vec!["page_3.tif", "page_4.tif"]
    );
    assert_eq!(fixture.media.list("book_orig").unwrap().len(), 4);
    assert!(fixture.media.list("book").unwrap().is_empty());
}

#[test]
fn given_missing_media_file_when_exploding_then_skipped() {
    let store = Arc::new(InMemoryWorkpieceStore::new());
    let locks = Arc::new(InMemoryLockService::new());
    let media = Arc::new(InMemoryMediaStore::new());
    store.save(&sample_book("book", 2, &[1, 1]), "book").unwrap();
    media.add("book", "page_1.tif");
    let service = ExplodeService::new(store, locks, media.clone(), "explode@host");

    let outcome = service.explode("book").unwrap();

    assert_eq!(outcome.media_copied, 1);
    assert!(media.list("book_chapter-2").unwrap().is_empty());
}

#[test]
fn given_locked_workpiece_when_exploding_then_object_locked_and_nothing_changes() {
    let fixture = fixture(&["book"]);
    fixture.locks.acquire("book", "someone@scanner").unwrap();

    let err = fixture.service.explode("book").err().unwrap();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::ObjectLocked { ref holder, .. }) if holder == "someone@scanner"
    ));
    assert_eq!(fixture.store.list().unwrap(), vec!["book"]);
    assert_eq!(fixture.locks.is_locked("book").as_deref(), Some("someone@scanner"));
}

#[test]
fn given_existing_original_when_exploding_then_workpiece_exists() {
    let fixture = fixture(&["book"]);
    fixture
        .store
        .save(&sample_book("book_orig", 1, &[]), "book_orig")
        .unwrap();

    let err = fixture.service.explode("book").err().unwrap();

    assert!(matches!(err, ApplicationError::WorkpieceExists(id) if id == "book_orig"));
    assert_eq!(fixture.locks.is_locked("book"), None);
    assert_eq!(fixture.store.list().unwrap().len(), 2);
}

#[test]
fn given_flat_workpiece_when_exploding_then_nothing_to_explode() {
    let fixture = fixture(&[]);
    fixture
        .store
        .save(&sample_book("flat", 2, &[]), "flat")
        .unwrap();

    let err = fixture.service.explode("flat").err().unwrap();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::NothingToExplode(_))
    ));
    assert!(fixture.store.exists("flat"));
    assert!(!fixture.store.exists("flat_orig"));
}

#[test]
fn given_missing_workpiece_when_exploding_then_not_found() {
    let fixture = fixture(&[]);

    let err = fixture.service.explode("ghost").err().unwrap();

    assert!(matches!(err, ApplicationError::WorkpieceNotFound(_)));
}

#[test]
fn given_several_workpieces_when_exploding_all_then_results_in_input_order() {
    let fixture = fixture(&["a", "b", "c"]);
    fixture.locks.acquire("b", "busy@host").unwrap();
    let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();

    let results = fixture.service.explode_all(&ids);

    let order: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert!(results[0].1.is_ok());
    assert!(results[1].1.is_err());
    assert!(results[2].1.is_ok());
    assert!(fixture.store.exists("c_chapter-2"));
    assert!(!fixture.store.exists("b_orig"));
}

#[test]
fn given_types_colliding_with_numbering_when_exploding_then_no_child_overwritten() {
    let store = Arc::new(InMemoryWorkpieceStore::new());
    let mut source = Workpiece::new("book", "monograph");
    let pages = add_pages(&mut source, 3);
    let root = source.logical_root();
    for (kind, &page) in ["chapter", "chapter", "chapter-1"].iter().zip(&pages) {
        editor::insert_structure(
            kind,
            &mut source,
            root,
            InsertionPosition::LastChildOfCurrent,
            &[View::on(page)],
        )
        .unwrap();
    }
    store.save(&source, "book").unwrap();
    let service = ExplodeService::new(
        store.clone(),
        Arc::new(InMemoryLockService::new()),
        Arc::new(InMemoryMediaStore::new()),
        "explode@host",
    );

    let outcome = service.explode("book").unwrap();

    assert_eq!(
        outcome.child_ids,
        vec!["book_chapter-1", "book_chapter-2", "book_chapter-1-2"]
    );
    for (child_id, kind) in outcome.child_ids.iter().zip(["chapter", "chapter", "chapter-1"]) {
        let child = store.load(child_id).unwrap();
        assert_eq!(
            child.logical_division(child.logical_root()).map(|d| d.kind.as_str()),
            Some(kind)
        );
        assert_eq!(child.physical().len(), 2);
    }
}

// ============================================================
// Failing collaborators
// ============================================================

/// Delegates to an in-memory store but refuses to save one locator.
struct SaveFailingStore {
    inner: Arc<InMemoryWorkpieceStore>,
    locator: &'static str,
}

impl WorkpieceStore for SaveFailingStore {
    fn load(&self, locator: &str) -> io::Result<Workpiece> {
        self.inner.load(locator)
    }

    fn save(&self, workpiece: &Workpiece, locator: &str) -> io::Result<()> {
        if locator == self.locator {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.inner.save(workpiece, locator)
    }

    fn exists(&self, locator: &str) -> bool {
        self.inner.exists(locator)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        self.inner.rename(from, to)
    }

    fn backup(&self, locator: &str) -> io::Result<()> {
        self.inner.backup(locator)
    }

    fn remove(&self, locator: &str) -> io::Result<()> {
        self.inner.remove(locator)
    }

    fn list(&self) -> io::Result<Vec<String>> {
        self.inner.list()
    }
}

/// Delegates to in-memory media but cannot move an object's media.
struct RenameFailingMedia(Arc<InMemoryMediaStore>);

impl MediaStore for RenameFailingMedia {
    fn list(&self, object_id: &str) -> io::Result<Vec<String>> {
        self.0.list(object_id)
    }

    fn copy(&self, from_object: &str, to_object: &str, uri: &str) -> io::Result<()> {
        self.0.copy(from_object, to_object, uri)
    }

    fn rename_object(&self, _from_object: &str, _to_object: &str) -> io::Result<()> {
        Err(io::Error::other("media volume offline"))
    }

    fn remove_object(&self, object_id: &str) -> io::Result<()> {
        self.0.remove_object(object_id)
    }
}

fn assert_untouched(fixture: &Fixture, before: &WorkpieceSnapshot) {
    assert_eq!(fixture.store.list().unwrap(), vec!["book"]);
    assert_eq!(fixture.store.snapshot("book").as_ref(), Some(before));
    assert_eq!(fixture.media.list("book").unwrap().len(), 4);
    for other in ["book_orig", "book_chapter-1", "book_chapter-2"] {
        assert!(fixture.media.list(other).unwrap().is_empty(), "media left for {}", other);
    }
    assert_eq!(fixture.locks.is_locked("book"), None);
}

#[rstest]
#[case::second_child("book_chapter-2")]
#[case::parent("book")]
fn given_failing_save_when_exploding_then_store_and_media_restored(#[case] locator: &'static str) {
    // Arrange
    let fixture = fixture(&["book"]);
    let before = fixture.store.snapshot("book").unwrap();
    let store = Arc::new(SaveFailingStore {
        inner: fixture.store.clone(),
        locator,
    });
    let service = ExplodeService::new(store, fixture.locks.clone(), fixture.media.clone(), "explode@host");

    // Act
    let err = service.explode("book").err().unwrap();

    // Assert
    assert!(matches!(err, ApplicationError::OperationFailed { .. }));
    assert_untouched(&fixture, &before);
}

#[test]
fn given_failing_media_move_when_exploding_then_store_and_media_restored() {
    let fixture = fixture(&["book"]);
    let before = fixture.store.snapshot("book").unwrap();
    let media = Arc::new(RenameFailingMedia(fixture.media.clone()));
    let service = ExplodeService::new(fixture.store.clone(), fixture.locks.clone(), media, "explode@host");

    let err = service.explode("book").err().unwrap();

    assert!(matches!(err, ApplicationError::OperationFailed { .. }));
    assert_untouched(&fixture, &before);
}

#[test]
fn given_leftover_media_for_child_id_when_exploding_then_workpiece_exists() {
    let fixture = fixture(&["book"]);
    fixture.media.add("book_chapter-2", "stray.tif");

    let err = fixture.service.explode("book").err().unwrap();

    assert!(matches!(err, ApplicationError::WorkpieceExists(id) if id == "book_chapter-2"));
    assert_eq!(fixture.store.list().unwrap(), vec!["book"]);
    assert_eq!(fixture.media.list("book_chapter-2").unwrap(), vec!["stray.tif"]);
}
