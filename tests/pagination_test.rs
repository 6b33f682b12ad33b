//! Tests for order labels, renumbering and the pagination service

use std::sync::Arc;

use rstest::rstest;

use structmeta::application::services::{PaginationService, SessionService};
use structmeta::config::PaginationConfig;
use structmeta::domain::{
    editor, pagination, Division, DomainError, InsertionPosition, PaginationScope, Paginator,
    PaginatorMode, PaginatorType, Physical, RomanNumeral, Workpiece,
};
use structmeta::infrastructure::memory::{
    InMemoryLockService, InMemoryMediaStore, InMemoryWorkpieceStore,
};
use structmeta::infrastructure::traits::WorkpieceStore;
use structmeta::util::testing::{add_pages, init_test_setup};

fn labels(workpiece: &Workpiece) -> Vec<Option<String>> {
    editor::collect_all_physical_sorted_by_order(workpiece, "page")
        .into_iter()
        .filter_map(|id| workpiece.physical_division(id))
        .map(|division| division.order_label.clone())
        .collect()
}

fn some(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some(v.to_string())).collect()
}

// ============================================================
// Paginator
// ============================================================

#[rstest]
#[case(PaginatorType::Arabic, PaginatorMode::Pages, "1", false, vec!["1", "2", "3", "4"])]
#[case(PaginatorType::Arabic, PaginatorMode::Pages, "9", false, vec!["9", "10", "11", "12"])]
#[case(PaginatorType::Roman, PaginatorMode::Pages, "i", false, vec!["i", "ii", "iii", "iv"])]
#[case(PaginatorType::Roman, PaginatorMode::Pages, "XIX", false, vec!["XIX", "XX", "XXI", "XXII"])]
#[case(PaginatorType::Arabic, PaginatorMode::DoublePages, "1", false, vec!["1 2", "3 4", "5 6", "7 8"])]
#[case(PaginatorType::Arabic, PaginatorMode::Foliation, "1", false, vec!["1", "1", "2", "2"])]
#[case(PaginatorType::Arabic, PaginatorMode::RectoVersoFoliation, "5", false, vec!["5r", "5v", "6r", "6v"])]
#[case(PaginatorType::Uncounted, PaginatorMode::Pages, "", false, vec![" - ", " - ", " - ", " - "])]
#[case(PaginatorType::Freetext, PaginatorMode::Pages, "Plate", false, vec!["Plate", "Plate", "Plate", "Plate"])]
#[case(PaginatorType::Arabic, PaginatorMode::Pages, "1", true, vec!["[1]", "[2]", "[3]", "[4]"])]
fn given_paginator_when_iterating_then_yields_expected_labels(
    #[case] kind: PaginatorType,
    #[case] mode: PaginatorMode,
    #[case] start: &str,
    #[case] fictitious: bool,
    #[case] expected: Vec<&str>,
) {
    let paginator = Paginator::new(kind, mode, start).unwrap().fictitious(fictitious);

    let labels: Vec<String> = paginator.take(4).collect();

    assert_eq!(labels, expected);
}

#[test]
fn given_custom_separator_when_double_paging_then_separator_joins_numbers() {
    let paginator = Paginator::new(PaginatorType::Roman, PaginatorMode::DoublePages, "I")
        .unwrap()
        .separator("-");

    let labels: Vec<String> = paginator.take(2).collect();

    assert_eq!(labels, vec!["I-II", "III-IV"]);
}

#[rstest]
#[case(PaginatorType::Arabic, "one")]
#[case(PaginatorType::Roman, "IIII")]
fn given_unparsable_start_when_creating_paginator_then_invalid_pagination(
    #[case] kind: PaginatorType,
    #[case] start: &str,
) {
    let result = Paginator::new(kind, PaginatorMode::Pages, start);

    assert!(matches!(result, Err(DomainError::InvalidPagination(_))));
}

#[test]
fn given_numbers_when_formatting_roman_then_canonical() {
    assert_eq!(RomanNumeral::format(1994, true), "MCMXCIV");
    assert_eq!(RomanNumeral::format(48, false), "xlviii");
    assert_eq!(RomanNumeral::parse("xlviii"), Some(48));
}

#[rstest]
#[case("arabic", vec!["3", "4"])]
#[case("roman", vec!["III", "IV"])]
#[case("uncounted", vec![" - ", " - "])]
#[case("none", vec!["", ""])]
fn given_default_type_when_creating_default_paginator_then_counts_from_first(
    #[case] default_type: &str,
    #[case] expected: Vec<&str>,
) {
    let labels: Vec<String> = Paginator::for_default(default_type, 3).take(2).collect();

    assert_eq!(labels, expected);
}

// ============================================================
// renumber / paginate_selection / add_dummy_pages
// ============================================================

#[test]
fn given_pages_out_of_order_when_renumbering_then_orders_are_consecutive() {
    // Arrange
    init_test_setup();
    let mut workpiece = Workpiece::new("book", "monograph");
    let root = workpiece.physical_root();
    for order in [30, 10, 20] {
        editor::insert_physical_division(
            Division::<Physical>::new("page").with_order(order),
            &mut workpiece,
            root,
            InsertionPosition::LastChildOfCurrent,
        )
        .unwrap();
    }
    let paginator = Paginator::new(PaginatorType::Arabic, PaginatorMode::Pages, "1").unwrap();

    // Act
    let count = pagination::renumber(&mut workpiece, "page", paginator);

    // Assert
    assert_eq!(count, 3);
    let first_inserted = workpiece.physical().child_at(root, 0).unwrap();
    let division = workpiece.physical_division(first_inserted).unwrap();
    assert_eq!(division.order(), 3);
    assert_eq!(division.order_label.as_deref(), Some("3"));
    assert_eq!(labels(&workpiece), some(&["1", "2", "3"]));
}

#[test]
fn given_selection_when_paginating_from_first_then_following_pages_relabelled() {
    let mut workpiece = Workpiece::new("book", "monograph");
    add_pages(&mut workpiece, 4);
    let arabic = Paginator::new(PaginatorType::Arabic, PaginatorMode::Pages, "1").unwrap();
    pagination::renumber(&mut workpiece, "page", arabic);
    let roman = Paginator::new(PaginatorType::Roman, PaginatorMode::Pages, "i").unwrap();

    let count = pagination::paginate_selection(
        &mut workpiece,
        "page",
        &[2, 1],
        PaginationScope::FromFirstSelected,
        roman,
    )
    .unwrap();

    assert_eq!(count, 3);
    assert_eq!(labels(&workpiece), some(&["1", "i", "ii", "iii"]));
}

#[test]
fn given_selection_when_paginating_selected_only_then_others_untouched() {
    let mut workpiece = Workpiece::new("book", "monograph");
    add_pages(&mut workpiece, 4);
    let text = Paginator::new(PaginatorType::Freetext, PaginatorMode::Pages, "Map").unwrap();

    let count = pagination::paginate_selection(
        &mut workpiece,
        "page",
        &[3, 0, 3],
        PaginationScope::SelectedOnly,
        text,
    )
    .unwrap();

    assert_eq!(count, 2);
    assert_eq!(
        labels(&workpiece),
        vec![Some("Map".to_string()), None, None, Some("Map".to_string())]
    );
}

#[rstest]
#[case(vec![])]
#[case(vec![0, 4])]
fn given_invalid_selection_when_paginating_then_fails_without_change(#[case] selection: Vec<usize>) {
    let mut workpiece = Workpiece::new("book", "monograph");
    add_pages(&mut workpiece, 4);
    let before = workpiece.to_snapshot();
    let paginator = Paginator::infer("1");

    let result = pagination::paginate_selection(
        &mut workpiece,
        "page",
        &selection,
        PaginationScope::SelectedOnly,
        paginator,
    );

    assert!(matches!(result, Err(DomainError::InvalidPagination(_))));
    assert_eq!(workpiece.to_snapshot(), before);
}

#[test]
fn given_pages_when_adding_dummy_pages_then_appended_after_last_order() {
    let mut workpiece = Workpiece::new("book", "monograph");
    add_pages(&mut workpiece, 2);

    let created = pagination::add_dummy_pages(
        &mut workpiece,
        2,
        "page",
        Some(Paginator::for_default("arabic", 3).fictitious(true)),
    )
    .unwrap();

    assert_eq!(created.len(), 2);
    let dummy = workpiece.physical_division(created[1]).unwrap();
    assert_eq!(dummy.order(), 4);
    assert!(!dummy.has_media());
    assert_eq!(labels(&workpiece)[2..].to_vec(), some(&["[3]", "[4]"]));
}

// ============================================================
// PaginationService
// ============================================================

struct Fixture {
    store: Arc<InMemoryWorkpieceStore>,
    media: Arc<InMemoryMediaStore>,
    service: PaginationService,
}

fn fixture(config: PaginationConfig) -> Fixture {
    let store = Arc::new(InMemoryWorkpieceStore::new());
    let locks = Arc::new(InMemoryLockService::new());
    let media = Arc::new(InMemoryMediaStore::new());
    store
        .save(&Workpiece::new("book", "monograph"), "book")
        .unwrap();
    let sessions = SessionService::new(store.clone(), locks, "tester@host");
    let service = PaginationService::new(sessions, media.clone(), config);
    Fixture {
        store,
        media,
        service,
    }
}

#[test]
fn given_media_files_when_creating_pagination_then_one_labelled_page_per_file() {
    // Arrange
    init_test_setup();
    let fixture = fixture(PaginationConfig::default());
    for uri in ["00000002.tif", "00000001.tif", "00000003.tif"] {
        fixture.media.add("book", uri);
    }

    // Act
    let created = fixture.service.create_pagination("book").unwrap();

    // Assert
    assert_eq!(created, 3);
    let book = fixture.store.load("book").unwrap();
    assert_eq!(labels(&book), some(&["1", "2", "3"]));
    assert_eq!(book.views(book.logical_root()).len(), 3);
    assert!(book.back_references_consistent());
    let first = editor::collect_all_physical_sorted_by_order(&book, "page")[0];
    assert_eq!(
        book.physical_division(first)
            .and_then(|d| d.media_files().get("LOCAL").cloned()),
        Some("00000001.tif".to_string())
    );
}

#[test]
fn given_existing_pagination_when_creating_again_then_only_new_files_added() {
    let fixture = fixture(PaginationConfig::default());
    fixture.media.add("book", "00000001.tif");
    fixture.service.create_pagination("book").unwrap();
    fixture.media.add("book", "00000002.tif");

    let created = fixture.service.create_pagination("book").unwrap();

    assert_eq!(created, 1);
    let book = fixture.store.load("book").unwrap();
    assert_eq!(labels(&book), some(&["1", "2"]));
    assert_eq!(fixture.store.backup_count("book"), 2);
}

#[test]
fn given_roman_default_when_creating_pagination_then_roman_labels() {
    let fixture = fixture(PaginationConfig {
        default_type: "roman".into(),
        ..PaginationConfig::default()
    });
    fixture.media.add("book", "a.tif");
    fixture.media.add("book", "b.tif");

    fixture.service.create_pagination("book").unwrap();

    let book = fixture.store.load("book").unwrap();
    assert_eq!(labels(&book), some(&["I", "II"]));
}

#[rstest]
#[case(true, vec![Some("1".to_string()), Some("[2]".to_string()), Some("[3]".to_string())])]
#[case(false, vec![Some("1".to_string()), None, None])]
fn given_automatic_setting_when_adding_dummy_pages_then_labels_follow_setting(
    #[case] automatic: bool,
    #[case] expected: Vec<Option<String>>,
) {
    let fixture = fixture(PaginationConfig {
        automatic,
        ..PaginationConfig::default()
    });
    fixture.media.add("book", "00000001.tif");
    fixture.service.create_pagination("book").unwrap();

    let created = fixture.service.add_dummy_pages("book", 2).unwrap();

    assert_eq!(created, 2);
    assert_eq!(labels(&fixture.store.load("book").unwrap()), expected);
}

#[test]
fn given_stored_pages_when_paginating_through_service_then_saved() {
    let fixture = fixture(PaginationConfig::default());
    for uri in ["1.tif", "2.tif", "3.tif"] {
        fixture.media.add("book", uri);
    }
    fixture.service.create_pagination("book").unwrap();
    let roman = Paginator::new(PaginatorType::Roman, PaginatorMode::Pages, "v").unwrap();

    let count = fixture
        .service
        .paginate("book", &[1], PaginationScope::SelectedOnly, roman)
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(
        labels(&fixture.store.load("book").unwrap()),
        some(&["1", "v", "3"])
    );
}

#[test]
fn given_pages_when_renumbering_through_service_then_all_relabelled() {
    let fixture = fixture(PaginationConfig::default());
    fixture.media.add("book", "1.tif");
    fixture.media.add("book", "2.tif");
    fixture.service.create_pagination("book").unwrap();
    let paginator = Paginator::new(PaginatorType::Arabic, PaginatorMode::Foliation, "1").unwrap();

    let count = fixture.service.renumber("book", paginator).unwrap();

    assert_eq!(count, 2);
    assert_eq!(
        labels(&fixture.store.load("book").unwrap()),
        some(&["1", "1"])
    );
}
