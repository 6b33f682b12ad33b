//! Test support: one-time logging setup and sample workpieces.

use std::sync::Once;

use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::domain::division::LOCAL_MEDIA_USE;
use crate::domain::{editor, Division, InsertionPosition, Physical, PhysicalId, View, Workpiece};

static TEST_SETUP: Once = Once::new();

/// Installs a stderr subscriber once per test binary, honouring `RUST_LOG`.
pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter),
    );

    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else if let Err(e) = subscriber.try_init() {
        eprintln!("Error: Failed to set up logging: {}", e);
    }
}

/// Appends `count` pages `page_1.tif`, `page_2.tif`, ... with orders `1..=count`.
pub fn add_pages(workpiece: &mut Workpiece, count: usize) -> Vec<PhysicalId> {
    let root = workpiece.physical_root();
    (1..=count)
        .map(|n| {
            let page = Division::<Physical>::new("page")
                .with_order(u32::try_from(n).unwrap_or(u32::MAX))
                .with_media(LOCAL_MEDIA_USE, format!("page_{}.tif", n));
            editor::insert_physical_division(page, workpiece, root, InsertionPosition::LastChildOfCurrent)
                .unwrap_or(root)
        })
        .collect()
}

/// A monograph with `pages` pages, all viewed by the root, and one chapter per
/// entry of `chapters` viewing that many consecutive pages.
pub fn sample_book(id: &str, pages: usize, chapters: &[usize]) -> Workpiece {
    let mut workpiece = Workpiece::new(id, "monograph");
    let ids = add_pages(&mut workpiece, pages);
    let root = workpiece.logical_root();
    for &page in &ids {
        let _ = editor::assign_view(&mut workpiece, root, View::on(page), None);
    }
    let mut next = 0;
    for &size in chapters {
        let views: Vec<View> = ids.iter().skip(next).take(size).map(|&p| View::on(p)).collect();
        next += size;
        let _ = editor::insert_structure(
            "chapter",
            &mut workpiece,
            root,
            InsertionPosition::LastChildOfCurrent,
            &views,
        );
    }
    workpiece
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_setup() {
        init_test_setup();
        init_test_setup();
    }

    #[test]
    fn sample_book_keeps_back_references_consistent() {
        let book = sample_book("book", 4, &[2, 2]);
        assert_eq!(book.logical().child_count(book.logical_root()), 2);
        assert_eq!(book.views(book.logical_root()).len(), 4);
        assert!(book.back_references_consistent());
    }
}
