mod common;

use common::budget_alloc::BudgetAlloc;
use common::fixtures::{prose, EpubBuilder};
use epub_pager::{DocumentOptions, EpubDocument, WordSource};
use epub_pager_embedded_graphics::{EgTextMeasurer, FontBackend, FontSize, MonoFontBackend};
use epub_pager_layout::{LayoutConfig, LayoutEngine};

const DISPLAY_WIDTH: i32 = 480;
const DISPLAY_HEIGHT: i32 = 800;
// The chapter is over 1MiB of markup; open -> convert -> page through it
// must stay far below that.
const PAGING_BUDGET_BYTES: usize = 256 * 1024;

#[global_allocator]
static ALLOC: BudgetAlloc = BudgetAlloc::new();

#[test]
fn paging_a_large_chapter_stays_under_budget() {
    let dir = tempfile::tempdir().expect("tempdir");
    let body = prose(1800, 90);
    assert!(body.len() > 1024 * 1024);
    let path = EpubBuilder::new()
        .chapter("Long", &body)
        .chapter("Short", &prose(2, 10))
        .write_to(dir.path(), "large.epub");
    drop(body);

    let backend = MonoFontBackend::new(FontSize::Medium);
    let engine = LayoutEngine::knuth_plass(
        LayoutConfig::for_display(DISPLAY_WIDTH, DISPLAY_HEIGHT)
            .with_line_height(backend.line_height()),
    );
    let measurer = EgTextMeasurer::with_backend(backend);
    let options = DocumentOptions::embedded().with_cache_dir(dir.path().join("cache"));

    let (pages, usage) = ALLOC.measure(|| {
        let mut document = EpubDocument::open(&path, options).expect("open");
        let pages = engine.pages(&mut document, &measurer).count();
        assert!(document.set_chapter(1));
        pages
    });

    assert!(pages > 100, "only {pages} pages");
    assert!(
        usage.peak_bytes <= PAGING_BUDGET_BYTES,
        "peak heap {} exceeds budget {}",
        usage.peak_bytes,
        PAGING_BUDGET_BYTES
    );
}
