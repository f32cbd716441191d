use std::alloc::{GlobalAlloc, Layout, System};
use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

#[path = "../tests/common/fixtures.rs"]
#[allow(dead_code)]
mod fixtures;

use epub_pager::{
    normalize_markup, DocumentOptions, EpubDocument, MemoryStore, NormalizeOptions, WordScanner,
    WordSource,
};
use epub_pager_embedded_graphics::{EgTextMeasurer, FontBackend, FontSize, MonoFontBackend};
use epub_pager_layout::{LayoutConfig, LayoutEngine, LayoutStrategy};
use fixtures::{prose, EpubBuilder};

const DISPLAY_WIDTH: i32 = 480;
const DISPLAY_HEIGHT: i32 = 800;

const BOOKS: &[(&str, usize, usize)] = &[("short-chapters", 40, 30), ("long-chapters", 400, 90)];

struct TrackingAllocator;

static CURRENT_ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);
static PEAK_ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);

#[global_allocator]
static GLOBAL_ALLOCATOR: TrackingAllocator = TrackingAllocator;

fn current_alloc_bytes() -> usize {
    CURRENT_ALLOC_BYTES.load(Ordering::Relaxed)
}

fn add_current_alloc_bytes(delta: usize) {
    let current = CURRENT_ALLOC_BYTES.fetch_add(delta, Ordering::Relaxed) + delta;
    PEAK_ALLOC_BYTES.fetch_max(current, Ordering::Relaxed);
}

fn sub_current_alloc_bytes(delta: usize) {
    let _ = CURRENT_ALLOC_BYTES.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(delta))
    });
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            add_current_alloc_bytes(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        sub_current_alloc_bytes(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            if new_size >= layout.size() {
                add_current_alloc_bytes(new_size - layout.size());
            } else {
                sub_current_alloc_bytes(layout.size() - new_size);
            }
        }
        new_ptr
    }
}

#[derive(Clone, Debug)]
struct CaseResult {
    book: String,
    case: String,
    iterations: usize,
    min_ns: u128,
    median_ns: u128,
    max_ns: u128,
    median_peak_heap_bytes: usize,
    max_peak_heap_bytes: usize,
}

fn run_case<F>(book: &str, case: &str, warmup_iters: usize, measure_iters: usize, mut op: F) -> CaseResult
where
    F: FnMut() -> usize,
{
    for _ in 0..warmup_iters {
        black_box(op());
    }

    let mut time_samples = Vec::with_capacity(measure_iters);
    let mut mem_samples = Vec::with_capacity(measure_iters);
    for _ in 0..measure_iters {
        let baseline_alloc = current_alloc_bytes();
        PEAK_ALLOC_BYTES.store(baseline_alloc, Ordering::Relaxed);
        let start = Instant::now();
        black_box(op());
        time_samples.push(start.elapsed().as_nanos());
        mem_samples.push(PEAK_ALLOC_BYTES.load(Ordering::Relaxed).saturating_sub(baseline_alloc));
    }

    time_samples.sort_unstable();
    mem_samples.sort_unstable();

    CaseResult {
        book: book.to_string(),
        case: case.to_string(),
        iterations: measure_iters,
        min_ns: time_samples[0],
        median_ns: time_samples[time_samples.len() / 2],
        max_ns: time_samples[time_samples.len() - 1],
        median_peak_heap_bytes: mem_samples[mem_samples.len() / 2],
        max_peak_heap_bytes: mem_samples[mem_samples.len() - 1],
    }
}

fn engine(strategy: LayoutStrategy) -> (LayoutEngine, EgTextMeasurer) {
    let backend = MonoFontBackend::new(FontSize::Medium);
    let config = LayoutConfig::for_display(DISPLAY_WIDTH, DISPLAY_HEIGHT)
        .with_line_height(backend.line_height());
    (
        LayoutEngine::new(config).with_strategy(strategy),
        EgTextMeasurer::with_backend(backend),
    )
}

fn main() {
    let quick = std::env::args().any(|arg| arg == "--quick");
    let warmup_iters = if quick { 1 } else { 2 };
    let measure_iters = if quick { 3 } else { 10 };
    let scratch = tempfile::tempdir().expect("tempdir");

    println!("# epub-pager benchmark");
    println!(
        "# mode={} warmup_iters={} measure_iters={}",
        if quick { "quick" } else { "full" },
        warmup_iters,
        measure_iters
    );
    println!("book,case,iterations,min_ns,median_ns,max_ns,median_peak_heap_bytes,max_peak_heap_bytes");

    let mut results = Vec::new();
    for &(key, paragraphs, words) in BOOKS {
        let body = prose(paragraphs, words);
        let markup = format!("<html><body>{body}</body></html>").into_bytes();
        let text = normalize_markup(&markup, NormalizeOptions::styled());
        let path = EpubBuilder::new()
            .chapter("One", &body)
            .chapter("Two", &body)
            .write_to(scratch.path(), &format!("{key}.epub"));

        results.push(run_case(key, "normalize_chapter", warmup_iters, measure_iters, || {
            normalize_markup(&markup, NormalizeOptions::styled()).len()
        }));

        results.push(run_case(key, "scan_words", warmup_iters, measure_iters, || {
            let mut scanner = WordScanner::new(MemoryStore::new(text.clone()));
            let mut count = 0;
            while scanner.next_word().is_some() {
                count += 1;
            }
            count
        }));

        for (case, strategy) in [
            ("paginate_greedy", LayoutStrategy::Greedy),
            ("paginate_knuth_plass", LayoutStrategy::KnuthPlass),
        ] {
            let (engine, measurer) = engine(strategy);
            results.push(run_case(key, case, warmup_iters, measure_iters, || {
                let mut scanner = WordScanner::new(MemoryStore::new(text.clone()));
                engine.pages(&mut scanner, &measurer).count()
            }));
        }

        let (engine, measurer) = engine(LayoutStrategy::Greedy);
        results.push(run_case(key, "page_backward", warmup_iters, measure_iters, || {
            let mut scanner = WordScanner::new(MemoryStore::new(text.clone()));
            let last = engine
                .pages(&mut scanner, &measurer)
                .last()
                .map_or(0, |page| page.start_position);
            let mut at = last;
            let mut flips = 0;
            while at > 0 && flips < 10_000 {
                at = engine.previous_page_start(&mut scanner, &measurer, at);
                flips += 1;
            }
            flips
        }));

        let cache = scratch.path().join(format!("{key}-cache"));
        results.push(run_case(key, "open_to_first_page", warmup_iters, measure_iters, || {
            let options = DocumentOptions::embedded().with_cache_dir(&cache);
            let mut document = EpubDocument::open(&path, options).expect("open");
            engine.layout_text(&mut document, &measurer).lines.len()
        }));
    }

    for result in &results {
        println!(
            "{},{},{},{},{},{},{},{}",
            result.book,
            result.case,
            result.iterations,
            result.min_ns,
            result.median_ns,
            result.max_ns,
            result.median_peak_heap_bytes,
            result.max_peak_heap_bytes
        );
    }
}
