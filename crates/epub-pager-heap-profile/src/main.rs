//! DHAT heap profiler for epub-pager.
//!
//! Profiles allocation patterns across the reading pipeline:
//! open -> convert -> paginate -> page back.
//!
//! Usage:
//!   cargo run -p epub-pager-heap-profile --release -- [OPTIONS] <EPUB_FILES...>
//!
//! Outputs dhat-<phase>.json files in the output directory (default: target/memory).
//! Open in https://nnethercote.github.io/dh_view/dh_view.html

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::path::{Path, PathBuf};
use std::process::Command;

use epub_pager::{DocumentOptions, EpubDocument, WordSource};
use epub_pager_embedded_graphics::{EgTextMeasurer, FontBackend, FontSize, MonoFontBackend};
use epub_pager_layout::{LayoutConfig, LayoutEngine, LayoutStrategy};

const DISPLAY_WIDTH: i32 = 480;
const DISPLAY_HEIGHT: i32 = 800;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Convert,
    Paginate,
    Full,
    Backward,
}

impl Phase {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "convert" => Some(Self::Convert),
            "paginate" => Some(Self::Paginate),
            "full" => Some(Self::Full),
            "backward" => Some(Self::Backward),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Convert => "convert",
            Self::Paginate => "paginate",
            Self::Full => "full",
            Self::Backward => "backward",
        }
    }
}

fn engine_for(strategy: LayoutStrategy) -> (LayoutEngine, EgTextMeasurer) {
    let backend = MonoFontBackend::new(FontSize::Medium);
    let config = LayoutConfig::for_display(DISPLAY_WIDTH, DISPLAY_HEIGHT)
        .with_line_height(backend.line_height());
    (
        LayoutEngine::new(config).with_strategy(strategy),
        EgTextMeasurer::with_backend(backend),
    )
}

fn pick_text_chapter(document: &mut EpubDocument) -> usize {
    let count = document.chapter_count();
    for idx in 0..count.min(12) {
        if document.set_chapter(idx) && document.has_next_word() {
            return idx;
        }
    }
    0
}

fn page_forward(engine: &LayoutEngine, measurer: &EgTextMeasurer, document: &mut EpubDocument) -> usize {
    engine.pages(document, measurer).count()
}

fn profile_file(path: &Path, phase: Phase, strategy: LayoutStrategy, cache_dir: &Path) {
    let path_str = path.to_string_lossy();
    let options = DocumentOptions::embedded().with_cache_dir(cache_dir);
    let mut document = EpubDocument::open(path, options)
        .unwrap_or_else(|e| panic!("open {}: {}", path_str, e));

    match phase {
        Phase::Open => {}
        Phase::Convert => {
            for ch in 0..document.chapter_count() {
                if !document.set_chapter(ch) {
                    panic!("convert {}: chapter {} failed", path_str, ch);
                }
            }
        }
        Phase::Paginate => {
            let ch = pick_text_chapter(&mut document);
            document.set_chapter(ch);
            let (engine, measurer) = engine_for(strategy);
            let pages = page_forward(&engine, &measurer, &mut document);
            if pages == 0 {
                panic!("paginate {} produced zero pages", path_str);
            }
        }
        Phase::Full => {
            let (engine, measurer) = engine_for(strategy);
            let mut pages = 0usize;
            for ch in 0..document.chapter_count() {
                if document.set_chapter(ch) {
                    pages = pages.saturating_add(page_forward(&engine, &measurer, &mut document));
                }
            }
            if pages == 0 {
                panic!("full {} produced zero pages", path_str);
            }
        }
        Phase::Backward => {
            let ch = pick_text_chapter(&mut document);
            document.set_chapter(ch);
            let (engine, measurer) = engine_for(strategy);
            let mut starts = Vec::with_capacity(64);
            let mut last_start = 0;
            for page in engine.pages(&mut document, &measurer) {
                starts.push(page.start_position);
                last_start = page.start_position;
            }
            let mut at = last_start;
            let mut flips = 0usize;
            while at > 0 && flips <= starts.len() {
                at = engine.previous_page_start(&mut document, &measurer, at);
                flips += 1;
            }
            if flips == 0 && starts.len() > 1 {
                panic!("backward {} never flipped", path_str);
            }
        }
    }
}

/// Extract a short name from a file path for use in output filenames.
fn short_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

fn usage() {
    eprintln!("Usage: heap-profile [OPTIONS] <EPUB_FILES...>");
    eprintln!();
    eprintln!("Options:");
    eprintln!(
        "  --phase <open|convert|paginate|full|backward>  Pipeline phase to profile (default: paginate)"
    );
    eprintln!("  --greedy                             Use first-fit line breaking instead of total-fit");
    eprintln!("  --out-dir <DIR>                      Output directory for dhat JSON (default: target/memory)");
    eprintln!(
        "  --aggregate                          Single profile for all files (default: per-file)"
    );
    eprintln!();
    eprintln!("By default, each EPUB gets its own clean DHAT profile (separate process).");
    eprintln!("With --aggregate, all files share one profile.");
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut phase = Phase::Paginate;
    let mut strategy = LayoutStrategy::KnuthPlass;
    let mut out_dir = PathBuf::from("target/memory");
    let mut files: Vec<PathBuf> = Vec::with_capacity(8);
    let mut aggregate = false;
    // Internal flag: set in the child process that profiles one file.
    let mut single_file_mode = false;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--phase" => {
                i += 1;
                phase = args
                    .get(i)
                    .and_then(|s| Phase::from_str(s))
                    .unwrap_or_else(|| {
                        eprintln!("Unknown phase: {}", args.get(i).map_or("", |s| s.as_str()));
                        usage();
                        std::process::exit(1);
                    });
            }
            "--greedy" => {
                strategy = LayoutStrategy::Greedy;
            }
            "--out-dir" => {
                i += 1;
                out_dir = args.get(i).map(PathBuf::from).unwrap_or_else(|| {
                    usage();
                    std::process::exit(1);
                });
            }
            "--aggregate" => {
                aggregate = true;
            }
            "--single-file" => {
                single_file_mode = true;
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            other => {
                files.push(PathBuf::from(other));
            }
        }
        i += 1;
    }

    if files.is_empty() {
        eprintln!("No EPUB files given.");
        usage();
        std::process::exit(1);
    }

    std::fs::create_dir_all(&out_dir).unwrap_or_else(|e| {
        eprintln!("Failed to create output dir {}: {}", out_dir.display(), e);
        std::process::exit(1);
    });
    let cache_dir = out_dir.join("cache");

    let phase_name = phase.name();

    if single_file_mode {
        assert!(files.len() == 1, "--single-file expects exactly one file");
        let file = &files[0];
        let name = short_name(file);
        let json_path = out_dir.join(format!("dhat-{phase_name}-{name}.json"));

        let _profiler = dhat::Profiler::builder().file_name(json_path).build();

        profile_file(file, phase, strategy, &cache_dir);
        return;
    }

    if aggregate {
        let json_path = out_dir.join(format!("dhat-{phase_name}.json"));
        eprintln!(
            "heap-profile: phase={}, files={} (aggregate), out={}",
            phase_name,
            files.len(),
            out_dir.display()
        );

        let _profiler = dhat::Profiler::builder()
            .file_name(json_path.clone())
            .build();

        for file in &files {
            eprintln!("  profiling: {}", file.display());
            profile_file(file, phase, strategy, &cache_dir);
        }

        eprintln!(
            "Done. Open {} in https://nnethercote.github.io/dh_view/dh_view.html",
            json_path.display()
        );
        return;
    }

    let self_exe = std::env::current_exe().unwrap_or_else(|e| {
        eprintln!("Failed to determine own executable path: {}", e);
        std::process::exit(1);
    });

    eprintln!(
        "heap-profile: phase={}, files={} (per-file), out={}",
        phase_name,
        files.len(),
        out_dir.display()
    );

    let mut any_failed = false;
    for file in &files {
        let name = short_name(file);
        eprintln!(
            "  profiling: {} -> dhat-{}-{}.json",
            file.display(),
            phase_name,
            name
        );

        let mut child = Command::new(&self_exe);
        child
            .arg("--single-file")
            .arg("--phase")
            .arg(phase_name)
            .arg("--out-dir")
            .arg(&out_dir);
        if strategy == LayoutStrategy::Greedy {
            child.arg("--greedy");
        }
        match child.arg(file).status() {
            Ok(s) if s.success() => {}
            Ok(s) => {
                eprintln!("    FAILED (exit {})", s.code().unwrap_or(-1));
                any_failed = true;
            }
            Err(e) => {
                eprintln!("    FAILED to spawn: {}", e);
                any_failed = true;
            }
        }
    }

    eprintln!();
    eprintln!("Profiles saved to {}:", out_dir.display());
    for file in &files {
        let name = short_name(file);
        let json_path = out_dir.join(format!("dhat-{phase_name}-{name}.json"));
        if json_path.exists() {
            eprintln!("  {}", json_path.display());
        }
    }

    if any_failed {
        std::process::exit(1);
    }
}
