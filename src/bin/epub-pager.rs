//! Inspect a book through the ingestion pipeline.
//!
//! Usage:
//!   cargo run --features cli --bin epub-pager -- <COMMAND> <BOOK> [OPTIONS]
//!
//! Commands:
//!   info      package path, spine size and total bytes
//!   chapters  spine items with their TOC names and offsets
//!   words     word tokens of one chapter, one per line
//!   text      normalized text of one chapter, control tokens shown as <X>

use std::path::PathBuf;
use std::process::ExitCode;

use epub_pager::{
    ContainerOptions, ControlToken, DocumentKind, DocumentOptions, EpubContainer, EpubDocument,
    WordSource, ESC,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Command {
    Info,
    Chapters,
    Words,
    Text,
}

impl Command {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "chapters" => Some(Self::Chapters),
            "words" => Some(Self::Words),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

struct Args {
    command: Command,
    book: PathBuf,
    chapter: usize,
    limit: usize,
    cache_dir: Option<PathBuf>,
    extract: bool,
}

fn usage() {
    eprintln!("Usage: epub-pager <info|chapters|words|text> <BOOK> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --chapter <N>     Chapter for words/text (default: 0)");
    eprintln!("  --limit <N>       Maximum tokens printed by words (default: 200)");
    eprintln!("  --cache-dir <DIR> Directory for extracted and converted files");
    eprintln!("  --extract         Extract chapters before converting instead of streaming");
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::from_str(args.first()?)?;
    let book = PathBuf::from(args.get(1)?);
    let mut parsed = Args {
        command,
        book,
        chapter: 0,
        limit: 200,
        cache_dir: None,
        extract: false,
    };
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--chapter" => {
                i += 1;
                parsed.chapter = args.get(i)?.parse().ok()?;
            }
            "--limit" => {
                i += 1;
                parsed.limit = args.get(i)?.parse().ok()?;
            }
            "--cache-dir" => {
                i += 1;
                parsed.cache_dir = Some(PathBuf::from(args.get(i)?));
            }
            "--extract" => parsed.extract = true,
            _ => return None,
        }
        i += 1;
    }
    Some(parsed)
}

fn container_options(args: &Args) -> ContainerOptions {
    match &args.cache_dir {
        Some(dir) => ContainerOptions::default().with_cache_dir(dir),
        None => ContainerOptions::default(),
    }
}

fn print_info(args: &Args) -> Result<(), epub_pager::EpubError> {
    let container = EpubContainer::open(&args.book, container_options(args))?;
    println!("package:  {}", container.content_opf_path());
    println!("spine:    {} items", container.spine_count());
    println!("size:     {} bytes", container.total_book_size());
    println!("valid:    {}", container.is_valid());
    Ok(())
}

fn print_chapters(args: &Args) -> Result<(), epub_pager::EpubError> {
    let container = EpubContainer::open(&args.book, container_options(args))?;
    for (index, item) in container.spine().iter().enumerate() {
        println!(
            "{:>4}  {:>9}  {:>5.1}%  {}  {}",
            index,
            item.size,
            container.percentage_at(index, 0) * 100.0,
            item.path,
            container.chapter_name_for_spine(index).unwrap_or("-")
        );
    }
    Ok(())
}

fn open_document(args: &Args) -> Result<EpubDocument, epub_pager::EpubError> {
    let options = DocumentOptions {
        container: container_options(args),
        streaming_conversion: !args.extract,
        ..DocumentOptions::default()
    };
    let mut document = EpubDocument::open(&args.book, options)?;
    if !document.set_chapter(args.chapter) {
        return Err(epub_pager::EpubError::OutOfRange {
            index: args.chapter,
            len: document.chapter_count(),
        });
    }
    Ok(document)
}

fn print_words(args: &Args) -> Result<(), epub_pager::EpubError> {
    let mut document = open_document(args)?;
    if document.kind() == DocumentKind::Epub {
        println!("# {}", document.chapter_name().unwrap_or("untitled"));
    }
    let mut printed = 0;
    while printed < args.limit {
        let index = document.current_index();
        let Some(token) = document.next_word() else {
            break;
        };
        println!(
            "{:>8}  {:>5.1}%  {:<10}  {:?}",
            index,
            document.percentage_at(index) * 100.0,
            format!("{:?}", token.style),
            token.text
        );
        printed += 1;
    }
    Ok(())
}

fn print_text(args: &Args) -> Result<(), epub_pager::EpubError> {
    let document = open_document(args)?;
    let bytes = std::fs::read(document.chapter_text_path())?;
    let mut out = String::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    let mut plain = Vec::new();
    while let Some(byte) = iter.next() {
        if byte != ESC {
            plain.push(byte);
            continue;
        }
        out.push_str(&String::from_utf8_lossy(&plain));
        plain.clear();
        match iter.next().and_then(ControlToken::from_command) {
            Some(token) => {
                out.push('<');
                out.push(token.command() as char);
                out.push('>');
            }
            None => out.push_str("<?>"),
        }
    }
    out.push_str(&String::from_utf8_lossy(&plain));
    print!("{}", out);
    Ok(())
}

fn main() -> ExitCode {
    let Some(args) = parse_args() else {
        usage();
        return ExitCode::from(2);
    };
    let result = match args.command {
        Command::Info => print_info(&args),
        Command::Chapters => print_chapters(&args),
        Command::Words => print_words(&args),
        Command::Text => print_text(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("epub-pager: {}: {}", args.book.display(), err);
            ExitCode::FAILURE
        }
    }
}
