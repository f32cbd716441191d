//! Reading session over a book.
//!
//! [`EpubDocument`] opens an `.epub` (or a bare `.xhtml`/`.html`/`.htm`
//! file), converts the active chapter to normalized text in the cache
//! directory, and exposes it as a [`WordSource`] with chapter navigation.
//! Only one chapter's scanner is alive at a time; converted chapters stay
//! on disk so revisiting one skips the conversion.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use crate::container::{book_cache_dir, ContainerOptions, EpubContainer};
use crate::error::EpubError;
use crate::normalizer::{NormalizeOptions, TextNormalizer};
use crate::scanner::WordScanner;
use crate::store::{FileStore, DEFAULT_WINDOW_SIZE};
use crate::tokenizer::MarkupTokenizer;
use crate::word::{FontStyle, TextAlign, WordSource, WordToken};

/// Chunk size for streaming chapter conversion.
pub const DEFAULT_STREAM_CHUNK: usize = 1024;

/// Kind of file behind a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    /// EPUB package with a spine.
    Epub,
    /// Single markup file; one chapter.
    Xhtml,
}

impl DocumentKind {
    /// Guess from the file extension; anything not markup is an EPUB.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("xhtml" | "html" | "htm") => Self::Xhtml,
            _ => Self::Epub,
        }
    }
}

/// Settings for a reading session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentOptions {
    /// Package options, including the cache directory.
    pub container: ContainerOptions,
    /// Scanner window size in bytes.
    pub window_size: usize,
    /// Convert chapters straight from the decompression stream instead of
    /// extracting them first.
    pub streaming_conversion: bool,
    /// Chunk size for streaming conversion.
    pub stream_chunk: usize,
    /// Normalizer settings.
    pub normalize: NormalizeOptions,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            container: ContainerOptions::default(),
            window_size: DEFAULT_WINDOW_SIZE,
            streaming_conversion: true,
            stream_chunk: DEFAULT_STREAM_CHUNK,
            normalize: NormalizeOptions::styled(),
        }
    }
}

impl DocumentOptions {
    /// Embedded-focused preset with smaller bounds.
    pub fn embedded() -> Self {
        Self {
            container: ContainerOptions::embedded(),
            window_size: 1024,
            stream_chunk: 512,
            ..Self::default()
        }
    }

    /// Set the cache root; each book gets its own subdirectory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.container.cache_dir = dir.into();
        self
    }

    /// Set the scanner window size.
    pub fn with_window_size(mut self, bytes: usize) -> Self {
        self.window_size = bytes;
        self
    }

    /// Choose streaming or extract-then-convert chapter loading.
    pub fn with_streaming_conversion(mut self, enabled: bool) -> Self {
        self.streaming_conversion = enabled;
        self
    }

    /// Set normalizer settings.
    pub fn with_normalize(mut self, normalize: NormalizeOptions) -> Self {
        self.normalize = normalize;
        self
    }
}

/// An open book with a chapter cursor.
pub struct EpubDocument {
    kind: DocumentKind,
    options: DocumentOptions,
    source: PathBuf,
    text_dir: PathBuf,
    container: Option<EpubContainer>,
    chapter: usize,
    chapter_size: u64,
    scanner: Option<WordScanner<FileStore>>,
    converted: HashSet<usize>,
}

impl EpubDocument {
    /// Open `path` and load its first chapter.
    pub fn open(path: impl AsRef<Path>, options: DocumentOptions) -> Result<Self, EpubError> {
        let path = path.as_ref();
        let kind = DocumentKind::from_path(path);
        let text_dir = book_cache_dir(&options.container.cache_dir, path)?.join("text");
        fs::create_dir_all(&text_dir)?;
        let container = match kind {
            DocumentKind::Epub => Some(EpubContainer::open(path, options.container.clone())?),
            DocumentKind::Xhtml => None,
        };
        let mut document = Self {
            kind,
            options,
            source: path.to_path_buf(),
            text_dir,
            container,
            chapter: 0,
            chapter_size: 0,
            scanner: None,
            converted: HashSet::new(),
        };
        document.open_chapter(0)?;
        log::info!(
            "[EPUB] opened {} ({:?}, {} chapters)",
            document.source.display(),
            kind,
            document.chapter_count()
        );
        Ok(document)
    }

    /// File kind.
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// Package reader, for EPUB documents.
    pub fn container(&self) -> Option<&EpubContainer> {
        self.container.as_ref()
    }

    /// Whether a chapter is loaded.
    pub fn is_valid(&self) -> bool {
        self.scanner.is_some() && self.container.as_ref().is_none_or(|c| c.is_valid())
    }

    /// TOC name of the current chapter.
    pub fn chapter_name(&self) -> Option<&str> {
        self.container
            .as_ref()?
            .chapter_name_for_spine(self.chapter)
    }

    /// Progress inside the current chapter, `[0, 1]`.
    pub fn chapter_percentage(&mut self) -> f32 {
        self.scanner.as_mut().map_or(1.0, |s| s.percentage())
    }

    /// Progress of `index` inside the current chapter, `[0, 1]`.
    pub fn chapter_percentage_at(&mut self, index: usize) -> f32 {
        self.scanner.as_mut().map_or(1.0, |s| s.percentage_at(index))
    }

    /// Path of the normalized text of the current chapter.
    pub fn chapter_text_path(&self) -> PathBuf {
        self.text_path(self.chapter)
    }

    fn text_path(&self, chapter: usize) -> PathBuf {
        self.text_dir.join(format!("chapter-{:04}.txt", chapter))
    }

    fn open_chapter(&mut self, index: usize) -> Result<(), EpubError> {
        let count = self.chapter_count();
        if index >= count {
            return Err(EpubError::OutOfRange { index, len: count });
        }
        // Release the current chapter before loading the next one.
        self.scanner = None;
        let text_path = self.text_path(index);
        if !self.converted.contains(&index) {
            self.chapter_size = self.convert_chapter(index, &text_path)?;
            self.converted.insert(index);
        } else {
            self.chapter_size = self.source_size(index);
        }
        let store = FileStore::open(&text_path)?;
        self.scanner = Some(WordScanner::with_window(store, self.options.window_size));
        self.chapter = index;
        log::debug!(
            "[EPUB] chapter {} loaded ({} source bytes)",
            index,
            self.chapter_size
        );
        Ok(())
    }

    fn source_size(&self, index: usize) -> u64 {
        match &self.container {
            Some(container) => container.spine_item(index).map_or(0, |item| item.size),
            None => fs::metadata(&self.source).map_or(0, |m| m.len()),
        }
    }

    /// Convert chapter `index` into `target`; returns its source size.
    fn convert_chapter(&mut self, index: usize, target: &Path) -> Result<u64, EpubError> {
        let mut out = BufWriter::new(File::create(target)?);
        let mut normalizer = TextNormalizer::new(self.options.normalize);
        let chunk = self.options.stream_chunk.max(1);

        let Some(container) = self.container.as_mut() else {
            let mut tokenizer = MarkupTokenizer::open_file(&self.source)?;
            normalizer.convert(&mut tokenizer, &mut out)?;
            return Ok(fs::metadata(&self.source)?.len());
        };
        let item = container
            .spine_item(index)
            .cloned()
            .ok_or(EpubError::OutOfRange {
                index,
                len: container.spine_count(),
            })?;

        if self.options.streaming_conversion {
            let stream = container.start_streaming(&item.path, chunk)?;
            let mut tokenizer = MarkupTokenizer::from_stream(stream, chunk);
            normalizer.convert(&mut tokenizer, &mut out)?;
            let stream = tokenizer.into_inner().into_inner();
            if stream.failed() {
                return Err(EpubError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("stream of {} failed", item.path),
                )));
            }
            stream.end();
        } else {
            let extracted = container
                .get_file(&item.path)
                .ok_or_else(|| EpubError::UnknownHref(item.path.clone()))?;
            let mut tokenizer = MarkupTokenizer::open_file(&extracted)?;
            normalizer.convert(&mut tokenizer, &mut out)?;
        }
        Ok(item.size)
    }

    fn scaled_local(&self, index: usize) -> u64 {
        let Some(scanner) = self.scanner.as_ref() else {
            return 0;
        };
        let text_len = scanner.len() as u64;
        if text_len == 0 {
            return 0;
        }
        let index = (index as u64).min(text_len);
        ((index as u128 * self.chapter_size as u128) / text_len as u128) as u64
    }
}

impl WordSource for EpubDocument {
    fn has_next_word(&mut self) -> bool {
        self.scanner.as_mut().is_some_and(|s| s.has_next_word())
    }

    fn has_prev_word(&mut self) -> bool {
        self.scanner.as_mut().is_some_and(|s| s.has_prev_word())
    }

    fn next_word(&mut self) -> Option<WordToken> {
        self.scanner.as_mut()?.next_word()
    }

    fn prev_word(&mut self) -> Option<WordToken> {
        self.scanner.as_mut()?.prev_word()
    }

    fn unget_word(&mut self) {
        if let Some(scanner) = self.scanner.as_mut() {
            scanner.unget_word();
        }
    }

    fn peek_char(&mut self, offset: isize) -> Option<u8> {
        self.scanner.as_mut()?.peek_char(offset)
    }

    fn consume_chars(&mut self, n: usize) -> usize {
        self.scanner.as_mut().map_or(0, |s| s.consume_chars(n))
    }

    fn is_inside_word(&mut self) -> bool {
        self.scanner.as_mut().is_some_and(|s| s.is_inside_word())
    }

    fn current_index(&self) -> usize {
        self.scanner.as_ref().map_or(0, |s| s.current_index())
    }

    fn set_position(&mut self, index: usize) {
        if let Some(scanner) = self.scanner.as_mut() {
            scanner.set_position(index);
        }
    }

    /// Book-wide progress; the scanner offset is scaled into the chapter's
    /// uncompressed source size.
    fn percentage(&mut self) -> f32 {
        let index = self.current_index();
        self.percentage_at(index)
    }

    fn percentage_at(&mut self, index: usize) -> f32 {
        match &self.container {
            Some(container) => container.percentage_at(self.chapter, self.scaled_local(index)),
            None => self.chapter_percentage_at(index),
        }
    }

    fn reset(&mut self) {
        if let Some(scanner) = self.scanner.as_mut() {
            scanner.reset();
        }
    }

    fn paragraph_alignment(&mut self) -> Option<TextAlign> {
        self.scanner.as_mut()?.paragraph_alignment()
    }

    fn chapter_count(&self) -> usize {
        self.container.as_ref().map_or(1, |c| c.spine_count())
    }

    fn current_chapter(&self) -> usize {
        self.chapter
    }

    fn set_chapter(&mut self, index: usize) -> bool {
        if index == self.chapter && self.scanner.is_some() {
            self.reset();
            return true;
        }
        let previous = self.chapter;
        match self.open_chapter(index) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("[EPUB] cannot open chapter {}: {}", index, err);
                if self.scanner.is_none() && previous != index {
                    if let Err(err) = self.open_chapter(previous) {
                        log::warn!("[EPUB] cannot restore chapter {}: {}", previous, err);
                    }
                }
                false
            }
        }
    }

    fn current_style(&self) -> FontStyle {
        self.scanner
            .as_ref()
            .map_or(FontStyle::Regular, |s| s.current_style())
    }

    fn has_style_support(&self) -> bool {
        self.scanner.is_some() && self.options.normalize.control_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_extension() {
        assert_eq!(DocumentKind::from_path(Path::new("a/b.XHTML")), DocumentKind::Xhtml);
        assert_eq!(DocumentKind::from_path(Path::new("b.htm")), DocumentKind::Xhtml);
        assert_eq!(DocumentKind::from_path(Path::new("b.epub")), DocumentKind::Epub);
        assert_eq!(DocumentKind::from_path(Path::new("noext")), DocumentKind::Epub);
    }

    #[test]
    fn bare_markup_file_is_a_single_chapter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let page = dir.path().join("page.xhtml");
        fs::write(&page, "<html><body><p>One <b>two</b></p><p>three</p></body></html>")
            .expect("write");
        let options = DocumentOptions::default().with_cache_dir(dir.path().join("cache"));
        let mut doc = EpubDocument::open(&page, options).expect("open");
        assert_eq!(doc.kind(), DocumentKind::Xhtml);
        assert_eq!(doc.chapter_count(), 1);
        assert!(doc.chapter_name().is_none());
        assert!(doc.set_chapter(0));
        assert!(!doc.set_chapter(1));

        let mut words = Vec::new();
        while let Some(token) = doc.next_word() {
            if token.is_word() {
                words.push((token.text, token.style));
            }
        }
        assert_eq!(
            words,
            vec![
                ("One".to_string(), FontStyle::Regular),
                ("two".to_string(), FontStyle::Bold),
                ("three".to_string(), FontStyle::Regular),
            ]
        );
        assert_eq!(doc.percentage(), 1.0);
    }

    fn words_of(doc: &mut EpubDocument) -> Vec<String> {
        doc.reset();
        let mut words = Vec::new();
        while let Some(token) = doc.next_word() {
            if token.is_word() {
                words.push(token.text);
            }
        }
        words
    }

    #[test]
    fn books_sharing_a_stem_keep_separate_chapter_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let options = DocumentOptions::default().with_cache_dir(dir.path().join("cache"));
        let mut books = Vec::new();
        for (sub, body) in [("a", "alpha alpha alpha"), ("b", "bravo")] {
            fs::create_dir_all(dir.path().join(sub)).expect("mkdir");
            let page = dir.path().join(sub).join("book.xhtml");
            fs::write(&page, format!("<html><body><p>{body}</p></body></html>")).expect("write");
            books.push(EpubDocument::open(&page, options.clone()).expect("open"));
        }
        let [first, second] = &mut books[..] else {
            unreachable!()
        };
        assert_ne!(first.chapter_text_path(), second.chapter_text_path());
        assert_eq!(words_of(second), ["bravo"]);
        assert_eq!(words_of(first), ["alpha", "alpha", "alpha"]);
        first.scanner = None;
        assert!(first.set_chapter(0));
        assert_eq!(words_of(first), ["alpha", "alpha", "alpha"]);
    }
}
