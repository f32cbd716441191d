//! epub-pager -- resumable EPUB text ingestion for e-reader pagination
//!
//! Turns an EPUB (or a bare XHTML file) into a bidirectional word cursor that
//! a layout engine can page through forward and backward without re-reading
//! the document from the start. Memory stays bounded: chapters are streamed
//! out of the archive, flattened to normalized text, and scanned through a
//! fixed-size sliding window.
//!
//! Pipeline, leaves first:
//!
//! - [`tokenizer`] -- bidirectional markup tokenizer with capture/restore
//!   positions
//! - [`container`] -- ZIP package reader: manifest, spine, extraction and
//!   pull-based decompression streaming
//! - [`normalizer`] -- markup to normalized text with embedded control tokens
//! - [`scanner`] -- word cursor over normalized text
//! - [`document`] -- one open book: chapter switching and book-wide progress
//!
//! Line breaking, pagination and hyphenation live in the companion
//! `epub-pager-layout` crate, which consumes any [`WordSource`].

#![warn(missing_docs)]
#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod container;
pub mod document;
pub mod error;
pub mod navigation;
pub mod normalizer;
pub mod scanner;
pub mod store;
pub mod tokenizer;
pub mod word;
pub mod zip;

pub use container::{book_cache_dir, ContainerOptions, EntryStream, EpubContainer, SpineItem};
pub use document::{DocumentKind, DocumentOptions, EpubDocument};
pub use error::{EpubError, ZipError, ZipErrorKind};
pub use navigation::{NavPoint, Navigation, NavigationLimits};
pub use normalizer::{normalize_markup, NormalizeOptions, TextNormalizer};
pub use scanner::WordScanner;
pub use store::{
    ByteAccess, ByteStore, ChunkFn, ChunkSource, ChunkWindow, FileStore, MemoryStore,
    ReadChunks, SlidingWindow,
};
pub use tokenizer::{Attribute, MarkupTokenizer, NodeType, Position};
pub use word::{
    BoundaryKind, ControlToken, Direction, Emphasis, FontStyle, StyleState, TextAlign,
    WordSource, WordToken, ESC,
};
pub use zip::{StreamingZip, ZipEntry, ZipEntryReader, ZipLimits};
