//! Persistable reading position.

use std::io;

use epub_pager::WordSource;
use serde::{Deserialize, Serialize};

use crate::layout_ir::PageLayout;

/// Where a reader is, independent of any page cache.
///
/// `index` is a word-source index inside `chapter`; `progress` is the
/// book-wide fraction kept for display and as a fallback when the chapter
/// text changes between sessions. Storage is up to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadingPosition {
    /// Spine index.
    pub chapter: usize,
    /// Chapter href, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_href: Option<String>,
    /// Word-source index inside the chapter.
    pub index: usize,
    /// Book-wide progress in `[0, 1]`.
    pub progress: f32,
}

impl ReadingPosition {
    /// Capture the source's cursor.
    pub fn capture<S>(source: &mut S, chapter_href: Option<String>) -> Self
    where
        S: WordSource + ?Sized,
    {
        Self {
            chapter: source.current_chapter(),
            chapter_href,
            index: source.current_index(),
            progress: source.percentage().clamp(0.0, 1.0),
        }
    }

    /// Position of the first word on `page`.
    pub fn at_page<S>(source: &mut S, page: &PageLayout, chapter_href: Option<String>) -> Self
    where
        S: WordSource + ?Sized,
    {
        Self {
            chapter: source.current_chapter(),
            chapter_href,
            index: page.start_position,
            progress: source.percentage_at(page.start_position).clamp(0.0, 1.0),
        }
    }

    /// Move `source` here. Returns `false` if the chapter cannot be opened.
    pub fn restore<S>(&self, source: &mut S) -> bool
    where
        S: WordSource + ?Sized,
    {
        if source.current_chapter() != self.chapter && !source.set_chapter(self.chapter) {
            log::warn!("[LAYOUT] cannot restore chapter {}", self.chapter);
            return false;
        }
        source.set_position(self.index);
        true
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Encode as JSON into `writer`.
    pub fn write_json<W: io::Write>(&self, writer: W) -> Result<(), serde_json::Error> {
        serde_json::to_writer(writer, self)
    }

    /// Decode from JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
