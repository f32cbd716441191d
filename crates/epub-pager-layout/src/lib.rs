//! Line breaking, pagination and hyphenation for `epub-pager`.
//!
//! [`LayoutEngine`] pages any [`epub_pager::WordSource`] into
//! [`PageLayout`]s using a renderer-supplied [`TextMeasurer`], and draws
//! them through a [`TextDrawer`]. Pages carry the source index to resume
//! from, so paging forward and backward needs no page cache.

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

mod engine;
pub mod greedy;
pub mod hyphenation;
pub mod knuth_plass;
mod layout_ir;
pub mod paragraph;
mod patterns;
mod reading_position;

pub use engine::{LayoutEngine, LayoutStrategy, PageIter};
pub use epub_pager::{FontStyle, TextAlign, WordSource};
pub use greedy::greedy_breaks;
pub use hyphenation::{
    BreakOffsets, BreakPoint, HyphenationParams, Hyphenator, Language, MAX_BREAK_POINTS,
    MAX_WORD_BYTES,
};
pub use knuth_plass::{optimal_breaks, total_demerits};
pub use layout_ir::{
    LayoutConfig, Line, PageLayout, PlacedWord, TextBounds, TextDrawer, TextMeasurer,
};
pub use paragraph::{BreakKind, Fragment, PARAGRAPH_WORD_CAP};
pub use reading_position::ReadingPosition;
