//! Page geometry, laid-out pages and the renderer capabilities layout
//! depends on.

use epub_pager::{FontStyle, TextAlign};
use smallvec::SmallVec;

use crate::hyphenation::{HyphenationParams, Hyphenator, Language};

/// Size of a measured run, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBounds {
    /// Advance width.
    pub width: i32,
    /// Line box height.
    pub height: i32,
}

/// Width metrics supplied by the renderer.
pub trait TextMeasurer {
    /// Bounds of `text` drawn in `style`.
    fn measure_text(&self, text: &str, style: FontStyle) -> TextBounds;

    /// Width of one inter-word space in `style`.
    fn space_width(&self, style: FontStyle) -> i32 {
        self.measure_text(" ", style).width
    }
}

impl<T: TextMeasurer + ?Sized> TextMeasurer for &T {
    fn measure_text(&self, text: &str, style: FontStyle) -> TextBounds {
        (**self).measure_text(text, style)
    }

    fn space_width(&self, style: FontStyle) -> i32 {
        (**self).space_width(style)
    }
}

/// Cursor-and-print drawing surface supplied by the renderer.
pub trait TextDrawer {
    /// Error reported by the surface.
    type Error;

    /// Font style for subsequent prints.
    fn set_style(&mut self, style: FontStyle);
    /// Top-left corner of the next print.
    fn set_cursor(&mut self, x: i32, y: i32);
    /// Draw `text` at the cursor.
    fn print(&mut self, text: &str) -> Result<(), Self::Error>;
}

/// Page geometry and paragraph policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutConfig {
    /// Full page width.
    pub page_width: i32,
    /// Full page height.
    pub page_height: i32,
    /// Top margin.
    pub margin_top: i32,
    /// Right margin.
    pub margin_right: i32,
    /// Bottom margin.
    pub margin_bottom: i32,
    /// Left margin.
    pub margin_left: i32,
    /// Baseline-to-baseline advance.
    pub line_height: i32,
    /// Alignment for paragraphs without a marker.
    pub default_alignment: TextAlign,
    /// Extra gap after each paragraph.
    pub paragraph_spacing: i32,
    /// Band above the bottom margin reserved for a footer.
    pub footer_height: i32,
    /// Hyphenation language.
    pub hyphenation: Language,
    /// Fragment limits for hyphenation.
    pub hyphenation_params: HyphenationParams,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::for_display(480, 800)
    }
}

impl LayoutConfig {
    /// Defaults for a display of `width` x `height` pixels.
    pub fn for_display(width: i32, height: i32) -> Self {
        Self {
            page_width: width,
            page_height: height,
            margin_top: 16,
            margin_right: 16,
            margin_bottom: 16,
            margin_left: 16,
            line_height: 20,
            default_alignment: TextAlign::Left,
            paragraph_spacing: 8,
            footer_height: 0,
            hyphenation: Language::English,
            hyphenation_params: Language::English.defaults(),
        }
    }

    /// Same margin on all four sides.
    pub fn with_margins(mut self, margin: i32) -> Self {
        self.margin_top = margin;
        self.margin_right = margin;
        self.margin_bottom = margin;
        self.margin_left = margin;
        self
    }

    /// Override line height.
    pub fn with_line_height(mut self, line_height: i32) -> Self {
        self.line_height = line_height;
        self
    }

    /// Override paragraph spacing.
    pub fn with_paragraph_spacing(mut self, spacing: i32) -> Self {
        self.paragraph_spacing = spacing;
        self
    }

    /// Override default alignment.
    pub fn with_default_alignment(mut self, alignment: TextAlign) -> Self {
        self.default_alignment = alignment;
        self
    }

    /// Reserve a footer band.
    pub fn with_footer_height(mut self, footer_height: i32) -> Self {
        self.footer_height = footer_height;
        self
    }

    /// Select a hyphenation language with its recommended limits.
    pub fn with_hyphenation(mut self, language: Language) -> Self {
        self.hyphenation = language;
        self.hyphenation_params = language.defaults();
        self
    }

    /// Width available to a line.
    pub fn content_width(&self) -> i32 {
        (self.page_width - self.margin_left - self.margin_right).max(0)
    }

    /// Lowest y a line's bottom edge may reach.
    pub fn content_bottom(&self) -> i32 {
        self.page_height - self.margin_bottom - self.footer_height
    }

    /// Whether a line starting at `y` fits above the footer band.
    pub fn line_fits(&self, y: i32) -> bool {
        y + self.line_height <= self.content_bottom()
    }

    pub(crate) fn hyphenator(&self) -> Hyphenator {
        Hyphenator::new(self.hyphenation).with_params(self.hyphenation_params)
    }
}

/// A positioned run of text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedWord {
    /// Text to draw, with an inserted hyphen if the word was split.
    pub text: String,
    /// Font style.
    pub style: FontStyle,
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Measured width.
    pub width: i32,
}

/// One laid-out line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Line {
    /// Words left to right.
    pub words: SmallVec<[PlacedWord; 12]>,
    /// Top edge.
    pub y: i32,
    /// Alignment the line was placed with.
    pub alignment: TextAlign,
    /// Whether the line closes its paragraph.
    pub ends_paragraph: bool,
    /// Source index a page starting with this line would start at.
    pub start_position: usize,
}

impl Line {
    /// Text of the line with single spaces where gaps were placed.
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut prev_end: Option<i32> = None;
        for word in &self.words {
            if prev_end.is_some_and(|end| word.x > end) {
                out.push(' ');
            }
            out.push_str(&word.text);
            prev_end = Some(word.x + word.width);
        }
        out
    }

    /// Right edge of the last word.
    pub fn right_edge(&self) -> i32 {
        self.words.last().map_or(0, |w| w.x + w.width)
    }
}

/// One page produced by a layout pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageLayout {
    /// Lines top to bottom.
    pub lines: Vec<Line>,
    /// Source index the page starts at.
    pub start_position: usize,
    /// Source index to resume the next page from.
    pub end_position: usize,
    /// Whether the source was exhausted.
    pub at_end: bool,
}

impl PageLayout {
    /// Whether the page holds no words.
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.words.is_empty())
    }

    /// Page text, one line per `\n`.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (idx, line) in self.lines.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            out.push_str(&line.text());
        }
        out
    }

    /// Bottom edge of the last line.
    pub fn bottom(&self, config: &LayoutConfig) -> i32 {
        self.lines
            .last()
            .map_or(config.margin_top, |line| line.y + config.line_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_box_excludes_margins_and_footer() {
        let config = LayoutConfig::for_display(200, 300)
            .with_margins(10)
            .with_line_height(20)
            .with_footer_height(30);
        assert_eq!(config.content_width(), 180);
        assert_eq!(config.content_bottom(), 260);
        assert!(config.line_fits(240));
        assert!(!config.line_fits(241));
    }

    #[test]
    fn hyphenation_builder_applies_language_limits() {
        let config = LayoutConfig::default().with_hyphenation(Language::German);
        assert_eq!(config.hyphenation_params.min_word_length, 5);
        assert_eq!(config.hyphenator().language(), Language::German);
    }

    #[test]
    fn line_text_joins_gapped_words() {
        let word = |text: &str, x: i32| PlacedWord {
            text: text.to_string(),
            style: FontStyle::Regular,
            x,
            y: 0,
            width: text.len() as i32 * 10,
        };
        let line = Line {
            words: [word("ab", 0), word("cd", 20), word("ef", 50)]
                .into_iter()
                .collect(),
            ..Line::default()
        };
        assert_eq!(line.text(), "abcd ef");
        assert_eq!(line.right_edge(), 70);
    }
}
